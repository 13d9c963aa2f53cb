//! # Reporting Module / 报告模块
//!
//! This module renders a [`RunReport`] into the machine-readable formats
//! (JUnit XML, TAP, JSON, HTML) and prints colorful summaries to the console
//! with internationalization support. Every renderer is a pure function of
//! the report; [`write_reports`] writes the configured files and returns them
//! as artifacts for the secret audit.
//!
//! 此模块将 [`RunReport`] 渲染为机器可读的格式（JUnit XML、TAP、JSON、HTML），
//! 并在控制台打印彩色摘要，支持国际化。每个渲染器都是报告的纯函数；
//! [`write_reports`] 写入配置的文件，并将其作为产物返回给密钥审计。

pub mod console;
pub mod html;
pub mod json;
pub mod junit;
pub mod tap;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::{audit::Artifact, config::ReportConfig, models::RunReport};
use crate::infra::fs::{files_under, write_atomic};

// Re-export common reporting functions
pub use console::{print_failure_details, print_leak_report, print_summary};
pub use html::{is_source_page, load_sources, SourceMap};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot read report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report {path} is not a valid JSON report: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes every configured report and returns the written files as artifacts.
///
/// HTML source pages are returned flagged redaction-exempt.
///
/// 写入每个已配置的报告，并将写入的文件作为产物返回。
pub fn write_reports(
    report: &RunReport,
    config: &ReportConfig,
    sources: &SourceMap,
    locale: &str,
) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::new();

    if let Some(path) = &config.junit {
        let content = junit::render(report).context("Failed to render JUnit report")?;
        write_atomic(path, content.as_bytes())?;
        artifacts.push(Artifact::file(path));
    }
    if let Some(path) = &config.tap {
        write_atomic(path, tap::render(report).as_bytes())?;
        artifacts.push(Artifact::file(path));
    }
    if let Some(path) = &config.json {
        let content = json::render(report).context("Failed to serialize JSON report")?;
        write_atomic(path, content.as_bytes())?;
        artifacts.push(Artifact::file(path));
    }
    if let Some(dir) = &config.html {
        for page in html::render(report, sources, locale) {
            let path = dir.join(&page.file_name);
            write_atomic(&path, &page.bytes)?;
            let artifact = Artifact::file(path);
            artifacts.push(if page.redaction_exempt {
                artifact.exempt()
            } else {
                artifact
            });
        }
    }

    tracing::info!(count = artifacts.len(), "reports written");
    Ok(artifacts)
}

/// An existing file as an audit artifact, exempt when it is an HTML source
/// page, the same way [`write_reports`] flags the pages it writes.
pub fn file_artifact(path: &Path) -> Artifact {
    let artifact = Artifact::file(path);
    if is_source_page(path) {
        artifact.exempt()
    } else {
        artifact
    }
}

/// Every file under `dir` in path order, classified by [`file_artifact`].
pub fn dir_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    Ok(files_under(dir)?.iter().map(|file| file_artifact(file)).collect())
}
