//! # Secret Audit Module / 密钥审计模块
//!
//! Final pass of a run: every artifact the run produced is searched for every
//! secret value, base and derived. A hit in a regular artifact is a leak and
//! forces the leak outcome. Artifacts flagged redaction-exempt (pages echoing
//! test source) are still scanned, but their hits are only reported as
//! warnings.
//!
//! 运行的最后一步：在运行产生的每个产物中搜索每个密钥值（基础值与派生值）。
//! 普通产物中的命中即为泄漏，并强制运行结果为泄漏。
//! 标记为免于脱敏的产物（回显测试源码的页面）仍会被扫描，但其命中只作为警告报告。

use anyhow::{Context, Result};
use memchr::memmem::Finder;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::core::secrets::SecretSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    File(PathBuf),
    /// A stream that only ever existed in memory, e.g. captured stderr.
    Memory { label: String, bytes: Vec<u8> },
    /// A captured stream spooled to disk, reported under `label`.
    Spooled { label: String, path: PathBuf },
}

/// Anything produced by a run that must not carry secret values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub source: ArtifactSource,
    /// `true` only for artifacts that render test source, never resolved values.
    pub redaction_exempt: bool,
}

impl Artifact {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: ArtifactSource::File(path.into()),
            redaction_exempt: false,
        }
    }

    pub fn memory(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            source: ArtifactSource::Memory {
                label: label.into(),
                bytes: bytes.into(),
            },
            redaction_exempt: false,
        }
    }

    pub fn spooled(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source: ArtifactSource::Spooled {
                label: label.into(),
                path: path.into(),
            },
            redaction_exempt: false,
        }
    }

    pub fn exempt(mut self) -> Self {
        self.redaction_exempt = true;
        self
    }

    /// Human-readable identity used in leak reports.
    pub fn label(&self) -> String {
        match &self.source {
            ArtifactSource::File(path) => path.display().to_string(),
            ArtifactSource::Memory { label, .. } | ArtifactSource::Spooled { label, .. } => {
                label.clone()
            }
        }
    }

    fn bytes(&self) -> Result<std::borrow::Cow<'_, [u8]>> {
        match &self.source {
            ArtifactSource::File(path) | ArtifactSource::Spooled { path, .. } => fs::read(path)
                .map(std::borrow::Cow::Owned)
                .with_context(|| format!("Failed to read artifact {}", path.display())),
            ArtifactSource::Memory { bytes, .. } => Ok(std::borrow::Cow::Borrowed(bytes)),
        }
    }
}

/// One secret found in one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leak {
    pub artifact: String,
    pub secret: String,
    /// Byte offset of the first occurrence.
    pub offset: usize,
}

impl fmt::Display for Leak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "secret `{}` found in {} at byte {}",
            self.secret, self.artifact, self.offset
        )
    }
}

/// Result of one audit pass. Deterministic for a given secret set and artifact list.
/// 一次审计的结果。对给定的密钥集合和产物列表是确定的。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeakReport {
    pub leaks: Vec<Leak>,
    /// Hits inside redaction-exempt artifacts.
    pub exempt_hits: Vec<Leak>,
    pub scanned: usize,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// Searches every artifact for every secret value (case-sensitive, byte-exact).
///
/// Findings are ordered by artifact, then by secret (base secrets before
/// derived ones, each sorted by name). Unreadable files are an error: an
/// artifact that cannot be checked cannot be declared clean.
///
/// 在每个产物中搜索每个密钥值（区分大小写，按字节精确匹配）。
/// 无法读取的文件视为错误：无法检查的产物不能被判定为干净。
pub fn audit(secrets: &SecretSet, artifacts: &[Artifact]) -> Result<LeakReport> {
    let mut report = LeakReport::default();
    if secrets.is_empty() {
        report.scanned = artifacts.len();
        return Ok(report);
    }

    let finders: Vec<(&str, Finder<'_>)> = secrets
        .iter()
        .map(|(name, value)| (name, Finder::new(value.as_bytes())))
        .collect();

    for artifact in artifacts {
        let bytes = artifact.bytes()?;
        report.scanned += 1;
        for (name, finder) in &finders {
            let Some(offset) = finder.find(&bytes) else {
                continue;
            };
            let leak = Leak {
                artifact: artifact.label(),
                secret: name.to_string(),
                offset,
            };
            if artifact.redaction_exempt {
                tracing::warn!("{leak} (redaction-exempt artifact)");
                report.exempt_hits.push(leak);
            } else {
                tracing::debug!("{leak}");
                report.leaks.push(leak);
            }
        }
    }
    Ok(report)
}

