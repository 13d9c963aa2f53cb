//! # Audit Command Module / 审计命令模块
//!
//! Standalone secret audit over existing files and directories, using the
//! same secret sources as `run`.
//!
//! 使用与 `run` 相同的密钥来源，对现有文件和目录进行独立的密钥审计。

use anyhow::{Context, Result};
use colored::*;
use std::path::PathBuf;

use crate::{
    core::{
        audit::audit,
        config::expand_path,
        models::RunOutcome,
        secrets::{unicode_env, SecretHook, SecretSetBuilder},
    },
    infra::t,
    reporting::{console::print_leak_report, dir_artifacts, file_artifact},
};

#[derive(Debug, Clone, Default)]
pub struct AuditArgs {
    pub paths: Vec<PathBuf>,
    pub config: PathBuf,
    pub config_explicit: bool,
    pub language: Option<String>,
    pub secrets: Vec<String>,
    pub secrets_file: Option<PathBuf>,
    pub secret_env_prefix: Option<String>,
}

/// Audits `args.paths` and returns 0 when clean or the leak exit code.
pub fn execute(args: AuditArgs) -> Result<u8> {
    let (mut config, locale) =
        super::load_config(&args.config, args.config_explicit, args.language.as_deref())?;
    if let Some(file) = &args.secrets_file {
        config.secrets.file = Some(file.clone());
    }
    if let Some(prefix) = &args.secret_env_prefix {
        config.secrets.env_prefix = prefix.clone();
    }
    if let Some(file) = &config.secrets.file {
        config.secrets.file = Some(expand_path(file)?);
    }

    let base = SecretSetBuilder::from_sources(&config.secrets, &args.secrets, unicode_env())
        .context(t!("run.secrets_failed", locale = locale).to_string())?
        .build();
    if base.is_empty() {
        println!("{}", t!("audit.no_secrets", locale = locale).yellow());
        return Ok(RunOutcome::Success.exit_code());
    }

    let mut derived = Vec::new();
    for hook in config.secrets.hooks.iter().map(SecretHook::from) {
        match hook.derive(&base) {
            Some(values) => derived.extend(values),
            None => tracing::info!(hook = hook.name(), "unit hook skipped by standalone audit"),
        }
    }
    let secrets = base.with_derived(derived);

    let mut artifacts = Vec::new();
    for path in &args.paths {
        let path = expand_path(path)?;
        if path.is_dir() {
            artifacts.extend(dir_artifacts(&path)?);
        } else {
            artifacts.push(file_artifact(&path));
        }
    }

    let leaks = audit(&secrets, &artifacts)?;
    print_leak_report(&leaks, &locale);
    Ok(if leaks.is_clean() {
        RunOutcome::Success.exit_code()
    } else {
        RunOutcome::Leak.exit_code()
    })
}
