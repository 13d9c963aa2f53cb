//! # Secrets Module / 密钥模块
//!
//! The set of secret values that must never appear in a run's artifacts, and
//! the hooks that derive further sensitive values (encoded forms of a secret)
//! after units run.
//!
//! 绝不能出现在运行产物中的密钥值集合，以及在单元运行后派生出更多敏感值（密钥的编码形式）的钩子。

use anyhow::{Context, Result};
use base64::Engine as _;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::core::config::{HookConfig, SecretsConfig};
use crate::core::discovery::parse_env_lines;
use crate::core::models::{ExecutionResult, TestUnit};

/// Replacement text used when the runner prints anything containing a secret.
pub const REDACTED: &str = "***";

/// The process environment as `(name, value)` pairs. Entries that are not
/// valid Unicode are skipped, as they cannot name or carry a secret.
pub fn unicode_env() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os().filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
        (Ok(key), Ok(value)) => Some((key, value)),
        (Ok(key), Err(_)) => {
            tracing::debug!(variable = %key, "skipping environment variable with a non-UTF-8 value");
            None
        }
        (Err(key), _) => {
            tracing::debug!(variable = ?key, "skipping environment variable with a non-UTF-8 name");
            None
        }
    })
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("invalid secret `{0}`: expected NAME=VALUE")]
    Malformed(String),
    #[error("secret `{0}` has an empty value")]
    Empty(String),
    #[error("secret `{0}` is defined twice with different values")]
    Conflict(String),
    #[error("cannot read secrets file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: line {line} is not a NAME=VALUE pair")]
    FileLine { path: PathBuf, line: usize },
}

/// A sensitive value computed from a secret, e.g. its URL-encoded form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DerivedSecret {
    pub name: String,
    pub value: String,
}

/// Named secret values plus derived values.
///
/// The base values are fixed once the set is built. Derived values are only
/// added by taking a snapshot with [`SecretSet::with_derived`].
///
/// 命名的密钥值以及派生值。基础值在集合构建后即固定；派生值只能通过 `with_derived` 快照加入。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSet {
    values: BTreeMap<String, String>,
    derived: BTreeMap<String, String>,
}

impl SecretSet {
    pub fn builder() -> SecretSetBuilder {
        SecretSetBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .or_else(|| self.derived.get(name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len() + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.derived.is_empty()
    }

    /// Base secrets, sorted by name.
    pub fn base(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Base then derived secrets, each group sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.base()
            .chain(self.derived.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Returns a snapshot that also carries `derived`.
    pub fn with_derived(&self, derived: impl IntoIterator<Item = DerivedSecret>) -> SecretSet {
        let mut snapshot = self.clone();
        for secret in derived {
            if !secret.value.is_empty() {
                snapshot.derived.insert(secret.name, secret.value);
            }
        }
        snapshot
    }

    /// Masks every secret value in `text`, longest values first so that a
    /// secret containing another one is masked whole.
    pub fn redact(&self, text: &str) -> String {
        let mut values: Vec<&str> = self.iter().map(|(_, v)| v).collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        values.dedup();
        let mut redacted = text.to_string();
        for value in values {
            redacted = redacted.replace(value, REDACTED);
        }
        redacted
    }

    /// `[flag, "name=value", ...]` for handing base secrets to the program under test.
    pub fn forward_args(&self, flag: &str) -> Vec<String> {
        if flag.is_empty() {
            return Vec::new();
        }
        self.base()
            .flat_map(|(name, value)| [flag.to_string(), format!("{name}={value}")])
            .collect()
    }
}

/// Collects secrets from every configured source.
#[derive(Debug, Clone, Default)]
pub struct SecretSetBuilder {
    values: BTreeMap<String, String>,
}

impl SecretSetBuilder {
    /// Loads the runner's own sources in order: configured values, the secrets
    /// file, prefixed environment variables, then command-line pairs.
    ///
    /// 按顺序加载运行器自身的来源：配置值、密钥文件、带前缀的环境变量，然后是命令行键值对。
    pub fn from_sources(
        config: &SecretsConfig,
        cli_pairs: &[String],
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, SecretError> {
        let mut builder = Self::default();
        for (name, value) in &config.values {
            builder.insert(name.as_str(), value.as_str())?;
        }
        if let Some(file) = &config.file {
            builder.load_file(file)?;
        }
        builder.load_env(&config.env_prefix, vars)?;
        for pair in cli_pairs {
            builder.insert_pair(pair)?;
        }
        Ok(builder)
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, SecretError> {
        let name = name.into();
        let value = value.into();
        if value.is_empty() {
            return Err(SecretError::Empty(name));
        }
        match self.values.get(&name) {
            Some(existing) if *existing != value => return Err(SecretError::Conflict(name)),
            _ => {
                self.values.insert(name, value);
            }
        }
        Ok(self)
    }

    /// Adds a `NAME=VALUE` pair as given on the command line.
    pub fn insert_pair(&mut self, pair: &str) -> Result<&mut Self, SecretError> {
        let (name, value) = pair
            .split_once('=')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| SecretError::Malformed(pair.to_string()))?;
        self.insert(name, value)
    }

    /// Adds every `NAME=VALUE` line of a secrets file.
    pub fn load_file(&mut self, path: &Path) -> Result<&mut Self, SecretError> {
        let content = fs::read_to_string(path).map_err(|source| SecretError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let pairs = parse_env_lines(&content).map_err(|line| SecretError::FileLine {
            path: path.to_path_buf(),
            line,
        })?;
        for (name, value) in pairs {
            self.insert(name, value)?;
        }
        Ok(self)
    }

    /// Adds variables named `<prefix><NAME>` as secret `NAME`.
    pub fn load_env(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<&mut Self, SecretError> {
        if prefix.is_empty() {
            return Ok(self);
        }
        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(prefix).filter(|n| !n.is_empty()) {
                self.insert(name, value)?;
            }
        }
        Ok(self)
    }

    /// Picks up `flag name=value` and `flag=name=value` occurrences in a unit's options.
    pub fn harvest_options(&mut self, flag: &str, options: &[String]) -> Result<&mut Self, SecretError> {
        if flag.is_empty() {
            return Ok(self);
        }
        let inline = format!("{flag}=");
        let mut args = options.iter();
        while let Some(arg) = args.next() {
            if arg == flag {
                if let Some(pair) = args.next() {
                    self.insert_pair(pair)?;
                }
            } else if let Some(pair) = arg.strip_prefix(&inline) {
                self.insert_pair(pair)?;
            }
        }
        Ok(self)
    }

    pub fn build(self) -> SecretSet {
        SecretSet {
            values: self.values,
            derived: BTreeMap::new(),
        }
    }
}

/// Derives additional sensitive values after a unit runs.
///
/// Transform hooks encode every base secret the way the program under test
/// might; command hooks delegate to an external program.
///
/// 在单元运行后派生额外的敏感值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretHook {
    UrlEncode,
    Base64,
    Hex,
    Command { command: String },
}

impl From<&HookConfig> for SecretHook {
    fn from(config: &HookConfig) -> Self {
        match config {
            HookConfig::UrlEncode => SecretHook::UrlEncode,
            HookConfig::Base64 => SecretHook::Base64,
            HookConfig::Hex => SecretHook::Hex,
            HookConfig::Command { command } => SecretHook::Command {
                command: command.clone(),
            },
        }
    }
}

impl SecretHook {
    pub fn name(&self) -> &'static str {
        match self {
            SecretHook::UrlEncode => "url-encode",
            SecretHook::Base64 => "base64",
            SecretHook::Hex => "hex",
            SecretHook::Command { .. } => "command",
        }
    }

    fn transform(&self, value: &str) -> Option<String> {
        match self {
            SecretHook::UrlEncode => Some(urlencoding::encode(value).into_owned()),
            SecretHook::Base64 => Some(base64::engine::general_purpose::STANDARD.encode(value)),
            SecretHook::Hex => Some(hex::encode(value)),
            SecretHook::Command { .. } => None,
        }
    }

    /// Runs the hook for one finished unit.
    pub async fn after_unit(
        &self,
        unit: &TestUnit,
        result: &ExecutionResult,
        secrets: &SecretSet,
    ) -> Result<Vec<DerivedSecret>> {
        match self {
            SecretHook::Command { command } => run_command_hook(command, unit, result, secrets).await,
            _ => Ok(self.derive(secrets).unwrap_or_default()),
        }
    }

    /// Derived values that do not depend on any unit: the encoded forms of
    /// every base secret. `None` for command hooks.
    pub fn derive(&self, secrets: &SecretSet) -> Option<Vec<DerivedSecret>> {
        if matches!(self, SecretHook::Command { .. }) {
            return None;
        }
        Some(
            secrets
                .base()
                .filter_map(|(name, value)| {
                    let derived = self.transform(value)?;
                    (derived != value).then(|| DerivedSecret {
                        name: format!("{name}:{}", self.name()),
                        value: derived,
                    })
                })
                .collect(),
        )
    }
}

async fn run_command_hook(
    command: &str,
    unit: &TestUnit,
    result: &ExecutionResult,
    secrets: &SecretSet,
) -> Result<Vec<DerivedSecret>> {
    let parts = shlex::split(command)
        .filter(|parts| !parts.is_empty())
        .with_context(|| format!("Failed to parse hook command: {command}"))?;

    let mut child = tokio::process::Command::new(&parts[0])
        .args(&parts[1..])
        .env("FIXTURE_UNIT", &unit.input)
        .env(
            "FIXTURE_EXIT_CODE",
            result.exit_code.map(|c| c.to_string()).unwrap_or_default(),
        )
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to spawn hook command: {command}"))?;

    let input: String = secrets
        .base()
        .map(|(name, value)| format!("{name}={value}\n"))
        .collect();
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
    }
    let output = child.wait_with_output().await?;
    if !output.status.success() {
        anyhow::bail!("hook command `{command}` exited with {}", output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| match line.split_once('=') {
            Some((name, value)) if secrets.get(name).is_some() => DerivedSecret {
                name: format!("{name}:command"),
                value: value.to_string(),
            },
            _ => DerivedSecret {
                name: format!("command#{}", i + 1),
                value: line.to_string(),
            },
        })
        .collect())
}
