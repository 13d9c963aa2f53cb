//! # Configuration Module / 配置模块
//!
//! Parses `FixtureRunner.toml`. Every key is optional; command-line flags
//! override whatever the file says.
//!
//! 解析 `FixtureRunner.toml`。所有键都是可选的；命令行参数会覆盖文件中的值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "FixtureRunner.toml";

/// Default environment variable prefix for secret injection.
pub const DEFAULT_SECRET_ENV_PREFIX: &str = "FIXTURE_SECRET_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to expand `{value}`: {message}")]
    Expand { value: String, message: String },
    #[error("invalid value for `{key}`: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Report output locations.
/// 报告输出位置。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub junit: Option<PathBuf>,
    pub tap: Option<PathBuf>,
    pub json: Option<PathBuf>,
    /// Directory receiving `index.html` and the per-unit pages.
    pub html: Option<PathBuf>,
    /// Merge into an existing JSON report instead of truncating it.
    pub append: bool,
}

/// A derived-secret hook as configured in the `[[secrets.hooks]]` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
pub enum HookConfig {
    UrlEncode,
    Base64,
    Hex,
    /// External program reading `NAME=VALUE` lines on stdin and printing one
    /// derived value per line.
    Command { command: String },
}

/// Secret sources and audit scope.
/// 密钥来源与审计范围。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecretsConfig {
    /// Inline `name = "value"` pairs.
    pub values: std::collections::BTreeMap<String, String>,
    /// A file of `NAME=VALUE` lines.
    pub file: Option<PathBuf>,
    pub env_prefix: String,
    /// Flag used to hand each secret to the program under test, e.g. `--secret`.
    /// Also used to harvest secrets from unit option companions. Empty disables both.
    pub forward_flag: String,
    /// Extra directories whose files are audited after the run.
    pub audit_dirs: Vec<PathBuf>,
    pub hooks: Vec<HookConfig>,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            values: Default::default(),
            file: None,
            env_prefix: DEFAULT_SECRET_ENV_PREFIX.to_string(),
            forward_flag: "--secret".to_string(),
            audit_dirs: Vec::new(),
            hooks: Vec::new(),
        }
    }
}

/// The whole runner configuration, loaded from a TOML file.
///
/// 从 TOML 文件加载的完整运行器配置。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言（例如 "en", "zh-CN"）。
    pub language: Option<String>,
    /// The program under test.
    pub program: String,
    /// Fixture root directories.
    pub roots: Vec<PathBuf>,
    /// Glob matched against paths relative to each root.
    pub pattern: String,
    /// Arguments passed to every unit, before the unit's own options.
    pub global_options: Vec<String>,
    /// Worker count. 1 runs sequentially, 0 means one per CPU.
    pub jobs: usize,
    pub repeat: u32,
    pub fail_fast: bool,
    /// Per-unit deadline.
    pub timeout_secs: u64,
    pub run_timeout_secs: Option<u64>,
    /// Working directory of every spawned process.
    pub work_dir: PathBuf,
    /// Where units are expected to write the artifacts checked by `<stem>.<ext>` companions.
    pub artifacts_dir: PathBuf,
    pub artifact_extensions: Vec<String>,
    /// Bytes of stdout/stderr kept per unit for HTML store pages.
    pub max_transcript_bytes: usize,
    pub reports: ReportConfig,
    pub secrets: SecretsConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            language: None,
            program: "hurl".to_string(),
            roots: vec![PathBuf::from("tests")],
            pattern: "**/*.input".to_string(),
            global_options: Vec::new(),
            jobs: 1,
            repeat: 1,
            fail_fast: false,
            timeout_secs: 60,
            run_timeout_secs: None,
            work_dir: PathBuf::from("."),
            artifacts_dir: PathBuf::from("build"),
            artifact_extensions: vec!["html".to_string(), "json".to_string()],
            max_transcript_bytes: 64 * 1024,
            reports: ReportConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validates values that serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "program",
                message: "must not be empty".to_string(),
            });
        }
        if self.repeat == 0 {
            return Err(ConfigError::Invalid {
                key: "repeat",
                message: "must be at least 1".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.roots.is_empty() {
            return Err(ConfigError::Invalid {
                key: "roots",
                message: "at least one fixture root is required".to_string(),
            });
        }
        if self.reports.append && self.reports.json.is_none() {
            return Err(ConfigError::Invalid {
                key: "reports.append",
                message: "append mode needs a JSON report path to merge into".to_string(),
            });
        }
        Ok(())
    }

    /// Resolved worker count (`0` means one per CPU).
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 { num_cpus::get() } else { self.jobs }
    }

    /// Paths of every report file or directory this configuration writes.
    pub fn report_paths(&self) -> Vec<&Path> {
        [
            self.reports.junit.as_deref(),
            self.reports.tap.as_deref(),
            self.reports.json.as_deref(),
            self.reports.html.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Loads the configuration file.
///
/// When `path` is the default file name and does not exist, built-in defaults
/// are returned; an explicitly named file must exist.
///
/// 加载配置文件。若使用默认文件名且文件不存在，则返回内置默认值；显式指定的文件必须存在。
pub fn load_run_config(path: &Path, explicit: bool) -> Result<RunConfig, ConfigError> {
    if !explicit && !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(RunConfig::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    RunConfig::from_toml(path, &content)
}

/// Expands `~` and `$VAR` in a configured path.
pub fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| ConfigError::Expand {
        value: raw.to_string(),
        message: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
