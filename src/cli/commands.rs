//! # Commands Module / 命令模块
//!
//! One module per subcommand, plus the configuration and locale handling
//! they share.
//!
//! 每个子命令一个模块，以及它们共享的配置与语言环境处理。

pub mod audit;
pub mod init;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;

use crate::core::config::{load_run_config, RunConfig};
use crate::infra::t;

/// Loads the configuration file and settles the output language.
///
/// `--lang` beats the config `language` key, which beats the system locale.
pub(crate) fn load_config(
    path: &Path,
    explicit: bool,
    requested_language: Option<&str>,
) -> Result<(RunConfig, String)> {
    let config = load_run_config(path, explicit)
        .with_context(|| t!("config.load_failed", path = path.display()).to_string())?;

    let locale = match requested_language.or(config.language.as_deref()) {
        Some(language) => crate::select_locale(language),
        None => rust_i18n::locale().to_string(),
    };
    rust_i18n::set_locale(&locale);
    Ok((config, locale))
}
