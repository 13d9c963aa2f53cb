//! # Configuration Initialization Module / 配置初始化模块
//!
//! This module provides the `init` command: an interactive wizard that writes
//! a `FixtureRunner.toml` file, or the built-in defaults when run with
//! `--non-interactive`.
//!
//! 此模块提供 `init` 命令：一个交互式向导，用于写入 `FixtureRunner.toml` 文件；
//! 使用 `--non-interactive` 时写入内置默认值。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: Step-by-step prompts for the program, roots, workers and reports
//! - **Overwrite Protection**: Confirmation prompt before overwriting an existing configuration
//!
//! - **交互式向导**: 逐步提示被测程序、根目录、工作者数量和报告
//! - **覆盖保护**: 覆盖现有配置前的确认提示

use anyhow::{bail, Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect};
use std::path::{Path, PathBuf};

use crate::core::config::RunConfig;
use crate::infra::{fs::write_atomic, t};

const HEADER: &str = "# Fixture runner configuration / 夹具运行器配置\n\
# Every key is optional; command-line flags override these values.\n\
# 所有键都是可选的；命令行参数会覆盖这些值。\n\n";

/// Renders a configuration as commented TOML.
pub fn render_config(config: &RunConfig) -> Result<String> {
    let body = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    Ok(format!("{HEADER}{body}"))
}

/// Runs the interactive wizard (or writes defaults) to create the config file.
///
/// 运行交互式向导（或写入默认值）以创建配置文件。
///
/// # Arguments
/// * `output` - Path of the configuration file to write
/// * `language` - The language for prompts and messages
/// * `non_interactive` - Write the defaults without prompting
/// * `force` - Overwrite an existing file without asking
pub fn run_init_wizard(output: &Path, language: &str, non_interactive: bool, force: bool) -> Result<()> {
    let theme = ColorfulTheme::default();

    if non_interactive {
        if output.exists() && !force {
            bail!(t!("init.file_exists", locale = language, path = output.display()).to_string());
        }
        let config = RunConfig {
            language: Some(language.to_string()),
            ..RunConfig::default()
        };
        return write_config(output, &config, language);
    }

    println!("\n{}", t!("init.welcome", locale = language).cyan().bold());
    println!("{}", t!("init.description", locale = language));

    if output.exists() && !force {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = output.display()))
            .default(false)
            .interact()
            .context(t!("init.confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let defaults = RunConfig::default();

    let program: String = Input::with_theme(&theme)
        .with_prompt(t!("init.program_prompt", locale = language))
        .default(defaults.program.clone())
        .interact_text()?;

    let roots: String = Input::with_theme(&theme)
        .with_prompt(t!("init.roots_prompt", locale = language))
        .default("tests".to_string())
        .interact_text()?;

    let jobs: usize = Input::with_theme(&theme)
        .with_prompt(t!("init.jobs_prompt", locale = language))
        .default(defaults.jobs)
        .interact_text()?;

    let formats = [
        ("junit", "build/report/junit.xml"),
        ("tap", "build/report/report.tap"),
        ("json", "build/report/report.json"),
        ("html", "build/report/html"),
    ];
    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init.reports_prompt", locale = language))
        .items(&formats.iter().map(|(name, path)| format!("{name} ({path})")).collect::<Vec<_>>())
        .interact()
        .context(t!("init.confirmation_failed", locale = language).to_string())?;

    let mut config = RunConfig {
        language: Some(language.to_string()),
        program,
        roots: roots
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(PathBuf::from)
            .collect(),
        jobs,
        ..defaults
    };
    for i in selections {
        let (name, path) = formats[i];
        let path = Some(PathBuf::from(path));
        match name {
            "junit" => config.reports.junit = path,
            "tap" => config.reports.tap = path,
            "json" => config.reports.json = path,
            _ => config.reports.html = path,
        }
    }

    write_config(output, &config, language)
}

fn write_config(path: &Path, config: &RunConfig, language: &str) -> Result<()> {
    config.validate()?;
    let content = render_config(config)?;
    write_atomic(path, content.as_bytes())
        .with_context(|| t!("init.write_failed", locale = language, path = path.display()).to_string())?;
    println!(
        "{}",
        t!("init.success", locale = language, path = path.display()).green()
    );
    println!("{}", t!("init.next_steps", locale = language));
    Ok(())
}
