//! # Command-Line Interface Module / 命令行接口模块
//!
//! Builds the `fixture-runner` command line with clap's builder API, with
//! help texts localized through rust-i18n, and dispatches to the `run`,
//! `init` and `audit` commands. Every path returns the process exit code.
//!
//! 使用 clap 构建器 API 构建 `fixture-runner` 命令行，帮助文本通过 rust-i18n 本地化，
//! 并分发到 `run`、`init` 和 `audit` 命令。每条路径都返回进程退出码。

pub mod commands;

use anyhow::Result;
use clap::{error::ErrorKind, Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::core::config::DEFAULT_CONFIG_FILE;
use crate::core::models::ORCHESTRATOR_ERROR_EXIT_CODE;
use crate::infra::t;
use commands::{audit::AuditArgs, run::RunArgs};

/// Pre-parses the command line arguments to find the language setting.
/// This allows i18n to be initialized before the full CLI is built.
/// It looks for a `--lang <VALUE>` or `--lang=<VALUE>` argument.
fn pre_parse_language() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    if let Some(lang) = args.iter().find_map(|arg| arg.strip_prefix("--lang=")) {
        return Some(lang.to_string());
    }
    let pos = args.iter().position(|arg| arg == "--lang")?;
    args.get(pos + 1).cloned()
}

fn config_arg(locale: &str) -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .help(t!("arg.config", locale = locale).to_string())
        .value_name("CONFIG")
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

fn secret_args(locale: &str) -> [Arg; 3] {
    [
        Arg::new("secret")
            .long("secret")
            .help(t!("arg.secret", locale = locale).to_string())
            .value_name("NAME=VALUE")
            .action(ArgAction::Append),
        Arg::new("secrets-file")
            .long("secrets-file")
            .help(t!("arg.secrets_file", locale = locale).to_string())
            .value_name("FILE")
            .value_parser(clap::value_parser!(PathBuf))
            .action(ArgAction::Set),
        Arg::new("secret-env-prefix")
            .long("secret-env-prefix")
            .help(t!("arg.secret_env_prefix", locale = locale).to_string())
            .value_name("PREFIX")
            .action(ArgAction::Set),
    ]
}

fn path_arg(id: &'static str, help: &str, value_name: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help.to_string())
        .value_name(value_name)
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
}

/// Builds the full command tree.
pub fn build_cli(locale: &str) -> Command {
    Command::new("fixture-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("arg.lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help(t!("arg.verbose", locale = locale).to_string())
                .global(true)
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("color")
                .long("color")
                .help(t!("arg.color", locale = locale).to_string())
                .value_name("WHEN")
                .value_parser(["auto", "always", "never"])
                .default_value("auto")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cmd.run_about", locale = locale).to_string())
                .arg(
                    Arg::new("roots")
                        .help(t!("arg.roots", locale = locale).to_string())
                        .value_name("ROOTS")
                        .num_args(0..)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("global-options")
                        .help(t!("arg.global_options", locale = locale).to_string())
                        .value_name("GLOBAL_OPTIONS")
                        .num_args(1..)
                        .last(true)
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                )
                .arg(config_arg(locale))
                .arg(
                    Arg::new("program")
                        .long("program")
                        .help(t!("arg.program", locale = locale).to_string())
                        .value_name("PROGRAM")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("pattern")
                        .long("pattern")
                        .help(t!("arg.pattern", locale = locale).to_string())
                        .value_name("GLOB")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("jobs")
                        .short('j')
                        .long("jobs")
                        .help(t!("arg.jobs", locale = locale).to_string())
                        .value_name("JOBS")
                        .value_parser(clap::value_parser!(usize))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("repeat")
                        .long("repeat")
                        .help(t!("arg.repeat", locale = locale).to_string())
                        .value_name("COUNT")
                        .value_parser(clap::value_parser!(u32).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .help(t!("arg.fail_fast", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help(t!("arg.timeout", locale = locale).to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("run-timeout")
                        .long("run-timeout")
                        .help(t!("arg.run_timeout", locale = locale).to_string())
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .action(ArgAction::Set),
                )
                .arg(path_arg("work-dir", &t!("arg.work_dir", locale = locale), "DIR"))
                .arg(path_arg("artifacts-dir", &t!("arg.artifacts_dir", locale = locale), "DIR"))
                .arg(path_arg("report-junit", &t!("arg.report_junit", locale = locale), "FILE"))
                .arg(path_arg("report-tap", &t!("arg.report_tap", locale = locale), "FILE"))
                .arg(path_arg("report-json", &t!("arg.report_json", locale = locale), "FILE"))
                .arg(path_arg("report-html", &t!("arg.report_html", locale = locale), "DIR"))
                .arg(
                    Arg::new("append")
                        .long("append")
                        .help(t!("arg.append", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .args(secret_args(locale))
                .arg(
                    Arg::new("audit-dir")
                        .long("audit-dir")
                        .help(t!("arg.audit_dir", locale = locale).to_string())
                        .value_name("DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cmd.init_about", locale = locale).to_string())
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("arg.non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("arg.output", locale = locale).to_string())
                        .value_name("PATH")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("arg.force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about(t!("cmd.audit_about", locale = locale).to_string())
                .arg(
                    Arg::new("paths")
                        .help(t!("arg.audit_paths", locale = locale).to_string())
                        .value_name("PATH")
                        .required(true)
                        .num_args(1..)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Append),
                )
                .arg(config_arg(locale))
                .args(secret_args(locale)),
        )
}

/// Initializes diagnostics on stderr. `RUST_LOG` wins over `-v`.
fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .try_init();
}

fn apply_color(choice: &str) {
    match choice {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => {
            if env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
                colored::control::set_override(false);
            }
        }
    }
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn paths(matches: &ArgMatches, id: &str) -> Vec<PathBuf> {
    matches
        .get_many::<PathBuf>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn config_path(matches: &ArgMatches) -> (PathBuf, bool) {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

/// Parses the command line, runs the selected command and returns the exit code.
///
/// 解析命令行，运行所选命令并返回退出码。
pub async fn run() -> Result<u8> {
    // Pre-parse language and initialize i18n first.
    let requested = pre_parse_language();
    let language = crate::select_locale(
        requested
            .clone()
            .or_else(sys_locale::get_locale)
            .as_deref()
            .unwrap_or("en"),
    );
    rust_i18n::set_locale(&language);

    let matches = match build_cli(&language).try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => ORCHESTRATOR_ERROR_EXIT_CODE,
            };
            e.print()?;
            return Ok(code);
        }
    };

    init_tracing(matches.get_count("verbose"));
    apply_color(
        matches
            .get_one::<String>("color")
            .map(String::as_str)
            .unwrap_or("auto"),
    );

    match matches.subcommand() {
        Some(("run", m)) => {
            let (config, config_explicit) = config_path(m);
            let args = RunArgs {
                config,
                config_explicit,
                language: requested,
                roots: paths(m, "roots"),
                global_options: strings(m, "global-options"),
                program: m.get_one::<String>("program").cloned(),
                pattern: m.get_one::<String>("pattern").cloned(),
                jobs: m.get_one::<usize>("jobs").copied(),
                repeat: m.get_one::<u32>("repeat").copied(),
                fail_fast: m.get_flag("fail-fast"),
                timeout_secs: m.get_one::<u64>("timeout").copied(),
                run_timeout_secs: m.get_one::<u64>("run-timeout").copied(),
                work_dir: m.get_one::<PathBuf>("work-dir").cloned(),
                artifacts_dir: m.get_one::<PathBuf>("artifacts-dir").cloned(),
                report_junit: m.get_one::<PathBuf>("report-junit").cloned(),
                report_tap: m.get_one::<PathBuf>("report-tap").cloned(),
                report_json: m.get_one::<PathBuf>("report-json").cloned(),
                report_html: m.get_one::<PathBuf>("report-html").cloned(),
                append: m.get_flag("append"),
                secrets: strings(m, "secret"),
                secrets_file: m.get_one::<PathBuf>("secrets-file").cloned(),
                secret_env_prefix: m.get_one::<String>("secret-env-prefix").cloned(),
                audit_dirs: paths(m, "audit-dir"),
            };
            commands::run::execute(args).await
        }
        Some(("init", m)) => {
            let non_interactive = m.get_flag("non-interactive");
            let output = m
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            commands::init::run_init_wizard(&output, &language, non_interactive, m.get_flag("force"))?;
            Ok(0)
        }
        Some(("audit", m)) => {
            let (config, config_explicit) = config_path(m);
            let args = AuditArgs {
                paths: paths(m, "paths"),
                config,
                config_explicit,
                language: requested,
                secrets: strings(m, "secret"),
                secrets_file: m.get_one::<PathBuf>("secrets-file").cloned(),
                secret_env_prefix: m.get_one::<String>("secret-env-prefix").cloned(),
            };
            commands::audit::execute(args)
        }
        _ => Ok(ORCHESTRATOR_ERROR_EXIT_CODE),
    }
}
