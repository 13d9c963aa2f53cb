//! # Configuration Module Unit Tests / 配置模块单元测试
//!
//! Tests for parsing, defaults and validation of `FixtureRunner.toml`.
//!
//! 测试 `FixtureRunner.toml` 的解析、默认值和校验。

use fixture_runner::cli::commands::init::render_config;
use fixture_runner::core::config::{
    expand_path, load_run_config, ConfigError, HookConfig, ReportConfig, RunConfig,
    DEFAULT_SECRET_ENV_PREFIX,
};
use std::fs;
use std::path::{Path, PathBuf};

#[test]
fn test_defaults() {
    let config = RunConfig::default();
    assert_eq!(config.program, "hurl");
    assert_eq!(config.pattern, "**/*.input");
    assert_eq!(config.jobs, 1);
    assert_eq!(config.repeat, 1);
    assert!(!config.fail_fast);
    assert_eq!(config.secrets.env_prefix, DEFAULT_SECRET_ENV_PREFIX);
    assert_eq!(config.secrets.forward_flag, "--secret");
    assert!(config.report_paths().is_empty());
    assert_eq!(config.reports, ReportConfig::default());
    config.validate().unwrap();
}

#[test]
fn test_full_configuration() {
    let content = r#"
language = "zh-CN"
program = "./target/debug/hurl"
roots = ["integration/tests_ok", "integration/tests_failed"]
pattern = "**/*.hurl"
global_options = ["--verbose"]
jobs = 4
repeat = 2
fail_fast = true
timeout_secs = 30
run_timeout_secs = 600
artifacts_dir = "build"
artifact_extensions = ["html"]

[reports]
junit = "build/report/junit.xml"
tap = "build/report/report.tap"
json = "build/report/report.json"
html = "build/report/html"
append = true

[secrets]
env_prefix = "HURL_SECRET_"
audit_dirs = ["build/cookies"]

[secrets.values]
token = "s3cr3t"

[[secrets.hooks]]
kind = "url-encode"

[[secrets.hooks]]
kind = "command"
command = "./derive.sh"
"#;
    let config = RunConfig::from_toml(Path::new("FixtureRunner.toml"), content).unwrap();
    config.validate().unwrap();

    assert_eq!(config.language.as_deref(), Some("zh-CN"));
    assert_eq!(config.roots.len(), 2);
    assert_eq!(config.effective_jobs(), 4);
    assert_eq!(config.run_timeout_secs, Some(600));
    assert_eq!(config.reports.json, Some(PathBuf::from("build/report/report.json")));
    assert_eq!(config.report_paths().len(), 4);
    assert_eq!(config.secrets.values.get("token").map(String::as_str), Some("s3cr3t"));
    assert_eq!(
        config.secrets.hooks,
        vec![
            HookConfig::UrlEncode,
            HookConfig::Command {
                command: "./derive.sh".to_string()
            }
        ]
    );
}

#[test]
fn test_unknown_keys_are_rejected() {
    let result = RunConfig::from_toml(Path::new("x.toml"), "progam = \"typo\"\n");
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[test]
fn test_invalid_toml_is_rejected() {
    let result = RunConfig::from_toml(Path::new("x.toml"), "[reports\njunit = 1\n");
    assert!(matches!(result, Err(ConfigError::Parse { .. })));
}

#[test]
fn test_validation() {
    let invalid = |config: RunConfig| match config.validate() {
        Err(ConfigError::Invalid { key, .. }) => key,
        other => panic!("expected a validation error, got {other:?}"),
    };

    assert_eq!(
        invalid(RunConfig {
            repeat: 0,
            ..RunConfig::default()
        }),
        "repeat"
    );
    assert_eq!(
        invalid(RunConfig {
            program: " ".to_string(),
            ..RunConfig::default()
        }),
        "program"
    );
    assert_eq!(
        invalid(RunConfig {
            roots: Vec::new(),
            ..RunConfig::default()
        }),
        "roots"
    );

    let mut append_without_json = RunConfig::default();
    append_without_json.reports.append = true;
    assert_eq!(invalid(append_without_json), "reports.append");
}

#[test]
fn test_zero_jobs_means_one_per_cpu() {
    let config = RunConfig {
        jobs: 0,
        ..RunConfig::default()
    };
    assert!(config.effective_jobs() >= 1);
}

#[test]
fn test_missing_default_file_yields_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("FixtureRunner.toml");
    assert_eq!(load_run_config(&path, false).unwrap(), RunConfig::default());
    assert!(matches!(
        load_run_config(&path, true),
        Err(ConfigError::Read { .. })
    ));
}

#[test]
fn test_load_from_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.toml");
    fs::write(&path, "program = \"curl\"\njobs = 3\n").unwrap();
    let config = load_run_config(&path, true).unwrap();
    assert_eq!(config.program, "curl");
    assert_eq!(config.jobs, 3);
    assert_eq!(config.repeat, 1);
}

#[test]
fn test_expand_path() {
    assert_eq!(
        expand_path(Path::new("plain/path")).unwrap(),
        PathBuf::from("plain/path")
    );
    assert!(matches!(
        expand_path(Path::new("$FIXTURE_RUNNER_TEST_UNSET_VARIABLE/x")),
        Err(ConfigError::Expand { .. })
    ));
}

#[test]
fn test_rendered_config_parses_back() {
    let mut config = RunConfig::default();
    config.language = Some("en".to_string());
    config.reports.junit = Some(PathBuf::from("build/junit.xml"));
    config.secrets.hooks.push(HookConfig::Base64);

    let rendered = render_config(&config).unwrap();
    assert!(rendered.starts_with('#'));
    let parsed = RunConfig::from_toml(Path::new("FixtureRunner.toml"), &rendered).unwrap();
    assert_eq!(parsed, config);
}
