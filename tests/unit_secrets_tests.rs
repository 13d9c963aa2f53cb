//! # Secrets Module Unit Tests / Secrets 模块单元测试
//!
//! Tests for collecting secrets from their sources, redaction and the
//! derived-secret hooks.
//!
//! 测试从各来源收集密钥、脱敏以及派生密钥钩子。

use chrono::Utc;
use fixture_runner::core::config::SecretsConfig;
use fixture_runner::core::models::{CommandLine, ExecutionResult, TestUnit};
use fixture_runner::core::secrets::{
    DerivedSecret, SecretError, SecretHook, SecretSet, SecretSetBuilder, REDACTED,
};
use std::fs;
use std::time::Duration;

fn secrets(pairs: &[(&str, &str)]) -> SecretSet {
    let mut builder = SecretSet::builder();
    for (name, value) in pairs {
        builder.insert(*name, *value).unwrap();
    }
    builder.build()
}

fn finished() -> ExecutionResult {
    ExecutionResult {
        command: CommandLine {
            program: "tool".to_string(),
            args: vec![],
        },
        stdout: Vec::new(),
        stderr: Vec::new(),
        exit_code: Some(0),
        duration: Duration::ZERO,
        started_at: Utc::now(),
        fault: None,
    }
}

#[test]
fn test_same_value_twice_is_accepted() {
    let mut builder = SecretSetBuilder::default();
    builder.insert("token", "abc").unwrap();
    builder.insert("token", "abc").unwrap();
    assert_eq!(builder.build().len(), 1);
}

#[test]
fn test_conflicting_values_are_rejected() {
    let mut builder = SecretSetBuilder::default();
    builder.insert("token", "abc").unwrap();
    assert!(matches!(
        builder.insert("token", "xyz"),
        Err(SecretError::Conflict(name)) if name == "token"
    ));
}

#[test]
fn test_empty_values_and_malformed_pairs_are_rejected() {
    let mut builder = SecretSetBuilder::default();
    assert!(matches!(builder.insert("token", ""), Err(SecretError::Empty(_))));
    assert!(matches!(builder.insert_pair("no-equals"), Err(SecretError::Malformed(_))));
    assert!(matches!(builder.insert_pair("=value"), Err(SecretError::Malformed(_))));
    builder.insert_pair("key=a=b").unwrap();
    assert_eq!(builder.build().get("key"), Some("a=b"));
}

#[test]
fn test_load_env_uses_prefix() {
    let vars = vec![
        ("FIXTURE_SECRET_token".to_string(), "abc".to_string()),
        ("FIXTURE_SECRET_".to_string(), "ignored".to_string()),
        ("PATH".to_string(), "/usr/bin".to_string()),
    ];
    let mut builder = SecretSetBuilder::default();
    builder.load_env("FIXTURE_SECRET_", vars).unwrap();
    let set = builder.build();
    assert_eq!(set.len(), 1);
    assert_eq!(set.get("token"), Some("abc"));
}

#[test]
fn test_load_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("secrets.env");
    fs::write(&path, "# secrets\napi_key=k-123\n\npassword=hunter2\n").unwrap();

    let mut builder = SecretSetBuilder::default();
    builder.load_file(&path).unwrap();
    let set = builder.build();
    assert_eq!(set.get("api_key"), Some("k-123"));
    assert_eq!(set.get("password"), Some("hunter2"));

    fs::write(&path, "api_key=k-123\nbroken line\n").unwrap();
    let mut builder = SecretSetBuilder::default();
    assert!(matches!(
        builder.load_file(&path),
        Err(SecretError::FileLine { line: 2, .. })
    ));
    assert!(matches!(
        SecretSetBuilder::default().load_file(&temp.path().join("missing")),
        Err(SecretError::Read { .. })
    ));
}

#[test]
fn test_from_sources_combines_every_source() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("secrets.env");
    fs::write(&file, "from_file=f\n").unwrap();

    let mut config = SecretsConfig::default();
    config.values.insert("from_config".to_string(), "c".to_string());
    config.file = Some(file);
    let vars = vec![("FIXTURE_SECRET_from_env".to_string(), "e".to_string())];

    let set = SecretSetBuilder::from_sources(&config, &["from_cli=l".to_string()], vars)
        .unwrap()
        .build();
    let names: Vec<&str> = set.base().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["from_cli", "from_config", "from_env", "from_file"]);
}

#[test]
fn test_from_sources_detects_conflicts_across_sources() {
    let mut config = SecretsConfig::default();
    config.values.insert("token".to_string(), "one".to_string());
    let result = SecretSetBuilder::from_sources(&config, &["token=two".to_string()], Vec::new());
    assert!(matches!(result, Err(SecretError::Conflict(_))));
}

#[test]
fn test_harvest_options() {
    let options: Vec<String> = ["--secret", "a=1", "--verbose", "--secret=b=2", "--secret"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut builder = SecretSetBuilder::default();
    builder.harvest_options("--secret", &options).unwrap();
    let set = builder.build();
    assert_eq!(set.get("a"), Some("1"));
    assert_eq!(set.get("b"), Some("2"));
    assert_eq!(set.len(), 2);

    let mut disabled = SecretSetBuilder::default();
    disabled.harvest_options("", &options).unwrap();
    assert!(disabled.build().is_empty());
}

#[test]
fn test_redact_masks_longest_value_first() {
    let set = secrets(&[("short", "abc"), ("long", "abcdef")]);
    assert_eq!(
        set.redact("token=abcdef and abc"),
        format!("token={REDACTED} and {REDACTED}")
    );
}

#[test]
fn test_forward_args() {
    let set = secrets(&[("b", "2"), ("a", "1")]);
    assert_eq!(
        set.forward_args("--secret"),
        vec!["--secret", "a=1", "--secret", "b=2"]
    );
    assert!(set.forward_args("").is_empty());
}

#[test]
fn test_with_derived_keeps_base_untouched() {
    let base = secrets(&[("token", "abc")]);
    let snapshot = base.with_derived(vec![
        DerivedSecret {
            name: "token:hex".to_string(),
            value: "616263".to_string(),
        },
        DerivedSecret {
            name: "empty".to_string(),
            value: String::new(),
        },
    ]);
    assert_eq!(base.len(), 1);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.base().count(), 1);
    assert_eq!(snapshot.get("token:hex"), Some("616263"));
    assert_eq!(snapshot.redact("x616263x"), format!("x{REDACTED}x"));
}

#[tokio::test]
async fn test_transform_hooks_derive_encoded_values() {
    let set = secrets(&[("token", "a b/c"), ("plain", "abc")]);
    let unit = TestUnit::new("tests/u.input", "u.input");

    let url = SecretHook::UrlEncode.after_unit(&unit, &finished(), &set).await.unwrap();
    assert_eq!(
        url,
        vec![DerivedSecret {
            name: "token:url-encode".to_string(),
            value: "a%20b%2Fc".to_string(),
        }]
    );

    let base64 = SecretHook::Base64.after_unit(&unit, &finished(), &set).await.unwrap();
    assert!(base64.contains(&DerivedSecret {
        name: "plain:base64".to_string(),
        value: "YWJj".to_string(),
    }));

    let hex = SecretHook::Hex.after_unit(&unit, &finished(), &set).await.unwrap();
    assert!(hex.contains(&DerivedSecret {
        name: "plain:hex".to_string(),
        value: "616263".to_string(),
    }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_hook_reads_secrets_on_stdin() {
    let set = secrets(&[("token", "abc")]);
    let unit = TestUnit::new("tests/u.input", "u.input");

    let hook = SecretHook::Command {
        command: "sh -c 'cat; echo extra-value'".to_string(),
    };
    let derived = hook.after_unit(&unit, &finished(), &set).await.unwrap();
    assert_eq!(
        derived,
        vec![
            DerivedSecret {
                name: "token:command".to_string(),
                value: "abc".to_string(),
            },
            DerivedSecret {
                name: "command#2".to_string(),
                value: "extra-value".to_string(),
            },
        ]
    );

    let failing = SecretHook::Command {
        command: "false".to_string(),
    };
    assert!(failing.after_unit(&unit, &finished(), &set).await.is_err());
}
