use criterion::{criterion_group, criterion_main, Criterion};
use fixture_runner::core::audit::{audit, Artifact};
use fixture_runner::core::discovery::Discovery;
use fixture_runner::core::models::{CommandLine, ExecutionResult, TestUnit};
use fixture_runner::core::secrets::{SecretHook, SecretSet};
use std::fs;
use std::hint::black_box;
use std::time::Duration;
use tokio::runtime::Runtime;

fn secrets() -> SecretSet {
    let mut builder = SecretSet::builder();
    for i in 0..8 {
        builder
            .insert(format!("secret{i}"), format!("s3cr3t-value-{i}-{}", "x".repeat(i)))
            .unwrap();
    }
    builder.build()
}

fn artifacts(count: usize, size: usize) -> Vec<Artifact> {
    let line = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"id\": 42}\n";
    let body = line.repeat(size / line.len() + 1);
    (0..count)
        .map(|i| Artifact::memory(format!("unit{i}.input #1 stdout"), body.as_bytes().to_vec()))
        .collect()
}

fn bench_audit(c: &mut Criterion) {
    let secrets = secrets();
    let artifacts = artifacts(32, 64 * 1024);

    c.bench_function("audit_32x64k_8_secrets", |b| {
        b.iter(|| audit(black_box(&secrets), black_box(&artifacts)).unwrap());
    });
}

fn bench_derived_audit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let base = secrets();
    let hooks = [SecretHook::UrlEncode, SecretHook::Base64, SecretHook::Hex];
    let unit = TestUnit::new("tests/bench.input", "bench.input");
    let result = ExecutionResult {
        command: CommandLine {
            program: "hurl".to_string(),
            args: vec!["tests/bench.input".to_string()],
        },
        stdout: Vec::new(),
        stderr: Vec::new(),
        exit_code: Some(0),
        duration: Duration::from_millis(1),
        started_at: chrono::Utc::now(),
        fault: None,
    };
    let derived = rt.block_on(async {
        let mut derived = Vec::new();
        for hook in &hooks {
            derived.extend(hook.after_unit(&unit, &result, &base).await.unwrap());
        }
        derived
    });
    let secrets = base.with_derived(derived);
    let artifacts = artifacts(32, 64 * 1024);

    c.bench_function("audit_32x64k_derived_secrets", |b| {
        b.iter(|| audit(black_box(&secrets), black_box(&artifacts)).unwrap());
    });
}

fn bench_redact(c: &mut Criterion) {
    let secrets = secrets();
    let text = "curl -H 'Authorization: Bearer s3cr3t-value-3-xxx' https://example.org/\n".repeat(256);

    c.bench_function("redact_command_lines", |b| {
        b.iter(|| secrets.redact(black_box(&text)));
    });
}

fn bench_discovery(c: &mut Criterion) {
    let temp = tempfile::tempdir().unwrap();
    for dir in 0..10 {
        for unit in 0..50 {
            let base = temp.path().join(format!("tests/group{dir:02}"));
            fs::create_dir_all(&base).unwrap();
            fs::write(base.join(format!("unit{unit:03}.input")), "GET http://localhost\n").unwrap();
            fs::write(base.join(format!("unit{unit:03}.out")), "ok").unwrap();
            fs::write(base.join(format!("unit{unit:03}.exit")), "0\n").unwrap();
        }
    }
    let discovery = Discovery::new([temp.path().join("tests")], "**/*.input").unwrap();

    c.bench_function("discover_500_units", |b| {
        b.iter(|| discovery.iter().filter(|unit| unit.is_ok()).count());
    });
}

criterion_group!(benches, bench_audit, bench_derived_audit, bench_redact, bench_discovery);
criterion_main!(benches);
