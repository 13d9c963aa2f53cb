//! # Report Generators Unit Tests / 报告生成器单元测试
//!
//! Tests for the aggregator and the JUnit, TAP, JSON and HTML renderers.
//!
//! 测试聚合器以及 JUnit、TAP、JSON 和 HTML 渲染器。

use chrono::Utc;
use fixture_runner::core::aggregator::{Aggregator, RecordIndex};
use fixture_runner::core::audit::{audit, ArtifactSource};
use fixture_runner::core::config::ReportConfig;
use fixture_runner::core::models::{
    CommandLine, ExecutionResult, Fault, RunOutcome, RunReport, TestUnit, Verdict,
};
use fixture_runner::core::secrets::{SecretSet, REDACTED};
use fixture_runner::reporting::{html, json, junit, tap, write_reports, SourceMap};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn result(args: &[&str], exit_code: i32, stdout: &str) -> ExecutionResult {
    ExecutionResult {
        command: CommandLine {
            program: "tool".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        },
        stdout: stdout.as_bytes().to_vec(),
        stderr: b"log line".to_vec(),
        exit_code: Some(exit_code),
        duration: Duration::from_millis(25),
        started_at: Utc::now(),
        fault: None,
    }
}

/// A report with a pass, an exit-code failure and a timeout.
fn sample_report() -> RunReport {
    let mut secrets = SecretSet::builder();
    secrets.insert("token", "s3cr3t").unwrap();
    let mut aggregator = Aggregator::new(Utc::now(), secrets.build(), 1024);

    let ok = TestUnit::new("tests/ok.input", "ok.input");
    let bad = TestUnit::new("tests/dir/bad.input", "dir/bad.input");
    let slow = TestUnit::new("tests/slow.input", "slow.input");

    aggregator.record(&ok, 1, result(&["--secret", "token=s3cr3t", "ok.input"], 0, "fine"));
    aggregator.record(&bad, 1, result(&["bad.input"], 22, ""));
    aggregator.record(
        &slow,
        1,
        ExecutionResult::faulted(
            CommandLine {
                program: "tool".to_string(),
                args: vec!["slow.input".to_string()],
            },
            Fault::Timeout { after_ms: 1000 },
        ),
    );
    aggregator.finalize();
    aggregator.into_report()
}

#[cfg(test)]
mod aggregator_tests {
    use super::*;

    #[test]
    fn test_recording_is_idempotent() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        let unit = TestUnit::new("tests/a.input", "a.input");

        let first = aggregator.record(&unit, 1, result(&[], 0, ""));
        let second = aggregator.record(&unit, 1, result(&[], 1, ""));
        assert_eq!(first, Verdict::Pass);
        assert_eq!(second, Verdict::Pass);
        assert_eq!(aggregator.report().records().len(), 1);
        assert_eq!(aggregator.report().counters().total(), 1);

        aggregator.record(&unit, 2, result(&[], 1, ""));
        assert_eq!(aggregator.report().records().len(), 2);
        assert!(aggregator.is_recorded(&unit, 2));
    }

    #[test]
    fn test_command_lines_are_redacted() {
        let report = sample_report();
        let command = report.records()[0].command.clone().unwrap();
        assert!(!command.contains("s3cr3t"));
        assert!(command.contains(REDACTED));
    }

    #[test]
    fn test_transcript_is_bounded() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 4);
        let unit = TestUnit::new("tests/a.input", "a.input");
        aggregator.record(&unit, 1, result(&[], 0, "0123456789"));

        let transcript = aggregator.report().records()[0].transcript.clone().unwrap();
        assert_eq!(transcript.stdout, "0123");
        assert!(transcript.truncated);
    }

    #[test]
    fn test_streams_are_retained_for_audit() {
        let mut aggregator =
            Aggregator::new(Utc::now(), SecretSet::default(), 1024).retain_streams(true);
        let unit = TestUnit::new("tests/a.input", "a.input");
        aggregator.record(&unit, 1, result(&[], 0, "out"));

        let labels: Vec<String> = aggregator.stream_artifacts().iter().map(|a| a.label()).collect();
        assert_eq!(labels, vec!["a.input #1 stdout", "a.input #1 stderr"]);
    }

    #[test]
    fn test_retained_streams_are_spooled_to_disk() {
        let mut aggregator =
            Aggregator::new(Utc::now(), SecretSet::default(), 1024).retain_streams(true);
        let unit = TestUnit::new("tests/a.input", "a.input");
        aggregator.record(&unit, 1, result(&[], 0, "token=s3cr3t"));
        aggregator.record(&unit, 2, result(&[], 0, "clean"));

        for artifact in aggregator.stream_artifacts() {
            match &artifact.source {
                ArtifactSource::Spooled { path, .. } => assert!(path.is_file()),
                other => panic!("stream kept in memory: {other:?}"),
            }
        }

        let mut secrets = SecretSet::builder();
        secrets.insert("token", "s3cr3t").unwrap();
        let leaks = audit(&secrets.build(), aggregator.stream_artifacts()).unwrap();
        assert_eq!(leaks.scanned, 4);
        assert_eq!(leaks.leaks.len(), 1);
        assert_eq!(leaks.leaks[0].artifact, "a.input #1 stdout");
        assert_eq!(leaks.leaks[0].offset, 6);
    }

    #[test]
    fn test_record_index_claims_each_key_once() {
        let mut index = RecordIndex::default();
        assert_eq!(index.claim(("a.input", 1), 0), Ok(0));
        assert_eq!(index.claim(("a.input", 2), 1), Ok(1));
        assert_eq!(index.claim(("a.input", 1), 2), Err(0));
        assert!(index.contains(&("a.input", 2)));
        assert!(!index.contains(&("b.input", 1)));
    }

    #[test]
    fn test_finalize_outcome() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        let unit = TestUnit::new("tests/a.input", "a.input");
        aggregator.record(&unit, 1, result(&[], 3, ""));
        let summary = aggregator.finalize();
        assert_eq!(summary.outcome, RunOutcome::Failures);
        assert!(aggregator.report().finished_at().is_some());
    }
}

#[cfg(test)]
mod junit_tests {
    use super::*;

    #[test]
    fn test_junit_shape() {
        let xml = junit::render(&sample_report()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<testsuite name=\"fixture-runner\" tests=\"3\" failures=\"1\" errors=\"1\" skipped=\"0\""));
        assert!(xml.contains("<testcase name=\"ok.input\" classname=\"fixture-runner\""));
        assert!(xml.contains("<testcase name=\"dir/bad.input\" classname=\"dir\""));
        assert!(xml.contains("<failure message=\"exit code mismatch: expected=0 actual=22\""));
        assert!(xml.contains("<error message=\"timeout after 1000 ms\""));
        assert!(xml.trim_end().ends_with("</testsuites>"));
    }

    #[test]
    fn test_markup_and_control_characters_are_escaped() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        let mut unit = TestUnit::new("tests/a&b.input", "<a&b>.input");
        unit.expect.stdout = Some(b"expected <ok>".to_vec());
        aggregator.record(&unit, 1, result(&[], 0, "got \u{1b}[31m\"red\""));
        let xml = junit::render(&aggregator.into_report()).unwrap();

        assert!(xml.contains("name=\"&lt;a&amp;b&gt;.input\""));
        assert!(!xml.contains('\u{1b}'));
        assert!(!xml.contains("<ok>"));
        assert!(xml.contains("&lt;ok&gt;"));
    }

    #[test]
    fn test_junit_is_deterministic() {
        let report = sample_report();
        assert_eq!(junit::render(&report).unwrap(), junit::render(&report).unwrap());
    }
}

#[cfg(test)]
mod tap_tests {
    use super::*;

    #[test]
    fn test_tap_shape() {
        let output = tap::render(&sample_report());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "TAP version 13");
        assert_eq!(lines[1], "ok 1 - ok.input");
        assert_eq!(lines[2], "not ok 2 - dir/bad.input");
        assert!(output.contains("  message: \"exit code mismatch: expected=0 actual=22\""));
        assert!(output.contains("  severity: fail"));
        assert!(output.contains("not ok 3 - slow.input"));
        assert!(output.contains("  severity: error"));
        assert_eq!(*lines.last().unwrap(), "1..3");
    }

    #[test]
    fn test_tap_is_deterministic() {
        let report = sample_report();
        assert_eq!(tap::render(&report), tap::render(&report));
    }

    #[test]
    fn test_empty_report_has_empty_plan() {
        assert_eq!(tap::render(&RunReport::default()), "TAP version 13\n1..0\n");
    }
}

#[cfg(test)]
mod json_tests {
    use super::*;

    #[test]
    fn test_json_reads_back() {
        let report = sample_report();
        let content = json::render(&report).unwrap();
        let parsed = json::parse(&content).unwrap();

        assert_eq!(parsed.counters(), report.counters());
        assert_eq!(parsed.records().len(), 3);
        for (a, b) in parsed.records().iter().zip(report.records()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.verdict, b.verdict);
            assert_eq!(a.detail, b.detail);
            assert_eq!(a.command, b.command);
            assert_eq!(a.transcript, b.transcript);
        }
    }

    #[test]
    fn test_json_is_deterministic() {
        let report = sample_report();
        assert_eq!(json::render(&report).unwrap(), json::render(&report).unwrap());

        let reread = json::parse(&json::render(&report).unwrap()).unwrap();
        assert_eq!(json::render(&reread).unwrap(), json::render(&report).unwrap());
    }

    #[test]
    fn test_json_contains_detail() {
        let content = json::render(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[1]["detail"], "exit code mismatch: expected=0 actual=22");
        assert_eq!(value[1]["verdict"]["status"], "fail");
        assert_eq!(value[2]["verdict"]["fault"]["kind"], "timeout");
    }

    #[test]
    fn test_read_missing_or_invalid() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("report.json");
        assert!(json::read(&path).unwrap().is_none());

        fs::write(&path, "").unwrap();
        assert!(json::read(&path).unwrap().is_none());

        fs::write(&path, "{not json").unwrap();
        assert!(json::read(&path).is_err());
    }

    #[test]
    fn test_append_merge_sums_counters() {
        let prior = json::parse(&json::render(&sample_report()).unwrap()).unwrap();
        let merged = RunReport::merge(prior, sample_report());
        assert_eq!(merged.records().len(), 6);
        assert_eq!(merged.counters().failed, 2);
        assert_eq!(merged.counters().errors, 2);
    }
}

#[cfg(test)]
mod html_tests {
    use super::*;

    #[test]
    fn test_pages_and_exempt_flags() {
        let report = sample_report();
        let mut sources = SourceMap::new();
        sources.insert(PathBuf::from("tests/ok.input"), "GET {{token}}".to_string());

        let pages = html::render(&report, &sources, "en");
        assert_eq!(pages.len(), 1 + 2 * report.records().len());
        assert_eq!(pages[0].file_name, "index.html");
        assert!(!pages[0].redaction_exempt);

        for page in &pages[1..] {
            assert_eq!(page.redaction_exempt, page.file_name.ends_with("-source.html"));
        }
        assert_eq!(pages[1].file_name, "0001-ok_input_1-source.html");
        assert_eq!(pages[2].file_name, "0001-ok_input_1-store.html");

        let index = String::from_utf8(pages[0].bytes.clone()).unwrap();
        assert!(index.contains("dir/bad.input"));
        assert!(index.contains("0002-dir_bad_input_1-store.html"));

        let source = String::from_utf8(pages[1].bytes.clone()).unwrap();
        assert!(source.contains("GET {{token}}"));

        let missing = String::from_utf8(pages[3].bytes.clone()).unwrap();
        assert!(missing.contains("Source file is not available."));
    }

    #[test]
    fn test_html_is_deterministic() {
        let report = sample_report();
        let mut sources = SourceMap::new();
        sources.insert(PathBuf::from("tests/ok.input"), "GET {{token}}".to_string());
        assert_eq!(
            html::render(&report, &sources, "en"),
            html::render(&report, &sources, "en")
        );
    }

    #[test]
    fn test_store_pages_survive_a_json_round_trip() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        let unit = TestUnit::new("tests/x.input", "x.input");
        aggregator.record(&unit, 1, result(&[], 0, "first-run-output"));
        let prior = json::parse(&json::render(&aggregator.into_report()).unwrap()).unwrap();

        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        aggregator.record(&unit, 1, result(&[], 0, "second-run-output"));
        let merged = RunReport::merge(prior, aggregator.into_report());

        let pages = html::render(&merged, &SourceMap::new(), "en");
        let first = String::from_utf8(pages[2].bytes.clone()).unwrap();
        let second = String::from_utf8(pages[4].bytes.clone()).unwrap();
        assert!(first.contains("first-run-output"));
        assert!(second.contains("second-run-output"));
        assert!(!first.contains("No captured output for this record."));
    }

    #[test]
    fn test_store_page_is_escaped() {
        let mut aggregator = Aggregator::new(Utc::now(), SecretSet::default(), 1024);
        let unit = TestUnit::new("tests/x.input", "x.input");
        aggregator.record(&unit, 1, result(&[], 0, "<script>alert(1)</script>"));
        let report = aggregator.into_report();

        let pages = html::render(&report, &SourceMap::new(), "en");
        let store = String::from_utf8(pages[2].bytes.clone()).unwrap();
        assert!(store.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn test_write_reports_returns_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let config = ReportConfig {
            junit: Some(temp.path().join("out/junit.xml")),
            tap: Some(temp.path().join("out/report.tap")),
            json: Some(temp.path().join("out/report.json")),
            html: Some(temp.path().join("out/html")),
            append: false,
        };
        let report = sample_report();
        let artifacts = write_reports(&report, &config, &SourceMap::new(), "en").unwrap();

        assert_eq!(artifacts.len(), 3 + 1 + 2 * report.records().len());
        assert_eq!(artifacts.iter().filter(|a| a.redaction_exempt).count(), 3);
        assert!(temp.path().join("out/junit.xml").is_file());
        assert!(temp.path().join("out/html/index.html").is_file());
        assert!(fs::read_to_string(temp.path().join("out/report.tap"))
            .unwrap()
            .starts_with("TAP version 13"));
    }
}
