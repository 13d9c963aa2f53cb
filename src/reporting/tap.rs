//! # TAP Reporting Module / TAP 报告模块
//!
//! Test Anything Protocol output, version 13. Failures and errors carry a
//! YAML diagnostic block; the plan line comes last.
//!
//! TAP 13 格式输出。失败和错误附带 YAML 诊断块；计划行位于最后。

use std::fmt::Write as _;

use crate::core::models::{RunReport, Verdict};
use crate::reporting::junit::case_name;

/// Renders the report as TAP.
pub fn render(report: &RunReport) -> String {
    let mut tap = String::from("TAP version 13\n");
    let records = report.records();

    for (i, record) in records.iter().enumerate() {
        let n = i + 1;
        let name = case_name(record).replace('#', "\\#");
        let detail = record.detail.clone().or_else(|| record.verdict.detail()).unwrap_or_default();
        match &record.verdict {
            Verdict::Pass => {
                let _ = writeln!(tap, "ok {n} - {name}");
            }
            Verdict::Skipped { .. } => {
                let _ = writeln!(tap, "ok {n} - {name} # SKIP {}", single_line(&detail));
            }
            Verdict::Fail { .. } | Verdict::FatalError { .. } => {
                let _ = writeln!(tap, "not ok {n} - {name}");
                let severity = if matches!(record.verdict, Verdict::Fail { .. }) {
                    "fail"
                } else {
                    "error"
                };
                tap.push_str("  ---\n");
                let _ = writeln!(tap, "  message: {}", yaml_string(&detail));
                let _ = writeln!(tap, "  severity: {severity}");
                if let Some(code) = record.exit_code {
                    let _ = writeln!(tap, "  exit_code: {code}");
                }
                let _ = writeln!(tap, "  duration_ms: {}", record.duration_ms);
                tap.push_str("  ...\n");
            }
        }
    }

    let _ = writeln!(tap, "1..{}", records.len());
    tap
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

/// A double-quoted YAML scalar; JSON string syntax is valid YAML.
fn yaml_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", single_line(text)))
}
