//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints run progress and reports to the console: one line per
//! finished unit, a summary table, failure details and the audit findings.
//! Colors follow the global `colored` override.
//!
//! 此模块在控制台打印运行进度和报告：每个完成的单元一行、摘要表、失败详情以及审计结果。
//! 颜色遵循 `colored` 的全局设置。

use colored::*;

use crate::core::{
    audit::LeakReport,
    discovery::DiscoveryError,
    models::{RunReport, RunSummary, Verdict},
    scheduler::WorkItem,
};
use crate::infra::t;

fn colored_status(verdict: &Verdict, locale: &str) -> ColoredString {
    let status = verdict.status_str(locale);
    match verdict {
        Verdict::Pass => status.green(),
        Verdict::Fail { .. } => status.red(),
        Verdict::Skipped { .. } => status.dimmed(),
        Verdict::FatalError { .. } => status.yellow(),
    }
}

/// Prints one line for a recorded unit.
pub fn print_progress(item: &WorkItem, verdict: &Verdict, locale: &str) {
    let name = if item.iteration > 1 {
        format!("{} #{}", item.unit.name, item.iteration)
    } else {
        item.unit.name.clone()
    };
    println!("  {:<10} {}", colored_status(verdict, locale), name);
}

/// Reports a unit excluded by discovery.
pub fn print_discovery_error(error: &DiscoveryError, locale: &str) {
    println!(
        "  {:<10} {}",
        t!("report.status_error", locale = locale).yellow(),
        t!("run.discovery_error", locale = locale, name = error.name, error = error.kind.to_string())
    );
}

/// Prints a formatted summary of the run to the console.
/// Displays a table with status, name, iteration and duration, using color
/// coding to highlight different statuses, followed by the counters.
///
/// 在控制台打印格式化的运行摘要。
/// 显示一个包含状态、名称、迭代和持续时间的表格，使用颜色编码突出显示不同的状态，然后是计数。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Status     | Unit                                     | Duration
///   - Passed     | http/get.input                           |     0.12s
///   - Failed     | http/post.input #2                       |     0.45s
/// ```
pub fn print_summary(report: &RunReport, locale: &str) {
    println!("\n{}", t!("summary.banner", locale = locale).bold());
    println!(
        "  - {:<10} | {:<40} | {:>9}",
        t!("summary.status", locale = locale),
        t!("summary.unit", locale = locale),
        t!("summary.duration", locale = locale)
    );

    for record in report.records() {
        let name = if record.iteration > 1 {
            format!("{} #{}", record.name, record.iteration)
        } else {
            record.name.clone()
        };
        println!(
            "  - {:<10} | {:<40} | {:>8.2}s",
            colored_status(&record.verdict, locale),
            name,
            record.duration().as_secs_f64()
        );
    }

    let counters = report.counters();
    println!(
        "\n{}",
        t!(
            "summary.counters",
            locale = locale,
            total = counters.total(),
            passed = counters.passed,
            failed = counters.failed,
            errors = counters.errors,
            skipped = counters.skipped
        )
    );
    if let Some(elapsed) = report.elapsed() {
        println!(
            "{}",
            t!("summary.elapsed", locale = locale, elapsed = format!("{:.2}", elapsed.as_secs_f64()))
        );
    }
}

/// Prints the detail of every failed or errored record.
///
/// 打印每条失败或出错记录的详情。
pub fn print_failure_details(report: &RunReport, locale: &str) {
    let failures: Vec<_> = report
        .records()
        .iter()
        .filter(|r| r.verdict.is_failure())
        .collect();
    if failures.is_empty() {
        return;
    }

    println!("\n{}", t!("summary.failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, record) in failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}'",
            i + 1,
            failures.len(),
            colored_status(&record.verdict, locale),
            record.name.cyan()
        );
        if let Some(command) = &record.command {
            println!("  {} {}", t!("summary.command_prefix", locale = locale).blue(), command);
        }
        if let Some(detail) = &record.detail {
            println!("  {detail}");
        }
        println!("{}", "-".repeat(80));
    }
}

/// Prints the audit findings; exempt hits are shown as warnings.
///
/// 打印审计结果；免检产物中的命中以警告形式显示。
pub fn print_leak_report(leaks: &LeakReport, locale: &str) {
    for hit in &leaks.exempt_hits {
        println!(
            "{}",
            t!("audit.exempt_hit", locale = locale, secret = hit.secret, artifact = hit.artifact).yellow()
        );
    }

    if leaks.is_clean() {
        println!(
            "{}",
            t!("audit.clean", locale = locale, count = leaks.scanned).green()
        );
        return;
    }

    println!("\n{}", t!("audit.leak_banner", locale = locale).red().bold());
    for leak in &leaks.leaks {
        println!(
            "  - {}",
            t!(
                "audit.leak",
                locale = locale,
                secret = leak.secret,
                artifact = leak.artifact,
                offset = leak.offset
            )
        );
    }
}

/// Prints the closing line for the run outcome.
pub fn print_outcome(summary: &RunSummary, locale: &str) {
    use crate::core::models::RunOutcome;
    let line = match summary.outcome {
        RunOutcome::Success => t!("outcome.success", locale = locale).green().bold(),
        RunOutcome::Failures => t!("outcome.failures", locale = locale).red().bold(),
        RunOutcome::Errors => t!("outcome.errors", locale = locale).yellow().bold(),
        RunOutcome::Leak => t!("outcome.leak", locale = locale).red().bold(),
    };
    println!("\n{line}");
}
