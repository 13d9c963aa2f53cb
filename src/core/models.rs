//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the fixture runner:
//! test units and their expectations, execution results, verdicts, the run report
//! and the per-run state machine.
//!
//! 此模块定义了整个夹具运行器中使用的核心数据结构：
//! 测试单元及其期望、执行结果、判定、运行报告以及每次运行的状态机。

use crate::infra::t;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Exit code used by the program under test to say "skip this unit on this platform".
/// 被测程序用来表示"在此平台上跳过此单元"的退出码。
pub const SKIP_EXIT_CODE: i32 = 255;

/// One line of a `.out.pattern` / `.err.pattern` companion.
/// The original text is kept for diagnostics; `regex` is the anchored translation.
#[derive(Debug, Clone)]
pub struct PatternLine {
    pub source: String,
    pub regex: Regex,
}

/// An expected output artifact: the companion holding the expected bytes and the
/// location where the unit is expected to produce the actual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedArtifact {
    pub expected: PathBuf,
    pub produced: PathBuf,
}

/// Everything a unit's companions ask of an execution.
/// 单元的伴随文件对一次执行提出的所有要求。
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    /// Expected exit code. `None` means 0.
    pub exit_code: Option<i32>,
    /// Byte-exact stdout.
    pub stdout: Option<Vec<u8>>,
    pub stdout_pattern: Option<Vec<PatternLine>>,
    /// Expected stderr, compared after trimming.
    pub stderr: Option<String>,
    pub stderr_pattern: Option<Vec<PatternLine>>,
    /// Expected `* curl ...` trace lines emitted on stderr.
    pub commands: Option<Vec<String>>,
    pub artifacts: Vec<ExpectedArtifact>,
}

impl Expectations {
    /// Expected exit code, defaulting to success.
    pub fn expected_exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(0)
    }

    /// `true` when no companion narrowed the unit.
    pub fn is_empty(&self) -> bool {
        self.exit_code.is_none()
            && self.stdout.is_none()
            && self.stdout_pattern.is_none()
            && self.stderr.is_none()
            && self.stderr_pattern.is_none()
            && self.commands.is_none()
            && self.artifacts.is_empty()
    }
}

/// A single fixture: an input file plus its optional companions.
/// Identity is the input path.
///
/// 单个夹具：一个输入文件及其可选的伴随文件。
/// 身份由输入路径决定。
#[derive(Debug, Clone)]
pub struct TestUnit {
    /// Path of the input file, as discovered (root joined with the relative path).
    pub input: PathBuf,
    /// Display name: the input path relative to its root, with `/` separators.
    pub name: String,
    /// Extra program arguments from the `.options` companion.
    pub options: Vec<String>,
    /// Environment overrides from the `.profile` companion.
    pub env: Vec<(String, String)>,
    pub expect: Expectations,
}

impl TestUnit {
    /// Creates a smoke unit with no companions.
    pub fn new(input: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            name: name.into(),
            options: Vec::new(),
            env: Vec::new(),
            expect: Expectations::default(),
        }
    }

    /// A smoke unit only requires the expected (zero) exit code.
    pub fn is_smoke(&self) -> bool {
        self.options.is_empty() && self.env.is_empty() && self.expect.is_empty()
    }
}

/// A resolved command line: program followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Renders the command line with shell quoting where needed.
    pub fn render(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A process-level fault: the unit could not produce a normal exit status.
/// 进程级故障：单元无法产生正常的退出状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    /// The deadline expired and the process group was killed.
    Timeout { after_ms: u64 },
    /// The program could not be started.
    Spawn { message: String },
    /// The process was terminated by a signal.
    Signal { signal: i32 },
    /// The worker running the unit panicked or was aborted.
    Crash { message: String },
    /// A companion file was malformed; the unit never ran.
    Discovery { message: String },
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Timeout { after_ms } => write!(f, "timeout after {after_ms} ms"),
            Fault::Spawn { message } => write!(f, "spawn failure: {message}"),
            Fault::Signal { signal } => write!(f, "killed by signal {signal}"),
            Fault::Crash { message } => write!(f, "worker crash: {message}"),
            Fault::Discovery { message } => write!(f, "discovery error: {message}"),
        }
    }
}

/// Captured output of one execution. Owned by the engine until the aggregator
/// consumes it.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command: CommandLine,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process did not exit normally.
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub fault: Option<Fault>,
}

impl ExecutionResult {
    /// A result for a unit that produced no process at all.
    pub fn faulted(command: CommandLine, fault: Fault) -> Self {
        Self {
            command,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            duration: Duration::ZERO,
            started_at: Utc::now(),
            fault: Some(fault),
        }
    }
}

/// First divergence between an expected and an actual text.
/// 期望文本与实际文本之间的第一个分歧点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDiff {
    /// 1-based line number of the first divergent line.
    pub line: usize,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for TextDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "line {}: expected <{}> actual <{}>",
            self.line, self.expected, self.actual
        )
    }
}

/// Why a unit failed its expectations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    ExitCode { expected: i32, actual: i32 },
    Stdout { diff: TextDiff },
    StdoutPattern { diff: TextDiff },
    Stderr { diff: TextDiff },
    StderrPattern { diff: TextDiff },
    Commands { diff: TextDiff },
    Artifact { path: PathBuf, diff: TextDiff },
    MissingArtifact { path: PathBuf },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::ExitCode { expected, actual } => {
                write!(f, "exit code mismatch: expected={expected} actual={actual}")
            }
            Mismatch::Stdout { diff } => write!(f, "stdout mismatch at {diff}"),
            Mismatch::StdoutPattern { diff } => write!(f, "stdout pattern mismatch at {diff}"),
            Mismatch::Stderr { diff } => write!(f, "stderr mismatch at {diff}"),
            Mismatch::StderrPattern { diff } => write!(f, "stderr pattern mismatch at {diff}"),
            Mismatch::Commands { diff } => write!(f, "curl commands mismatch at {diff}"),
            Mismatch::Artifact { path, diff } => {
                write!(f, "artifact {} mismatch at {diff}", path.display())
            }
            Mismatch::MissingArtifact { path } => {
                write!(f, "artifact {} was not produced", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The program exited with [`SKIP_EXIT_CODE`].
    Unsupported,
    /// The unit was never dispatched (fail-fast, run timeout or interruption).
    Cancelled,
}

/// The retained classification of one execution.
/// 一次执行的保留分类结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { mismatch: Mismatch },
    Skipped { reason: SkipReason },
    FatalError { fault: Fault },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// `true` for verdicts that should stop a fail-fast run.
    pub fn is_failure(&self) -> bool {
        matches!(self, Verdict::Fail { .. } | Verdict::FatalError { .. })
    }

    /// Gets the appropriate CSS class for the verdict.
    pub fn status_class(&self) -> &'static str {
        match self {
            Verdict::Pass => "status-Passed",
            Verdict::Fail { .. } => "status-Failed",
            Verdict::Skipped { .. } => "status-Skipped",
            Verdict::FatalError { fault: Fault::Timeout { .. } } => "status-Timeout",
            Verdict::FatalError { .. } => "status-Error",
        }
    }

    /// Gets the localized status label for display.
    /// 获取用于显示的本地化状态标签。
    pub fn status_str(&self, locale: &str) -> String {
        match self {
            Verdict::Pass => t!("report.status_passed", locale = locale).to_string(),
            Verdict::Fail { .. } => t!("report.status_failed", locale = locale).to_string(),
            Verdict::Skipped { .. } => t!("report.status_skipped", locale = locale).to_string(),
            Verdict::FatalError { fault: Fault::Timeout { .. } } => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            Verdict::FatalError { .. } => t!("report.status_error", locale = locale).to_string(),
        }
    }

    /// One-line detail for failures, errors and skips; `None` for a pass.
    pub fn detail(&self) -> Option<String> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail { mismatch } => Some(mismatch.to_string()),
            Verdict::Skipped { reason: SkipReason::Unsupported } => {
                Some(format!("exit code {SKIP_EXIT_CODE}: unsupported on this platform"))
            }
            Verdict::Skipped { reason: SkipReason::Cancelled } => Some("not dispatched".to_string()),
            Verdict::FatalError { fault } => Some(fault.to_string()),
        }
    }
}

/// Bounded copy of a unit's captured streams, kept for HTML store pages.
/// Persisted in the JSON report so appended runs can re-render earlier pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl Transcript {
    pub fn capture(result: &ExecutionResult, limit: usize) -> Self {
        let (stdout, cut_out) = clip(&result.stdout, limit);
        let (stderr, cut_err) = clip(&result.stderr, limit);
        Self {
            stdout,
            stderr,
            truncated: cut_out || cut_err,
        }
    }
}

fn clip(bytes: &[u8], limit: usize) -> (String, bool) {
    if bytes.len() <= limit {
        (String::from_utf8_lossy(bytes).into_owned(), false)
    } else {
        (String::from_utf8_lossy(&bytes[..limit]).into_owned(), true)
    }
}

/// One entry of the run report.
/// 运行报告中的一个条目。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    pub input: PathBuf,
    /// 1-based repeat index.
    pub iteration: u32,
    pub verdict: Verdict,
    /// One-line rendering of the verdict, see [`Verdict::detail`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Command line with secret values masked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Transcript>,
}

impl UnitRecord {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    /// A filesystem-safe identifier, unique within a report when combined with
    /// the record position.
    pub fn slug(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("{sanitized}_{}", self.iteration)
    }
}

/// Run-level verdict counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl Counters {
    pub fn count(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Pass => self.passed += 1,
            Verdict::Fail { .. } => self.failed += 1,
            Verdict::Skipped { .. } => self.skipped += 1,
            Verdict::FatalError { .. } => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped + self.errors
    }
}

impl std::ops::Add for Counters {
    type Output = Counters;

    fn add(self, other: Counters) -> Counters {
        Counters {
            passed: self.passed + other.passed,
            failed: self.failed + other.failed,
            skipped: self.skipped + other.skipped,
            errors: self.errors + other.errors,
        }
    }
}

/// The accumulated state of one orchestrator invocation.
///
/// Records are only appended through the aggregator; report generators read it.
///
/// 一次编排器调用的累积状态。
/// 记录只能通过聚合器追加；报告生成器只读取它。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    records: Vec<UnitRecord>,
    counters: Counters,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: Some(started_at),
            ..Self::default()
        }
    }

    /// Rebuilds a report from records, e.g. after reading a JSON report back.
    /// Counters are recomputed and timestamps are derived from the records.
    pub fn from_records(records: Vec<UnitRecord>) -> Self {
        let mut counters = Counters::default();
        for record in &records {
            counters.count(&record.verdict);
        }
        let started_at = records.iter().filter_map(|r| r.started_at).min();
        let finished_at = records
            .iter()
            .filter_map(|r| {
                r.started_at
                    .map(|s| s + chrono::Duration::milliseconds(r.duration_ms as i64))
            })
            .max();
        Self {
            records,
            counters,
            started_at,
            finished_at,
        }
    }

    /// Merges a new report into a prior one: prior records first, in their
    /// original order, then the new ones; counters are summed.
    pub fn merge(prior: RunReport, new: RunReport) -> RunReport {
        let counters = prior.counters + new.counters;
        let started_at = match (prior.started_at, new.started_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let finished_at = match (prior.finished_at, new.finished_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let mut records = prior.records;
        records.extend(new.records);
        RunReport {
            records,
            counters,
            started_at,
            finished_at,
        }
    }

    pub(crate) fn push(&mut self, record: UnitRecord) {
        self.counters.count(&record.verdict);
        self.records.push(record);
    }

    pub(crate) fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub fn records(&self) -> &[UnitRecord] {
        &self.records
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Wall-clock span of the run, if both ends are known.
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The overall outcome of a run, in increasing order of severity.
/// 运行的总体结果，按严重程度递增排序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failures,
    Errors,
    Leak,
}

impl RunOutcome {
    /// Process exit code for automation. Orchestrator errors use
    /// [`ORCHESTRATOR_ERROR_EXIT_CODE`].
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Failures => 1,
            RunOutcome::Errors => 2,
            RunOutcome::Leak => 3,
        }
    }
}

/// Exit code for configuration, I/O and other orchestrator-level errors.
pub const ORCHESTRATOR_ERROR_EXIT_CODE: u8 = 4;

/// Summary produced by `Aggregator::finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub counters: Counters,
    pub outcome: RunOutcome,
}

impl RunSummary {
    pub fn from_counters(counters: Counters) -> Self {
        let outcome = if counters.errors > 0 {
            RunOutcome::Errors
        } else if counters.failed > 0 {
            RunOutcome::Failures
        } else {
            RunOutcome::Success
        };
        Self { counters, outcome }
    }

    /// Outcome from the functional verdicts only. Units skipped because
    /// fail-fast stopped dispatch count as skips, so a fail-fast run with one
    /// assertion failure still ends with [`RunOutcome::Failures`].
    pub fn from_report(report: &RunReport) -> Self {
        Self::from_counters(report.counters())
    }

    /// Raises the outcome to at least [`RunOutcome::Errors`] for a run that
    /// was cut short by its run timeout or an interrupt.
    pub fn incomplete(mut self) -> Self {
        if self.outcome < RunOutcome::Errors {
            self.outcome = RunOutcome::Errors;
        }
        self
    }

    /// Forces the leak outcome regardless of the functional verdicts.
    pub fn with_leak(mut self) -> Self {
        self.outcome = RunOutcome::Leak;
        self
    }

    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }
}

/// Phases of one orchestrator invocation.
/// 一次编排器调用的各个阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Discovering,
    Scheduled,
    Executing,
    Aggregating,
    Reporting,
    Auditing,
    Done(RunOutcome),
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            RunState::Discovering => 0,
            RunState::Scheduled => 1,
            RunState::Executing => 2,
            RunState::Aggregating => 3,
            RunState::Reporting => 4,
            RunState::Auditing => 5,
            RunState::Done(_) => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done(_))
    }
}

/// Forward-only state machine guarding the run phases.
#[derive(Debug)]
pub struct RunStateMachine {
    state: RunState,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self {
            state: RunState::Discovering,
        }
    }
}

impl RunStateMachine {
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Moves to `next`. Revisiting or going backwards is an error.
    pub fn advance(&mut self, next: RunState) -> Result<()> {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            bail!("invalid run state transition {:?} -> {:?}", self.state, next);
        }
        tracing::debug!(from = ?self.state, to = ?next, "run state transition");
        self.state = next;
        Ok(())
    }
}
