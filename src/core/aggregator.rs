//! # Result Aggregator Module / 结果聚合模块
//!
//! The only writer of the [`RunReport`]. Workers hand over each execution
//! result; the aggregator judges it, keeps the verdict plus a bounded
//! transcript and drops the rest. Recording the same (unit, iteration) twice
//! is a no-op that returns the first verdict.
//!
//! [`RunReport`] 的唯一写入者。工作者交出每个执行结果；聚合器对其进行判定，
//! 保留判定结果和有限长度的输出记录，其余部分被丢弃。
//! 对同一（单元，迭代）重复记录不会产生任何效果，并返回第一次的判定结果。

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::hash::Hash;
use std::path::PathBuf;
use tempfile::TempDir;

use crate::core::{
    audit::Artifact,
    discovery::DiscoveryError,
    expectation::judge,
    models::{
        ExecutionResult, Fault, RunReport, RunSummary, SkipReason, TestUnit, Transcript,
        UnitRecord, Verdict,
    },
    secrets::{DerivedSecret, SecretSet},
};

/// First-wins positions of recorded keys.
///
/// 已记录键的位置，先到者胜。
#[derive(Debug)]
pub struct RecordIndex<K> {
    slots: HashMap<K, usize>,
}

impl<K> Default for RecordIndex<K> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq> RecordIndex<K> {
    /// Claims position `next` for `key`. Returns `Err` with the position of
    /// the first record when the key was already claimed.
    pub fn claim(&mut self, key: K, next: usize) -> Result<usize, usize> {
        match self.slots.get(&key) {
            Some(&existing) => Err(existing),
            None => {
                self.slots.insert(key, next);
                Ok(next)
            }
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }
}

/// Accumulates verdicts for one run.
#[derive(Debug)]
pub struct Aggregator {
    report: RunReport,
    index: RecordIndex<(PathBuf, u32)>,
    redaction: SecretSet,
    transcript_limit: usize,
    retain_streams: bool,
    /// Captured streams are written here instead of held in memory.
    spool: Option<TempDir>,
    streams: Vec<Artifact>,
    derived: BTreeSet<DerivedSecret>,
}

impl Aggregator {
    /// Creates an aggregator.
    ///
    /// # Arguments
    /// * `started_at` - Start of the run
    /// * `redaction` - Secrets masked in the recorded command lines
    /// * `transcript_limit` - Bytes of each stream kept for the HTML store pages
    pub fn new(started_at: DateTime<Utc>, redaction: SecretSet, transcript_limit: usize) -> Self {
        Self {
            report: RunReport::new(started_at),
            index: RecordIndex::default(),
            redaction,
            transcript_limit,
            retain_streams: false,
            spool: None,
            streams: Vec::new(),
            derived: BTreeSet::new(),
        }
    }

    /// Keeps full stdout/stderr of every unit for the audit pass, spooled to a
    /// temporary directory that lives as long as the aggregator.
    pub fn retain_streams(mut self, retain: bool) -> Self {
        self.retain_streams = retain;
        self
    }

    /// Judges and records one execution. Returns the verdict stored for the key.
    ///
    /// 判定并记录一次执行，返回该键所存储的判定结果。
    pub fn record(&mut self, unit: &TestUnit, iteration: u32, result: ExecutionResult) -> Verdict {
        let key = (unit.input.clone(), iteration);
        if let Some(existing) = self.claim(key) {
            tracing::debug!(unit = %unit.name, iteration, "duplicate result ignored");
            return existing;
        }

        let verdict = judge(unit, &result);
        let transcript = Transcript::capture(&result, self.transcript_limit);
        let record = UnitRecord {
            name: unit.name.clone(),
            input: unit.input.clone(),
            iteration,
            detail: verdict.detail(),
            verdict: verdict.clone(),
            duration_ms: result.duration.as_millis() as u64,
            exit_code: result.exit_code,
            command: Some(self.redaction.redact(&result.command.render())),
            started_at: Some(result.started_at),
            transcript: Some(transcript),
        };

        if self.retain_streams {
            let label = format!("{} #{}", unit.name, iteration);
            let slot = self.report.records().len();
            let stdout = self.spool_stream(format!("{label} stdout"), slot, "stdout", result.stdout);
            let stderr = self.spool_stream(format!("{label} stderr"), slot, "stderr", result.stderr);
            self.streams.extend([stdout, stderr]);
        }

        self.report.push(record);
        verdict
    }

    /// Records a unit that was excluded because its companions are malformed.
    pub fn record_discovery_error(&mut self, error: &DiscoveryError) -> Verdict {
        if let Some(existing) = self.claim((error.input.clone(), 1)) {
            return existing;
        }
        let verdict = Verdict::FatalError {
            fault: Fault::Discovery {
                message: error.kind.to_string(),
            },
        };
        self.report.push(bare_record(&error.name, &error.input, 1, verdict.clone()));
        verdict
    }

    /// Records a unit that was never dispatched.
    pub fn record_cancelled(&mut self, unit: &TestUnit, iteration: u32) -> Verdict {
        if let Some(existing) = self.claim((unit.input.clone(), iteration)) {
            return existing;
        }
        let verdict = Verdict::Skipped {
            reason: SkipReason::Cancelled,
        };
        self.report.push(bare_record(&unit.name, &unit.input, iteration, verdict.clone()));
        verdict
    }

    /// Records a unit whose worker panicked or was aborted.
    pub fn record_crash(&mut self, unit: &TestUnit, iteration: u32, message: String) -> Verdict {
        if let Some(existing) = self.claim((unit.input.clone(), iteration)) {
            return existing;
        }
        let verdict = Verdict::FatalError {
            fault: Fault::Crash { message },
        };
        self.report.push(bare_record(&unit.name, &unit.input, iteration, verdict.clone()));
        verdict
    }

    /// Adds secrets derived by hooks after a unit ran.
    pub fn add_derived(&mut self, secrets: impl IntoIterator<Item = DerivedSecret>) {
        self.derived.extend(secrets);
    }

    pub fn derived(&self) -> impl Iterator<Item = &DerivedSecret> {
        self.derived.iter()
    }

    /// Captured streams kept for the audit pass, in recording order.
    pub fn stream_artifacts(&self) -> &[Artifact] {
        &self.streams
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn is_recorded(&self, unit: &TestUnit, iteration: u32) -> bool {
        self.index.contains(&(unit.input.clone(), iteration))
    }

    /// Closes the report and computes the outcome from the counters.
    pub fn finalize(&mut self) -> RunSummary {
        self.report.finish(Utc::now());
        RunSummary::from_report(&self.report)
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Claims the next record slot for `key`, or returns the verdict already
    /// stored for it. A successful claim must be followed by one `report.push`.
    fn claim(&mut self, key: (PathBuf, u32)) -> Option<Verdict> {
        let next = self.report.records().len();
        self.index
            .claim(key, next)
            .err()
            .map(|i| self.report.records()[i].verdict.clone())
    }

    /// Writes one captured stream to the spool directory. Falls back to an
    /// in-memory artifact when the spool cannot be written.
    fn spool_stream(&mut self, label: String, slot: usize, stream: &str, bytes: Vec<u8>) -> Artifact {
        if self.spool.is_none() {
            match tempfile::Builder::new().prefix("fixture-runner-streams").tempdir() {
                Ok(dir) => self.spool = Some(dir),
                Err(e) => tracing::warn!("cannot create stream spool directory: {e}"),
            }
        }
        let Some(dir) = &self.spool else {
            return Artifact::memory(label, bytes);
        };
        let path = dir.path().join(format!("{slot:06}.{stream}"));
        match fs::write(&path, &bytes) {
            Ok(()) => Artifact::spooled(label, path),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot spool captured stream: {e}");
                Artifact::memory(label, bytes)
            }
        }
    }
}

fn bare_record(name: &str, input: &std::path::Path, iteration: u32, verdict: Verdict) -> UnitRecord {
    UnitRecord {
        name: name.to_string(),
        input: input.to_path_buf(),
        iteration,
        detail: verdict.detail(),
        verdict,
        duration_ms: 0,
        exit_code: None,
        command: None,
        started_at: None,
        transcript: None,
    }
}
