//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command: it drives one run through the
//! phases `Discovering → Scheduled → Executing → Aggregating → Reporting →
//! Auditing → Done` and returns the exit code of the outcome.
//!
//! 此模块实现了 `run` 命令：驱动一次运行依次经过各个阶段，并返回结果对应的退出码。

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{signal, sync::Mutex};
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        aggregator::Aggregator,
        audit::{audit, Artifact},
        config::{expand_path, RunConfig},
        discovery::Discovery,
        execution::{ExecutionOptions, ProcessExecutor},
        models::{RunReport, RunState, RunStateMachine, TestUnit},
        scheduler::{plan, Scheduler, StopReason},
        secrets::{unicode_env, SecretHook, SecretSetBuilder},
    },
    infra::{fs::resolve, t},
    reporting::{
        console::{
            print_discovery_error, print_failure_details, print_leak_report, print_outcome,
            print_progress, print_summary,
        },
        dir_artifacts, json, load_sources, write_reports,
    },
};

/// Command-line overrides for one `run` invocation. `None` keeps the config value.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub config: PathBuf,
    pub config_explicit: bool,
    pub language: Option<String>,
    pub roots: Vec<PathBuf>,
    pub global_options: Vec<String>,
    pub program: Option<String>,
    pub pattern: Option<String>,
    pub jobs: Option<usize>,
    pub repeat: Option<u32>,
    pub fail_fast: bool,
    pub timeout_secs: Option<u64>,
    pub run_timeout_secs: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub report_junit: Option<PathBuf>,
    pub report_tap: Option<PathBuf>,
    pub report_json: Option<PathBuf>,
    pub report_html: Option<PathBuf>,
    pub append: bool,
    pub secrets: Vec<String>,
    pub secrets_file: Option<PathBuf>,
    pub secret_env_prefix: Option<String>,
    pub audit_dirs: Vec<PathBuf>,
}

impl RunArgs {
    /// Applies the command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut RunConfig) {
        if !self.roots.is_empty() {
            config.roots = self.roots.clone();
        }
        if !self.global_options.is_empty() {
            config.global_options = self.global_options.clone();
        }
        if let Some(program) = &self.program {
            config.program = program.clone();
        }
        if let Some(pattern) = &self.pattern {
            config.pattern = pattern.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(repeat) = self.repeat {
            config.repeat = repeat;
        }
        config.fail_fast |= self.fail_fast;
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if self.run_timeout_secs.is_some() {
            config.run_timeout_secs = self.run_timeout_secs;
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(dir) = &self.artifacts_dir {
            config.artifacts_dir = dir.clone();
        }
        let reports = &mut config.reports;
        for (target, value) in [
            (&mut reports.junit, &self.report_junit),
            (&mut reports.tap, &self.report_tap),
            (&mut reports.json, &self.report_json),
            (&mut reports.html, &self.report_html),
        ] {
            if value.is_some() {
                *target = value.clone();
            }
        }
        reports.append |= self.append;
        if let Some(file) = &self.secrets_file {
            config.secrets.file = Some(file.clone());
        }
        if let Some(prefix) = &self.secret_env_prefix {
            config.secrets.env_prefix = prefix.clone();
        }
        config.secrets.audit_dirs.extend(self.audit_dirs.iter().cloned());
    }
}

/// Expands `~` and `$VAR` in every configured path.
fn expand_paths(config: &mut RunConfig) -> Result<()> {
    for root in &mut config.roots {
        *root = expand_path(root)?;
    }
    config.work_dir = expand_path(&config.work_dir)?;
    config.artifacts_dir = expand_path(&config.artifacts_dir)?;
    let reports = &mut config.reports;
    for path in [
        &mut reports.junit,
        &mut reports.tap,
        &mut reports.json,
        &mut reports.html,
        &mut config.secrets.file,
    ]
    .into_iter()
    .flatten()
    {
        *path = expand_path(path)?;
    }
    for dir in &mut config.secrets.audit_dirs {
        *dir = expand_path(dir)?;
    }
    Ok(())
}

/// Executes the run command with the provided arguments.
///
/// # Arguments
/// * `args` - Command-line overrides, including the config file location
///
/// # Returns
/// The process exit code of the run outcome. Configuration, I/O and report
/// errors are returned as `Err`.
pub async fn execute(args: RunArgs) -> Result<u8> {
    let (mut config, locale) =
        super::load_config(&args.config, args.config_explicit, args.language.as_deref())?;
    args.apply(&mut config);
    expand_paths(&mut config)?;
    config.validate()?;

    let mut machine = RunStateMachine::default();

    // Discovering
    let base = SecretSetBuilder::from_sources(&config.secrets, &args.secrets, unicode_env())
        .context(t!("run.secrets_failed").to_string())?;
    let forwarded = base.clone().build().forward_args(&config.secrets.forward_flag);

    let artifacts_dir = resolve(&config.work_dir, &config.artifacts_dir);
    let discovery = Discovery::new(config.roots.clone(), &config.pattern)
        .with_context(|| t!("run.invalid_pattern", pattern = config.pattern).to_string())?
        .with_artifacts(artifacts_dir, config.artifact_extensions.clone());

    println!(
        "{}",
        t!(
            "run.discovering",
            locale = locale,
            roots = discovery
                .roots()
                .iter()
                .map(|r| r.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
        .cyan()
    );

    let mut units: Vec<TestUnit> = Vec::new();
    let mut discovery_errors = Vec::new();
    let mut harvest = base;
    for item in discovery.iter() {
        match item {
            Ok(unit) => {
                harvest
                    .harvest_options(&config.secrets.forward_flag, &unit.options)
                    .with_context(|| t!("run.harvest_failed", name = unit.name).to_string())?;
                units.push(unit);
            }
            Err(error) => {
                tracing::warn!("{error}");
                print_discovery_error(&error, &locale);
                discovery_errors.push(error);
            }
        }
    }
    let secrets = harvest.build();
    let produced: Vec<PathBuf> = units
        .iter()
        .flat_map(|unit| unit.expect.artifacts.iter().map(|a| a.produced.clone()))
        .collect();

    // Scheduled
    machine.advance(RunState::Scheduled)?;
    let jobs = config.effective_jobs();
    let unit_count = units.len();
    let items = plan(units, config.repeat);
    println!(
        "{}",
        t!(
            "run.scheduled",
            locale = locale,
            units = unit_count,
            repeat = config.repeat,
            total = items.len(),
            jobs = jobs
        )
        .bold()
    );
    if items.is_empty() && discovery_errors.is_empty() {
        println!("{}", t!("run.no_units", locale = locale).yellow());
    }

    let hooks: Vec<SecretHook> = config.secrets.hooks.iter().map(SecretHook::from).collect();
    let mut aggregator = Aggregator::new(Utc::now(), secrets.clone(), config.max_transcript_bytes)
        .retain_streams(!secrets.is_empty());
    for error in &discovery_errors {
        aggregator.record_discovery_error(error);
    }
    let aggregator = Arc::new(Mutex::new(aggregator));

    // Executing
    machine.advance(RunState::Executing)?;
    let mut global_options = config.global_options.clone();
    global_options.extend(forwarded);
    let options = ExecutionOptions {
        program: config.program.clone(),
        global_options,
        work_dir: config.work_dir.clone(),
        timeout: Duration::from_secs(config.timeout_secs),
    };
    tracing::info!(
        command = %secrets.redact(&options.global_options.join(" ")),
        program = %options.program,
        "executing units"
    );

    let progress_locale = locale.clone();
    let scheduler = Scheduler::new(ProcessExecutor::new(options), jobs)
        .fail_fast(config.fail_fast)
        .run_timeout(config.run_timeout_secs.map(Duration::from_secs))
        .hooks(hooks, secrets.clone())
        .stop_token(setup_signal_handler(&locale))
        .on_result(move |item, verdict| print_progress(item, verdict, &progress_locale));
    let schedule = scheduler.run(items, Arc::clone(&aggregator)).await;

    if let Some(reason) = schedule.stopped {
        let count = schedule.cancelled;
        let message = match reason {
            StopReason::FailFast => t!("run.stopped_fail_fast", locale = locale, count = count),
            StopReason::RunTimeout => t!("run.stopped_run_timeout", locale = locale, count = count),
            StopReason::Interrupted => t!("run.stopped_interrupted", locale = locale, count = count),
        };
        println!("{}", message.yellow());
    }

    // Aggregating
    machine.advance(RunState::Aggregating)?;
    let (summary, report, audit_secrets, streams) = {
        let mut aggregator = aggregator.lock().await;
        let mut summary = aggregator.finalize();
        if schedule.is_incomplete() {
            summary = summary.incomplete();
        }
        let audit_secrets = secrets.with_derived(aggregator.derived().cloned());
        (
            summary,
            aggregator.report().clone(),
            audit_secrets,
            aggregator.stream_artifacts().to_vec(),
        )
    };

    // Reporting
    machine.advance(RunState::Reporting)?;
    print_summary(&report, &locale);
    print_failure_details(&report, &locale);

    let report = merge_prior(&config, report)?;
    let sources = load_sources(&report);
    let mut artifacts = write_reports(&report, &config.reports, &sources, &locale)
        .context(t!("run.report_failed").to_string())?;
    for path in config.report_paths() {
        println!("{}", t!("run.report_written", locale = locale, path = path.display()));
    }

    // Auditing
    machine.advance(RunState::Auditing)?;
    artifacts.extend(produced.into_iter().filter(|p| p.is_file()).map(Artifact::file));
    for dir in &config.secrets.audit_dirs {
        artifacts.extend(dir_artifacts(dir)?);
    }
    // Spooled streams live in the aggregator's temp dir, which outlives this audit.
    artifacts.extend(streams);

    let summary = if audit_secrets.is_empty() {
        summary
    } else {
        let leaks = audit(&audit_secrets, &artifacts)?;
        print_leak_report(&leaks, &locale);
        if leaks.is_clean() {
            summary
        } else {
            summary.with_leak()
        }
    };

    machine.advance(RunState::Done(summary.outcome))?;
    print_outcome(&summary, &locale);
    Ok(summary.exit_code())
}

/// In append mode, merges this run into the report already on disk.
fn merge_prior(config: &RunConfig, report: RunReport) -> Result<RunReport> {
    if !config.reports.append {
        return Ok(report);
    }
    let Some(path) = &config.reports.json else {
        return Ok(report);
    };
    match json::read(path)? {
        Some(prior) => {
            tracing::info!(
                prior = prior.records().len(),
                new = report.records().len(),
                "merging into existing report"
            );
            Ok(RunReport::merge(prior, report))
        }
        None => Ok(report),
    }
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
            token_clone.cancel();
        }
    });

    token
}
