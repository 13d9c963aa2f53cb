//! # Test Execution Engine Module / 测试执行引擎模块
//!
//! This module runs one test unit: it resolves the command line
//! (`program global_options unit_options input`), applies the unit's
//! environment profile, spawns the process under a deadline and packages the
//! captured streams into an [`ExecutionResult`]. It never judges the result.
//!
//! 此模块运行一个测试单元：解析命令行，应用单元的环境配置，在截止时间内派生进程，
//! 并将捕获的输出打包为 [`ExecutionResult`]。它从不判定结果。

use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{
    core::models::{CommandLine, ExecutionResult, Fault, TestUnit},
    infra::command::{self, ProcessExit},
};

/// How every unit of a run is invoked.
/// 一次运行中每个单元的调用方式。
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// The program under test.
    pub program: String,
    /// Arguments placed before each unit's own options.
    pub global_options: Vec<String>,
    /// Working directory of the spawned process.
    pub work_dir: PathBuf,
    /// Per-unit deadline.
    pub timeout: Duration,
}

impl ExecutionOptions {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            global_options: Vec::new(),
            work_dir: PathBuf::from("."),
            timeout: Duration::from_secs(60),
        }
    }

    /// Resolves the full command line for `unit`.
    ///
    /// The input path is made absolute when the process runs in another
    /// directory, so that it still names the same file.
    pub fn command_line(&self, unit: &TestUnit) -> CommandLine {
        let input = if self.work_dir == Path::new(".") {
            unit.input.clone()
        } else {
            std::path::absolute(&unit.input).unwrap_or_else(|_| unit.input.clone())
        };
        let mut args = self.global_options.clone();
        args.extend(unit.options.iter().cloned());
        args.push(input.to_string_lossy().into_owned());
        CommandLine {
            program: self.program.clone(),
            args,
        }
    }
}

/// Something that turns a unit into an execution result.
///
/// The scheduler is generic over this seam so that it can be driven without
/// spawning real processes.
pub trait Executor: Send + Sync + 'static {
    fn execute(&self, unit: &TestUnit) -> impl Future<Output = ExecutionResult> + Send;
}

/// Runs units as child processes of the program under test.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    options: ExecutionOptions,
}

impl ProcessExecutor {
    pub fn new(options: ExecutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }
}

impl Executor for ProcessExecutor {
    fn execute(&self, unit: &TestUnit) -> impl Future<Output = ExecutionResult> + Send {
        execute(unit, &self.options)
    }
}

/// Executes one unit and captures its outcome.
///
/// Spawn failures, signals and deadline expiry are reported as a [`Fault`]
/// inside the result rather than as an error.
///
/// # Arguments
/// * `unit` - The test unit to run
/// * `options` - Program, global options, working directory and deadline
///
/// # Returns
/// An `ExecutionResult` holding both streams and the exit status
pub async fn execute(unit: &TestUnit, options: &ExecutionOptions) -> ExecutionResult {
    let command_line = options.command_line(unit);
    let started_at = Utc::now();

    let mut cmd = tokio::process::Command::new(&command_line.program);
    cmd.args(&command_line.args)
        .current_dir(&options.work_dir)
        .envs(unit.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    tracing::debug!(unit = %unit.name, "spawning {}", command_line.program);

    let captured = match command::spawn_and_capture(cmd, options.timeout).await {
        Ok(captured) => captured,
        Err(e) => {
            tracing::warn!(unit = %unit.name, "failed to spawn {}: {e}", command_line.program);
            let mut result = ExecutionResult::faulted(
                command_line,
                Fault::Spawn {
                    message: e.to_string(),
                },
            );
            result.started_at = started_at;
            return result;
        }
    };

    let (exit_code, fault) = match captured.exit {
        ProcessExit::Exited(code) => (Some(code), None),
        ProcessExit::Signaled(signal) => (None, Some(Fault::Signal { signal })),
        ProcessExit::TimedOut => (
            None,
            Some(Fault::Timeout {
                after_ms: options.timeout.as_millis() as u64,
            }),
        ),
    };

    tracing::debug!(
        unit = %unit.name,
        ?exit_code,
        duration_ms = captured.duration.as_millis() as u64,
        "unit finished"
    );

    ExecutionResult {
        command: command_line,
        stdout: captured.stdout,
        stderr: captured.stderr,
        exit_code,
        duration: captured.duration,
        started_at,
        fault,
    }
}
