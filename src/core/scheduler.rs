//! # Scheduler Module / 调度模块
//!
//! Expands the discovered units into work items (one per unit and repeat
//! iteration) and dispatches them over a bounded pool of workers. With one
//! worker the run is strictly sequential and its record order is the
//! dispatch order. Fail-fast, the run-level timeout and an external stop
//! token all end dispatching in the same way: in-flight units finish, the
//! rest are recorded as cancelled skips.
//!
//! 将发现的单元展开为工作项（每个单元每次重复迭代一个），并在有界的工作者池上分发。
//! 只有一个工作者时运行严格按顺序进行。快速失败、运行级超时和外部停止令牌都以相同方式结束分发：
//! 正在执行的单元会完成，其余单元被记录为已取消的跳过。

use futures::{stream, StreamExt};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::{
    aggregator::Aggregator,
    execution::Executor,
    models::{TestUnit, Verdict},
    secrets::{DerivedSecret, SecretHook, SecretSet},
};

/// One scheduled execution of a unit.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Position in the plan; sequential runs record in this order.
    pub seq: usize,
    /// 1-based repeat index.
    pub iteration: u32,
    pub unit: Arc<TestUnit>,
}

/// Enqueues the full unit set `repeat` times: `u1, u2, u1, u2, ...`.
///
/// 将完整的单元集合入队 `repeat` 次。
pub fn plan(units: Vec<TestUnit>, repeat: u32) -> Vec<WorkItem> {
    let units: Vec<Arc<TestUnit>> = units.into_iter().map(Arc::new).collect();
    (1..=repeat.max(1))
        .flat_map(|iteration| units.iter().map(move |unit| (iteration, Arc::clone(unit))))
        .enumerate()
        .map(|(seq, (iteration, unit))| WorkItem {
            seq,
            iteration,
            unit,
        })
        .collect()
}

/// Why dispatching stopped before the plan was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    FailFast,
    RunTimeout,
    Interrupted,
}

/// What the scheduler did with the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub dispatched: usize,
    pub cancelled: usize,
    pub stopped: Option<StopReason>,
}

impl ScheduleReport {
    /// `true` when units were left undispatched by the run timeout or an
    /// interrupt. Fail-fast stops are a scheduling choice and do not count.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.stopped,
            Some(StopReason::RunTimeout | StopReason::Interrupted)
        )
    }
}

type Progress = Arc<dyn Fn(&WorkItem, &Verdict) + Send + Sync>;

/// Bounded worker pool over an [`Executor`].
pub struct Scheduler<E> {
    executor: Arc<E>,
    jobs: usize,
    fail_fast: bool,
    run_timeout: Option<Duration>,
    hooks: Arc<[SecretHook]>,
    secrets: Arc<SecretSet>,
    stop: CancellationToken,
    progress: Option<Progress>,
}

impl<E: Executor> Scheduler<E> {
    /// Creates a scheduler with `jobs` workers (at least one).
    pub fn new(executor: E, jobs: usize) -> Self {
        Self {
            executor: Arc::new(executor),
            jobs: jobs.max(1),
            fail_fast: false,
            run_timeout: None,
            hooks: Arc::from(Vec::new()),
            secrets: Arc::new(SecretSet::default()),
            stop: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Hooks run after every unit with the base `secrets`; their derived
    /// values are handed to the aggregator.
    pub fn hooks(mut self, hooks: Vec<SecretHook>, secrets: SecretSet) -> Self {
        self.hooks = Arc::from(hooks);
        self.secrets = Arc::new(secrets);
        self
    }

    /// External stop signal, e.g. Ctrl-C.
    pub fn stop_token(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    /// Called on the scheduling task for each recorded unit, in completion order.
    pub fn on_result(mut self, progress: impl Fn(&WorkItem, &Verdict) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Dispatches every item and records every outcome into `aggregator`.
    ///
    /// 分发每个工作项，并将每个结果记录到 `aggregator` 中。
    pub async fn run(&self, items: Vec<WorkItem>, aggregator: Arc<Mutex<Aggregator>>) -> ScheduleReport {
        let token = self.stop.child_token();
        let reason: Arc<OnceLock<StopReason>> = Arc::new(OnceLock::new());

        let timer = self.run_timeout.map(|limit| {
            let token = token.clone();
            let reason = Arc::clone(&reason);
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!("run timeout of {}s reached, stopping dispatch", limit.as_secs());
                        let _ = reason.set(StopReason::RunTimeout);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let mut results = stream::iter(items.into_iter().map(|item| {
            let executor = Arc::clone(&self.executor);
            let hooks = Arc::clone(&self.hooks);
            let secrets = Arc::clone(&self.secrets);
            let aggregator = Arc::clone(&aggregator);
            let token = token.clone();
            let reason = Arc::clone(&reason);
            let fail_fast = self.fail_fast;
            let task_item = item.clone();

            let handle = tokio::spawn(async move {
                let item = task_item;
                if token.is_cancelled() {
                    let verdict = aggregator
                        .lock()
                        .await
                        .record_cancelled(&item.unit, item.iteration);
                    return (verdict, false);
                }

                let result = executor.execute(&item.unit).await;
                let derived = run_hooks(&hooks, &item.unit, &result, &secrets).await;

                let verdict = {
                    let mut aggregator = aggregator.lock().await;
                    aggregator.add_derived(derived);
                    aggregator.record(&item.unit, item.iteration, result)
                };

                if fail_fast && verdict.is_failure() {
                    let _ = reason.set(StopReason::FailFast);
                    token.cancel();
                }
                (verdict, true)
            });
            async move { (item, handle.await) }
        }))
        .buffer_unordered(self.jobs);

        let mut report = ScheduleReport::default();
        while let Some((item, joined)) = results.next().await {
            let (verdict, dispatched) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(unit = %item.unit.name, "worker failed: {e}");
                    let verdict = aggregator.lock().await.record_crash(
                        &item.unit,
                        item.iteration,
                        e.to_string(),
                    );
                    if self.fail_fast {
                        let _ = reason.set(StopReason::FailFast);
                        token.cancel();
                    }
                    (verdict, true)
                }
            };
            if dispatched {
                report.dispatched += 1;
            } else {
                report.cancelled += 1;
            }
            if let Some(progress) = &self.progress {
                progress(&item, &verdict);
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }
        if self.stop.is_cancelled() {
            let _ = reason.set(StopReason::Interrupted);
        }
        report.stopped = if report.cancelled > 0 { reason.get().copied() } else { None };
        report
    }
}

async fn run_hooks(
    hooks: &[SecretHook],
    unit: &TestUnit,
    result: &crate::core::models::ExecutionResult,
    secrets: &SecretSet,
) -> Vec<DerivedSecret> {
    let mut derived = Vec::new();
    for hook in hooks {
        match hook.after_unit(unit, result, secrets).await {
            Ok(values) => derived.extend(values),
            Err(e) => tracing::warn!(unit = %unit.name, hook = hook.name(), "secret hook failed: {e:#}"),
        }
    }
    derived
}
