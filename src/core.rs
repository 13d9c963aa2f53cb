//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the fixture runner:
//! data models, configuration, discovery, expectation checking, execution,
//! scheduling, aggregation and the secret audit.
//!
//! 此模块包含夹具运行器的核心功能：
//! 数据模型、配置、发现、期望检查、执行、调度、聚合以及密钥审计。

pub mod aggregator;
pub mod audit;
pub mod config;
pub mod discovery;
pub mod execution;
pub mod expectation;
pub mod models;
pub mod scheduler;
pub mod secrets;

// Re-exports
pub use aggregator::Aggregator;
pub use audit::{audit, Artifact, LeakReport};
pub use config::RunConfig;
pub use discovery::Discovery;
pub use execution::{execute, ExecutionOptions, Executor, ProcessExecutor};
pub use models::{RunReport, TestUnit, Verdict};
pub use scheduler::{plan, Scheduler, WorkItem};
pub use secrets::SecretSet;
