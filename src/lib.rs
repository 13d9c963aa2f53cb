//! # Fixture Runner Library / Fixture Runner 库
//!
//! This library provides the core functionality for the Fixture Runner tool,
//! a test orchestration engine that runs a command-line program against a
//! fixture corpus, reports the verdicts in several formats and audits every
//! produced artifact for leaked secrets.
//!
//! 此库为 Fixture Runner 工具提供核心功能，
//! 这是一个测试编排引擎：针对夹具语料运行命令行程序，以多种格式报告判定结果，
//! 并审计每个产出的产物是否泄漏密钥。
//!
//! ## Modules / 模块
//!
//! - `core` - Data models, discovery, execution, scheduling, aggregation and audit
//! - `infra` - Infrastructure services like process execution and file system operations
//! - `reporting` - JUnit, TAP, JSON, HTML and console reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 数据模型、发现、执行、调度、聚合与审计
//! - `infra` - 基础设施服务，如进程执行和文件系统操作
//! - `reporting` - JUnit、TAP、JSON、HTML 和控制台报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use crate::core::config;
pub use crate::core::execution;
pub use crate::core::models;

/// Picks the best available locale for a requested one.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then just the
/// language code (e.g., "en" from "en-US"), and finally falls back to "en".
///
/// 为请求的语言环境选择最合适的可用语言环境：先完整匹配，再匹配语言代码，最后回退到 "en"。
pub fn select_locale(requested: &str) -> String {
    let available_locales = rust_i18n::available_locales!();
    let requested = requested.replace('_', "-");

    if available_locales.contains(&requested.as_str()) {
        return requested;
    }
    let language = requested.split('-').next().unwrap_or("en");
    available_locales
        .iter()
        .find(|locale| locale.split('-').next() == Some(language))
        .map(|locale| locale.to_string())
        .unwrap_or_else(|| "en".to_string())
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
