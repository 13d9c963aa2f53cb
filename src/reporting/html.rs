//! # HTML Reporting Module / HTML 报告模块
//!
//! This module handles the generation of the HTML report directory:
//! `index.html` with run statistics and a results table, plus two pages per
//! record. `<id>-source.html` echoes the unit's input file and is
//! redaction-exempt; `<id>-store.html` shows the redacted command line, the
//! exit code, the mismatch detail and the captured output transcript, and is
//! audited like every other artifact.
//!
//! 此模块处理 HTML 报告目录的生成：包含运行统计和结果表格的 `index.html`，
//! 以及每条记录的两个页面。`<id>-source.html` 回显单元的输入文件，免于脱敏检查；
//! `<id>-store.html` 显示脱敏后的命令行、退出码、不匹配详情和捕获的输出记录，与其他产物一样接受审计。

use maud::{html, Markup, PreEscaped, DOCTYPE};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::models::{RunReport, UnitRecord};
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = include_str!("assets/report.css");

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = include_str!("assets/report.js");

const INDEX_PAGE: &str = "index.html";
const SOURCE_PAGE_SUFFIX: &str = "-source.html";

/// Input file contents keyed by input path, loaded before rendering.
pub type SourceMap = BTreeMap<PathBuf, String>;

/// One rendered file of the HTML report directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub redaction_exempt: bool,
}

/// Reads the input file of every record. Unreadable inputs are left out and
/// rendered as unavailable.
///
/// 读取每条记录的输入文件。无法读取的输入会被跳过，并显示为不可用。
pub fn load_sources(report: &RunReport) -> SourceMap {
    let mut sources = SourceMap::new();
    for record in report.records() {
        if sources.contains_key(&record.input) {
            continue;
        }
        match fs::read(&record.input) {
            Ok(bytes) => {
                sources.insert(
                    record.input.clone(),
                    String::from_utf8_lossy(&bytes).into_owned(),
                );
            }
            Err(e) => tracing::debug!(input = %record.input.display(), "source not loaded: {e}"),
        }
    }
    sources
}

/// Base name of the pages of the record at `index`.
pub fn page_id(index: usize, record: &UnitRecord) -> String {
    format!("{:04}-{}", index + 1, record.slug())
}

/// Renders the whole report directory: index first, then source and store
/// pages in record order.
///
/// 渲染整个报告目录：先是索引页，然后按记录顺序生成源码页和存储页。
///
/// # Arguments / 参数
/// * `report` - The run report to render
///              要渲染的运行报告
/// * `sources` - Input file contents, see [`load_sources`]
///               输入文件内容
/// * `locale` - The locale to use for internationalization
///              用于国际化使用的语言环境
pub fn render(report: &RunReport, sources: &SourceMap, locale: &str) -> Vec<Page> {
    let mut pages = vec![Page {
        file_name: INDEX_PAGE.to_string(),
        bytes: render_index(report, locale).into_string().into_bytes(),
        redaction_exempt: false,
    }];

    for (i, record) in report.records().iter().enumerate() {
        let id = page_id(i, record);
        pages.push(Page {
            file_name: format!("{id}{SOURCE_PAGE_SUFFIX}"),
            bytes: render_source(record, sources.get(&record.input), locale)
                .into_string()
                .into_bytes(),
            redaction_exempt: true,
        });
        pages.push(Page {
            file_name: format!("{id}-store.html"),
            bytes: render_store(record, locale).into_string().into_bytes(),
            redaction_exempt: false,
        });
    }
    pages
}

/// Whether `path` is a source page of an HTML report directory, i.e. a
/// redaction-exempt page written next to the report's `index.html`.
///
/// 判断 `path` 是否为 HTML 报告目录中的源码页面（免于脱敏检查）。
pub fn is_source_page(path: &Path) -> bool {
    let is_source = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(SOURCE_PAGE_SUFFIX));
    is_source && path.with_file_name(INDEX_PAGE).is_file()
}

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (title) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                (body)
                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

fn render_index(report: &RunReport, locale: &str) -> Markup {
    let counters = report.counters();
    let elapsed = report
        .elapsed()
        .map(|d| format!("{:.2}s", d.as_secs_f64()))
        .unwrap_or_else(|| "N/A".to_string());
    let started = report
        .started_at()
        .map(|s| s.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "N/A".to_string());

    let body = html! {
        h1 { (t!("html_report.main_header", locale = locale)) }
        p.run-info {
            (t!("html_report.started_at", locale = locale, time = started))
            " · "
            (t!("html_report.elapsed", locale = locale, elapsed = elapsed))
        }
        div.summary-container {
            (summary_item(counters.total(), "", &t!("html_report.summary.total", locale = locale)))
            (summary_item(counters.passed, "passed-text", &t!("html_report.summary.passed", locale = locale)))
            (summary_item(counters.failed, "failed-text", &t!("html_report.summary.failed", locale = locale)))
            (summary_item(counters.errors, "error-text", &t!("html_report.summary.errors", locale = locale)))
            (summary_item(counters.skipped, "skipped-text", &t!("html_report.summary.skipped", locale = locale)))
        }
        div.filter-bar {
            input #filter type="search" placeholder=(t!("html_report.filter_placeholder", locale = locale)) oninput="filterRows(this.value)";
        }
        table #results {
            thead {
                tr {
                    th { "#" }
                    th { (t!("html_report.table.header.name", locale = locale)) }
                    th.status-col { (t!("html_report.table.header.status", locale = locale)) }
                    th.duration-cell { (t!("html_report.table.header.duration", locale = locale)) }
                    th { (t!("html_report.table.header.pages", locale = locale)) }
                }
            }
            tbody {
                @for (i, record) in report.records().iter().enumerate() {
                    @let id = page_id(i, record);
                    @let detail_id = format!("detail-{}", i + 1);
                    tr.result-row data-name=(record.name) {
                        td { (i + 1) }
                        td {
                            (record.name)
                            @if record.iteration > 1 {
                                span.iteration { " #" (record.iteration) }
                            }
                        }
                        td.status-col {
                            div class=(format!("status-cell {}", record.verdict.status_class())) {
                                (record.verdict.status_str(locale))
                            }
                            @if record.detail.is_some() {
                                div.output-toggle onclick=(format!("toggleOutput('{detail_id}')")) {
                                    (t!("html_report.toggle_output", locale = locale))
                                }
                            }
                        }
                        td.duration-cell { (format!("{:.2}s", record.duration().as_secs_f64())) }
                        td.links {
                            a href=(format!("{id}-source.html")) { (t!("html_report.source_link", locale = locale)) }
                            " "
                            a href=(format!("{id}-store.html")) { (t!("html_report.store_link", locale = locale)) }
                        }
                    }
                    @if let Some(detail) = &record.detail {
                        tr id=(detail_id) style="display:none;" {
                            td colspan="5" { pre.output-content { (detail) } }
                        }
                    }
                }
            }
        }
    };
    layout(&t!("html_report.title", locale = locale), body)
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div.summary-item {
            span class=(format!("count {class}")) { (count) }
            span.label { (label) }
        }
    }
}

fn render_source(record: &UnitRecord, source: Option<&String>, locale: &str) -> Markup {
    let body = html! {
        p { a href="index.html" { (t!("html_report.back", locale = locale)) } }
        h1 { (record.name) }
        p.path { code { (record.input.display().to_string()) } }
        @match source {
            Some(text) => { pre.source { (text) } }
            None => { p.unavailable { (t!("html_report.source_unavailable", locale = locale)) } }
        }
    };
    layout(&record.name, body)
}

fn render_store(record: &UnitRecord, locale: &str) -> Markup {
    let exit_code = record
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let body = html! {
        p { a href="index.html" { (t!("html_report.back", locale = locale)) } }
        h1 { (record.name) " #" (record.iteration) }
        table.store {
            tr {
                th { (t!("html_report.table.header.status", locale = locale)) }
                td { div class=(format!("status-cell {}", record.verdict.status_class())) { (record.verdict.status_str(locale)) } }
            }
            tr {
                th { (t!("html_report.command", locale = locale)) }
                td { code { (record.command.as_deref().unwrap_or("-")) } }
            }
            tr {
                th { (t!("html_report.exit_code", locale = locale)) }
                td { (exit_code) }
            }
            @if let Some(detail) = &record.detail {
                tr {
                    th { (t!("html_report.detail", locale = locale)) }
                    td { pre.output-content { (detail) } }
                }
            }
        }
        @match &record.transcript {
            Some(transcript) => {
                h2 { "stdout" }
                pre.output-content { (transcript.stdout) }
                h2 { "stderr" }
                pre.output-content { (transcript.stderr) }
                @if transcript.truncated {
                    p.truncated { (t!("html_report.truncated", locale = locale)) }
                }
            }
            None => { p.unavailable { (t!("html_report.transcript_unavailable", locale = locale)) } }
        }
    };
    layout(&record.name, body)
}
