//! # JUnit XML Reporting Module / JUnit XML 报告模块
//!
//! One `<testsuite>` holding one `<testcase>` per record, in report order.
//!
//! 一个 `<testsuite>`，按报告顺序为每条记录生成一个 `<testcase>`。

use anyhow::Result;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::path::Path;

use crate::core::models::{RunReport, UnitRecord, Verdict};

const SUITE_NAME: &str = "fixture-runner";

/// Renders the report as JUnit XML.
pub fn render(report: &RunReport) -> Result<String> {
    let counters = report.counters();
    let total_time: f64 = report
        .records()
        .iter()
        .map(|r| r.duration().as_secs_f64())
        .sum();
    let totals = [
        ("tests", counters.total().to_string()),
        ("failures", counters.failed.to_string()),
        ("errors", counters.errors.to_string()),
        ("skipped", counters.skipped.to_string()),
        ("time", format!("{total_time:.3}")),
    ];

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut suites = BytesStart::new("testsuites");
    for (key, value) in &totals {
        suites.push_attribute((*key, value.as_str()));
    }
    writer.write_event(Event::Start(suites))?;

    let mut suite = BytesStart::new("testsuite");
    suite.push_attribute(("name", SUITE_NAME));
    for (key, value) in &totals {
        suite.push_attribute((*key, value.as_str()));
    }
    if let Some(started) = report.started_at() {
        let timestamp = started.format("%Y-%m-%dT%H:%M:%S").to_string();
        suite.push_attribute(("timestamp", timestamp.as_str()));
    }
    writer.write_event(Event::Start(suite))?;

    for record in report.records() {
        write_testcase(&mut writer, record)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;

    let mut xml = String::from_utf8(writer.into_inner())?;
    xml.push('\n');
    Ok(xml)
}

fn write_testcase(writer: &mut Writer<Vec<u8>>, record: &UnitRecord) -> Result<()> {
    let name = case_name(record);
    let class = class_name(&record.name);
    let time = format!("{:.3}", record.duration().as_secs_f64());
    let mut testcase = BytesStart::new("testcase");
    testcase.push_attribute(("name", &*xml_text(&name)));
    testcase.push_attribute(("classname", &*xml_text(&class)));
    testcase.push_attribute(("time", time.as_str()));

    let (element, kind) = match &record.verdict {
        Verdict::Pass => {
            writer.write_event(Event::Empty(testcase))?;
            return Ok(());
        }
        Verdict::Fail { .. } => ("failure", Some("mismatch")),
        Verdict::FatalError { .. } => ("error", Some("fault")),
        Verdict::Skipped { .. } => ("skipped", None),
    };

    let detail = record.detail.clone().or_else(|| record.verdict.detail()).unwrap_or_default();
    let detail = xml_text(&detail);
    writer.write_event(Event::Start(testcase))?;
    let mut child = BytesStart::new(element);
    child.push_attribute(("message", &*detail));
    match kind {
        Some(kind) => {
            child.push_attribute(("type", kind));
            writer.write_event(Event::Start(child))?;
            writer.write_event(Event::Text(BytesText::new(&detail)))?;
            writer.write_event(Event::End(BytesEnd::new(element)))?;
        }
        None => writer.write_event(Event::Empty(child))?,
    }
    writer.write_event(Event::End(BytesEnd::new("testcase")))?;
    Ok(())
}

/// The unit name, suffixed with `#<iteration>` for repeated runs.
pub(crate) fn case_name(record: &UnitRecord) -> String {
    if record.iteration > 1 {
        format!("{} #{}", record.name, record.iteration)
    } else {
        record.name.clone()
    }
}

/// `dir/sub/file.input` → `dir.sub`; top-level units use the suite name.
fn class_name(name: &str) -> String {
    let parent = Path::new(name)
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join(".")
        })
        .unwrap_or_default();
    if parent.is_empty() {
        SUITE_NAME.to_string()
    } else {
        parent
    }
}

/// Drops the control characters XML 1.0 cannot carry, even escaped.
fn xml_text(input: &str) -> Cow<'_, str> {
    let forbidden = |c: char| {
        (c < '\u{20}' && !matches!(c, '\t' | '\n' | '\r')) || c == '\u{FFFE}' || c == '\u{FFFF}'
    };
    if input.contains(forbidden) {
        Cow::Owned(input.chars().filter(|&c| !forbidden(c)).collect())
    } else {
        Cow::Borrowed(input)
    }
}
