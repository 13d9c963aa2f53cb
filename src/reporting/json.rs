//! # JSON Reporting Module / JSON 报告模块
//!
//! The JSON report is an array of unit records. It is also the persisted
//! form read back in append mode.
//!
//! JSON 报告是单元记录的数组，也是追加模式下读回的持久化形式。

use std::fs;
use std::path::Path;

use crate::core::models::{RunReport, UnitRecord};
use crate::reporting::ReportError;

/// Serializes the records in report order.
pub fn render(report: &RunReport) -> serde_json::Result<String> {
    let mut content = serde_json::to_string_pretty(report.records())?;
    content.push('\n');
    Ok(content)
}

/// Rebuilds a report from JSON text; counters are recomputed from the records.
pub fn parse(content: &str) -> serde_json::Result<RunReport> {
    let records: Vec<UnitRecord> = serde_json::from_str(content)?;
    Ok(RunReport::from_records(records))
}

/// Reads a JSON report from disk. A missing file yields `None`.
///
/// 从磁盘读取 JSON 报告。文件不存在时返回 `None`。
pub fn read(path: &Path) -> Result<Option<RunReport>, ReportError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ReportError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    parse(&content)
        .map(Some)
        .map_err(|source| ReportError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
