//! # Expectation Checking Module / 期望检查模块
//!
//! Turns a unit and its execution result into a [`Verdict`]. A mismatch is a
//! normal outcome carrying a structured diff, never an error.
//!
//! 将单元及其执行结果转换为 [`Verdict`]。不匹配是带有结构化差异的正常结果，而不是错误。

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;

use crate::core::models::{
    ExecutionResult, Mismatch, PatternLine, SKIP_EXIT_CODE, SkipReason, TestUnit, TextDiff,
    Verdict,
};

static RAW_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<<([^>]+)>>>").expect("static regex"));

const EOF_MARKER: &str = "<eof>";

/// Computes the verdict of one execution against the unit's expectations.
///
/// Checks run in a fixed order and stop at the first mismatch: fault, skip
/// code, exit code, stdout, stdout pattern, stderr, stderr pattern, curl
/// commands, artifacts.
///
/// 根据单元的期望计算一次执行的判定结果。
/// 检查按固定顺序进行，并在第一个不匹配处停止。
pub fn judge(unit: &TestUnit, result: &ExecutionResult) -> Verdict {
    if let Some(fault) = &result.fault {
        return Verdict::FatalError {
            fault: fault.clone(),
        };
    }
    let Some(actual_code) = result.exit_code else {
        return Verdict::FatalError {
            fault: crate::core::models::Fault::Crash {
                message: "process ended without an exit code".to_string(),
            },
        };
    };
    if actual_code == SKIP_EXIT_CODE {
        return Verdict::Skipped {
            reason: SkipReason::Unsupported,
        };
    }

    match check(unit, result, actual_code) {
        Some(mismatch) => Verdict::Fail { mismatch },
        None => Verdict::Pass,
    }
}

fn check(unit: &TestUnit, result: &ExecutionResult, actual_code: i32) -> Option<Mismatch> {
    let expect = &unit.expect;

    let expected_code = expect.expected_exit_code();
    if actual_code != expected_code {
        return Some(Mismatch::ExitCode {
            expected: expected_code,
            actual: actual_code,
        });
    }

    if let Some(expected) = &expect.stdout {
        if *expected != result.stdout {
            let diff = first_divergence(&decode_text(expected), &decode_text(&result.stdout));
            return Some(Mismatch::Stdout { diff });
        }
    }

    if let Some(patterns) = &expect.stdout_pattern {
        let actual = ignore_lines(&decode_text(&result.stdout));
        if let Some(diff) = match_pattern(patterns, &actual) {
            return Some(Mismatch::StdoutPattern { diff });
        }
    }

    let stderr = decode_text(&result.stderr);

    if let Some(expected) = &expect.stderr {
        let expected = ignore_lines(expected);
        let actual = ignore_lines(&stderr);
        if expected.trim() != actual.trim() {
            let diff = first_divergence(expected.trim(), actual.trim());
            return Some(Mismatch::Stderr { diff });
        }
    }

    if let Some(patterns) = &expect.stderr_pattern {
        let actual = ignore_lines(&stderr);
        if let Some(diff) = match_pattern(patterns, &actual) {
            return Some(Mismatch::StderrPattern { diff });
        }
    }

    if let Some(expected) = &expect.commands {
        let actual = curl_commands(&stderr);
        if let Some(diff) = compare_lines(expected, &actual) {
            return Some(Mismatch::Commands { diff });
        }
    }

    for artifact in &expect.artifacts {
        let Ok(produced) = fs::read(&artifact.produced) else {
            return Some(Mismatch::MissingArtifact {
                path: artifact.produced.clone(),
            });
        };
        let expected = match fs::read(&artifact.expected) {
            Ok(bytes) => bytes,
            Err(_) => {
                return Some(Mismatch::MissingArtifact {
                    path: artifact.expected.clone(),
                });
            }
        };
        if expected != produced {
            return Some(Mismatch::Artifact {
                path: artifact.produced.clone(),
                diff: first_divergence(&decode_text(&expected), &decode_text(&produced)),
            });
        }
    }

    None
}

/// Decodes captured bytes, honouring UTF-8 and UTF-16 byte order marks.
/// 解码捕获的字节，支持 UTF-8 与 UTF-16 字节序标记。
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    let utf16 = |rest: &[u8], le: bool| {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| {
                if le {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        String::from_utf16_lossy(&units)
    };
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return utf16(rest, true);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16(rest, false);
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Drops curl debug lines (`**`) and loader noise so they never take part in
/// comparisons.
pub fn ignore_lines(text: &str) -> String {
    text.split('\n')
        .filter(|line| !line.starts_with("**"))
        .filter(|line| !line.contains("libcurl.so.4: no version information available"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compiles a pattern companion into anchored line regexes.
///
/// Text is literal except for `<<<regex>>>` segments, which are inserted
/// verbatim. On error, returns the 1-based line number with the regex error.
pub fn compile_pattern(content: &str) -> Result<Vec<PatternLine>, (usize, regex::Error)> {
    ignore_lines(content)
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            let mut regex = String::from("^");
            let mut last = 0;
            for caps in RAW_SEGMENT.captures_iter(line) {
                let (Some(whole), Some(raw)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                regex.push_str(&regex::escape(&line[last..whole.start()]));
                regex.push_str(raw.as_str());
                last = whole.end();
            }
            regex.push_str(&regex::escape(&line[last..]));
            regex.push('$');
            Regex::new(&regex)
                .map(|regex| PatternLine {
                    source: line.to_string(),
                    regex,
                })
                .map_err(|e| (i + 1, e))
        })
        .collect()
}

fn match_pattern(patterns: &[PatternLine], actual: &str) -> Option<TextDiff> {
    let actual_lines: Vec<&str> = actual
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    for (i, (pattern, line)) in patterns.iter().zip(&actual_lines).enumerate() {
        if !pattern.regex.is_match(line) {
            return Some(TextDiff {
                line: i + 1,
                expected: pattern.source.clone(),
                actual: line.to_string(),
            });
        }
    }
    line_count_diff(patterns.len(), actual_lines.len(), |i| {
        patterns.get(i).map(|p| p.source.clone())
    }, |i| actual_lines.get(i).map(|l| l.to_string()))
}

fn compare_lines(expected: &[String], actual: &[String]) -> Option<TextDiff> {
    for (i, (e, a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            return Some(TextDiff {
                line: i + 1,
                expected: e.clone(),
                actual: a.clone(),
            });
        }
    }
    line_count_diff(expected.len(), actual.len(), |i| expected.get(i).cloned(), |i| {
        actual.get(i).cloned()
    })
}

fn line_count_diff(
    expected_len: usize,
    actual_len: usize,
    expected_at: impl Fn(usize) -> Option<String>,
    actual_at: impl Fn(usize) -> Option<String>,
) -> Option<TextDiff> {
    if expected_len == actual_len {
        return None;
    }
    let at = expected_len.min(actual_len);
    Some(TextDiff {
        line: at + 1,
        expected: expected_at(at).unwrap_or_else(|| EOF_MARKER.to_string()),
        actual: actual_at(at).unwrap_or_else(|| EOF_MARKER.to_string()),
    })
}

/// Locates the first divergent line between two texts.
/// 定位两个文本之间第一个不同的行。
pub fn first_divergence(expected: &str, actual: &str) -> TextDiff {
    let expected_lines: Vec<String> = expected.split('\n').map(str::to_string).collect();
    let actual_lines: Vec<String> = actual.split('\n').map(str::to_string).collect();
    compare_lines(&expected_lines, &actual_lines).unwrap_or_else(|| TextDiff {
        // Same text after decoding: the bytes differ in encoding only.
        line: 1,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// `* curl ...` lines of a verbose stderr, without the leading `* `.
pub fn curl_commands(stderr: &str) -> Vec<String> {
    stderr
        .trim()
        .lines()
        .filter(|line| line.starts_with("* curl"))
        .map(|line| line[2..].trim_end_matches('\r').to_string())
        .collect()
}
