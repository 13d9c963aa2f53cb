//! # Fixture Discovery Module / 夹具发现模块
//!
//! Enumerates fixture roots and binds every input file to its optional
//! companions (`.exit`, `.out`, `.err`, `.options`, ...) by stripping the
//! input's extension.
//!
//! 遍历夹具根目录，并通过去掉输入文件的扩展名，将每个输入文件与其可选的伴随文件绑定。

use globset::{Glob, GlobMatcher};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::core::expectation::compile_pattern;
use crate::core::models::{ExpectedArtifact, Expectations, TestUnit};

/// `name.1.input`, `name.2.input`... are parts of a multi-file fixture, not units.
static AUXILIARY_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\d+\.[^.]+$").expect("static regex"));

#[derive(Debug, Error)]
pub enum DiscoveryErrorKind {
    #[error("cannot walk fixture tree: {0}")]
    Walk(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: unparsable option string `{content}`")]
    Options { path: PathBuf, content: String },
    #[error("{path}: exit code is not an integer: `{content}`")]
    ExitCode { path: PathBuf, content: String },
    #[error("{path}: line {line} is not a NAME=VALUE pair")]
    Profile { path: PathBuf, line: usize },
    #[error("{path}: line {line}: invalid pattern: {message}")]
    Pattern {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// A unit that could not be loaded. It is excluded from the run, not fatal to it.
///
/// 无法加载的单元。它会被排除在运行之外，但不会中止整个运行。
#[derive(Debug, Error)]
#[error("{name}: {kind}")]
pub struct DiscoveryError {
    pub input: PathBuf,
    pub name: String,
    #[source]
    pub kind: DiscoveryErrorKind,
}

/// Finds test units under a set of roots.
///
/// The sequence is lazy, finite and restartable: [`Discovery::iter`] walks the
/// filesystem again on every call, in lexicographic path order.
#[derive(Debug, Clone)]
pub struct Discovery {
    roots: Vec<PathBuf>,
    matcher: GlobMatcher,
    artifacts_dir: PathBuf,
    artifact_extensions: Vec<String>,
    os: String,
}

impl Discovery {
    /// Creates a discovery over `roots`, sorted and deduplicated, keeping files
    /// whose root-relative path matches `pattern`.
    pub fn new(
        roots: impl IntoIterator<Item = PathBuf>,
        pattern: &str,
    ) -> Result<Self, globset::Error> {
        let mut roots: Vec<PathBuf> = roots.into_iter().collect();
        roots.sort();
        roots.dedup();
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(Self {
            roots,
            matcher,
            artifacts_dir: PathBuf::from("build"),
            artifact_extensions: Vec::new(),
            os: std::env::consts::OS.to_string(),
        })
    }

    /// Enables `<stem>.<ext>` expected-artifact companions; the produced file is
    /// looked up as `<artifacts_dir>/<stem>.<ext>`.
    pub fn with_artifacts(mut self, artifacts_dir: PathBuf, extensions: Vec<String>) -> Self {
        self.artifacts_dir = artifacts_dir;
        self.artifact_extensions = extensions;
        self
    }

    /// Overrides the OS name used for `<stem>.<os>.err` and `<stem>.<os>.curl`.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Walks every root and yields one item per candidate input file.
    /// 遍历每个根目录，为每个候选输入文件产出一项。
    pub fn iter(&self) -> impl Iterator<Item = Result<TestUnit, DiscoveryError>> + '_ {
        self.roots.iter().flat_map(move |root| {
            WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_map(move |entry| match entry {
                    Ok(entry) => {
                        if !entry.file_type().is_file() {
                            return None;
                        }
                        let name = self.candidate_name(root, entry.path())?;
                        Some(self.load_unit(entry.path(), name))
                    }
                    Err(e) => {
                        let path = e.path().unwrap_or(root.as_path()).to_path_buf();
                        Some(Err(DiscoveryError {
                            name: path.display().to_string(),
                            input: path,
                            kind: DiscoveryErrorKind::Walk(e.to_string()),
                        }))
                    }
                })
        })
    }

    /// Returns the unit name if `path` is an input file under `root`.
    fn candidate_name(&self, root: &Path, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_string_lossy();
        if AUXILIARY_INPUT.is_match(&file_name) {
            return None;
        }
        // A root given as a file is always a unit.
        if path == root {
            return Some(file_name.into_owned());
        }
        let relative = path.strip_prefix(root).ok()?;
        if !self.matcher.is_match(relative) {
            return None;
        }
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(name)
    }

    /// Binds one input file to its companions.
    pub fn load_unit(&self, input: &Path, name: String) -> Result<TestUnit, DiscoveryError> {
        let fail = |kind| DiscoveryError {
            input: input.to_path_buf(),
            name: name.clone(),
            kind,
        };
        let stem = input.with_extension("");
        let os_specific = |suffix: &str| {
            let specific = companion(&stem, &format!("{}.{suffix}", self.os));
            if specific.exists() { specific } else { companion(&stem, suffix) }
        };

        let mut expect = Expectations::default();

        let exit_path = companion(&stem, "exit");
        if let Some(content) = read_text(&exit_path).map_err(fail)? {
            let code = content.trim().parse::<i32>().map_err(|_| {
                fail(DiscoveryErrorKind::ExitCode {
                    path: exit_path.clone(),
                    content: content.trim().to_string(),
                })
            })?;
            expect.exit_code = Some(code);
        }

        let out_path = companion(&stem, "out");
        if out_path.exists() {
            let bytes = fs::read(&out_path).map_err(|source| {
                fail(DiscoveryErrorKind::Io {
                    path: out_path.clone(),
                    source,
                })
            })?;
            expect.stdout = Some(bytes);
        }

        let out_pattern = companion(&stem, "out.pattern");
        if let Some(content) = read_text(&out_pattern).map_err(fail)? {
            expect.stdout_pattern = Some(pattern_lines(&out_pattern, &content).map_err(fail)?);
        }

        expect.stderr = read_text(&os_specific("err")).map_err(fail)?;

        let err_pattern = companion(&stem, "err.pattern");
        if let Some(content) = read_text(&err_pattern).map_err(fail)? {
            expect.stderr_pattern = Some(pattern_lines(&err_pattern, &content).map_err(fail)?);
        }

        if let Some(content) = read_text(&os_specific("curl")).map_err(fail)? {
            let lines = content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect();
            expect.commands = Some(lines);
        }

        for ext in &self.artifact_extensions {
            let expected = companion(&stem, ext);
            if expected == input || !expected.exists() {
                continue;
            }
            let file_name = expected.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            expect.artifacts.push(ExpectedArtifact {
                produced: self.artifacts_dir.join(file_name),
                expected,
            });
        }

        let options_path = companion(&stem, "options");
        let options = match read_text(&options_path).map_err(fail)? {
            Some(content) => shlex::split(&content).ok_or_else(|| {
                fail(DiscoveryErrorKind::Options {
                    path: options_path.clone(),
                    content: content.trim().to_string(),
                })
            })?,
            None => Vec::new(),
        };

        let profile_path = companion(&stem, "profile");
        let env = match read_text(&profile_path).map_err(fail)? {
            Some(content) => parse_env_lines(&content).map_err(|line| {
                fail(DiscoveryErrorKind::Profile {
                    path: profile_path.clone(),
                    line,
                })
            })?,
            None => Vec::new(),
        };

        Ok(TestUnit {
            input: input.to_path_buf(),
            name,
            options,
            env,
            expect,
        })
    }
}

/// `<stem>.<suffix>`, keeping non-UTF-8 stems intact.
pub fn companion(stem: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(stem.as_os_str());
    path.push(".");
    path.push(suffix);
    PathBuf::from(path)
}

fn read_text(path: &Path) -> Result<Option<String>, DiscoveryErrorKind> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(DiscoveryErrorKind::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn pattern_lines(
    path: &Path,
    content: &str,
) -> Result<Vec<crate::core::models::PatternLine>, DiscoveryErrorKind> {
    compile_pattern(content).map_err(|(line, e)| DiscoveryErrorKind::Pattern {
        path: path.to_path_buf(),
        line,
        message: e.to_string(),
    })
}

/// Parses `NAME=VALUE` lines, skipping blanks and `#` comments.
/// On error returns the 1-based number of the offending line.
pub fn parse_env_lines(content: &str) -> Result<Vec<(String, String)>, usize> {
    let mut pairs = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                pairs.push((name.trim().to_string(), value.to_string()));
            }
            _ => return Err(i + 1),
        }
    }
    Ok(pairs)
}
