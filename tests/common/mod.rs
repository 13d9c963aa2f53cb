// Shared test helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

/// A fake program under test: drops `--secret name=value` pairs after
/// exporting them as `SECRET_<name>`, ignores other options and runs the
/// input file as a shell script.
const FAKE_TOOL: &str = r#"#!/bin/sh
while [ $# -gt 1 ]; do
  case "$1" in
    --secret)
      name=${2%%=*}
      value=${2#*=}
      export "SECRET_$name=$value"
      shift 2
      ;;
    *)
      shift
      ;;
  esac
done
exec sh "$1"
"#;

/// Creates an empty workspace with a `tests/` fixture root.
pub fn workspace() -> TempDir {
    let temp_dir = tempdir().expect("Failed to create temporary directory");
    fs::create_dir_all(temp_dir.path().join("tests")).expect("Failed to create fixture root");
    temp_dir
}

/// Writes `content` at `relative` under `base`, creating parent directories.
pub fn write(base: &Path, relative: &str, content: &str) -> PathBuf {
    let path = base.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write fixture file");
    path
}

/// Installs the fake tool in `base` and returns its path.
pub fn fake_tool(base: &Path) -> PathBuf {
    let path = write(base, "bin/fake-tool", FAKE_TOOL);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
            .expect("Failed to make the fake tool executable");
    }
    path
}

/// Reads a whole file as a string.
pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()))
}
