//! Test utilities for kiln-lib.
//!
//! Cross-platform helpers for tests that need to run real processes.

use std::path::{Path, PathBuf};

use crate::project::{BuildOptions, Project, Target, TargetKind, TargetOptions};

/// Returns the shell binary and args that run `script`.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// Returns a script that creates an empty file at `path`.
#[cfg(unix)]
pub fn touch_script(path: &Path) -> String {
  format!(": > '{}'", path.display())
}

#[cfg(windows)]
pub fn touch_script(path: &Path) -> String {
  format!("type nul > \"{}\"", path.display())
}

/// Returns a script that prints `msg` to stderr and exits with `code`.
#[cfg(unix)]
pub fn fail_script(msg: &str, code: i32) -> String {
  format!("echo '{}' >&2; exit {}", msg, code)
}

#[cfg(windows)]
pub fn fail_script(msg: &str, code: i32) -> String {
  format!("echo {} 1>&2 & exit /b {}", msg, code)
}

/// A target with default options.
pub fn target(name: &str, kind: TargetKind, sources: &[&str], dependencies: &[&str]) -> Target {
  Target {
    name: name.to_string(),
    kind,
    sources: sources.iter().map(PathBuf::from).collect(),
    include_dirs: vec![],
    dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
    defines: vec![],
    options: TargetOptions::default(),
  }
}

/// A project named `demo` holding `targets`.
pub fn project(targets: Vec<Target>) -> Project {
  Project {
    name: "demo".to_string(),
    version: "0.1.0".to_string(),
    targets,
    external_libraries: vec![],
    options: BuildOptions::default(),
  }
}
