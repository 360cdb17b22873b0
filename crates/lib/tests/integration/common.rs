//! Shared helpers for kiln-lib integration tests.
//!
//! Each test gets a temporary source tree and a fake toolchain made of
//! `/bin/sh` scripts, so builds run end to end without a real compiler.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use kiln_lib::platform::Platform;
use kiln_lib::project::{BuildOptions, Project, Target, TargetKind, TargetOptions};
use kiln_lib::session::{BuildSession, SessionConfig};
use kiln_lib::toolchain::{ProbeOutcome, Prober, ProcessProber, ToolOverrides};

/// Sources containing this marker fail to compile.
pub const FAIL_MARKER: &str = "KILN_FAIL";

/// Answers `--version` like GCC. Compiles fail when the source holds the
/// failure marker; otherwise the `-o` output is created empty.
const FAKE_CC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "cc (GCC) 12.2.0"
  echo "Copyright (C) 2022 Free Software Foundation, Inc."
  exit 0
fi
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -c) src="$2"; shift ;;
  esac
  shift
done
if [ -n "$src" ]; then
  while IFS= read -r line || [ -n "$line" ]; do
    case "$line" in
      *KILN_FAIL*) echo "$src:1: error: forced failure" >&2; exit 1 ;;
    esac
  done < "$src"
fi
: > "$out"
"#;

/// Answers `--version` like binutils `ar`; `ar rcs out objs...` creates `out`.
const FAKE_AR: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "GNU ar (GNU Binutils) 2.40"
  exit 0
fi
: > "$2"
"#;

/// Exits successfully without writing anything.
const SILENT_CC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "cc (GCC) 12.2.0"
fi
exit 0
"#;

/// Answers `--version` promptly, then hangs on any real work.
const SLOW_CC: &str = r#"#!/bin/sh
if [ "$1" = "--version" ]; then
  echo "cc (GCC) 12.2.0"
  exit 0
fi
sleep 30
"#;

/// Probes only the fake tools. Every other candidate looks uninstalled, so
/// tools on the host never leak into a test.
pub struct IsolatedProber {
  allowed: Vec<String>,
}

impl Prober for IsolatedProber {
  async fn probe(&self, program: &str, args: &[String], timeout: Duration) -> ProbeOutcome {
    if self.allowed.iter().any(|a| a == program) {
      ProcessProber.probe(program, args, timeout).await
    } else {
      ProbeOutcome::SpawnFailed(format!("{} is not installed", program))
    }
  }
}

/// Isolated build environment.
pub struct TestEnv {
  pub temp: TempDir,
  pub tools: ToolOverrides,
}

impl TestEnv {
  /// Source tree plus fake C compiler, C++ compiler and archiver.
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();
    let mut env = Self {
      temp,
      tools: ToolOverrides::default(),
    };
    env.tools.cc = Some(env.install_tool("fake-cc", FAKE_CC));
    env.tools.cxx = Some(env.install_tool("fake-cxx", FAKE_CC));
    env.tools.ar = Some(env.install_tool("fake-ar", FAKE_AR));
    env
  }

  /// Environment without any C++ compiler.
  pub fn without_cxx() -> Self {
    let mut env = Self::new();
    env.tools.cxx = None;
    env
  }

  /// Environment whose C compiler reports success but never writes outputs.
  pub fn with_silent_cc() -> Self {
    let mut env = Self::new();
    env.tools.cc = Some(env.install_tool("silent-cc", SILENT_CC));
    env
  }

  /// Environment whose C compiler never finishes a compile.
  pub fn with_slow_cc() -> Self {
    let mut env = Self::new();
    env.tools.cc = Some(env.install_tool("slow-cc", SLOW_CC));
    env
  }

  fn install_tool(&self, name: &str, script: &str) -> String {
    let dir = self.temp.path().join("tools");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
  }

  pub fn source_dir(&self) -> PathBuf {
    let p = self.temp.path().join("src");
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn build_root(&self) -> PathBuf {
    self.source_dir().join("build")
  }

  /// Write a source file relative to the source tree.
  pub fn write_source(&self, relative_path: &str, content: &str) {
    let path = self.source_dir().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  pub fn config(&self) -> SessionConfig {
    SessionConfig {
      jobs: 2,
      source_dir: self.source_dir(),
      build_dir: PathBuf::from("build"),
      platform: Platform::host(),
      overrides: self.tools.clone(),
      ..SessionConfig::default()
    }
  }

  pub fn session(&self) -> BuildSession<IsolatedProber> {
    self.session_with(self.config())
  }

  pub fn session_with(&self, config: SessionConfig) -> BuildSession<IsolatedProber> {
    let allowed = [&self.tools.cc, &self.tools.cxx, &self.tools.ar]
      .into_iter()
      .flatten()
      .cloned()
      .collect();
    BuildSession::with_prober(IsolatedProber { allowed }, config)
  }

  /// Final artifact of `target` inside the build directory.
  pub fn artifact(&self, target: &Target) -> PathBuf {
    self
      .build_root()
      .join(kiln_lib::backend::artifact_path(target, Platform::host().os))
  }
}

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

pub fn project(targets: Vec<Target>) -> Project {
  Project {
    name: "demo".to_string(),
    version: "0.1.0".to_string(),
    targets,
    external_libraries: vec![],
    options: BuildOptions::default(),
  }
}

/// A static library `core` and an executable `app` linking it.
pub fn library_and_app(env: &TestEnv) -> Project {
  env.write_source("core.c", "int core(void) { return 1; }\n");
  env.write_source("main.c", "int main(void) { return 0; }\n");
  project(vec![
    target("core", TargetKind::StaticLibrary, &["core.c"], &[]),
    target("app", TargetKind::Executable, &["main.c"], &["core"]),
  ])
}
