use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File extensions compiled as C++.
const CXX_EXTENSIONS: &[&str] = &["cpp", "cc", "cxx", "c++", "C", "cppm", "ixx"];

/// File extensions compiled as C.
const C_EXTENSIONS: &[&str] = &["c"];

/// A complete project: metadata, targets and global build options.
///
/// Projects are produced by an external loader; kiln only consumes the
/// in-memory shape (or its JSON serialization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
  pub name: String,
  pub version: String,

  /// Targets in declaration order.
  #[serde(default)]
  pub targets: Vec<Target>,

  /// Libraries provided by the host rather than built by this project.
  #[serde(default)]
  pub external_libraries: Vec<ExternalLibrary>,

  /// Defaults applied to every target unless overridden.
  #[serde(default)]
  pub options: BuildOptions,
}

/// A named buildable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
  pub name: String,
  pub kind: TargetKind,

  /// Translation units, relative to the project source directory.
  pub sources: Vec<PathBuf>,

  #[serde(default)]
  pub include_dirs: Vec<PathBuf>,

  /// Library dependencies by name: either another target or an external library.
  #[serde(default)]
  pub dependencies: Vec<String>,

  /// Preprocessor definitions (`NAME` or `NAME=value`).
  #[serde(default)]
  pub defines: Vec<String>,

  #[serde(default)]
  pub options: TargetOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
  Executable,
  SharedLibrary,
  StaticLibrary,
}

impl TargetKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Executable => "executable",
      Self::SharedLibrary => "shared_library",
      Self::StaticLibrary => "static_library",
    }
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A library resolved by name at link time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLibrary {
  pub name: String,

  /// Extra directory searched by the linker for this library.
  #[serde(default)]
  pub search_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptLevel {
  #[default]
  O0,
  O1,
  O2,
  O3,
  Os,
}

/// Project-wide build options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
  pub optimization: OptLevel,
  pub debug: bool,
  pub standard: Option<String>,
}

impl Default for BuildOptions {
  fn default() -> Self {
    Self {
      optimization: OptLevel::O0,
      debug: true,
      standard: None,
    }
  }
}

/// Per-target overrides. `None` inherits the project default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOptions {
  pub optimization: Option<OptLevel>,
  pub debug: Option<bool>,
  pub standard: Option<String>,
}

impl TargetOptions {
  /// Merge these overrides over `base`; every set field wins.
  pub fn merged_over(&self, base: &BuildOptions) -> BuildOptions {
    BuildOptions {
      optimization: self.optimization.unwrap_or(base.optimization),
      debug: self.debug.unwrap_or(base.debug),
      standard: self.standard.clone().or_else(|| base.standard.clone()),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  C,
  Cxx,
}

impl Language {
  /// Classify a single source file by extension.
  pub fn of_source(path: &Path) -> Option<Self> {
    let ext = path.extension()?.to_str()?;
    if CXX_EXTENSIONS.contains(&ext) {
      Some(Self::Cxx)
    } else if C_EXTENSIONS.contains(&ext) {
      Some(Self::C)
    } else {
      None
    }
  }

  /// Whether a language standard name belongs to this language.
  pub fn accepts_standard(&self, standard: &str) -> bool {
    let is_cxx = standard.starts_with("c++") || standard.starts_with("gnu++");
    match self {
      Self::Cxx => is_cxx,
      Self::C => !is_cxx && (standard.starts_with('c') || standard.starts_with("gnu")),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::C => "c",
      Self::Cxx => "c++",
    }
  }
}

impl fmt::Display for Language {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Target {
  /// The language the target is compiled and linked as.
  ///
  /// A single C++ translation unit makes the whole target C++ so that the
  /// C++ runtime is linked.
  pub fn language(&self) -> Language {
    if self.sources.iter().any(|s| Language::of_source(s) == Some(Language::Cxx)) {
      Language::Cxx
    } else {
      Language::C
    }
  }

  /// Options after merging this target's overrides over the project defaults.
  pub fn effective_options(&self, defaults: &BuildOptions) -> BuildOptions {
    self.options.merged_over(defaults)
  }
}

impl Project {
  pub fn target(&self, name: &str) -> Option<&Target> {
    self.targets.iter().find(|t| t.name == name)
  }

  pub fn external_library(&self, name: &str) -> Option<&ExternalLibrary> {
    self.external_libraries.iter().find(|l| l.name == name)
  }

  /// Language whose driver links `target`.
  ///
  /// Static libraries carry no runtime of their own, so C++ code reached
  /// through them makes the final link C++.
  pub fn link_language<'a>(&'a self, target: &'a Target) -> Language {
    let mut seen = HashSet::from([target.name.as_str()]);
    let mut stack = vec![target];
    while let Some(current) = stack.pop() {
      if current.language() == Language::Cxx {
        return Language::Cxx;
      }
      for dep in &current.dependencies {
        if let Some(dep_target) = self.target(dep)
          && dep_target.kind == TargetKind::StaticLibrary
          && seen.insert(dep_target.name.as_str())
        {
          stack.push(dep_target);
        }
      }
    }
    Language::C
  }
}
