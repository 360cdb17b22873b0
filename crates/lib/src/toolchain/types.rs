use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::platform::arch::Arch;
use crate::project::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
  /// Compiler driver; also used to link executables and shared libraries.
  Compiler,
  Archiver,
}

/// Concrete tool family. Argument conventions are chosen per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolFamily {
  Gcc,
  Clang,
  Msvc,
  GnuAr,
  LlvmAr,
  MsvcLib,
}

impl ToolFamily {
  pub fn kind(&self) -> ToolKind {
    match self {
      Self::Gcc | Self::Clang | Self::Msvc => ToolKind::Compiler,
      Self::GnuAr | Self::LlvmAr | Self::MsvcLib => ToolKind::Archiver,
    }
  }

  /// MSVC-style tools take `/flag` arguments and `.obj` objects.
  pub fn is_msvc(&self) -> bool {
    matches!(self, Self::Msvc | Self::MsvcLib)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Gcc => "gcc",
      Self::Clang => "clang",
      Self::Msvc => "msvc",
      Self::GnuAr => "gnu-ar",
      Self::LlvmAr => "llvm-ar",
      Self::MsvcLib => "msvc-lib",
    }
  }
}

impl fmt::Display for ToolFamily {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An abstract requirement satisfied by a discovered tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Capability {
  Compiler {
    language: Language,
    standard: Option<String>,
  },
  Archiver,
}

impl Capability {
  pub fn compiler(language: Language, standard: Option<&str>) -> Self {
    Self::Compiler {
      language,
      standard: standard.map(str::to_string),
    }
  }

  pub fn tool_kind(&self) -> ToolKind {
    match self {
      Self::Compiler { .. } => ToolKind::Compiler,
      Self::Archiver => ToolKind::Archiver,
    }
  }

  /// Stable key used to memoize resolutions, e.g. `c++-compiler[c++17]`.
  pub fn key(&self) -> String {
    match self {
      Self::Compiler {
        language,
        standard: Some(standard),
      } => format!("{}-compiler[{}]", language, standard),
      Self::Compiler { language, standard: None } => format!("{}-compiler", language),
      Self::Archiver => "archiver".to_string(),
    }
  }
}

impl fmt::Display for Capability {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key())
  }
}

/// A discovered tool. Immutable once created; shared through `Arc` for the
/// lifetime of a build session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainDescriptor {
  pub kind: ToolKind,
  pub family: ToolFamily,
  pub path: PathBuf,
  pub version: String,
  /// Languages this driver was probed for.
  pub languages: Vec<Language>,
  /// Language standards the tool accepts, e.g. `c11`, `c++17`.
  pub standards: Vec<String>,
  pub architectures: Vec<Arch>,
}

impl ToolchainDescriptor {
  pub fn satisfies(&self, capability: &Capability) -> bool {
    if self.kind != capability.tool_kind() {
      return false;
    }
    match capability {
      Capability::Compiler { language, standard } => {
        self.languages.contains(language)
          && standard
            .as_ref()
            .is_none_or(|s| self.standards.iter().any(|known| known == s))
      }
      Capability::Archiver => true,
    }
  }
}
