//! Candidate tools and probe banner interpretation.
//!
//! Candidates are tried in priority order: an explicit override (`CC`, `CXX`,
//! `AR`) first, then the conventional names for the host OS.

use std::path::{Path, PathBuf};

use crate::platform::arch::Arch;
use crate::platform::os::Os;
use crate::project::Language;

use super::types::{Capability, ToolFamily, ToolKind, ToolchainDescriptor};

/// Tool names from the environment that take priority over the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOverrides {
  pub cc: Option<String>,
  pub cxx: Option<String>,
  pub ar: Option<String>,
}

impl ToolOverrides {
  /// Read `CC`, `CXX` and `AR`. Empty values are ignored.
  pub fn from_env() -> Self {
    let read = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
    Self {
      cc: read("CC"),
      cxx: read("CXX"),
      ar: read("AR"),
    }
  }
}

/// One tool to try, with the argument that makes it print its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
  pub program: String,
  pub version_args: Vec<String>,
}

impl Candidate {
  pub fn new(program: &str) -> Self {
    // MSVC tools print their banner when run without arguments and reject --version.
    let version_args = match program_stem(program).as_str() {
      "cl" | "lib" => vec![],
      _ => vec!["--version".to_string()],
    };
    Self {
      program: program.to_string(),
      version_args,
    }
  }
}

/// Prioritized, de-duplicated candidates for a capability.
pub fn candidates_for(capability: &Capability, os: Os, overrides: &ToolOverrides) -> Vec<Candidate> {
  let (preferred, defaults): (Option<&String>, &[&str]) = match (capability, os) {
    (Capability::Compiler { language: Language::C, .. }, Os::Windows) => (overrides.cc.as_ref(), &["cl", "clang", "gcc"]),
    (Capability::Compiler { language: Language::C, .. }, _) => (overrides.cc.as_ref(), &["cc", "gcc", "clang"]),
    (Capability::Compiler { language: Language::Cxx, .. }, Os::Windows) => {
      (overrides.cxx.as_ref(), &["cl", "clang++", "g++"])
    }
    (Capability::Compiler { language: Language::Cxx, .. }, _) => (overrides.cxx.as_ref(), &["c++", "g++", "clang++"]),
    (Capability::Archiver, Os::Windows) => (overrides.ar.as_ref(), &["lib", "llvm-ar", "ar"]),
    (Capability::Archiver, _) => (overrides.ar.as_ref(), &["ar", "llvm-ar"]),
  };

  let mut programs: Vec<&str> = Vec::new();
  if let Some(program) = preferred {
    programs.push(program);
  }
  for program in defaults {
    if !programs.contains(program) {
      programs.push(program);
    }
  }
  programs.into_iter().map(Candidate::new).collect()
}

/// Locate `program` on `PATH`. Paths containing a separator are used as-is.
pub fn locate_program(program: &str) -> Option<PathBuf> {
  let path = Path::new(program);
  if path.components().count() > 1 {
    return path.is_file().then(|| path.to_path_buf());
  }
  let search = std::env::var_os("PATH")?;
  std::env::split_paths(&search).find_map(|dir| {
    let exact = dir.join(program);
    if exact.is_file() {
      return Some(exact);
    }
    let exe = dir.join(format!("{}.exe", program));
    exe.is_file().then_some(exe)
  })
}

/// Build a descriptor from a successful probe, or `None` when the banner is
/// not from a tool family kiln knows how to drive.
pub fn describe(
  candidate: &Candidate,
  capability: &Capability,
  banner: &str,
  host_arch: Option<Arch>,
) -> Option<ToolchainDescriptor> {
  let family = detect_family(capability.tool_kind(), banner)?;
  let version = find_version(banner)?;
  let path = locate_program(&candidate.program).unwrap_or_else(|| PathBuf::from(&candidate.program));

  let (languages, standards) = match capability {
    Capability::Compiler { language, .. } => (vec![*language], supported_standards(family, *language, &version)),
    Capability::Archiver => (vec![], vec![]),
  };

  let architectures = match find_target_arch(banner).or(host_arch) {
    Some(arch) => vec![arch],
    None => vec![],
  };

  Some(ToolchainDescriptor {
    kind: family.kind(),
    family,
    path,
    version,
    languages,
    standards,
    architectures,
  })
}

fn program_stem(program: &str) -> String {
  Path::new(program)
    .file_stem()
    .map(|s| s.to_string_lossy().to_lowercase())
    .unwrap_or_default()
}

fn detect_family(kind: ToolKind, banner: &str) -> Option<ToolFamily> {
  let lower = banner.to_lowercase();
  match kind {
    ToolKind::Compiler => {
      if lower.contains("clang version") {
        Some(ToolFamily::Clang)
      } else if lower.contains("microsoft (r) c/c++") {
        Some(ToolFamily::Msvc)
      } else if lower.contains("(gcc)") || lower.contains("free software foundation") || lower.starts_with("gcc") {
        Some(ToolFamily::Gcc)
      } else {
        None
      }
    }
    ToolKind::Archiver => {
      if lower.contains("gnu ar") {
        Some(ToolFamily::GnuAr)
      } else if lower.contains("llvm") {
        Some(ToolFamily::LlvmAr)
      } else if lower.contains("microsoft (r) library manager") {
        Some(ToolFamily::MsvcLib)
      } else {
        None
      }
    }
  }
}

/// First dotted numeric token in the banner (`11.4.0`, `19.29.30133`).
fn find_version(banner: &str) -> Option<String> {
  banner.split_whitespace().find_map(|token| {
    let numeric: String = token.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    let numeric = numeric.trim_end_matches('.');
    let looks_like_version = numeric.contains('.') && numeric.starts_with(|c: char| c.is_ascii_digit());
    looks_like_version.then(|| numeric.to_string())
  })
}

/// Architecture from a `Target: x86_64-pc-linux-gnu` line (Clang) or the
/// trailing `for x64` of an MSVC banner.
fn find_target_arch(banner: &str) -> Option<Arch> {
  for line in banner.lines() {
    if let Some(triple) = line.trim().strip_prefix("Target:") {
      return triple.trim().split('-').next().and_then(Arch::parse);
    }
    if line.contains("Microsoft")
      && let Some((_, arch)) = line.rsplit_once(" for ")
    {
      return Arch::parse(arch.trim());
    }
  }
  None
}

fn major_minor(version: &str) -> (u32, u32) {
  let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
  (parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Minimum (major, minor) version per family for each standard.
/// `None` means the family does not accept the standard at all.
struct StandardSupport {
  name: &'static str,
  language: Language,
  gnu_variant: bool,
  gcc: Option<(u32, u32)>,
  clang: Option<(u32, u32)>,
  msvc: Option<(u32, u32)>,
}

const STANDARDS: &[StandardSupport] = &[
  StandardSupport { name: "c89", language: Language::C, gnu_variant: true, gcc: Some((1, 0)), clang: Some((1, 0)), msvc: None },
  StandardSupport { name: "c99", language: Language::C, gnu_variant: true, gcc: Some((1, 0)), clang: Some((1, 0)), msvc: None },
  StandardSupport { name: "c11", language: Language::C, gnu_variant: true, gcc: Some((4, 7)), clang: Some((3, 1)), msvc: Some((19, 28)) },
  StandardSupport { name: "c17", language: Language::C, gnu_variant: true, gcc: Some((8, 0)), clang: Some((6, 0)), msvc: Some((19, 28)) },
  StandardSupport { name: "c2x", language: Language::C, gnu_variant: true, gcc: Some((9, 0)), clang: Some((9, 0)), msvc: None },
  StandardSupport { name: "c++98", language: Language::Cxx, gnu_variant: true, gcc: Some((1, 0)), clang: Some((1, 0)), msvc: None },
  StandardSupport { name: "c++11", language: Language::Cxx, gnu_variant: true, gcc: Some((4, 8)), clang: Some((3, 3)), msvc: None },
  StandardSupport { name: "c++14", language: Language::Cxx, gnu_variant: true, gcc: Some((5, 0)), clang: Some((3, 4)), msvc: Some((19, 0)) },
  StandardSupport { name: "c++17", language: Language::Cxx, gnu_variant: true, gcc: Some((7, 0)), clang: Some((5, 0)), msvc: Some((19, 11)) },
  StandardSupport { name: "c++20", language: Language::Cxx, gnu_variant: true, gcc: Some((10, 0)), clang: Some((10, 0)), msvc: Some((19, 29)) },
  StandardSupport { name: "c++23", language: Language::Cxx, gnu_variant: true, gcc: Some((11, 0)), clang: Some((17, 0)), msvc: None },
];

/// Standards a compiler of `family` at `version` accepts for `language`.
pub fn supported_standards(family: ToolFamily, language: Language, version: &str) -> Vec<String> {
  let have = major_minor(version);
  let mut standards = Vec::new();
  for support in STANDARDS.iter().filter(|s| s.language == language) {
    let minimum = match family {
      ToolFamily::Gcc => support.gcc,
      ToolFamily::Clang => support.clang,
      ToolFamily::Msvc => support.msvc,
      ToolFamily::GnuAr | ToolFamily::LlvmAr | ToolFamily::MsvcLib => None,
    };
    if minimum.is_some_and(|min| have >= min) {
      standards.push(support.name.to_string());
      if support.gnu_variant && !family.is_msvc() {
        standards.push(support.name.replacen('c', "gnu", 1));
      }
    }
  }
  standards
}
