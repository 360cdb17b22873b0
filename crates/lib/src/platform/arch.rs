use std::fmt;

use serde::{Deserialize, Serialize};

/// CPU architecture variants kiln can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
  X86,
  X86_64,
  Arm,
  Aarch64,
  Riscv64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    Self::parse(std::env::consts::ARCH)
  }

  /// Parse an architecture name, accepting the common aliases compilers print
  /// in their target triples.
  pub fn parse(name: &str) -> Option<Self> {
    match name {
      "x86" | "i386" | "i486" | "i586" | "i686" => Some(Self::X86),
      "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
      "arm" | "armv7" | "armv7l" | "armv7a" => Some(Self::Arm),
      "aarch64" | "arm64" | "arm64e" => Some(Self::Aarch64),
      "riscv64" | "riscv64gc" => Some(Self::Riscv64),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86 => "x86",
      Self::X86_64 => "x86_64",
      Self::Arm => "arm",
      Self::Aarch64 => "aarch64",
      Self::Riscv64 => "riscv64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
