use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating system variants supported by kiln
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }

  /// Suffix appended to executables (`.exe` on Windows, nothing elsewhere).
  pub fn exe_suffix(&self) -> &'static str {
    match self {
      Self::Windows => ".exe",
      Self::Linux | Self::MacOs => "",
    }
  }

  /// Prefix and suffix of a shared library file name.
  pub fn shared_lib_affixes(&self) -> (&'static str, &'static str) {
    match self {
      Self::Linux => ("lib", ".so"),
      Self::MacOs => ("lib", ".dylib"),
      Self::Windows => ("", ".dll"),
    }
  }

  /// Prefix and suffix of a static archive file name.
  pub fn static_lib_affixes(&self) -> (&'static str, &'static str) {
    match self {
      Self::Linux | Self::MacOs => ("lib", ".a"),
      Self::Windows => ("", ".lib"),
    }
  }

  /// Whether shared-library code must be compiled position independent.
  pub fn needs_pic(&self) -> bool {
    !matches!(self, Self::Windows)
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
