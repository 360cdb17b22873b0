//! Host and target platform description.
//!
//! The platform decides artifact naming (see [`os::Os`]) and which
//! architecture a probed compiler must produce code for.

pub mod arch;
pub mod os;

use arch::Arch;
use os::Os;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture plus OS, written as `<arch>-<os>` (`aarch64-darwin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// `None` on hosts kiln has no naming rules for.
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// The running host; unknown hosts get x86_64-linux naming rules.
  pub fn host() -> Self {
    Self::current().unwrap_or(Self::new(Arch::X86_64, Os::Linux))
  }

  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch, self.os)
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}
