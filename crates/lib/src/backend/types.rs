use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::project::TargetKind;
use crate::util::quote::shell_join;

/// Stable identifier of a step, e.g. `app:compile:src/main.c` or `core:archive`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepKind {
  Compile { source: PathBuf },
  /// Executable or shared library, linked through the compiler driver.
  Link { kind: TargetKind },
  Archive,
}

impl StepKind {
  /// Short verb for progress display.
  pub fn verb(&self) -> &'static str {
    match self {
      Self::Compile { .. } => "CC",
      Self::Link { .. } => "LINK",
      Self::Archive => "AR",
    }
  }
}

/// One concrete tool invocation. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
  pub id: StepId,
  /// Position in generation order.
  pub index: usize,
  pub tier: usize,
  pub target: String,
  pub kind: StepKind,
  pub program: PathBuf,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  pub inputs: Vec<PathBuf>,
  pub outputs: Vec<PathBuf>,
  /// Steps that must succeed before this one may start.
  pub depends_on: Vec<StepId>,
  /// Long argument lists may be passed as an `@file`.
  pub response_file: bool,
}

impl BuildStep {
  /// The command line as a POSIX shell would run it.
  pub fn command_line(&self) -> String {
    shell_join(&self.program.to_string_lossy(), &self.args)
  }

  /// Human readable one-liner, e.g. `CC src/main.c`.
  pub fn description(&self) -> String {
    match &self.kind {
      StepKind::Compile { source } => format!("{} {}", self.kind.verb(), source.display()),
      StepKind::Link { .. } | StepKind::Archive => {
        let artifact = self.outputs.first().map(|p| p.display().to_string()).unwrap_or_default();
        format!("{} {}", self.kind.verb(), artifact)
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTier {
  pub index: usize,
  pub steps: Vec<BuildStep>,
}

/// Every step of a build, grouped by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedBuild {
  pub project: String,
  pub tiers: Vec<StepTier>,
}

impl GeneratedBuild {
  pub fn steps(&self) -> impl Iterator<Item = &BuildStep> {
    self.tiers.iter().flat_map(|t| t.steps.iter())
  }

  pub fn step(&self, id: &StepId) -> Option<&BuildStep> {
    self.steps().find(|s| &s.id == id)
  }

  pub fn len(&self) -> usize {
    self.tiers.iter().map(|t| t.steps.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
