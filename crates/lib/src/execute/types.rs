//! Types for step execution.
//!
//! Failures and skips are data in the report rather than errors: one failed
//! step never stops the executor from recording what happened to the rest.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

/// Why a step that ran did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepFailure {
  #[error("exited with {}", .code.map(|c| format!("code {}", c)).unwrap_or_else(|| "a signal".to_string()))]
  NonZeroExit { code: Option<i32> },

  #[error("timed out after {}", humanize(.limit))]
  Timeout { limit: Duration },

  #[error("declared outputs missing: {}", .paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
  MissingOutputs { paths: Vec<PathBuf> },

  #[error("could not start {program}: {message}")]
  SpawnFailed { program: String, message: String },
}

fn humanize(d: &Duration) -> String {
  format!("{:.1}s", d.as_secs_f64())
}

/// Why a step never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkipReason {
  /// A dependency (same or earlier tier) failed or was itself skipped.
  DependencyFailed { step: StepId },
  Cancelled,
  FailFast,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DependencyFailed { step } => write!(f, "dependency {} did not succeed", step),
      Self::Cancelled => f.write_str("build cancelled"),
      Self::FailFast => f.write_str("stopped after first failure"),
    }
  }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
  pub step: StepId,
  pub index: usize,
  pub tier: usize,
  pub target: String,
  pub description: String,
  pub status: StepStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub failure: Option<StepFailure>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<SkipReason>,
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortCause {
  Cancelled,
  FailFast,
}

/// Overall result of an execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "cause", rename_all = "lowercase")]
pub enum BuildOutcome {
  Succeeded,
  Failed,
  Aborted(AbortCause),
}

/// Every step result plus aggregate counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
  pub outcome: BuildOutcome,
  /// Results ordered by step generation index.
  pub results: Vec<ExecutionResult>,
  pub duration: Duration,
}

impl SessionReport {
  pub fn is_success(&self) -> bool {
    self.outcome == BuildOutcome::Succeeded
  }

  fn count(&self, pred: impl Fn(&ExecutionResult) -> bool) -> usize {
    self.results.iter().filter(|r| pred(r)).count()
  }

  pub fn succeeded(&self) -> usize {
    self.count(|r| r.status == StepStatus::Succeeded)
  }

  pub fn failed(&self) -> usize {
    self.count(|r| r.status == StepStatus::Failed)
  }

  /// Steps skipped because something they depend on did not succeed.
  pub fn skipped_for_dependency(&self) -> usize {
    self.count(|r| matches!(r.skip_reason, Some(SkipReason::DependencyFailed { .. })))
  }

  /// Steps skipped because the session was aborted.
  pub fn skipped_for_abort(&self) -> usize {
    self.count(|r| matches!(r.skip_reason, Some(SkipReason::Cancelled | SkipReason::FailFast)))
  }

  pub fn result(&self, step: &str) -> Option<&ExecutionResult> {
    self.results.iter().find(|r| r.step.0 == step)
  }
}

/// Configuration for step execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of steps running at once.
  pub jobs: usize,

  /// Abort the session after the first failed step.
  pub fail_fast: bool,

  /// Per-step time limit. `None` lets steps run indefinitely.
  pub step_timeout: Option<Duration>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      jobs: num_cpus(),
      fail_fast: false,
      step_timeout: None,
    }
  }
}

/// Number of logical cores, used as the default worker pool size.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Session-wide cancellation flag. Cheap to clone; all clones share state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::SeqCst)
  }
}
