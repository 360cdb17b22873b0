use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::trace;

use crate::process::{ProcessSpec, ScopedProcess};

/// Result of asking a candidate tool for its version banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
  Exited { success: bool, stdout: String, stderr: String },
  TimedOut,
  SpawnFailed(String),
}

impl ProbeOutcome {
  /// The banner text when the tool answered. MSVC prints its banner on
  /// stderr and exits nonzero when run without inputs, so both streams count.
  pub fn banner(&self) -> Option<String> {
    match self {
      Self::Exited { stdout, stderr, .. } => {
        let text = format!("{}{}", stdout, stderr);
        (!text.trim().is_empty()).then_some(text)
      }
      Self::TimedOut | Self::SpawnFailed(_) => None,
    }
  }
}

/// Runs version queries against candidate tools.
pub trait Prober: Send + Sync {
  fn probe(&self, program: &str, args: &[String], timeout: Duration) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Probes by spawning the candidate as a real process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProber;

impl Prober for ProcessProber {
  async fn probe(&self, program: &str, args: &[String], timeout: Duration) -> ProbeOutcome {
    let spec = ProcessSpec {
      program: Path::new(program),
      args,
      cwd: None,
      response_file: false,
    };
    let process = match ScopedProcess::spawn(spec) {
      Ok(process) => process,
      Err(e) => return ProbeOutcome::SpawnFailed(e.to_string()),
    };
    match process.wait(Some(timeout)).await {
      Ok(output) if output.timed_out => ProbeOutcome::TimedOut,
      Ok(output) => {
        trace!(program, code = ?output.exit_code, "probe finished");
        ProbeOutcome::Exited {
          success: output.success(),
          stdout: output.stdout,
          stderr: output.stderr,
        }
      }
      Err(e) => ProbeOutcome::SpawnFailed(e.to_string()),
    }
  }
}
