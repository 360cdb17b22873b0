//! Scoped external process execution.
//!
//! Every external invocation (toolchain probes and build steps) goes through
//! [`ScopedProcess`]. It owns the child handle, the output readers and the
//! optional response file. Dropping it on any path (normal completion,
//! timeout, cancellation or an early `?`) terminates a child that is still
//! running and deletes the response file.

use std::io::{self, Write};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::consts::RESPONSE_FILE_THRESHOLD;
use crate::util::quote::response_file_quote;

/// How long to keep reading output after the child is gone. Grandchildren
/// that inherited the pipes can otherwise keep the readers open.
const READER_GRACE: Duration = Duration::from_secs(2);

/// What to run.
#[derive(Debug, Clone, Copy)]
pub struct ProcessSpec<'a> {
  pub program: &'a Path,
  pub args: &'a [String],
  pub cwd: Option<&'a Path>,
  /// Allow long argument lists to be passed as `@file`.
  pub response_file: bool,
}

/// Captured result of a finished (or terminated) process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
  /// Exit code, `None` if the process was killed by a signal or timed out.
  pub exit_code: Option<i32>,
  pub timed_out: bool,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    !self.timed_out && self.exit_code == Some(0)
  }
}

/// A running child process and the resources tied to it.
pub struct ScopedProcess {
  child: Child,
  program: String,
  started: Instant,
  stdout: Option<JoinHandle<Vec<u8>>>,
  stderr: Option<JoinHandle<Vec<u8>>>,
  response_file: Option<NamedTempFile>,
}

impl ScopedProcess {
  /// Spawn the process with piped output.
  pub fn spawn(spec: ProcessSpec<'_>) -> io::Result<Self> {
    let program = spec.program.display().to_string();

    let response_file = if spec.response_file && args_len(spec.args) > RESPONSE_FILE_THRESHOLD {
      Some(write_response_file(spec.args)?)
    } else {
      None
    };

    let mut command = Command::new(spec.program);
    match &response_file {
      Some(file) => {
        debug!(program = %program, path = %file.path().display(), "passing arguments through response file");
        command.arg(format!("@{}", file.path().display()));
      }
      None => {
        command.args(spec.args);
      }
    }
    if let Some(cwd) = spec.cwd {
      command.current_dir(cwd);
    }
    command
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    // Own process group so a timeout can take down anything the tool forked.
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    Ok(Self {
      child,
      program,
      started: Instant::now(),
      stdout: Some(stdout),
      stderr: Some(stderr),
      response_file,
    })
  }

  /// Wait for the process, terminating it if `limit` elapses first.
  pub async fn wait(mut self, limit: Option<Duration>) -> io::Result<ProcessOutput> {
    let (exit_code, timed_out) = match limit {
      Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
          warn!(program = %self.program, limit = ?limit, "process exceeded time limit, terminating");
          self.terminate().await?;
          (None, true)
        }
      },
      None => (self.child.wait().await?.code(), false),
    };

    let duration = self.started.elapsed();
    let stdout = collect(self.stdout.take()).await;
    let stderr = collect(self.stderr.take()).await;

    Ok(ProcessOutput {
      exit_code,
      timed_out,
      stdout,
      stderr,
      duration,
    })
  }

  async fn terminate(&mut self) -> io::Result<()> {
    #[cfg(unix)]
    {
      if let Some(pid) = self.child.id().and_then(|id| rustix::process::Pid::from_raw(id as i32)) {
        // The group may already be gone; the direct kill below still reaps the child.
        let _ = rustix::process::kill_process_group(pid, rustix::process::Signal::KILL);
      }
    }
    self.child.kill().await
  }
}

impl Drop for ScopedProcess {
  fn drop(&mut self) {
    if let Ok(None) = self.child.try_wait() {
      warn!(program = %self.program, "terminating process released before completion");
      let _ = self.child.start_kill();
    }
    for reader in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
      reader.abort();
    }
    if let Some(file) = self.response_file.take() {
      debug!(path = %file.path().display(), "removing response file");
    }
  }
}

fn args_len(args: &[String]) -> usize {
  args.iter().map(|a| a.len() + 1).sum()
}

fn write_response_file(args: &[String]) -> io::Result<NamedTempFile> {
  let mut file = tempfile::Builder::new().prefix("kiln-").suffix(".rsp").tempfile()?;
  for arg in args {
    writeln!(file, "{}", response_file_quote(arg))?;
  }
  file.flush()?;
  Ok(file)
}

fn drain<R>(reader: Option<R>) -> JoinHandle<Vec<u8>>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
      let _ = reader.read_to_end(&mut buf).await;
    }
    buf
  })
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
  let Some(mut reader) = reader else {
    return String::new();
  };
  match tokio::time::timeout(READER_GRACE, &mut reader).await {
    Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
    Ok(Err(e)) => {
      warn!(error = %e, "output reader failed");
      String::new()
    }
    Err(_) => {
      reader.abort();
      String::new()
    }
  }
}
