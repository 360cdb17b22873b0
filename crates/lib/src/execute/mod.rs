//! Step execution.
//!
//! Runs a [`GeneratedBuild`] tier by tier with a bounded worker pool:
//! - tiers are barriers; a tier starts only when every earlier step is terminal
//! - inside a tier, a step starts once its structural dependencies succeeded
//! - a failed or skipped step skips everything that depends on it
//! - cancellation and fail-fast stop new spawns; running steps finish

pub mod types;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::{BuildStep, GeneratedBuild, StepId};
use crate::process::{ProcessSpec, ScopedProcess};

pub use types::{
  AbortCause, BuildOutcome, CancelToken, ExecuteConfig, ExecutionResult, SessionReport, SkipReason, StepFailure,
  StepStatus,
};

/// Append-only log of step results, shared with running tasks.
type ResultLog = Arc<Mutex<Vec<ExecutionResult>>>;

fn record(log: &ResultLog, result: ExecutionResult) {
  match log.lock() {
    Ok(mut results) => results.push(result),
    Err(poisoned) => poisoned.into_inner().push(result),
  }
}

fn skipped(step: &BuildStep, reason: SkipReason) -> ExecutionResult {
  ExecutionResult {
    step: step.id.clone(),
    index: step.index,
    tier: step.tier,
    target: step.target.clone(),
    description: step.description(),
    status: StepStatus::Skipped,
    failure: None,
    skip_reason: Some(reason),
    exit_code: None,
    stdout: String::new(),
    stderr: String::new(),
    duration: Duration::ZERO,
  }
}

fn failed(step: &BuildStep, failure: StepFailure, duration: Duration) -> ExecutionResult {
  ExecutionResult {
    status: StepStatus::Failed,
    failure: Some(failure),
    skip_reason: None,
    duration,
    ..skipped(step, SkipReason::Cancelled)
  }
}

/// What a dependency check decided for a pending step.
enum Readiness {
  Ready,
  Waiting,
  Blocked(StepId),
}

fn readiness(step: &BuildStep, statuses: &HashMap<StepId, StepStatus>) -> Readiness {
  let mut waiting = false;
  for dep in &step.depends_on {
    match statuses.get(dep) {
      Some(StepStatus::Succeeded) => {}
      Some(StepStatus::Failed | StepStatus::Skipped) | None => return Readiness::Blocked(dep.clone()),
      Some(StepStatus::Pending | StepStatus::Running) => waiting = true,
    }
  }
  if waiting { Readiness::Waiting } else { Readiness::Ready }
}

/// Execute every step of `build`.
///
/// Never returns an error: every step ends up in the report as succeeded,
/// failed or skipped.
pub async fn execute(build: &GeneratedBuild, config: &ExecuteConfig, cancel: &CancelToken) -> SessionReport {
  let started = Instant::now();
  info!(steps = build.len(), tiers = build.tiers.len(), jobs = config.jobs, "starting execution");

  let log: ResultLog = Arc::new(Mutex::new(Vec::with_capacity(build.len())));
  let semaphore = Arc::new(Semaphore::new(config.jobs.max(1)));
  let mut statuses: HashMap<StepId, StepStatus> = build.steps().map(|s| (s.id.clone(), StepStatus::Pending)).collect();
  let mut abort: Option<AbortCause> = None;
  let mut any_failed = false;
  // Raised by the first failing task when fail-fast is on.
  let halt = CancelToken::new();

  for tier in &build.tiers {
    debug!(tier = tier.index, steps = tier.steps.len(), "executing tier");
    let mut pending: Vec<&BuildStep> = tier.steps.iter().collect();
    let mut join_set = JoinSet::new();
    let mut running: HashMap<tokio::task::Id, StepId> = HashMap::new();

    loop {
      if abort.is_none() && cancel.is_cancelled() {
        warn!("cancellation requested, no further steps will start");
        abort = Some(AbortCause::Cancelled);
      }

      if let Some(cause) = abort {
        let reason = match cause {
          AbortCause::Cancelled => SkipReason::Cancelled,
          AbortCause::FailFast => SkipReason::FailFast,
        };
        for step in pending.drain(..) {
          statuses.insert(step.id.clone(), StepStatus::Skipped);
          record(&log, skipped(step, reason.clone()));
        }
      }

      // Resolve skips until no more cascade inside this tier, then spawn what is ready.
      let mut progressed = true;
      while progressed {
        progressed = false;
        let mut still_pending = Vec::with_capacity(pending.len());
        for step in pending.drain(..) {
          match readiness(step, &statuses) {
            Readiness::Ready => {
              statuses.insert(step.id.clone(), StepStatus::Running);
              let handle = join_set.spawn(run_task(
                step.clone(),
                config.step_timeout,
                Arc::clone(&semaphore),
                cancel.clone(),
                config.fail_fast.then(|| halt.clone()),
                Arc::clone(&log),
              ));
              running.insert(handle.id(), step.id.clone());
            }
            Readiness::Blocked(dep) => {
              warn!(step = %step.id, dependency = %dep, "skipping step due to failed dependency");
              statuses.insert(step.id.clone(), StepStatus::Skipped);
              record(&log, skipped(step, SkipReason::DependencyFailed { step: dep }));
              progressed = true;
            }
            Readiness::Waiting => still_pending.push(step),
          }
        }
        pending = still_pending;
      }

      let Some(joined) = join_set.join_next_with_id().await else {
        // Nothing running: whatever is still pending waits on a step that
        // cannot finish in this tier.
        for step in pending.drain(..) {
          let dep = step
            .depends_on
            .iter()
            .find(|d| statuses.get(*d) != Some(&StepStatus::Succeeded))
            .cloned()
            .unwrap_or_else(|| step.id.clone());
          statuses.insert(step.id.clone(), StepStatus::Skipped);
          record(&log, skipped(step, SkipReason::DependencyFailed { step: dep }));
        }
        break;
      };

      let (id, status) = match joined {
        Ok((task_id, status)) => (running.remove(&task_id), status),
        Err(e) => {
          let id = running.remove(&e.id());
          if let Some(step) = id.as_ref().and_then(|id| build.step(id)) {
            error!(step = %step.id, error = %e, "step task panicked");
            let failure = StepFailure::SpawnFailed {
              program: step.program.display().to_string(),
              message: format!("execution task failed: {}", e),
            };
            record(&log, failed(step, failure, Duration::ZERO));
          }
          (id, StepStatus::Failed)
        }
      };

      if let Some(id) = id {
        statuses.insert(id, status);
      }
      if status == StepStatus::Failed {
        any_failed = true;
        if config.fail_fast && abort.is_none() {
          warn!("fail-fast: aborting after first failure");
          halt.cancel();
          abort = Some(AbortCause::FailFast);
        }
      }
    }
  }

  let mut results = match Arc::try_unwrap(log) {
    Ok(mutex) => mutex.into_inner().unwrap_or_else(|p| p.into_inner()),
    Err(shared) => shared.lock().map(|r| r.clone()).unwrap_or_default(),
  };
  results.sort_by_key(|r| r.index);

  // A step reported skipped by its own task (cancelled after waiting for a
  // permit) also aborts the session.
  if abort.is_none() && results.iter().any(|r| r.skip_reason == Some(SkipReason::Cancelled)) {
    abort = Some(AbortCause::Cancelled);
  }

  let outcome = match abort {
    Some(cause) => BuildOutcome::Aborted(cause),
    None if any_failed => BuildOutcome::Failed,
    None => BuildOutcome::Succeeded,
  };

  let report = SessionReport {
    outcome,
    results,
    duration: started.elapsed(),
  };
  info!(
    outcome = ?report.outcome,
    succeeded = report.succeeded(),
    failed = report.failed(),
    skipped = report.skipped_for_dependency() + report.skipped_for_abort(),
    "execution complete"
  );
  report
}

/// Body of one worker task. Records its own result and returns the status.
///
/// `halt` is set when fail-fast is on. A failing task raises it before its
/// permit is released, so no queued step starts after the first failure.
async fn run_task(
  step: BuildStep,
  timeout: Option<Duration>,
  semaphore: Arc<Semaphore>,
  cancel: CancelToken,
  halt: Option<CancelToken>,
  log: ResultLog,
) -> StepStatus {
  let stopped = |cancel: &CancelToken, halt: &Option<CancelToken>| {
    if cancel.is_cancelled() {
      Some(SkipReason::Cancelled)
    } else if halt.as_ref().is_some_and(CancelToken::is_cancelled) {
      Some(SkipReason::FailFast)
    } else {
      None
    }
  };

  if let Some(reason) = stopped(&cancel, &halt) {
    record(&log, skipped(&step, reason));
    return StepStatus::Skipped;
  }
  let _permit = match semaphore.acquire().await {
    Ok(permit) => permit,
    Err(e) => {
      let failure = StepFailure::SpawnFailed {
        program: step.program.display().to_string(),
        message: e.to_string(),
      };
      record(&log, failed(&step, failure, Duration::ZERO));
      return StepStatus::Failed;
    }
  };
  if let Some(reason) = stopped(&cancel, &halt) {
    debug!(step = %step.id, reason = ?reason, "step stopped while waiting for a worker");
    record(&log, skipped(&step, reason));
    return StepStatus::Skipped;
  }

  let result = run_step(&step, timeout).await;
  let status = result.status;
  if status == StepStatus::Failed
    && let Some(halt) = &halt
  {
    halt.cancel();
  }
  record(&log, result);
  status
}

async fn prepare_dirs(step: &BuildStep) -> std::io::Result<()> {
  tokio::fs::create_dir_all(&step.cwd).await?;
  for output in &step.outputs {
    if let Some(parent) = output.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
  }
  Ok(())
}

/// Run a single step and classify its outcome.
pub async fn run_step(step: &BuildStep, timeout: Option<Duration>) -> ExecutionResult {
  let started = Instant::now();
  let program = step.program.display().to_string();
  debug!(step = %step.id, command = %step.command_line(), "running step");

  if let Err(e) = prepare_dirs(step).await {
    let failure = StepFailure::SpawnFailed {
      program,
      message: format!("failed to create output directories: {}", e),
    };
    return failed(step, failure, started.elapsed());
  }

  let spec = ProcessSpec {
    program: &step.program,
    args: &step.args,
    cwd: Some(&step.cwd),
    response_file: step.response_file,
  };
  let process = match ScopedProcess::spawn(spec) {
    Ok(process) => process,
    Err(e) => {
      error!(step = %step.id, program = %program, error = %e, "failed to spawn step");
      let failure = StepFailure::SpawnFailed {
        program,
        message: e.to_string(),
      };
      return failed(step, failure, started.elapsed());
    }
  };

  let output = match process.wait(timeout).await {
    Ok(output) => output,
    Err(e) => {
      let failure = StepFailure::SpawnFailed {
        program,
        message: e.to_string(),
      };
      return failed(step, failure, started.elapsed());
    }
  };

  let failure = if output.timed_out {
    Some(StepFailure::Timeout {
      limit: timeout.unwrap_or_default(),
    })
  } else if output.exit_code != Some(0) {
    Some(StepFailure::NonZeroExit { code: output.exit_code })
  } else {
    let missing: Vec<_> = step.outputs.iter().filter(|p| !Path::new(p).exists()).cloned().collect();
    (!missing.is_empty()).then_some(StepFailure::MissingOutputs { paths: missing })
  };

  match &failure {
    Some(f) => error!(step = %step.id, failure = %f, "step failed"),
    None => info!(step = %step.id, duration = ?output.duration, "step succeeded"),
  }

  ExecutionResult {
    step: step.id.clone(),
    index: step.index,
    tier: step.tier,
    target: step.target.clone(),
    description: step.description(),
    status: if failure.is_some() {
      StepStatus::Failed
    } else {
      StepStatus::Succeeded
    },
    failure,
    skip_reason: None,
    exit_code: output.exit_code,
    stdout: output.stdout,
    stderr: output.stderr,
    duration: started.elapsed(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::{StepKind, StepTier};
  use crate::util::testutil::{fail_script, shell_cmd, touch_script};
  use std::path::PathBuf;
  use tempfile::TempDir;

  /// A step that runs `script` in a shell and declares `outputs`.
  fn shell_step(id: &str, tier: usize, script: &str, outputs: Vec<PathBuf>, deps: &[&str], cwd: &Path) -> BuildStep {
    let (sh, args) = shell_cmd(script);
    BuildStep {
      id: StepId(id.to_string()),
      index: 0,
      tier,
      target: id.split(':').next().unwrap_or(id).to_string(),
      kind: StepKind::Archive,
      program: PathBuf::from(sh),
      args,
      cwd: cwd.to_path_buf(),
      inputs: vec![],
      outputs,
      depends_on: deps.iter().map(|d| StepId(d.to_string())).collect(),
      response_file: false,
    }
  }

  fn touching(id: &str, tier: usize, dir: &Path, deps: &[&str]) -> BuildStep {
    let out = dir.join(format!("{}.out", id.replace(':', "_")));
    shell_step(id, tier, &touch_script(&out), vec![out], deps, dir)
  }

  fn build_of(tiers: Vec<Vec<BuildStep>>) -> GeneratedBuild {
    let mut index = 0;
    let tiers = tiers
      .into_iter()
      .enumerate()
      .map(|(i, steps)| StepTier {
        index: i,
        steps: steps
          .into_iter()
          .map(|mut s| {
            s.index = index;
            index += 1;
            s
          })
          .collect(),
      })
      .collect();
    GeneratedBuild {
      project: "demo".to_string(),
      tiers,
    }
  }

  fn config(jobs: usize, fail_fast: bool) -> ExecuteConfig {
    ExecuteConfig {
      jobs,
      fail_fast,
      step_timeout: None,
    }
  }

  #[tokio::test]
  async fn empty_build_succeeds() {
    let report = execute(&GeneratedBuild::default(), &config(2, false), &CancelToken::new()).await;
    assert!(report.is_success());
    assert!(report.results.is_empty());
  }

  #[tokio::test]
  async fn dependent_steps_run_in_order() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![
      vec![
        touching("a:compile", 0, dir.path(), &[]),
        touching("a:archive", 0, dir.path(), &["a:compile"]),
      ],
      vec![touching("b:link", 1, dir.path(), &["a:archive"])],
    ]);

    let report = execute(&build, &config(4, false), &CancelToken::new()).await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.succeeded(), 3);
    assert!(dir.path().join("b_link.out").exists());
  }

  #[tokio::test]
  async fn failure_skips_only_reachable_steps() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![
      vec![
        shell_step("bad:compile", 0, &fail_script("boom", 1), vec![], &[], dir.path()),
        touching("bad:archive", 0, dir.path(), &["bad:compile"]),
        touching("good:compile", 0, dir.path(), &[]),
      ],
      vec![
        touching("app:link", 1, dir.path(), &["bad:archive"]),
        touching("other:link", 1, dir.path(), &["good:compile"]),
      ],
    ]);

    let report = execute(&build, &config(2, false), &CancelToken::new()).await;

    assert_eq!(report.outcome, BuildOutcome::Failed);
    let bad = report.result("bad:compile").unwrap();
    assert_eq!(bad.failure, Some(StepFailure::NonZeroExit { code: Some(1) }));
    assert!(bad.stderr.contains("boom"));
    assert_eq!(
      report.result("bad:archive").unwrap().skip_reason,
      Some(SkipReason::DependencyFailed {
        step: StepId("bad:compile".to_string())
      })
    );
    assert_eq!(
      report.result("app:link").unwrap().skip_reason,
      Some(SkipReason::DependencyFailed {
        step: StepId("bad:archive".to_string())
      })
    );
    assert_eq!(report.result("other:link").unwrap().status, StepStatus::Succeeded);
    assert_eq!(report.skipped_for_dependency(), 2);
  }

  #[tokio::test]
  async fn fail_fast_aborts_remaining_tiers() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![
      vec![shell_step("bad:compile", 0, &fail_script("boom", 2), vec![], &[], dir.path())],
      vec![touching("independent:compile", 1, dir.path(), &[])],
    ]);

    let report = execute(&build, &config(1, true), &CancelToken::new()).await;

    assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::FailFast));
    assert_eq!(
      report.result("independent:compile").unwrap().skip_reason,
      Some(SkipReason::FailFast)
    );
  }

  #[tokio::test]
  async fn fail_fast_stops_steps_queued_in_the_same_tier() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![vec![
      shell_step("bad:compile", 0, &fail_script("boom", 1), vec![], &[], dir.path()),
      touching("one:compile", 0, dir.path(), &[]),
      touching("two:compile", 0, dir.path(), &[]),
      touching("three:compile", 0, dir.path(), &[]),
    ]]);

    let report = execute(&build, &config(1, true), &CancelToken::new()).await;

    assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::FailFast));
    assert_eq!(report.result("bad:compile").unwrap().status, StepStatus::Failed);
    for id in ["one:compile", "two:compile", "three:compile"] {
      let result = report.result(id).unwrap();
      assert_eq!(result.status, StepStatus::Skipped, "{} ran after the failure", id);
      assert_eq!(result.skip_reason, Some(SkipReason::FailFast));
    }
    assert_eq!(report.results.len(), 4);
    assert!(!dir.path().join("one_compile.out").exists());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn cancel_while_running_lets_the_running_step_finish() {
    let dir = TempDir::new().unwrap();
    let slow_out = dir.path().join("slow.out");
    let build = build_of(vec![
      vec![
        shell_step(
          "slow:compile",
          0,
          &format!("sleep 1; {}", touch_script(&slow_out)),
          vec![slow_out.clone()],
          &[],
          dir.path(),
        ),
        touching("queued:compile", 0, dir.path(), &[]),
        touching("also:compile", 0, dir.path(), &[]),
      ],
      vec![touching("later:link", 1, dir.path(), &["slow:compile"])],
    ]);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(200)).await;
      trigger.cancel();
    });

    let report = execute(&build, &config(1, false), &cancel).await;
    canceller.await.unwrap();

    assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::Cancelled));
    assert_eq!(report.outcome.exit_code(), 130);
    assert_eq!(report.result("slow:compile").unwrap().status, StepStatus::Succeeded);
    assert!(slow_out.exists());
    for id in ["queued:compile", "also:compile", "later:link"] {
      assert_eq!(
        report.result(id).unwrap().skip_reason,
        Some(SkipReason::Cancelled),
        "{} was not cancelled",
        id
      );
    }
    assert_eq!(report.skipped_for_abort(), 3);
  }

  #[tokio::test]
  async fn exit_zero_without_outputs_is_missing_outputs() {
    let dir = TempDir::new().unwrap();
    let expected = dir.path().join("never-written.o");
    let build = build_of(vec![vec![shell_step(
      "lazy:compile",
      0,
      "exit 0",
      vec![expected.clone()],
      &[],
      dir.path(),
    )]]);

    let report = execute(&build, &config(1, false), &CancelToken::new()).await;

    assert_eq!(
      report.result("lazy:compile").unwrap().failure,
      Some(StepFailure::MissingOutputs { paths: vec![expected] })
    );
  }

  #[tokio::test]
  async fn missing_program_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let mut step = touching("ghost:compile", 0, dir.path(), &[]);
    step.program = PathBuf::from("/nonexistent/kiln-cc");
    let report = execute(&build_of(vec![vec![step]]), &config(1, false), &CancelToken::new()).await;

    assert!(matches!(
      report.result("ghost:compile").unwrap().failure,
      Some(StepFailure::SpawnFailed { .. })
    ));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn slow_step_times_out() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![vec![shell_step("slow:compile", 0, "sleep 30", vec![], &[], dir.path())]]);
    let config = ExecuteConfig {
      step_timeout: Some(Duration::from_millis(200)),
      ..config(1, false)
    };

    let report = execute(&build, &config, &CancelToken::new()).await;

    assert_eq!(
      report.result("slow:compile").unwrap().failure,
      Some(StepFailure::Timeout {
        limit: Duration::from_millis(200)
      })
    );
  }

  #[tokio::test]
  async fn cancelled_session_skips_everything_pending() {
    let dir = TempDir::new().unwrap();
    let build = build_of(vec![
      vec![touching("a:compile", 0, dir.path(), &[])],
      vec![touching("b:compile", 1, dir.path(), &[])],
    ]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let report = execute(&build, &config(1, false), &cancel).await;

    assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::Cancelled));
    assert_eq!(report.skipped_for_abort(), 2);
    assert!(!dir.path().join("a_compile.out").exists());
  }

  #[tokio::test]
  async fn outputs_directories_are_created() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("obj").join("core").join("a.o");
    let build = build_of(vec![vec![shell_step(
      "core:compile",
      0,
      &touch_script(&nested),
      vec![nested.clone()],
      &[],
      dir.path(),
    )]]);

    let report = execute(&build, &config(1, false), &CancelToken::new()).await;

    assert!(report.is_success(), "{:?}", report);
    assert!(nested.exists());
  }
}
