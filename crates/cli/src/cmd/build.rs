//! Implementation of the `kiln build` command.
//!
//! Plans the project and runs every step directly, without an intermediate
//! build file. Ctrl-C cancels the session: running steps finish, nothing new
//! starts, and the command exits with 130.

use std::num::NonZeroUsize;

use anyhow::Result;
use clap::Args;
use tracing::warn;

use kiln_lib::backend::GeneratedBuild;
use kiln_lib::consts::EXIT_SUCCESS;
use kiln_lib::execute::{AbortCause, BuildOutcome, ExecutionResult, SessionReport, StepStatus};
use kiln_lib::session::BuildSession;

use super::ProjectArgs;
use crate::output::{
  OutputFormat, format_duration, print_error, print_info, print_json, print_planned_step, print_stat,
  print_step_failed, print_step_skipped, print_step_succeeded, print_success, print_warning,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
  #[command(flatten)]
  pub project: ProjectArgs,

  /// Maximum number of steps running at once (overrides KILN_JOBS)
  #[arg(short, long)]
  pub jobs: Option<NonZeroUsize>,

  /// Stop starting new steps after the first failure
  #[arg(long)]
  pub fail_fast: bool,

  /// Per-step time limit, e.g. "90s" or "5m"
  #[arg(long)]
  pub timeout: Option<humantime::Duration>,

  /// Print the steps that would run without running them
  #[arg(long)]
  pub dry_run: bool,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  pub format: OutputFormat,
}

pub async fn cmd_build(args: &BuildArgs) -> Result<u8> {
  let (project, mut config) = args.project.load()?;
  if let Some(jobs) = args.jobs {
    config.jobs = jobs.get();
  }
  config.fail_fast |= args.fail_fast;
  if let Some(timeout) = args.timeout.as_deref() {
    config.step_timeout = Some(*timeout);
  }

  let mut session = BuildSession::new(config);

  if args.dry_run {
    let build = session.generate(&project).await?;
    if args.format.is_json() {
      print_json(&build)?;
    } else {
      print_steps(&build);
    }
    return Ok(EXIT_SUCCESS);
  }

  let token = session.cancel_token();
  let interrupt = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling build");
      token.cancel();
    }
  });

  let report = session.run(&project).await;
  interrupt.abort();
  let report = report?;

  if args.format.is_json() {
    print_json(&report)?;
  } else {
    print_report(&project.name, &report);
  }
  Ok(report.outcome.exit_code())
}

fn print_steps(build: &GeneratedBuild) {
  print_info(&format!("{} step(s) for {}", build.len(), build.project));
  for tier in &build.tiers {
    println!();
    println!("Tier {}:", tier.index);
    for step in &tier.steps {
      print_planned_step(&step.description(), &step.command_line());
    }
  }
}

fn print_result(result: &ExecutionResult) {
  match result.status {
    StepStatus::Succeeded => print_step_succeeded(&result.description, result.duration),
    StepStatus::Failed => {
      let reason = result
        .failure
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "failed".to_string());
      print_step_failed(&result.description, &reason, &[result.stdout.as_str(), result.stderr.as_str()]);
    }
    StepStatus::Skipped => {
      let reason = result.skip_reason.as_ref().map(|r| r.to_string()).unwrap_or_default();
      print_step_skipped(&result.description, &reason);
    }
    StepStatus::Pending | StepStatus::Running => {}
  }
}

fn print_report(project: &str, report: &SessionReport) {
  for result in &report.results {
    print_result(result);
  }
  println!();

  let elapsed = format_duration(report.duration);
  match report.outcome {
    BuildOutcome::Succeeded => print_success(&format!("Built {} in {}", project, elapsed)),
    BuildOutcome::Failed => print_error(&format!("Build of {} failed after {}", project, elapsed)),
    BuildOutcome::Aborted(AbortCause::FailFast) => {
      print_error(&format!("Build of {} stopped after the first failure", project))
    }
    BuildOutcome::Aborted(AbortCause::Cancelled) => print_warning(&format!("Build of {} cancelled", project)),
  }
  print_stat("Succeeded", &report.succeeded().to_string());
  print_stat("Failed", &report.failed().to_string());
  print_stat("Skipped (dependency)", &report.skipped_for_dependency().to_string());
  print_stat("Skipped (aborted)", &report.skipped_for_abort().to_string());
}
