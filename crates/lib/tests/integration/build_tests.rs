//! End-to-end build sessions against the fake toolchain.

use std::time::Duration;

use kiln_lib::backend::StepId;
use kiln_lib::execute::{AbortCause, BuildOutcome, SkipReason, StepFailure, StepStatus};
use kiln_lib::graph::{Granularity, GraphError};
use kiln_lib::plan::PlanError;
use kiln_lib::project::TargetKind;
use kiln_lib::session::{SessionConfig, SessionError, SessionState};
use kiln_lib::toolchain::ToolchainError;

use super::common::{FAIL_MARKER, TestEnv, library_and_app, project, target};

fn status(report: &kiln_lib::execute::SessionReport, step: &str) -> StepStatus {
  report
    .result(step)
    .unwrap_or_else(|| panic!("no result for {}", step))
    .status
}

#[tokio::test]
async fn library_then_executable() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let mut session = env.session();

  let report = session.run(&project).await.unwrap();

  assert_eq!(report.outcome, BuildOutcome::Succeeded);
  assert_eq!(report.outcome.exit_code(), 0);
  assert_eq!(report.succeeded(), 4);
  assert_eq!(session.state(), SessionState::Completed);

  let archive = report.result("core:archive").unwrap();
  let link = report.result("app:link").unwrap();
  assert_eq!(archive.tier, 0);
  assert_eq!(link.tier, 1);

  assert!(env.artifact(&project.targets[0]).is_file());
  assert!(env.artifact(&project.targets[1]).is_file());
}

#[tokio::test]
async fn each_capability_is_probed_once_per_session() {
  let env = TestEnv::new();
  env.write_source("a.c", "int a;\n");
  env.write_source("b.c", "int b;\n");
  env.write_source("main.c", "int main(void) { return 0; }\n");
  let project = project(vec![
    target("a", TargetKind::StaticLibrary, &["a.c"], &[]),
    target("b", TargetKind::StaticLibrary, &["b.c"], &[]),
    target("app", TargetKind::Executable, &["main.c"], &["a", "b"]),
  ]);
  let mut session = env.session();

  session.run(&project).await.unwrap();

  // C compiler (compile and link) plus the archiver.
  assert_eq!(session.resolver().probe_sequences(), 2);
}

#[tokio::test]
async fn failed_compile_skips_dependents_only() {
  let env = TestEnv::new();
  env.write_source("core.c", &format!("/* {} */\n", FAIL_MARKER));
  env.write_source("main.c", "int main(void) { return 0; }\n");
  env.write_source("tool.c", "int main(void) { return 0; }\n");
  let project = project(vec![
    target("core", TargetKind::StaticLibrary, &["core.c"], &[]),
    target("app", TargetKind::Executable, &["main.c"], &["core"]),
    target("tool", TargetKind::Executable, &["tool.c"], &[]),
  ]);
  let mut session = env.session();

  let report = session.run(&project).await.unwrap();

  assert_eq!(report.outcome, BuildOutcome::Failed);
  assert_eq!(report.outcome.exit_code(), 1);
  assert_eq!(report.failed(), 1);

  let failed = report.result("core:compile:core.c").unwrap();
  assert_eq!(failed.status, StepStatus::Failed);
  assert_eq!(failed.failure, Some(StepFailure::NonZeroExit { code: Some(1) }));
  assert!(failed.stderr.contains("forced failure"));

  let archive = report.result("core:archive").unwrap();
  assert_eq!(archive.status, StepStatus::Skipped);
  assert_eq!(
    archive.skip_reason,
    Some(SkipReason::DependencyFailed {
      step: StepId("core:compile:core.c".to_string()),
    })
  );
  assert_eq!(status(&report, "app:link"), StepStatus::Skipped);
  assert!(report.skipped_for_dependency() >= 3);

  assert_eq!(status(&report, "tool:link"), StepStatus::Succeeded);
  assert!(env.artifact(&project.targets[2]).is_file());
  assert!(!env.artifact(&project.targets[1]).exists());
}

#[tokio::test]
async fn fail_fast_aborts_the_session() {
  let env = TestEnv::new();
  env.write_source("core.c", &format!("/* {} */\n", FAIL_MARKER));
  env.write_source("main.c", "int main(void) { return 0; }\n");
  let project = project(vec![
    target("core", TargetKind::StaticLibrary, &["core.c"], &[]),
    target("app", TargetKind::Executable, &["main.c"], &["core"]),
  ]);
  let config = SessionConfig {
    jobs: 1,
    fail_fast: true,
    ..env.config()
  };
  let mut session = env.session_with(config);

  let report = session.run(&project).await.unwrap();

  assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::FailFast));
  assert_eq!(report.outcome.exit_code(), 1);
  assert_eq!(session.state(), SessionState::Aborted);
  assert_eq!(status(&report, "app:link"), StepStatus::Skipped);
  assert_eq!(report.results.len(), 4);
}

#[tokio::test]
async fn cancelled_session_runs_nothing() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let mut session = env.session();
  session.cancel_token().cancel();

  let report = session.run(&project).await.unwrap();

  assert_eq!(report.outcome, BuildOutcome::Aborted(AbortCause::Cancelled));
  assert_eq!(report.outcome.exit_code(), 130);
  assert_eq!(report.skipped_for_abort(), 4);
  assert!(!env.artifact(&project.targets[1]).exists());
}

#[tokio::test]
async fn missing_cxx_compiler_fails_planning() {
  let env = TestEnv::without_cxx();
  env.write_source("main.cpp", "int main() { return 0; }\n");
  let project = project(vec![target("app", TargetKind::Executable, &["main.cpp"], &[])]);
  let mut session = env.session();

  let err = session.run(&project).await.unwrap_err();

  assert_eq!(err.exit_code(), 2);
  match err {
    SessionError::Plan(PlanError::Toolchain(ToolchainError::NotFound { capability, candidates })) => {
      assert!(capability.contains("c++"), "capability was {}", capability);
      for name in ["c++", "g++", "clang++"] {
        assert!(candidates.iter().any(|c| c == name), "{} not tried", name);
      }
    }
    other => panic!("unexpected error: {}", other),
  }
  assert!(!env.build_root().exists());
}

#[tokio::test]
async fn dependency_cycle_fails_planning() {
  let env = TestEnv::new();
  let project = project(vec![
    target("x", TargetKind::StaticLibrary, &["x.c"], &["y"]),
    target("y", TargetKind::StaticLibrary, &["y.c"], &["x"]),
  ]);
  let mut session = env.session();

  let err = session.run(&project).await.unwrap_err();

  assert_eq!(err.exit_code(), 2);
  let SessionError::Graph(GraphError::DependencyCycle { path }) = err else {
    panic!("expected a dependency cycle");
  };
  assert_eq!(path, vec!["x", "y", "x"]);
  assert_eq!(session.resolver().probe_sequences(), 0);
}

#[tokio::test]
async fn unit_granularity_builds_the_same_artifacts() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let config = SessionConfig {
    granularity: Granularity::Unit,
    ..env.config()
  };
  let mut session = env.session_with(config);

  let report = session.run(&project).await.unwrap();

  assert!(report.is_success());
  assert_eq!(report.results.len(), 4);
  assert!(env.artifact(&project.targets[1]).is_file());
}

#[tokio::test]
async fn missing_outputs_fail_the_step() {
  let env = TestEnv::with_silent_cc();
  env.write_source("main.c", "int main(void) { return 0; }\n");
  let project = project(vec![target("app", TargetKind::Executable, &["main.c"], &[])]);
  let mut session = env.session();

  let report = session.run(&project).await.unwrap();

  let compile = report.result("app:compile:main.c").unwrap();
  assert_eq!(compile.status, StepStatus::Failed);
  assert!(matches!(compile.failure, Some(StepFailure::MissingOutputs { .. })));
  assert_eq!(status(&report, "app:link"), StepStatus::Skipped);
}

#[tokio::test]
async fn rebuilding_is_deterministic() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let session = env.session();

  let first = session.generate(&project).await.unwrap();
  let second = session.generate(&project).await.unwrap();

  assert_eq!(first, second);
  assert!(
    first
      .steps()
      .all(|s| s.cwd == env.build_root() && s.outputs.iter().all(|o| o.starts_with(env.build_root())))
  );
}

#[tokio::test]
async fn step_timeout_is_reported() {
  let env = TestEnv::with_slow_cc();
  env.write_source("main.c", "int main(void) { return 0; }\n");
  let project = project(vec![target("app", TargetKind::Executable, &["main.c"], &[])]);
  let config = SessionConfig {
    step_timeout: Some(Duration::from_millis(300)),
    ..env.config()
  };
  let mut session = env.session_with(config);

  let report = session.run(&project).await.unwrap();

  assert_eq!(report.outcome, BuildOutcome::Failed);
  assert!(matches!(
    report.result("app:compile:main.c").unwrap().failure,
    Some(StepFailure::Timeout { .. })
  ));
  assert_eq!(status(&report, "app:link"), StepStatus::Skipped);
}
