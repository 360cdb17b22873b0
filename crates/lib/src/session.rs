//! Build sessions.
//!
//! A [`BuildSession`] owns everything scoped to one build: configuration, the
//! toolchain cache and the cancellation token. It sequences
//! validate → graph → plan → generate → execute and maps the outcome to an
//! exit code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{self, GenerateConfig, GenerateError, GeneratedBuild};
use crate::consts::{
  DEFAULT_BUILD_DIR, DEFAULT_PROBE_TIMEOUT, ENV_BUILD_DIR, ENV_JOBS, EXIT_CANCELLED, EXIT_EXECUTION_FAILED,
  EXIT_PLANNING_FAILED, EXIT_SUCCESS,
};
use crate::execute::{self, AbortCause, BuildOutcome, CancelToken, ExecuteConfig, SessionReport};
use crate::graph::{BuildGraph, Granularity, GraphError};
use crate::plan::{self, BuildPlan, PlanError};
use crate::platform::Platform;
use crate::project::{ConfigError, ConfigValidationError, Project};
use crate::toolchain::{Prober, ProcessProber, ResolverConfig, ToolOverrides, ToolchainResolver};

/// Everything that can stop a session before execution.
#[derive(Debug, Error)]
pub enum SessionError {
  #[error(transparent)]
  Load(#[from] ConfigError),

  #[error(transparent)]
  Validation(#[from] ConfigValidationError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Generate(#[from] GenerateError),

  #[error("invalid value for {var}: {reason}")]
  Env { var: String, reason: String },
}

impl SessionError {
  /// Planning failures never reach execution.
  pub fn exit_code(&self) -> u8 {
    EXIT_PLANNING_FAILED
  }
}

impl BuildOutcome {
  pub fn exit_code(&self) -> u8 {
    match self {
      Self::Succeeded => EXIT_SUCCESS,
      Self::Failed | Self::Aborted(AbortCause::FailFast) => EXIT_EXECUTION_FAILED,
      Self::Aborted(AbortCause::Cancelled) => EXIT_CANCELLED,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
  Planning,
  Executing,
  Completed,
  Aborted,
}

/// Session settings. Environment variables fill in defaults; callers
/// override individual fields afterwards.
#[derive(Debug, Clone)]
pub struct SessionConfig {
  pub jobs: usize,
  pub fail_fast: bool,
  pub step_timeout: Option<Duration>,
  pub probe_timeout: Duration,
  /// Output root; relative paths are taken from `source_dir`.
  pub build_dir: PathBuf,
  pub source_dir: PathBuf,
  pub granularity: Granularity,
  pub platform: Platform,
  pub overrides: ToolOverrides,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      jobs: execute::types::num_cpus(),
      fail_fast: false,
      step_timeout: None,
      probe_timeout: DEFAULT_PROBE_TIMEOUT,
      build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
      source_dir: PathBuf::from("."),
      granularity: Granularity::default(),
      platform: Platform::host(),
      overrides: ToolOverrides::default(),
    }
  }
}

impl SessionConfig {
  /// Defaults plus `KILN_JOBS`, `KILN_BUILD_DIR`, `CC`, `CXX` and `AR`.
  pub fn from_env(source_dir: &Path) -> Result<Self, SessionError> {
    let mut config = Self {
      source_dir: dunce::canonicalize(source_dir).unwrap_or_else(|_| source_dir.to_path_buf()),
      overrides: ToolOverrides::from_env(),
      ..Self::default()
    };

    if let Ok(jobs) = std::env::var(ENV_JOBS) {
      config.jobs = match jobs.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => {
          return Err(SessionError::Env {
            var: ENV_JOBS.to_string(),
            reason: format!("expected a positive integer, got '{}'", jobs),
          });
        }
      };
    }
    if let Ok(dir) = std::env::var(ENV_BUILD_DIR)
      && !dir.trim().is_empty()
    {
      config.build_dir = PathBuf::from(dir);
    }

    debug!(jobs = config.jobs, build_dir = %config.build_dir.display(), "session configuration");
    Ok(config)
  }

  /// Absolute build directory.
  pub fn build_root(&self) -> PathBuf {
    if self.build_dir.is_absolute() {
      self.build_dir.clone()
    } else {
      self.source_dir.join(&self.build_dir)
    }
  }

  fn resolver_config(&self) -> ResolverConfig {
    ResolverConfig {
      probe_timeout: self.probe_timeout,
      overrides: self.overrides.clone(),
      os: self.platform.os,
      host_arch: Some(self.platform.arch),
    }
  }

  fn execute_config(&self) -> ExecuteConfig {
    ExecuteConfig {
      jobs: self.jobs,
      fail_fast: self.fail_fast,
      step_timeout: self.step_timeout,
    }
  }

  fn generate_config(&self) -> GenerateConfig {
    GenerateConfig {
      build_dir: self.build_root(),
      source_dir: self.source_dir.clone(),
      platform: self.platform,
    }
  }
}

/// One build session. The toolchain cache lives and dies with it.
pub struct BuildSession<P: Prober = ProcessProber> {
  config: SessionConfig,
  resolver: ToolchainResolver<P>,
  cancel: CancelToken,
  state: SessionState,
}

impl BuildSession<ProcessProber> {
  pub fn new(config: SessionConfig) -> Self {
    Self::with_prober(ProcessProber, config)
  }
}

impl<P: Prober> BuildSession<P> {
  pub fn with_prober(prober: P, config: SessionConfig) -> Self {
    let resolver = ToolchainResolver::with_prober(prober, config.resolver_config());
    Self {
      config,
      resolver,
      cancel: CancelToken::new(),
      state: SessionState::Planning,
    }
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn resolver(&self) -> &ToolchainResolver<P> {
    &self.resolver
  }

  /// Token that aborts this session when cancelled.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// Validate `project`, build its graph and plan it.
  pub async fn plan<'p>(&self, project: &'p Project) -> Result<(BuildGraph<'p>, BuildPlan), SessionError> {
    project.validate()?;
    let graph = BuildGraph::build(project, self.config.granularity)?;
    let plan = plan::plan(&graph, &self.resolver).await?;
    Ok((graph, plan))
  }

  /// Plan `project` and generate its steps without running anything.
  pub async fn generate(&self, project: &Project) -> Result<GeneratedBuild, SessionError> {
    let (graph, plan) = self.plan(project).await?;
    Ok(backend::generate(&graph, &plan, &self.config.generate_config())?)
  }

  /// Plan, generate and execute `project`.
  ///
  /// Planning errors are returned before any process starts. Execution
  /// problems are reported in the [`SessionReport`].
  pub async fn run(&mut self, project: &Project) -> Result<SessionReport, SessionError> {
    self.state = SessionState::Planning;
    info!(project = %project.name, granularity = %self.config.granularity, "planning build");
    let build = self.generate(project).await?;

    self.state = SessionState::Executing;
    let report = execute::execute(&build, &self.config.execute_config(), &self.cancel).await;

    self.state = match report.outcome {
      BuildOutcome::Aborted(cause) => {
        warn!(cause = ?cause, "session aborted");
        SessionState::Aborted
      }
      BuildOutcome::Succeeded | BuildOutcome::Failed => SessionState::Completed,
    };
    Ok(report)
  }
}
