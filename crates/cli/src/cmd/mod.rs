mod build;
mod generate;
mod plan;
mod toolchain;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, ValueEnum};

use kiln_lib::consts::DEFAULT_PROJECT_FILE;
use kiln_lib::graph::Granularity;
use kiln_lib::project::Project;
use kiln_lib::session::{SessionConfig, SessionError};

pub use build::{BuildArgs, cmd_build};
pub use generate::{BackendArg, cmd_generate};
pub use plan::cmd_plan;
pub use toolchain::cmd_toolchain;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GranularityArg {
  /// One node per target
  Target,
  /// One node per translation unit plus one per link
  Unit,
}

impl From<GranularityArg> for Granularity {
  fn from(arg: GranularityArg) -> Self {
    match arg {
      GranularityArg::Target => Granularity::Target,
      GranularityArg::Unit => Granularity::Unit,
    }
  }
}

/// Arguments shared by every command that works on a project file.
#[derive(Debug, Args)]
pub struct ProjectArgs {
  /// Path to the project file
  #[arg(default_value = DEFAULT_PROJECT_FILE)]
  pub project: PathBuf,

  /// Build directory, relative to the project file (overrides KILN_BUILD_DIR)
  #[arg(long)]
  pub build_dir: Option<PathBuf>,

  /// Dependency graph granularity
  #[arg(long, value_enum)]
  pub granularity: Option<GranularityArg>,
}

impl ProjectArgs {
  /// Load the project and build a session configuration around it.
  ///
  /// Sources and the build directory are resolved against the directory
  /// holding the project file. Flags take precedence over the environment.
  pub fn load(&self) -> Result<(Project, SessionConfig)> {
    let project = Project::from_json_file(&self.project).map_err(SessionError::from)?;

    let source_dir = self
      .project
      .parent()
      .filter(|p| !p.as_os_str().is_empty())
      .unwrap_or(Path::new("."));
    let mut config = SessionConfig::from_env(source_dir)?;

    if let Some(dir) = &self.build_dir {
      config.build_dir = dir.clone();
    }
    if let Some(granularity) = self.granularity {
      config.granularity = granularity.into();
    }
    Ok((project, config))
  }
}
