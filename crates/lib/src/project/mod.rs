//! Configuration model.
//!
//! The in-memory shape of a project consumed by the rest of the engine.
//! Validation here catches bad or contradictory target data before any graph
//! is built, so later stages can rely on:
//!
//! - unique, file-name-safe target names
//! - at least one compilable source per target, with no duplicates
//! - external library names that do not shadow targets
//! - no target linking against an executable

mod types;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

pub use types::*;

/// Bad or contradictory project data, reported before planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {subject}: {reason}")]
pub struct ConfigValidationError {
  /// What was invalid, e.g. `target 'core'` or `project`.
  pub subject: String,
  pub reason: String,
}

impl ConfigValidationError {
  fn new(subject: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      subject: subject.into(),
      reason: reason.into(),
    }
  }

  fn target(name: &str, reason: impl Into<String>) -> Self {
    Self::new(format!("target '{}'", name), reason)
  }
}

/// Errors raised while loading a project.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read project file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse project file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Validation(#[from] ConfigValidationError),
}

impl Project {
  /// Load and validate a project from its JSON serialization.
  pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let project: Project = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    project.validate()?;
    debug!(project = %project.name, targets = project.targets.len(), "loaded project");
    Ok(project)
  }

  /// Check the project for bad or contradictory data.
  ///
  /// Dependency resolution and cycles are left to the graph builder, which
  /// reports them with their own error kinds.
  pub fn validate(&self) -> Result<(), ConfigValidationError> {
    if self.name.trim().is_empty() {
      return Err(ConfigValidationError::new("project", "name must not be empty"));
    }

    if let Some(standard) = &self.options.standard
      && ![Language::C, Language::Cxx].iter().any(|l| l.accepts_standard(standard))
    {
      return Err(ConfigValidationError::new(
        "project",
        format!("default standard '{}' is neither a C nor a C++ standard", standard),
      ));
    }

    let mut external_names = HashSet::new();
    for lib in &self.external_libraries {
      if lib.name.trim().is_empty() {
        return Err(ConfigValidationError::new("external library", "name must not be empty"));
      }
      if !external_names.insert(lib.name.as_str()) {
        return Err(ConfigValidationError::new(
          format!("external library '{}'", lib.name),
          "declared more than once",
        ));
      }
    }

    let mut target_names = HashSet::new();
    for target in &self.targets {
      validate_target_name(&target.name)?;
      if !target_names.insert(target.name.as_str()) {
        return Err(ConfigValidationError::target(&target.name, "declared more than once"));
      }
      if external_names.contains(target.name.as_str()) {
        return Err(ConfigValidationError::target(
          &target.name,
          "name collides with an external library",
        ));
      }
    }

    for target in &self.targets {
      self.validate_target(target)?;
    }

    Ok(())
  }

  fn validate_target(&self, target: &Target) -> Result<(), ConfigValidationError> {
    if target.sources.is_empty() {
      return Err(ConfigValidationError::target(&target.name, "has no sources"));
    }

    let mut seen = HashSet::new();
    for source in &target.sources {
      if Language::of_source(source).is_none() {
        return Err(ConfigValidationError::target(
          &target.name,
          format!("source {} is not a C or C++ translation unit", source.display()),
        ));
      }
      if !seen.insert(source) {
        return Err(ConfigValidationError::target(
          &target.name,
          format!("source {} is listed more than once", source.display()),
        ));
      }
    }

    let mut includes = HashSet::new();
    for dir in &target.include_dirs {
      if !includes.insert(dir) {
        return Err(ConfigValidationError::target(
          &target.name,
          format!("include directory {} is listed more than once", dir.display()),
        ));
      }
    }

    let mut deps = HashSet::new();
    for dep in &target.dependencies {
      if !deps.insert(dep.as_str()) {
        return Err(ConfigValidationError::target(
          &target.name,
          format!("dependency '{}' is listed more than once", dep),
        ));
      }
      if let Some(other) = self.target(dep)
        && other.kind == TargetKind::Executable
      {
        return Err(ConfigValidationError::target(
          &target.name,
          format!("cannot link against executable '{}'", dep),
        ));
      }
    }

    // An inherited default only applies to the sources it fits; a target's
    // own standard must fit at least one of its sources.
    if let Some(standard) = &target.options.standard
      && !target
        .sources
        .iter()
        .filter_map(|s| Language::of_source(s))
        .any(|language| language.accepts_standard(standard))
    {
      return Err(ConfigValidationError::target(
        &target.name,
        format!("standard '{}' does not apply to {} sources", standard, target.language()),
      ));
    }

    Ok(())
  }
}

/// Target names end up in file names, so restrict them to a portable set.
fn validate_target_name(name: &str) -> Result<(), ConfigValidationError> {
  if name.is_empty() {
    return Err(ConfigValidationError::new("target", "name must not be empty"));
  }
  let portable = name
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
  if !portable || name.starts_with('.') {
    return Err(ConfigValidationError::target(
      name,
      "name may only contain ASCII letters, digits, '_', '-' and '.'",
    ));
  }
  Ok(())
}
