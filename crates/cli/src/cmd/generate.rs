//! Implementation of the `kiln generate` command.
//!
//! Writes a static build file for an external build tool. The file lands in
//! the build directory unless `--output` says otherwise; `-` prints it.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;

use kiln_lib::backend::BackendFormat;
use kiln_lib::consts::EXIT_SUCCESS;
use kiln_lib::session::BuildSession;

use super::ProjectArgs;
use crate::output::print_success;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum BackendArg {
  #[default]
  Ninja,
  Make,
}

impl From<BackendArg> for BackendFormat {
  fn from(arg: BackendArg) -> Self {
    match arg {
      BackendArg::Ninja => BackendFormat::Ninja,
      BackendArg::Make => BackendFormat::Makefile,
    }
  }
}

pub async fn cmd_generate(args: &ProjectArgs, backend: BackendArg, output: Option<&Path>) -> Result<u8> {
  let (project, config) = args.load()?;
  let format = BackendFormat::from(backend);
  let default_path = config.build_root().join(format.file_name());

  let session = BuildSession::new(config);
  let build = session.generate(&project).await?;
  let rendered = format.render(&build);

  if output == Some(Path::new("-")) {
    print!("{}", rendered);
    return Ok(EXIT_SUCCESS);
  }

  let path: PathBuf = output.map(Path::to_path_buf).unwrap_or(default_path);
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {}", parent.display()))?;
  }
  fs::write(&path, rendered).with_context(|| format!("Failed to write build file: {}", path.display()))?;

  print_success(&format!(
    "Wrote {} file with {} step(s) to {}",
    format,
    build.len(),
    path.display()
  ));
  Ok(EXIT_SUCCESS)
}
