//! Implementation of the `kiln toolchain` command.
//!
//! Resolves the C compiler, the C++ compiler and the archiver the way a
//! build would, and reports what was found.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use kiln_lib::consts::{EXIT_PLANNING_FAILED, EXIT_SUCCESS};
use kiln_lib::project::Language;
use kiln_lib::session::{BuildSession, SessionConfig};
use kiln_lib::toolchain::{Capability, ToolchainDescriptor};

use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning};

#[derive(Debug, Serialize)]
struct ToolchainEntry {
  capability: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  tool: Option<ToolchainDescriptor>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

pub async fn cmd_toolchain(format: OutputFormat) -> Result<u8> {
  let config = SessionConfig::from_env(Path::new("."))?;
  let platform = config.platform;
  let session = BuildSession::new(config);

  let capabilities = [
    Capability::compiler(Language::C, None),
    Capability::compiler(Language::Cxx, None),
    Capability::Archiver,
  ];

  let mut entries = Vec::with_capacity(capabilities.len());
  for capability in &capabilities {
    let entry = match session.resolver().resolve(capability).await {
      Ok(tool) => ToolchainEntry {
        capability: capability.key(),
        tool: Some((*tool).clone()),
        error: None,
      },
      Err(err) => ToolchainEntry {
        capability: capability.key(),
        tool: None,
        error: Some(err.to_string()),
      },
    };
    entries.push(entry);
  }

  let code = if entries.iter().all(|e| e.tool.is_some()) {
    EXIT_SUCCESS
  } else {
    EXIT_PLANNING_FAILED
  };

  if format.is_json() {
    print_json(&entries)?;
    return Ok(code);
  }

  println!("Host: {}", platform);
  for entry in &entries {
    match (&entry.tool, &entry.error) {
      (Some(tool), _) => {
        println!();
        print_success(&format!("{}: {} {}", entry.capability, tool.family, tool.version));
        print_stat("Path", &tool.path.display().to_string());
        if !tool.standards.is_empty() {
          print_stat("Standards", &tool.standards.join(", "));
        }
        if !tool.architectures.is_empty() {
          let arches: Vec<&str> = tool.architectures.iter().map(|a| a.as_str()).collect();
          print_stat("Targets", &arches.join(", "));
        }
      }
      (None, error) => {
        println!();
        print_warning(error.as_deref().unwrap_or("not found"));
      }
    }
  }

  Ok(code)
}
