//! Implementation of the `kiln plan` command.
//!
//! Validates the project, builds its dependency graph and resolves every tool
//! it needs, then prints the execution tiers. Nothing is compiled.

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::consts::EXIT_SUCCESS;
use kiln_lib::session::BuildSession;

use super::ProjectArgs;
use crate::output::{OutputFormat, print_info, print_json, symbols};

pub async fn cmd_plan(args: &ProjectArgs, format: OutputFormat) -> Result<u8> {
  let (project, config) = args.load()?;
  let session = BuildSession::new(config);

  let (graph, plan) = session.plan(&project).await?;
  let summary = plan.summary(&graph);

  if format.is_json() {
    print_json(&summary)?;
    return Ok(EXIT_SUCCESS);
  }

  print_info(&format!(
    "Plan for {}: {} node(s) in {} tier(s), {} granularity",
    summary.project,
    plan.node_count(),
    summary.tiers.len(),
    summary.granularity
  ));

  for (index, tier) in summary.tiers.iter().enumerate() {
    println!();
    println!("Tier {}:", index);
    for node in tier {
      println!(
        "  {} {} {}",
        symbols::ARROW,
        node.label,
        format!("({})", node.kind).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
      for tool in &node.tools {
        println!(
          "      {} {} {} {}",
          tool.capability,
          tool.family,
          tool.version,
          tool.path.if_supports_color(Stream::Stdout, |s| s.dimmed())
        );
      }
    }
  }

  Ok(EXIT_SUCCESS)
}
