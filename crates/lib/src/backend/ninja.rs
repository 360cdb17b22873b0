//! Ninja renderer.
//!
//! One `build` statement per step. Tier boundaries become phony `tier_N`
//! targets that the next tier lists as order-only inputs.

use std::fmt::Write;
use std::path::Path;

use crate::consts::{APP_NAME, RESPONSE_FILE_THRESHOLD};
use crate::util::quote::{response_file_quote, shell_quote};

use super::types::{BuildStep, GeneratedBuild};

/// Escape a path for a `build` line.
fn escape_path(path: &Path) -> String {
  path
    .display()
    .to_string()
    .replace('$', "$$")
    .replace(' ', "$ ")
    .replace(':', "$:")
}

/// Escape a variable value.
fn escape_value(value: &str) -> String {
  value.replace('$', "$$").replace('\n', "$\n")
}

fn needs_rspfile(step: &BuildStep) -> bool {
  step.response_file && step.args.iter().map(|a| a.len() + 1).sum::<usize>() > RESPONSE_FILE_THRESHOLD
}

fn join_paths<'a>(paths: impl IntoIterator<Item = &'a std::path::PathBuf>) -> String {
  paths.into_iter().map(|p| escape_path(p)).collect::<Vec<_>>().join(" ")
}

pub fn render(build: &GeneratedBuild) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "# Generated by {} for project {}. Do not edit.", APP_NAME, build.project);
  let _ = writeln!(out, "ninja_required_version = 1.3");
  let _ = writeln!(out);
  let _ = writeln!(out, "rule step");
  let _ = writeln!(out, "  command = $cmd");
  let _ = writeln!(out, "  description = $desc");
  let _ = writeln!(out);
  let _ = writeln!(out, "rule step_rsp");
  let _ = writeln!(out, "  command = cd $cwd && $program @$out.rsp");
  let _ = writeln!(out, "  rspfile = $out.rsp");
  let _ = writeln!(out, "  rspfile_content = $rsp");
  let _ = writeln!(out, "  description = $desc");

  for tier in &build.tiers {
    let _ = writeln!(out);
    let _ = writeln!(out, "# tier {}", tier.index);
    for step in &tier.steps {
      let rsp = needs_rspfile(step);
      let mut line = format!(
        "build {}: {} {}",
        join_paths(&step.outputs),
        if rsp { "step_rsp" } else { "step" },
        join_paths(&step.inputs)
      );
      if tier.index > 0 {
        let _ = write!(line, " || tier_{}", tier.index - 1);
      }
      let _ = writeln!(out, "{}", line.trim_end());
      let cwd = shell_quote(&step.cwd.to_string_lossy());
      if rsp {
        let program = shell_quote(&step.program.to_string_lossy());
        let content: Vec<String> = step.args.iter().map(|a| response_file_quote(a)).collect();
        let _ = writeln!(out, "  cwd = {}", escape_value(&cwd));
        let _ = writeln!(out, "  program = {}", escape_value(&program));
        let _ = writeln!(out, "  rsp = {}", escape_value(&content.join(" ")));
      } else {
        let _ = writeln!(out, "  cmd = cd {} && {}", escape_value(&cwd), escape_value(&step.command_line()));
      }
      let _ = writeln!(out, "  desc = {}", escape_value(&step.description()));
    }
    let _ = writeln!(
      out,
      "build tier_{}: phony {}",
      tier.index,
      join_paths(tier.steps.iter().flat_map(|s| s.outputs.iter()))
    );
  }

  let _ = writeln!(out);
  match build.tiers.last() {
    Some(last) => {
      let _ = writeln!(out, "default tier_{}", last.index);
    }
    None => {
      let _ = writeln!(out, "build all: phony");
      let _ = writeln!(out, "default all");
    }
  }
  out
}
