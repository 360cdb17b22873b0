//! Makefile renderer (GNU make).

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;
use crate::util::quote::shell_quote;

use super::types::GeneratedBuild;

fn escape_path(path: &Path) -> String {
  path
    .display()
    .to_string()
    .replace('$', "$$")
    .replace(' ', "\\ ")
    .replace(':', "\\:")
    .replace('#', "\\#")
}

fn join_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> String {
  paths.into_iter().map(|p| escape_path(p)).collect::<Vec<_>>().join(" ")
}

pub fn render(build: &GeneratedBuild) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "# Generated by {} for project {}. Do not edit.", APP_NAME, build.project);
  let _ = writeln!(out);

  let phony: Vec<String> = build.tiers.iter().map(|t| format!("tier_{}", t.index)).collect();
  let _ = writeln!(out, ".PHONY: all {}", phony.join(" "));
  match build.tiers.last() {
    Some(last) => {
      let _ = writeln!(out, "all: tier_{}", last.index);
    }
    None => {
      let _ = writeln!(out, "all:");
    }
  }

  for tier in &build.tiers {
    let _ = writeln!(out);
    let _ = writeln!(out, "# tier {}", tier.index);
    let outputs = join_paths(tier.steps.iter().flat_map(|s| s.outputs.iter()));
    let _ = writeln!(out, "tier_{}: {}", tier.index, outputs);

    for step in &tier.steps {
      // Grouped targets when one step produces several files.
      let separator = if step.outputs.len() > 1 { "&:" } else { ":" };
      let mut rule = format!("{}{} {}", join_paths(&step.outputs), separator, join_paths(&step.inputs));
      if tier.index > 0 {
        let _ = write!(rule, " | tier_{}", tier.index - 1);
      }
      let _ = writeln!(out);
      let _ = writeln!(out, "{}", rule.trim_end());
      let _ = writeln!(out, "\t@echo {}", shell_quote(&step.description()).replace('$', "$$"));
      for dir in output_dirs(&step.outputs) {
        let _ = writeln!(out, "\t@mkdir -p {}", shell_quote(&dir).replace('$', "$$"));
      }
      let cwd = shell_quote(&step.cwd.to_string_lossy());
      let recipe = format!("cd {} && {}", cwd, step.command_line());
      let _ = writeln!(out, "\t{}", recipe.replace('$', "$$"));
    }
  }
  out
}

fn output_dirs(outputs: &[PathBuf]) -> Vec<String> {
  let mut dirs: Vec<String> = outputs
    .iter()
    .filter_map(|p| p.parent())
    .filter(|p| !p.as_os_str().is_empty())
    .map(|p| p.display().to_string())
    .collect();
  dirs.dedup();
  dirs
}
