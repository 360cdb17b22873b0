//! Terminal output for kiln commands.
//!
//! Status lines go to stdout, problems to stderr. Colors are only applied when
//! the stream supports them, so piped output stays plain.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const SKIP: &str = "-";
}

/// Compact duration for step timings: `850ms`, `2.05s`, `3m 12s`.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  match secs {
    0 => format!("{}ms", millis),
    1..60 => format!("{}.{:02}s", secs, millis / 10),
    _ => format!("{}m {}s", secs / 60, secs % 60),
  }
}

pub fn indent(text: &str, width: usize) -> String {
  let pad = " ".repeat(width);
  text
    .lines()
    .map(|line| format!("{}{}", pad, line))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// A step that would run, followed by its full command line.
pub fn print_planned_step(description: &str, command_line: &str) {
  println!("  {} {}", symbols::ARROW, description);
  println!("      {}", command_line.if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

pub fn print_step_succeeded(description: &str, elapsed: Duration) {
  println!(
    "  {} {} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    description,
    format!("({})", format_duration(elapsed)).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

/// A failed step and whatever the tool printed, indented under it.
pub fn print_step_failed(description: &str, reason: &str, captured: &[&str]) {
  println!(
    "  {} {}: {}",
    symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
    description,
    reason
  );
  for output in captured.iter().map(|o| o.trim_end()).filter(|o| !o.trim().is_empty()) {
    println!("{}", indent(output, 6));
  }
}

pub fn print_step_skipped(description: &str, reason: &str) {
  println!(
    "  {} {}",
    symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    format!("{} (skipped: {})", description, reason).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
