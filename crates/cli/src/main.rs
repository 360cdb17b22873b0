mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::consts::EXIT_EXECUTION_FAILED;
use kiln_lib::session::SessionError;

use cmd::{BackendArg, BuildArgs, ProjectArgs};
use output::{OutputFormat, print_error};

/// kiln - build orchestration for C and C++ projects
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Resolve toolchains and show the execution tiers without building
  Plan {
    #[command(flatten)]
    project: ProjectArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },

  /// Build the project by running every step directly
  Build(BuildArgs),

  /// Write a Ninja or Makefile build file for the project
  Generate {
    #[command(flatten)]
    project: ProjectArgs,

    /// Build file format
    #[arg(long, value_enum, default_value_t)]
    backend: BackendArg,

    /// Where to write the build file ("-" for stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Show the compilers and archiver found on this host
  Toolchain {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
  },
}

fn init_tracing(verbose: bool) {
  let filter = if verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

/// Errors from before execution (loading, validation, planning) map to the
/// planning exit code; anything else is reported as a failed run.
fn exit_code_for(err: &anyhow::Error) -> u8 {
  err
    .downcast_ref::<SessionError>()
    .map(SessionError::exit_code)
    .unwrap_or(EXIT_EXECUTION_FAILED)
}

#[tokio::main]
async fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match &cli.command {
    Commands::Plan { project, format } => cmd::cmd_plan(project, *format).await,
    Commands::Build(args) => cmd::cmd_build(args).await,
    Commands::Generate {
      project,
      backend,
      output,
    } => cmd::cmd_generate(project, *backend, output.as_deref()).await,
    Commands::Toolchain { format } => cmd::cmd_toolchain(*format).await,
  };

  match result {
    Ok(code) => ExitCode::from(code),
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(exit_code_for(&err))
    }
  }
}
