//! Crate-wide constants.

use std::time::Duration;

pub const APP_NAME: &str = "kiln";

/// Project file read by the CLI when no path is given.
pub const DEFAULT_PROJECT_FILE: &str = "kiln.json";

/// Environment variable overriding the default worker pool size.
pub const ENV_JOBS: &str = "KILN_JOBS";

/// Environment variable overriding the default build directory.
pub const ENV_BUILD_DIR: &str = "KILN_BUILD_DIR";

/// Build directory used when neither a flag nor `KILN_BUILD_DIR` is given.
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Upper bound on a single toolchain probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Argument length (in bytes) above which arguments go into a response file.
pub const RESPONSE_FILE_THRESHOLD: usize = 8 * 1024;

/// Number of hex characters of the source-path digest used in object file names.
pub const OBJ_DIGEST_LEN: usize = 8;

/// Exit code for a session that completed with every step succeeding.
pub const EXIT_SUCCESS: u8 = 0;

/// Exit code when at least one step failed (including fail-fast aborts).
pub const EXIT_EXECUTION_FAILED: u8 = 1;

/// Exit code when the session never reached execution.
pub const EXIT_PLANNING_FAILED: u8 = 2;

/// Exit code when the session was aborted by cancellation.
pub const EXIT_CANCELLED: u8 = 130;
