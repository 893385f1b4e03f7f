//! Command-line interface definitions for the `cloud-janitor` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must stay free of crate-internal imports for that reason.

use clap::Parser;

/// Default retention threshold for volumes, in minutes.
pub(crate) const DEFAULT_VOLUME_LAG_MINUTES: u32 = 30;

/// Default retention threshold for instances, in minutes.
pub(crate) const DEFAULT_INSTANCE_LAG_MINUTES: u32 = 120;

/// Top-level CLI for the `cloud-janitor` binary.
#[derive(Debug, Parser)]
#[command(
    name = "cloud-janitor",
    about = "Find and destroy cloud instances and volumes leaked by test runs"
)]
pub(crate) struct Cli {
    /// Print the calculated actions without deleting anything.
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// YAML document containing the cloud credentials for every account to
    /// sweep.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_file: String,
    /// Minimum age in minutes before a test-owned volume is destroyed.
    #[arg(long, value_name = "MINUTES", default_value_t = DEFAULT_VOLUME_LAG_MINUTES)]
    pub(crate) volume_lag: u32,
    /// Minimum age in minutes before a test-owned instance is destroyed.
    #[arg(long, value_name = "MINUTES", default_value_t = DEFAULT_INSTANCE_LAG_MINUTES)]
    pub(crate) instance_lag: u32,
    /// Hexadecimal marker stored in the node field of test cluster UUIDs.
    ///
    /// Defaults to the pre-shared marker used by the acceptance suites.
    #[arg(long, value_name = "HEX")]
    pub(crate) marker: Option<String>,
    /// Instance name prefix considered for deletion (repeatable).
    ///
    /// The creator from the credentials document is appended to every
    /// prefix. When omitted, `acceptance-test-` and `client-test-` are used.
    #[arg(long = "instance-name-prefix", value_name = "PREFIX")]
    pub(crate) instance_name_prefixes: Vec<String>,
}
