//! Ambient janitor settings layered via `ortho-config`.
//!
//! These are operational knobs that rarely change between runs, so they live
//! in `cloud-janitor.toml` or `CLOUD_JANITOR_*` environment variables rather
//! than on the command line.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::janitor::DEFAULT_CLUSTER_ID_TAG;

/// Default upper bound for a single provider call, in seconds.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Default number of concurrent destroy calls.
pub const DEFAULT_DESTROY_CONCURRENCY: usize = 4;

/// Default AWS CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// Default Scaleway CLI binary name.
pub const DEFAULT_SCW_BIN: &str = "scw";

/// Settings shared by every provider client and the executor.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLOUD_JANITOR",
    discovery(
        app_name = "cloud-janitor",
        env_var = "CLOUD_JANITOR_CONFIG_PATH",
        config_file_name = "cloud-janitor.toml",
        dotfile_name = ".cloud-janitor.toml",
        project_file_name = "cloud-janitor.toml"
    )
)]
pub struct JanitorSettings {
    /// Upper bound, in seconds, for any single provider call.
    #[ortho_config(default = DEFAULT_PROVIDER_TIMEOUT_SECS)]
    pub provider_timeout_secs: u64,
    /// Maximum number of destroy calls in flight at once.
    #[ortho_config(default = DEFAULT_DESTROY_CONCURRENCY)]
    pub destroy_concurrency: usize,
    /// Path or name of the AWS CLI binary.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// Path or name of the Scaleway CLI binary.
    #[ortho_config(default = DEFAULT_SCW_BIN.to_owned())]
    pub scw_bin: String,
    /// Tag (or metadata) key holding a volume's cluster UUID.
    #[ortho_config(default = DEFAULT_CLUSTER_ID_TAG.to_owned())]
    pub cluster_id_tag: String,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            destroy_concurrency: DEFAULT_DESTROY_CONCURRENCY,
            aws_bin: DEFAULT_AWS_BIN.to_owned(),
            scw_bin: DEFAULT_SCW_BIN.to_owned(),
            cluster_id_tag: DEFAULT_CLUSTER_ID_TAG.to_owned(),
        }
    }
}

impl JanitorSettings {
    /// Loads settings from files and environment without parsing CLI
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SettingsError> {
        Self::load_from_iter([OsString::from("cloud-janitor")])
            .map_err(|err| SettingsError::Parse(err.to_string()))
    }

    /// Rejects values that would stall or misconfigure a run.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.provider_timeout_secs == 0 {
            return Err(SettingsError::invalid(
                "provider_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.destroy_concurrency == 0 {
            return Err(SettingsError::invalid(
                "destroy_concurrency",
                "must be greater than zero",
            ));
        }
        for (field, value) in [
            ("aws_bin", &self.aws_bin),
            ("scw_bin", &self.scw_bin),
            ("cluster_id_tag", &self.cluster_id_tag),
        ] {
            if value.trim().is_empty() {
                return Err(SettingsError::invalid(field, "must not be blank"));
            }
        }
        Ok(())
    }

    /// Provider call timeout as a [`Duration`].
    #[must_use]
    pub const fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Errors raised while loading ambient settings.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SettingsError {
    /// Raised when configuration sources cannot be merged.
    #[error("settings parsing failed: {0}")]
    Parse(String),
    /// Raised when a setting has an unusable value.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl SettingsError {
    fn invalid(field: &str, reason: &str) -> Self {
        Self::Invalid {
            field: field.to_owned(),
            reason: reason.to_owned(),
        }
    }
}
