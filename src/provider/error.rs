//! Error types shared by the cloud provider clients.

use thiserror::Error;

use crate::command::{CommandOutput, SpawnError};

/// Errors raised while talking to a cloud provider.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when a provider CLI cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a provider CLI returns a non-zero exit status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed (for example `aws`).
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when provider output cannot be decoded.
    #[error("failed to parse {resource} output: {message}")]
    Parse {
        /// Resource type being parsed (for example `volumes`).
        resource: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when an HTTP call to a provider API fails.
    #[error("{operation} request failed: {message}")]
    Http {
        /// Operation that was attempted.
        operation: String,
        /// Transport or status error message.
        message: String,
    },
    /// Raised when authentication succeeds but the service catalogue lacks
    /// an endpoint the client needs.
    #[error("no {service} endpoint for region {region}")]
    MissingEndpoint {
        /// Service type looked up in the catalogue.
        service: String,
        /// Region requested.
        region: String,
    },
    /// Raised when a provider call exceeds the configured timeout.
    #[error("{operation} on {provider} timed out after {seconds}s")]
    Timeout {
        /// Label of the provider client.
        provider: String,
        /// Operation that timed out.
        operation: String,
        /// Timeout that elapsed, in seconds.
        seconds: u64,
    },
}

impl From<SpawnError> for ProviderError {
    fn from(value: SpawnError) -> Self {
        Self::Spawn {
            program: value.program,
            message: value.message,
        }
    }
}

impl ProviderError {
    /// Converts a non-zero CLI exit into [`ProviderError::CommandFailure`].
    pub(crate) fn from_output(program: &str, resource: &str, output: &CommandOutput) -> Self {
        Self::CommandFailure {
            program: program.to_owned(),
            status: output.code,
            status_text: output.status_text(),
            stderr: format!("{resource}: {}", output.stderr.trim()),
        }
    }

    /// Wraps a decoding failure.
    pub(crate) fn parse(resource: &str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            resource: resource.to_owned(),
            message: err.to_string(),
        }
    }
}
