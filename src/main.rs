//! Binary entry point for the `cloud-janitor` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use chrono::{TimeDelta, Utc};
use clap::Parser;
use thiserror::Error;
use tracing::error;

use cloud_janitor::janitor::MarkerError;
use cloud_janitor::{
    ClusterMarker, CredentialsDocument, CredentialsError, DEFAULT_INSTANCE_NAME_PREFIXES, Janitor,
    JanitorConfig, JanitorError, JanitorSettings, ProcessCommandRunner, ProviderError,
    ProviderRegistry, ReportError, SettingsError, logging,
};

mod cli;

use cli::Cli;

#[derive(Debug, Error)]
enum CliError {
    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("invalid --marker: {0}")]
    Marker(#[from] MarkerError),
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("janitor run failed: {0}")]
    Janitor(#[from] JanitorError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error("failed to write report: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            err.print().ok();
            process::exit(code);
        }
    };

    logging::init_logging();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(event = "janitor.run.failed", error = %err);
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32, CliError> {
    let document = CredentialsDocument::load(&Utf8PathBuf::from(cli.config_file))?;
    let creator = document.creator()?;
    let accounts = document.accounts()?;

    let settings = JanitorSettings::load_without_cli_args()?;
    settings.validate()?;

    let marker = cli
        .marker
        .as_deref()
        .map_or(Ok(ClusterMarker::DEFAULT), str::parse::<ClusterMarker>)?;
    let prefixes = if cli.instance_name_prefixes.is_empty() {
        DEFAULT_INSTANCE_NAME_PREFIXES
            .iter()
            .map(|prefix| (*prefix).to_owned())
            .collect()
    } else {
        cli.instance_name_prefixes
    };
    let config = JanitorConfig::new(
        creator,
        prefixes,
        TimeDelta::minutes(i64::from(cli.volume_lag)),
        TimeDelta::minutes(i64::from(cli.instance_lag)),
    )?
    .with_marker(marker)
    .with_cluster_id_tag(settings.cluster_id_tag.clone())
    .with_dry_run(cli.dry_run);

    let registry = ProviderRegistry::build(&accounts, &settings, &ProcessCommandRunner)?;
    let janitor = Janitor::new(config, registry, &settings);
    let outcome = janitor.sweep(Utc::now()).await?;

    let report = outcome.report()?;
    writeln!(io::stdout(), "{report}")?;
    Ok(outcome.exit_signal().code())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
