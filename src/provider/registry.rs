//! Builds one provider client per configured account.

use std::sync::Arc;

use tracing::info;

use crate::command::CommandRunner;
use crate::credentials::Account;
use crate::settings::JanitorSettings;

use super::{AwsProvider, CloudProvider, ProviderError, RackspaceProvider, ScalewayProvider};

/// Ordered collection of provider clients for one run.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn CloudProvider>>,
}

impl ProviderRegistry {
    /// Builds a client for every account, preserving account order.
    ///
    /// CLI-backed clients share `runner`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Http`] when an HTTP client cannot be
    /// constructed.
    pub fn build<R>(
        accounts: &[Account],
        settings: &JanitorSettings,
        runner: &R,
    ) -> Result<Self, ProviderError>
    where
        R: CommandRunner + Clone + 'static,
    {
        let mut providers: Vec<Arc<dyn CloudProvider>> = Vec::with_capacity(accounts.len());
        for account in accounts {
            let label = account.label();
            let provider: Arc<dyn CloudProvider> = match account {
                Account::Rackspace { credentials, .. } => Arc::new(RackspaceProvider::new(
                    label,
                    credentials.clone(),
                    settings.provider_timeout(),
                )?),
                Account::Aws { credentials, .. } => Arc::new(AwsProvider::new(
                    label,
                    credentials,
                    settings.aws_bin.clone(),
                    runner.clone(),
                )),
                Account::Scaleway { credentials, .. } => Arc::new(ScalewayProvider::new(
                    label,
                    credentials,
                    settings.scw_bin.clone(),
                    runner.clone(),
                )),
            };
            providers.push(provider);
        }
        info!(
            event = "janitor.registry.built",
            count = providers.len(),
            providers = ?providers.iter().map(|provider| provider.label()).collect::<Vec<_>>()
        );
        Ok(Self { providers })
    }

    /// Wraps an explicit list of clients.
    #[must_use]
    pub const fn from_providers(providers: Vec<Arc<dyn CloudProvider>>) -> Self {
        Self { providers }
    }

    /// Clients in sweep order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn CloudProvider>] {
        &self.providers
    }

    /// Labels of every client, in sweep order.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|provider| provider.label())
            .collect()
    }
}
