//! Cloud credentials document loading.
//!
//! The credentials document is the YAML file passed with `--config-file`. It
//! carries one primary section per provider, an optional `extra-aws` list of
//! account overlays, and the `metadata.creator` used to scope instance
//! cleanup to one operator. Every section deserialises with all fields
//! optional; required fields are checked when the section is resolved so
//! errors can name the section and field that are missing.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;

/// Default Keystone v2.0 endpoint for Rackspace API-key authentication.
pub const DEFAULT_RACKSPACE_AUTH_URL: &str = "https://identity.api.rackspacecloud.com/v2.0/tokens";

/// Zone used for Scaleway listings when the section does not set one.
pub const DEFAULT_SCALEWAY_ZONE: &str = "all";

/// Errors raised while loading or resolving the credentials document.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialsError {
    /// Raised when the document does not exist.
    #[error("credentials file does not exist: '{path}'")]
    MissingFile {
        /// Path passed by the caller.
        path: Utf8PathBuf,
    },
    /// Raised when the document cannot be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path that could not be read.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the document is not valid YAML or has the wrong shape.
    #[error("unable to parse YAML from {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Parser error message.
        message: String,
    },
    /// Raised when a required credential field is absent or blank.
    #[error("missing {section}.{field} in credentials document")]
    MissingField {
        /// Section containing the field (for example `aws`).
        section: String,
        /// Name of the missing field.
        field: String,
    },
    /// Raised when overlays are given without the section they extend.
    #[error("{overlay} requires a base [{base}] section")]
    OrphanOverlay {
        /// Overlay list name.
        overlay: String,
        /// Base section name.
        base: String,
    },
    /// Raised when the document configures no provider at all.
    #[error("credentials document configures no cloud provider")]
    NoProviders,
}

/// Parsed credentials document.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct CredentialsDocument {
    /// Operator metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Rackspace account.
    pub rackspace: Option<RackspaceSection>,
    /// Primary AWS account.
    pub aws: Option<AwsSection>,
    /// Extra AWS accounts, each overlaid on the primary `aws` section.
    #[serde(default)]
    pub extra_aws: Vec<AwsSection>,
    /// Scaleway project.
    pub scaleway: Option<ScalewaySection>,
}

/// Operator metadata from the credentials document.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Metadata {
    /// Identifier appended to instance name prefixes.
    pub creator: Option<String>,
}

/// Raw `rackspace` section.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct RackspaceSection {
    /// Account user name.
    pub username: Option<String>,
    /// API key.
    pub key: Option<String>,
    /// Region code (for example `dfw`).
    pub region: Option<String>,
    /// Identity endpoint override.
    pub auth_url: Option<String>,
}

/// Raw `aws` section or `extra-aws` overlay.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct AwsSection {
    /// Access key id.
    pub access_key: Option<String>,
    /// Secret access key.
    pub secret_access_token: Option<String>,
    /// Region (for example `us-west-2`).
    pub region: Option<String>,
}

/// Raw `scaleway` section.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct ScalewaySection {
    /// API secret key.
    pub secret_key: Option<String>,
    /// API access key.
    pub access_key: Option<String>,
    /// Project identifier used to scope listings.
    pub project_id: Option<String>,
    /// Zone filter passed to `scw`.
    pub zone: Option<String>,
}

/// Resolved Rackspace credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RackspaceCredentials {
    /// Account user name.
    pub username: String,
    /// API key.
    pub key: String,
    /// Region code.
    pub region: String,
    /// Identity endpoint.
    pub auth_url: String,
}

/// Resolved AWS credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCredentials {
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_access_token: String,
    /// Region.
    pub region: String,
}

/// Resolved Scaleway credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScalewayCredentials {
    /// API secret key.
    pub secret_key: String,
    /// API access key.
    pub access_key: Option<String>,
    /// Project identifier.
    pub project_id: String,
    /// Zone filter.
    pub zone: String,
}

/// One account the registry should build a client for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Account {
    /// Rackspace account.
    Rackspace {
        /// Account name used in provider labels.
        name: String,
        /// Resolved credentials.
        credentials: RackspaceCredentials,
    },
    /// AWS account.
    Aws {
        /// Account name used in provider labels.
        name: String,
        /// Resolved credentials.
        credentials: AwsCredentials,
    },
    /// Scaleway project.
    Scaleway {
        /// Account name used in provider labels.
        name: String,
        /// Resolved credentials.
        credentials: ScalewayCredentials,
    },
}

impl Account {
    /// Label identifying the account and region (`<name>@<region>`).
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Rackspace { name, credentials } => format!("{name}@{}", credentials.region),
            Self::Aws { name, credentials } => format!("{name}@{}", credentials.region),
            Self::Scaleway { name, credentials } => format!("{name}@{}", credentials.zone),
        }
    }
}

impl AwsSection {
    /// Returns `self` with every field `overlay` sets replaced.
    #[must_use]
    pub fn overlaid_with(&self, overlay: &Self) -> Self {
        Self {
            access_key: overlay.access_key.clone().or_else(|| self.access_key.clone()),
            secret_access_token: overlay
                .secret_access_token
                .clone()
                .or_else(|| self.secret_access_token.clone()),
            region: overlay.region.clone().or_else(|| self.region.clone()),
        }
    }

    fn resolve(&self, section: &str) -> Result<AwsCredentials, CredentialsError> {
        Ok(AwsCredentials {
            access_key: require(self.access_key.as_deref(), section, "access_key")?,
            secret_access_token: require(
                self.secret_access_token.as_deref(),
                section,
                "secret_access_token",
            )?,
            region: require(self.region.as_deref(), section, "region")?,
        })
    }
}

impl RackspaceSection {
    fn resolve(&self) -> Result<RackspaceCredentials, CredentialsError> {
        let section = "rackspace";
        Ok(RackspaceCredentials {
            username: require(self.username.as_deref(), section, "username")?,
            key: require(self.key.as_deref(), section, "key")?,
            region: require(self.region.as_deref(), section, "region")?,
            auth_url: optional(self.auth_url.as_deref())
                .unwrap_or_else(|| DEFAULT_RACKSPACE_AUTH_URL.to_owned()),
        })
    }
}

impl ScalewaySection {
    fn resolve(&self) -> Result<ScalewayCredentials, CredentialsError> {
        let section = "scaleway";
        Ok(ScalewayCredentials {
            secret_key: require(self.secret_key.as_deref(), section, "secret_key")?,
            access_key: optional(self.access_key.as_deref()),
            project_id: require(self.project_id.as_deref(), section, "project_id")?,
            zone: optional(self.zone.as_deref())
                .unwrap_or_else(|| DEFAULT_SCALEWAY_ZONE.to_owned()),
        })
    }
}

impl CredentialsDocument {
    /// Reads and parses the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::MissingFile`], [`CredentialsError::Io`] or
    /// [`CredentialsError::Parse`] when the file cannot be loaded.
    pub fn load(path: &Utf8Path) -> Result<Self, CredentialsError> {
        let contents = read_document(path)?;
        Self::parse(path, &contents)
    }

    /// Parses document text; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Parse`] when the YAML is invalid.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self, CredentialsError> {
        serde_yaml::from_str::<Option<Self>>(contents)
            .map(Option::unwrap_or_default)
            .map_err(|err| CredentialsError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })
    }

    /// Returns the trimmed creator identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::MissingField`] when `metadata.creator` is
    /// absent or blank.
    pub fn creator(&self) -> Result<String, CredentialsError> {
        require(self.metadata.creator.as_deref(), "metadata", "creator")
    }

    /// Resolves every configured account in sweep order: `rackspace`, `aws`,
    /// each `extra-aws` overlay, then `scaleway`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when a required field is missing, when
    /// `extra-aws` is present without `aws`, or when no provider is
    /// configured.
    pub fn accounts(&self) -> Result<Vec<Account>, CredentialsError> {
        let mut accounts = Vec::new();

        if let Some(section) = &self.rackspace {
            accounts.push(Account::Rackspace {
                name: String::from("rackspace"),
                credentials: section.resolve()?,
            });
        }

        match &self.aws {
            Some(base) => {
                accounts.push(Account::Aws {
                    name: String::from("aws"),
                    credentials: base.resolve("aws")?,
                });
                for (index, overlay) in self.extra_aws.iter().enumerate() {
                    let name = format!("aws-extra-{}", index + 1);
                    let credentials = base.overlaid_with(overlay).resolve(&name)?;
                    accounts.push(Account::Aws { name, credentials });
                }
            }
            None if !self.extra_aws.is_empty() => {
                return Err(CredentialsError::OrphanOverlay {
                    overlay: String::from("extra-aws"),
                    base: String::from("aws"),
                });
            }
            None => {}
        }

        if let Some(section) = &self.scaleway {
            accounts.push(Account::Scaleway {
                name: String::from("scaleway"),
                credentials: section.resolve()?,
            });
        }

        if accounts.is_empty() {
            return Err(CredentialsError::NoProviders);
        }
        Ok(accounts)
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_owned)
}

fn require(value: Option<&str>, section: &str, field: &str) -> Result<String, CredentialsError> {
    optional(value).ok_or_else(|| CredentialsError::MissingField {
        section: section.to_owned(),
        field: field.to_owned(),
    })
}

fn read_document(path: &Utf8Path) -> Result<String, CredentialsError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| CredentialsError::Io {
        path: path.to_path_buf(),
        message: String::from("credentials path is missing a filename"),
    })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            CredentialsError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            CredentialsError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            }
        }
    })?;

    dir.read_to_string(file_name).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            CredentialsError::MissingFile {
                path: path.to_path_buf(),
            }
        } else {
            CredentialsError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    })
}
