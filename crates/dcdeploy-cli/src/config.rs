use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dcdeploy_api::{ApiConfig, origin};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Project-level config file, looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = "dcdeploy.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Origins {
    pub data_connect: Option<String>,
    pub cloud_sql: Option<String>,
    pub cloud_billing: Option<String>,
    pub service_usage: Option<String>,
    pub resource_manager: Option<String>,
}

/// Defaults read from `dcdeploy.json` or the user config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub project: Option<String>,
    pub access_token: Option<String>,
    #[serde(default)]
    pub origins: Origins,
    pub operation_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Field-wise merge; values in `self` win.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            project: self.project.or(fallback.project),
            access_token: self.access_token.or(fallback.access_token),
            origins: Origins {
                data_connect: self.origins.data_connect.or(fallback.origins.data_connect),
                cloud_sql: self.origins.cloud_sql.or(fallback.origins.cloud_sql),
                cloud_billing: self.origins.cloud_billing.or(fallback.origins.cloud_billing),
                service_usage: self.origins.service_usage.or(fallback.origins.service_usage),
                resource_manager: self
                    .origins
                    .resource_manager
                    .or(fallback.origins.resource_manager),
            },
            operation_timeout_secs: self
                .operation_timeout_secs
                .or(fallback.operation_timeout_secs),
        }
    }

    /// A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$CONFIG_DIR/dcdeploy/config.json`, when the platform has a config dir.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dcdeploy").join("config.json"))
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub project: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project: String,
    pub api: ApiConfig,
}

fn override_origin(
    target: &mut Url,
    name: &'static str,
    value: Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = value {
        *target = origin(&value).map_err(|source| ConfigError::InvalidOrigin {
            name,
            value,
            source,
        })?;
    }
    Ok(())
}

/// Resolve settings: flags and environment, then the project's
/// `dcdeploy.json`, then the user config file.
///
/// # Errors
///
/// Returns an error when a config file is unreadable, an origin does not
/// parse, or no project or access token is configured anywhere.
pub fn resolve(
    overrides: Overrides,
    root: &Path,
    user_config: Option<&Path>,
) -> Result<Settings, ConfigError> {
    let mut file = ConfigFile::load(&root.join(PROJECT_CONFIG_FILE))?;
    if let Some(path) = user_config {
        file = file.or(ConfigFile::load(path)?);
    }
    tracing::debug!(root = %root.display(), ?user_config, "resolved config files");

    let project = overrides
        .project
        .or(file.project)
        .filter(|project| !project.trim().is_empty())
        .ok_or(ConfigError::MissingProject)?;
    let access_token = overrides
        .access_token
        .or(file.access_token)
        .filter(|token| !token.trim().is_empty())
        .ok_or(ConfigError::MissingAccessToken)?;

    let mut api = ApiConfig::new(access_token).map_err(|source| ConfigError::InvalidOrigin {
        name: "default",
        value: String::new(),
        source,
    })?;
    let origins = file.origins;
    override_origin(&mut api.data_connect_origin, "Data Connect", origins.data_connect)?;
    override_origin(&mut api.cloud_sql_origin, "Cloud SQL", origins.cloud_sql)?;
    override_origin(&mut api.cloud_billing_origin, "Cloud Billing", origins.cloud_billing)?;
    override_origin(&mut api.service_usage_origin, "Service Usage", origins.service_usage)?;
    override_origin(
        &mut api.resource_manager_origin,
        "Resource Manager",
        origins.resource_manager,
    )?;
    if let Some(secs) = file.operation_timeout_secs {
        api.operation_timeout = Duration::from_secs(secs);
    }

    Ok(Settings { project, api })
}
