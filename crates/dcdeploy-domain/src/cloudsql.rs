use std::fmt;

use serde::{Deserialize, Serialize};

const IAM_AUTHENTICATION_FLAG: &str = "cloudsql.iam_authentication";
const ML_INTEGRATION_FLAG: &str = "cloudsql.enable_google_ml_integration";

pub const DEFAULT_DATABASE_VERSION: &str = "POSTGRES_15";
pub const DEFAULT_TIER: &str = "db-f1-micro";
pub const DEFAULT_EDITION: &str = "ENTERPRISE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Runnable,
    PendingCreate,
    PendingDelete,
    Maintenance,
    Suspended,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseFlag {
    pub name: String,
    pub value: String,
}

impl DatabaseFlag {
    fn on(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: "on".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpConfiguration {
    #[serde(default)]
    pub ipv4_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_network: Option<String>,
    #[serde(default)]
    pub enable_private_path_for_google_cloud_services: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition: Option<String>,
    #[serde(default)]
    pub ip_configuration: IpConfiguration,
    #[serde(default)]
    pub database_flags: Vec<DatabaseFlag>,
    #[serde(default)]
    pub enable_google_ml_integration: bool,
}

impl InstanceSettings {
    fn flag_is_on(&self, name: &str) -> bool {
        self.database_flags
            .iter()
            .any(|flag| flag.name == name && flag.value == "on")
    }

    fn set_flag_on(&mut self, name: &str) {
        match self.database_flags.iter_mut().find(|flag| flag.name == name) {
            Some(flag) => flag.value = "on".to_string(),
            None => self.database_flags.push(DatabaseFlag::on(name)),
        }
    }
}

/// Cloud SQL instance as returned by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<InstanceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_email_address: Option<String>,
    #[serde(default)]
    pub settings: InstanceSettings,
}

impl Instance {
    /// A new instance configured the way the control plane needs it.
    #[must_use]
    pub fn new_for_data_connect(instance_id: &str, location: &str, requires_vector: bool) -> Self {
        let mut settings = InstanceSettings {
            tier: Some(DEFAULT_TIER.to_string()),
            edition: Some(DEFAULT_EDITION.to_string()),
            ip_configuration: IpConfiguration {
                ipv4_enabled: true,
                ..IpConfiguration::default()
            },
            database_flags: vec![DatabaseFlag::on(IAM_AUTHENTICATION_FLAG)],
            enable_google_ml_integration: requires_vector,
        };
        if requires_vector {
            settings.set_flag_on(ML_INTEGRATION_FLAG);
        }
        Self {
            name: instance_id.to_string(),
            region: Some(location.to_string()),
            database_version: Some(DEFAULT_DATABASE_VERSION.to_string()),
            state: None,
            connection_name: None,
            service_account_email_address: None,
            settings,
        }
    }

    #[must_use]
    pub fn is_runnable(&self) -> bool {
        self.state == Some(InstanceState::Runnable)
    }

    #[must_use]
    pub fn is_pending_create(&self) -> bool {
        self.state == Some(InstanceState::PendingCreate)
    }

    /// Reasons the instance must be updated before it can back a service. Empty when compatible.
    #[must_use]
    pub fn update_reasons(&self, requires_vector: bool) -> Vec<&'static str> {
        let settings = &self.settings;
        let mut reasons = Vec::new();
        let ip = &settings.ip_configuration;
        if !ip.ipv4_enabled
            && ip.private_network.is_some()
            && !ip.enable_private_path_for_google_cloud_services
        {
            reasons.push("to enable Private Path for Google Cloud Services");
        }
        if requires_vector {
            if !settings.enable_google_ml_integration {
                reasons.push("to enable Google ML integration");
            }
            if !settings.flag_is_on(ML_INTEGRATION_FLAG) {
                reasons.push("to enable Google ML integration database flag");
            }
        }
        if !settings.flag_is_on(IAM_AUTHENTICATION_FLAG) {
            reasons.push("to enable IAM authentication database flag");
        }
        reasons
    }

    /// Copy of this instance with the missing settings turned on; other flags are kept.
    #[must_use]
    pub fn patched_for_data_connect(&self, requires_vector: bool) -> Self {
        let mut patched = self.clone();
        let settings = &mut patched.settings;
        settings.set_flag_on(IAM_AUTHENTICATION_FLAG);
        if requires_vector {
            settings.enable_google_ml_integration = true;
            settings.set_flag_on(ML_INTEGRATION_FLAG);
        }
        if settings.ip_configuration.private_network.is_some() {
            settings
                .ip_configuration
                .enable_private_path_for_google_cloud_services = true;
        }
        patched
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlDatabase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// One SQL statement the migration planner proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub description: String,
    pub sql: String,
    #[serde(default)]
    pub destructive: bool,
}

impl SchemaDiff {
    /// Statements that create extensions or schemas need superuser rights.
    #[must_use]
    pub fn requires_superuser(&self) -> bool {
        self.sql.starts_with("CREATE EXTENSION") || self.sql.starts_with("CREATE SCHEMA")
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.destructive { "Destructive: " } else { "" };
        write!(formatter, "/** {marker}{} */\n{}", self.description, self.sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    IncompatibleSchema,
    InaccessibleSchema,
    #[serde(other)]
    Unknown,
}

/// Decoded `IncompatibleSqlSchemaError` detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompatibleSqlSchema {
    #[serde(default)]
    pub diffs: Vec<SchemaDiff>,
    #[serde(default)]
    pub destructive: bool,
    #[serde(default = "default_violation")]
    pub violation_type: ViolationType,
}

const fn default_violation() -> ViolationType {
    ViolationType::IncompatibleSchema
}
