use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod cloudsql;
mod filter;
mod graphql;
mod model;
mod names;
mod report;
mod stats;

pub use cloudsql::{
    DEFAULT_DATABASE_VERSION, DEFAULT_EDITION, DEFAULT_TIER, DatabaseFlag, IncompatibleSqlSchema,
    Instance, InstanceSettings, InstanceState, IpConfiguration, SchemaDiff, SqlDatabase,
    ViolationType,
};
pub use filter::{FILTER_PREFIX, FilterScope, ResourceFilter, Selection};
pub use graphql::{
    GraphqlError, GraphqlErrorExtensions, PathSegment, SourceLocation, WarningLevel, Workaround,
};
pub use model::{
    BuildOutput, CloudSqlRef, CloudSqlYaml, Connector, ConnectorInfo, ConnectorYaml,
    DataConnectYaml, Datasource, DatasourceYaml, DeploymentMetadata, GraphqlSource,
    PostgresDatasource, PostgresRequirements, PostgresYaml, PrimaryDataSource, RemoteService,
    Schema, SchemaMigration, SchemaValidation, SchemaYaml, ServiceInfo, SourceFile,
};
pub use names::{MAIN_SCHEMA_ID, ServiceName, connector_id_of, instance_id_of};
pub use report::{
    ConnectorPhase, DeployPlan, DeployReport, DeployedConnector, MigratedSchema, PlanAction,
    PlannedChange, SchemaPlan,
};
pub use stats::{DeployStats, DeployStatsSnapshot, WarningCounts};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainValidationError {
    #[error("service id must not be empty")]
    EmptyServiceId,
    #[error("connector id must not be empty")]
    EmptyConnectorId,
    #[error("identifier \"{value}\" must not contain '/' or ':'")]
    InvalidIdentifier { value: String },
    #[error("malformed resource name \"{name}\" (expected {expected})")]
    MalformedName { name: String, expected: &'static str },
}

fn validate_identifier(value: &str) -> Result<(), DomainValidationError> {
    if value.contains('/') || value.contains(':') {
        return Err(DomainValidationError::InvalidIdentifier {
            value: value.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId(String);

impl ServiceId {
    /// Create a service id, rejecting blank ids and ids containing name separators.
    ///
    /// # Errors
    ///
    /// Returns an error when `id` is empty after trimming or contains `/` or `:`.
    pub fn new(id: String) -> Result<Self, DomainValidationError> {
        if id.trim().is_empty() {
            return Err(DomainValidationError::EmptyServiceId);
        }
        validate_identifier(&id)?;
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceId {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ServiceId {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl Deref for ServiceId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<ServiceId> for String {
    fn from(value: ServiceId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Create a connector id, rejecting blank ids and ids containing name separators.
    ///
    /// # Errors
    ///
    /// Returns an error when `id` is empty after trimming or contains `/` or `:`.
    pub fn new(id: String) -> Result<Self, DomainValidationError> {
        if id.trim().is_empty() {
            return Err(DomainValidationError::EmptyConnectorId);
        }
        validate_identifier(&id)?;
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConnectorId {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ConnectorId {
    type Error = DomainValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value.to_string())
    }
}

impl Deref for ConnectorId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<ConnectorId> for String {
    fn from(value: ConnectorId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{ConnectorId, DomainValidationError, ServiceId};

    #[test]
    fn service_id_rejects_blank_values() {
        let error = ServiceId::try_from("   ").expect_err("blank ids must be rejected");
        assert_eq!(error, DomainValidationError::EmptyServiceId);
    }

    #[test]
    fn connector_id_rejects_separators() {
        let error = ConnectorId::try_from("a/b").expect_err("separators must be rejected");
        assert!(matches!(
            error,
            DomainValidationError::InvalidIdentifier { .. }
        ));
    }

    #[test]
    fn ids_deserialize_through_validation() {
        let id: ServiceId = serde_json::from_str("\"movies\"").expect("valid id");
        assert_eq!(id.as_str(), "movies");
        assert!(serde_json::from_str::<ServiceId>("\"\"").is_err());
    }
}
