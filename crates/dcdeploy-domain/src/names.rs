use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ConnectorId, DomainValidationError, ServiceId};

/// Schema id of the primary (SQL-backed) schema of every service.
pub const MAIN_SCHEMA_ID: &str = "main";

const SERVICE_NAME_SHAPE: &str = "projects/{project}/locations/{location}/services/{service}";

/// Fully-qualified service resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName {
    pub project: String,
    pub location: String,
    pub service_id: ServiceId,
}

impl ServiceName {
    #[must_use]
    pub const fn new(project: String, location: String, service_id: ServiceId) -> Self {
        Self {
            project,
            location,
            service_id,
        }
    }

    /// Parse `projects/{p}/locations/{l}/services/{s}`. Trailing child segments
    /// (`/schemas/..`, `/connectors/..`) are accepted and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error when the name does not have the service shape.
    pub fn parse(name: &str) -> Result<Self, DomainValidationError> {
        let malformed = || DomainValidationError::MalformedName {
            name: name.to_string(),
            expected: SERVICE_NAME_SHAPE,
        };
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() < 6
            || parts[0] != "projects"
            || parts[2] != "locations"
            || parts[4] != "services"
            || parts[1].is_empty()
            || parts[3].is_empty()
        {
            return Err(malformed());
        }
        let service_id = ServiceId::new(parts[5].to_string()).map_err(|_| malformed())?;
        Ok(Self::new(parts[1].to_string(), parts[3].to_string(), service_id))
    }

    #[must_use]
    pub fn schema_name(&self, schema_id: &str) -> String {
        format!("{self}/schemas/{schema_id}")
    }

    #[must_use]
    pub fn main_schema_name(&self) -> String {
        self.schema_name(MAIN_SCHEMA_ID)
    }

    #[must_use]
    pub fn connector_name(&self, connector_id: &ConnectorId) -> String {
        format!("{self}/connectors/{connector_id}")
    }

    #[must_use]
    pub fn instance_name(&self, instance_id: &str) -> String {
        format!(
            "projects/{}/locations/{}/instances/{instance_id}",
            self.project, self.location
        )
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "projects/{}/locations/{}/services/{}",
            self.project, self.location, self.service_id
        )
    }
}

impl TryFrom<String> for ServiceName {
    type Error = DomainValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceName> for String {
    fn from(value: ServiceName) -> Self {
        value.to_string()
    }
}

/// Last segment of a `.../connectors/{id}` resource name.
#[must_use]
pub fn connector_id_of(connector_name: &str) -> &str {
    connector_name
        .rsplit_once("/connectors/")
        .map_or(connector_name, |(_, id)| id)
}

/// Last segment of a Cloud SQL instance resource name.
#[must_use]
pub fn instance_id_of(instance_name: &str) -> &str {
    instance_name
        .rsplit_once('/')
        .map_or(instance_name, |(_, id)| id)
}
