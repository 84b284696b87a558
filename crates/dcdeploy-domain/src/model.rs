use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConnectorId, GraphqlError, MAIN_SCHEMA_ID, ServiceId, ServiceName, instance_id_of};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlSource {
    #[serde(default)]
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaValidation {
    None,
    Compatible,
    Strict,
}

impl SchemaValidation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Compatible => "COMPATIBLE",
            Self::Strict => "STRICT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaMigration {
    MigrateCompatible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSqlRef {
    /// Full instance resource name, `projects/{p}/locations/{l}/instances/{i}`.
    pub instance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatasource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_sql: Option<CloudSqlRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_validation: Option<SchemaValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_migration: Option<SchemaMigration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datasource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<PostgresDatasource>,
}

/// Control-plane schema resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub source: GraphqlSource,
    #[serde(default)]
    pub datasources: Vec<Datasource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciling: Option<bool>,
}

impl Schema {
    #[must_use]
    pub fn postgresql(&self) -> Option<&PostgresDatasource> {
        self.datasources.iter().find_map(|d| d.postgresql.as_ref())
    }

    pub fn postgresql_mut(&mut self) -> Option<&mut PostgresDatasource> {
        self.datasources.iter_mut().find_map(|d| d.postgresql.as_mut())
    }

    /// Set the validation mode on the SQL datasource, if the schema has one.
    pub fn set_validation_mode(&mut self, mode: Option<SchemaValidation>) {
        if let Some(postgresql) = self.postgresql_mut() {
            postgresql.schema_validation = mode;
        }
    }

    #[must_use]
    pub fn database_id(&self) -> Option<&str> {
        self.postgresql()?.database.as_deref()
    }

    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.postgresql()?
            .cloud_sql
            .as_ref()
            .map(|cloud_sql| cloud_sql.instance.as_str())
    }

    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_name().map(instance_id_of)
    }

    #[must_use]
    pub fn is_main(&self) -> bool {
        self.name
            .rsplit_once("/schemas/")
            .is_some_and(|(_, id)| id == MAIN_SCHEMA_ID)
    }
}

/// Control-plane connector resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub name: String,
    #[serde(default)]
    pub source: GraphqlSource,
}

/// Control-plane service resource, as listed remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteService {
    pub name: ServiceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciling: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSqlYaml {
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresYaml {
    pub database: String,
    pub cloud_sql: CloudSqlYaml,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_validation: Option<SchemaValidation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceYaml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<PostgresYaml>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaYaml {
    pub source: String,
    pub datasource: DatasourceYaml,
}

/// Declared service config (`dataconnect.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConnectYaml {
    pub service_id: ServiceId,
    pub location: String,
    pub schema: SchemaYaml,
    #[serde(default)]
    pub connector_dirs: Vec<String>,
}

/// Declared connector config (`connector.json`). SDK generation settings are opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorYaml {
    pub connector_id: ConnectorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub directory: PathBuf,
    pub connector: Connector,
    pub connector_yaml: ConnectorYaml,
}

impl ConnectorInfo {
    #[must_use]
    pub const fn connector_id(&self) -> &ConnectorId {
        &self.connector_yaml.connector_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresRequirements {
    #[serde(default)]
    pub required_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryDataSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresRequirements>,
}

/// Compiler-produced facts about a service, filled in by the build stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_data_source: Option<PrimaryDataSource>,
}

impl DeploymentMetadata {
    #[must_use]
    pub fn required_extensions(&self) -> &[String] {
        self.primary_data_source
            .as_ref()
            .and_then(|source| source.postgres.as_ref())
            .map(|postgres| postgres.required_extensions.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn requires_vector(&self) -> bool {
        self.required_extensions()
            .iter()
            .any(|extension| extension == "vector")
    }
}

/// Output of one compiler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutput {
    #[serde(default)]
    pub metadata: Option<DeploymentMetadata>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// One deployable unit: a service, its schema and its connectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: ServiceName,
    pub source_directory: PathBuf,
    pub schema: Schema,
    pub connector_info: Vec<ConnectorInfo>,
    pub data_connect_yaml: DataConnectYaml,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_metadata: Option<DeploymentMetadata>,
}

impl ServiceInfo {
    #[must_use]
    pub const fn service_id(&self) -> &ServiceId {
        &self.service_name.service_id
    }

    #[must_use]
    pub fn requires_vector(&self) -> bool {
        self.deployment_metadata
            .as_ref()
            .is_some_and(DeploymentMetadata::requires_vector)
    }

    #[must_use]
    pub fn find_connector(&self, connector_id: &ConnectorId) -> Option<&ConnectorInfo> {
        self.connector_info
            .iter()
            .find(|info| info.connector_id() == connector_id)
    }

    /// `(instance_id, database_id)` of the SQL datasource declared for this service.
    #[must_use]
    pub fn cloud_sql_target(&self) -> Option<(&str, &str)> {
        let postgresql = self.data_connect_yaml.schema.datasource.postgresql.as_ref()?;
        Some((
            postgresql.cloud_sql.instance_id.as_str(),
            postgresql.database.as_str(),
        ))
    }

    #[must_use]
    pub fn declared_validation(&self) -> Option<SchemaValidation> {
        self.data_connect_yaml
            .schema
            .datasource
            .postgresql
            .as_ref()
            .and_then(|postgresql| postgresql.schema_validation)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{BuildOutput, DeploymentMetadata, Schema, SchemaValidation};

    #[test]
    fn requires_vector_reads_required_extensions() {
        let metadata: DeploymentMetadata = serde_json::from_str(
            r#"{"primaryDataSource": {"postgres": {"requiredExtensions": ["uuid-ossp", "vector"]}}}"#,
        )
        .expect("decode");
        assert!(metadata.requires_vector());
        assert!(!DeploymentMetadata::default().requires_vector());
    }

    #[test]
    fn build_output_tolerates_missing_fields() {
        let output: BuildOutput = serde_json::from_str("{}").expect("decode");
        assert!(output.metadata.is_none());
        assert!(output.errors.is_empty());
    }

    #[test]
    fn schema_helpers_read_the_sql_datasource() {
        let mut schema: Schema = serde_json::from_str(
            r#"{
                "name": "projects/p/locations/l/services/s/schemas/main",
                "datasources": [{"postgresql": {
                    "database": "fdcdb",
                    "cloudSql": {"instance": "projects/p/locations/l/instances/fdc-sql"}
                }}]
            }"#,
        )
        .expect("decode");
        assert!(schema.is_main());
        assert_eq!(schema.database_id(), Some("fdcdb"));
        assert_eq!(schema.instance_id(), Some("fdc-sql"));

        schema.set_validation_mode(Some(SchemaValidation::Strict));
        let encoded = serde_json::to_value(&schema).expect("encode");
        assert_eq!(
            encoded["datasources"][0]["postgresql"]["schemaValidation"],
            "STRICT"
        );
    }
}
