#![allow(clippy::expect_used)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dcdeploy_domain::{
    BuildOutput, CloudSqlRef, CloudSqlYaml, Connector, ConnectorId, ConnectorInfo, ConnectorYaml,
    DataConnectYaml, Datasource, DatasourceYaml, DeploymentMetadata, GraphqlError, GraphqlSource,
    IncompatibleSqlSchema, Instance, InstanceState, PostgresDatasource, PostgresRequirements,
    PostgresYaml, PrimaryDataSource, RemoteService, Schema, SchemaDiff, SchemaYaml, ServiceId,
    ServiceInfo, ServiceName, SourceFile, SqlDatabase, ViolationType,
};

use crate::compile::SchemaCompiler;
use crate::error::{ApiError, BuildError, LoadError, PromptError, SchemaRejection};
use crate::load::ServiceLoader;
use crate::options::DeployFlags;
use crate::prompt::Prompter;
use crate::remote::{ApiResult, Backends, CloudSqlAdmin, ControlPlane, DeployContext, Platform};

pub const PROJECT: &str = "demo";
pub const LOCATION: &str = "us-east4";
pub const INSTANCE_ID: &str = "fdc-sql";
pub const DATABASE_ID: &str = "fdcdb";
pub const SERVICE_ACCOUNT: &str = "p123-abc@gcp-sa-cloud-sql.iam.gserviceaccount.com";

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().expect("fake state lock")
}

/// Answers confirmations from a script, falling back to the default.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[bool]) -> Self {
        let prompter = Self::default();
        prompter.script(answers);
        prompter
    }

    pub fn script(&self, answers: &[bool]) {
        lock(&self.answers).extend(answers.iter().copied());
    }

    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        lock(&self.asked).push(message.to_string());
        Ok(lock(&self.answers).pop_front().unwrap_or(default))
    }
}

/// In-memory control plane that records every call in order.
#[derive(Debug, Default)]
pub struct FakeControlPlane {
    services: Mutex<Vec<RemoteService>>,
    connectors: Mutex<BTreeSet<String>>,
    schema_responses: Mutex<VecDeque<ApiResult<()>>>,
    upserted_schemas: Mutex<Vec<(Schema, bool, bool)>>,
    connector_failures: Mutex<HashMap<String, usize>>,
    failing_creates: Mutex<BTreeSet<String>>,
    log: Mutex<Vec<String>>,
}

impl FakeControlPlane {
    pub fn add_remote_service(&self, service_id: &str) {
        lock(&self.services).push(RemoteService {
            name: service_name(service_id),
            uid: None,
            reconciling: None,
        });
    }

    pub fn add_remote_connector(&self, name: &str) {
        lock(&self.connectors).insert(name.to_string());
    }

    /// Responses for the next `upsert_schema` calls; later calls succeed.
    pub fn push_schema_response(&self, response: ApiResult<()>) {
        lock(&self.schema_responses).push_back(response);
    }

    pub fn fail_connector(&self, name: &str, times: usize) {
        lock(&self.connector_failures).insert(name.to_string(), times);
    }

    pub fn fail_create(&self, service_id: &str) {
        lock(&self.failing_creates).insert(service_id.to_string());
    }

    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    /// Log entries starting with `prefix`.
    pub fn calls(&self, prefix: &str) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }

    /// `(schema, validate_only, wait)` for each upsert, in order.
    pub fn upserted_schemas(&self) -> Vec<(Schema, bool, bool)> {
        lock(&self.upserted_schemas).clone()
    }

    pub fn deployed_connectors(&self) -> Vec<String> {
        lock(&self.connectors).iter().cloned().collect()
    }

    pub fn service_ids(&self) -> Vec<String> {
        lock(&self.services)
            .iter()
            .map(|service| service.name.service_id.to_string())
            .collect()
    }

    fn record(&self, entry: String) {
        lock(&self.log).push(entry);
    }
}

impl ControlPlane for FakeControlPlane {
    fn list_services(&self, _project: &str) -> ApiResult<Vec<RemoteService>> {
        self.record("list_services".to_string());
        Ok(lock(&self.services).clone())
    }

    fn create_service(&self, name: &ServiceName) -> ApiResult<()> {
        self.record(format!("create_service {}", name.service_id));
        if lock(&self.failing_creates).contains(name.service_id.as_str()) {
            return Err(ApiError::PermissionDenied {
                message: format!("cannot create {name}"),
            });
        }
        lock(&self.services).push(RemoteService {
            name: name.clone(),
            uid: None,
            reconciling: None,
        });
        Ok(())
    }

    fn delete_service(&self, name: &ServiceName) -> ApiResult<()> {
        self.record(format!("delete_service {}", name.service_id));
        lock(&self.services).retain(|service| &service.name != name);
        Ok(())
    }

    fn upsert_schema(&self, schema: &Schema, validate_only: bool, wait: bool) -> ApiResult<()> {
        let validation = schema
            .postgresql()
            .and_then(|postgresql| postgresql.schema_validation)
            .map_or("UNSET", |mode| mode.as_str());
        self.record(format!(
            "upsert_schema {} validation={validation} validate_only={validate_only}",
            schema.name
        ));
        lock(&self.upserted_schemas).push((schema.clone(), validate_only, wait));
        lock(&self.schema_responses).pop_front().unwrap_or(Ok(()))
    }

    fn list_connectors(&self, service: &ServiceName) -> ApiResult<Vec<Connector>> {
        self.record(format!("list_connectors {}", service.service_id));
        let prefix = format!("{service}/connectors/");
        Ok(lock(&self.connectors)
            .iter()
            .filter(|name| name.starts_with(&prefix))
            .map(|name| Connector {
                name: name.clone(),
                source: GraphqlSource::default(),
            })
            .collect())
    }

    fn upsert_connector(&self, connector: &Connector) -> ApiResult<()> {
        self.record(format!("upsert_connector {}", connector.name));
        let failing = lock(&self.connector_failures)
            .get_mut(&connector.name)
            .filter(|remaining| **remaining > 0)
            .map(|remaining| *remaining -= 1)
            .is_some();
        if failing {
            return Err(ApiError::FailedPrecondition {
                message: format!("{} is incompatible with the deployed schema", connector.name),
            });
        }
        lock(&self.connectors).insert(connector.name.clone());
        Ok(())
    }

    fn delete_connector(&self, name: &str) -> ApiResult<()> {
        self.record(format!("delete_connector {name}"));
        lock(&self.connectors).remove(name);
        Ok(())
    }
}

/// In-memory Cloud SQL admin.
#[derive(Debug, Default)]
pub struct FakeCloudSql {
    instances: Mutex<BTreeMap<String, Instance>>,
    databases: Mutex<BTreeSet<(String, String)>>,
    database_errors: Mutex<HashMap<String, ApiError>>,
    executed: Mutex<Vec<Vec<String>>>,
    log: Mutex<Vec<String>>,
}

impl FakeCloudSql {
    pub fn add_instance(&self, instance: Instance) {
        lock(&self.instances).insert(instance.name.clone(), instance);
    }

    pub fn add_database(&self, instance_id: &str, database_id: &str) {
        lock(&self.databases).insert((instance_id.to_string(), database_id.to_string()));
    }

    pub fn fail_database(&self, database_id: &str, error: ApiError) {
        lock(&self.database_errors).insert(database_id.to_string(), error);
    }

    /// Each `execute_sql` batch, in order.
    pub fn executed(&self) -> Vec<Vec<String>> {
        lock(&self.executed).clone()
    }

    /// Mutating calls only.
    pub fn mutations(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub fn instance(&self, instance_id: &str) -> Option<Instance> {
        lock(&self.instances).get(instance_id).cloned()
    }

    fn record(&self, entry: String) {
        lock(&self.log).push(entry);
    }
}

impl CloudSqlAdmin for FakeCloudSql {
    fn get_instance(&self, _project: &str, instance_id: &str) -> ApiResult<Instance> {
        self.instance(instance_id).ok_or_else(|| ApiError::NotFound {
            message: format!("instance {instance_id}"),
        })
    }

    fn create_instance(&self, _project: &str, instance: &Instance) -> ApiResult<()> {
        self.record(format!("create_instance {}", instance.name));
        let mut created = instance.clone();
        created.state = Some(InstanceState::PendingCreate);
        created.service_account_email_address = Some(SERVICE_ACCOUNT.to_string());
        lock(&self.instances).insert(created.name.clone(), created);
        Ok(())
    }

    fn update_instance(&self, _project: &str, instance: &Instance) -> ApiResult<()> {
        self.record(format!("update_instance {}", instance.name));
        lock(&self.instances).insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    fn get_database(
        &self,
        _project: &str,
        instance_id: &str,
        database_id: &str,
    ) -> ApiResult<SqlDatabase> {
        if let Some(error) = lock(&self.database_errors).get(database_id) {
            return Err(error.clone());
        }
        let key = (instance_id.to_string(), database_id.to_string());
        if lock(&self.databases).contains(&key) {
            Ok(SqlDatabase {
                name: database_id.to_string(),
                instance: Some(instance_id.to_string()),
            })
        } else {
            Err(ApiError::NotFound {
                message: format!("database {instance_id}/{database_id}"),
            })
        }
    }

    fn create_database(
        &self,
        _project: &str,
        instance_id: &str,
        database_id: &str,
    ) -> ApiResult<()> {
        self.record(format!("create_database {instance_id}/{database_id}"));
        self.add_database(instance_id, database_id);
        Ok(())
    }

    fn execute_sql(
        &self,
        _project: &str,
        instance_id: &str,
        database_id: &str,
        statements: &[String],
    ) -> ApiResult<()> {
        self.record(format!("execute_sql {instance_id}/{database_id}"));
        lock(&self.executed).push(statements.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    billing_disabled: AtomicBool,
    enabled_apis: Mutex<Vec<String>>,
    grants: Mutex<Vec<(String, String)>>,
}

impl FakePlatform {
    pub fn disable_billing(&self) {
        self.billing_disabled.store(true, Ordering::Relaxed);
    }

    pub fn enabled_apis(&self) -> Vec<String> {
        lock(&self.enabled_apis).clone()
    }

    /// `(service_account, role)` pairs granted so far.
    pub fn grants(&self) -> Vec<(String, String)> {
        lock(&self.grants).clone()
    }
}

impl Platform for FakePlatform {
    fn check_billing_enabled(&self, _project: &str) -> ApiResult<bool> {
        Ok(!self.billing_disabled.load(Ordering::Relaxed))
    }

    fn ensure_api_enabled(&self, _project: &str, api: &str) -> ApiResult<()> {
        lock(&self.enabled_apis).push(api.to_string());
        Ok(())
    }

    fn ensure_role_granted(
        &self,
        _project: &str,
        service_account: &str,
        role: &str,
    ) -> ApiResult<()> {
        let grant = (service_account.to_string(), role.to_string());
        let mut grants = lock(&self.grants);
        if !grants.contains(&grant) {
            grants.push(grant);
        }
        Ok(())
    }
}

/// Returns canned build output keyed by the service directory name.
#[derive(Debug, Default)]
pub struct FakeCompiler {
    outputs: Mutex<HashMap<String, BuildOutput>>,
}

impl FakeCompiler {
    pub fn set_output(
        &self,
        service_id: &str,
        metadata: Option<DeploymentMetadata>,
        errors: Vec<GraphqlError>,
    ) {
        lock(&self.outputs).insert(service_id.to_string(), BuildOutput { metadata, errors });
    }
}

impl SchemaCompiler for FakeCompiler {
    fn build(&self, source_directory: &Path) -> Result<BuildOutput, BuildError> {
        let key = source_directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(lock(&self.outputs).get(&key).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct FakeWorld {
    pub control_plane: FakeControlPlane,
    pub cloud_sql: FakeCloudSql,
    pub platform: FakePlatform,
    pub compiler: FakeCompiler,
    pub prompter: ScriptedPrompter,
}

impl FakeWorld {
    pub fn backends(&self) -> Backends<'_> {
        Backends {
            control_plane: &self.control_plane,
            cloud_sql: &self.cloud_sql,
            platform: &self.platform,
            compiler: &self.compiler,
            prompter: &self.prompter,
        }
    }

    pub fn context(&self, flags: DeployFlags) -> DeployContext<'_> {
        DeployContext {
            project: PROJECT,
            flags,
            backends: self.backends(),
        }
    }

    /// A runnable instance with its database, ready for migrations.
    pub fn with_ready_database(self) -> Self {
        self.cloud_sql.add_instance(runnable_instance(INSTANCE_ID));
        self.cloud_sql.add_database(INSTANCE_ID, DATABASE_ID);
        self
    }
}

/// Hands out a fixed set of services, as if read from disk.
#[derive(Debug, Default)]
pub struct StaticLoader {
    pub services: Vec<ServiceInfo>,
    pub loads: AtomicUsize,
}

impl StaticLoader {
    pub fn new(services: Vec<ServiceInfo>) -> Self {
        Self {
            services,
            loads: AtomicUsize::new(0),
        }
    }
}

impl ServiceLoader for StaticLoader {
    fn load(&self, _project: &str) -> Result<Vec<ServiceInfo>, LoadError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self.services.clone())
    }
}

pub fn service_name(service_id: &str) -> ServiceName {
    ServiceName::new(
        PROJECT.to_string(),
        LOCATION.to_string(),
        ServiceId::try_from(service_id).expect("service id"),
    )
}

pub fn sample_service(service_id: &str, connector_ids: &[&str]) -> ServiceInfo {
    let service_name = service_name(service_id);
    let schema = Schema {
        name: service_name.main_schema_name(),
        source: GraphqlSource {
            files: vec![SourceFile {
                path: "schema.gql".to_string(),
                content: format!(
                    "type Item @table {{ service: String! @default(value: \"{service_id}\") }}"
                ),
            }],
        },
        datasources: vec![Datasource {
            postgresql: Some(PostgresDatasource {
                database: Some(DATABASE_ID.to_string()),
                cloud_sql: Some(CloudSqlRef {
                    instance: service_name.instance_name(INSTANCE_ID),
                }),
                ..PostgresDatasource::default()
            }),
        }],
        reconciling: None,
    };

    let connector_info = connector_ids
        .iter()
        .map(|connector_id| {
            let connector_id = ConnectorId::try_from(*connector_id).expect("connector id");
            ConnectorInfo {
                directory: PathBuf::from("/workspace")
                    .join(service_id)
                    .join(connector_id.as_str()),
                connector: Connector {
                    name: service_name.connector_name(&connector_id),
                    source: GraphqlSource {
                        files: vec![SourceFile {
                            path: "queries.gql".to_string(),
                            content: format!("query {connector_id}List {{ items {{ service }} }}"),
                        }],
                    },
                },
                connector_yaml: ConnectorYaml {
                    connector_id,
                    generate: None,
                },
            }
        })
        .collect();

    ServiceInfo {
        source_directory: PathBuf::from("/workspace").join(service_id),
        schema,
        connector_info,
        data_connect_yaml: DataConnectYaml {
            service_id: service_name.service_id.clone(),
            location: LOCATION.to_string(),
            schema: SchemaYaml {
                source: "schema".to_string(),
                datasource: DatasourceYaml {
                    postgresql: Some(PostgresYaml {
                        database: DATABASE_ID.to_string(),
                        cloud_sql: CloudSqlYaml {
                            instance_id: INSTANCE_ID.to_string(),
                        },
                        schema_validation: None,
                    }),
                },
            },
            connector_dirs: connector_ids.iter().map(ToString::to_string).collect(),
        },
        service_name,
        deployment_metadata: None,
    }
}

pub fn vector_metadata() -> DeploymentMetadata {
    DeploymentMetadata {
        primary_data_source: Some(PrimaryDataSource {
            postgres: Some(PostgresRequirements {
                required_extensions: vec!["vector".to_string()],
            }),
        }),
    }
}

pub fn runnable_instance(instance_id: &str) -> Instance {
    let mut instance = Instance::new_for_data_connect(instance_id, LOCATION, false);
    instance.state = Some(InstanceState::Runnable);
    instance.service_account_email_address = Some(SERVICE_ACCOUNT.to_string());
    instance
}

pub fn diff(description: &str, sql: &str, destructive: bool) -> SchemaDiff {
    SchemaDiff {
        description: description.to_string(),
        sql: sql.to_string(),
        destructive,
    }
}

/// A schema upsert rejected because the database needs the given diffs.
pub fn incompatible(diffs: Vec<SchemaDiff>) -> ApiError {
    let destructive = diffs.iter().any(|diff| diff.destructive);
    ApiError::SchemaRejected(SchemaRejection {
        message: "schema is incompatible with the database".to_string(),
        incompatible: Some(IncompatibleSqlSchema {
            diffs,
            destructive,
            violation_type: ViolationType::IncompatibleSchema,
        }),
        ..SchemaRejection::default()
    })
}

/// A schema upsert rejected because deployed connectors would break.
pub fn invalid_connectors(names: &[&str]) -> ApiError {
    ApiError::SchemaRejected(SchemaRejection {
        message: "connectors are incompatible with the new schema".to_string(),
        invalid_connectors: names.iter().map(ToString::to_string).collect(),
        ..SchemaRejection::default()
    })
}
