use dcdeploy_domain::{Connector, Instance, RemoteService, Schema, ServiceName, SqlDatabase};

use crate::compile::SchemaCompiler;
use crate::error::ApiError;
use crate::options::DeployFlags;
use crate::prompt::Prompter;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const DATA_CONNECT_API: &str = "firebasedataconnect.googleapis.com";
pub const SQL_ADMIN_API: &str = "sqladmin.googleapis.com";
pub const AI_PLATFORM_API: &str = "aiplatform.googleapis.com";

/// Data Connect control plane. Mutations block until their long-running operation completes.
pub trait ControlPlane: Send + Sync {
    /// Services of the project across all locations.
    fn list_services(&self, project: &str) -> ApiResult<Vec<RemoteService>>;
    fn create_service(&self, name: &ServiceName) -> ApiResult<()>;
    fn delete_service(&self, name: &ServiceName) -> ApiResult<()>;
    /// Create or replace a schema. With `wait == false` the operation is left running.
    fn upsert_schema(&self, schema: &Schema, validate_only: bool, wait: bool) -> ApiResult<()>;
    fn list_connectors(&self, service: &ServiceName) -> ApiResult<Vec<Connector>>;
    fn upsert_connector(&self, connector: &Connector) -> ApiResult<()>;
    fn delete_connector(&self, name: &str) -> ApiResult<()>;
}

/// Cloud SQL admin surface used for provisioning and migrations.
pub trait CloudSqlAdmin: Send + Sync {
    fn get_instance(&self, project: &str, instance_id: &str) -> ApiResult<Instance>;
    /// Start instance creation without waiting for it to become runnable.
    fn create_instance(&self, project: &str, instance: &Instance) -> ApiResult<()>;
    fn update_instance(&self, project: &str, instance: &Instance) -> ApiResult<()>;
    fn get_database(
        &self,
        project: &str,
        instance_id: &str,
        database_id: &str,
    ) -> ApiResult<SqlDatabase>;
    fn create_database(&self, project: &str, instance_id: &str, database_id: &str)
    -> ApiResult<()>;
    /// Run statements in one session, in order.
    fn execute_sql(
        &self,
        project: &str,
        instance_id: &str,
        database_id: &str,
        statements: &[String],
    ) -> ApiResult<()>;
}

/// Project-level platform checks.
pub trait Platform: Send + Sync {
    fn check_billing_enabled(&self, project: &str) -> ApiResult<bool>;
    fn ensure_api_enabled(&self, project: &str, api: &str) -> ApiResult<()>;
    /// Grant `role` to a service account unless it already holds it.
    fn ensure_role_granted(&self, project: &str, service_account: &str, role: &str)
    -> ApiResult<()>;
}

/// Every external collaborator a deploy talks to.
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub control_plane: &'a dyn ControlPlane,
    pub cloud_sql: &'a dyn CloudSqlAdmin,
    pub platform: &'a dyn Platform,
    pub compiler: &'a dyn SchemaCompiler,
    pub prompter: &'a dyn Prompter,
}

/// Immutable environment shared by every stage of one invocation.
#[derive(Clone, Copy)]
pub struct DeployContext<'a> {
    pub project: &'a str,
    pub flags: DeployFlags,
    pub backends: Backends<'a>,
}
