mod compile;
mod error;
#[cfg(test)]
mod fake;
mod filter;
mod load;
mod migrate;
mod options;
mod pipeline;
mod policy;
mod prompt;
mod provision;
mod reconcile;
mod release;
mod remote;

pub use compile::{SchemaCompiler, TOOLKIT_BINARY, ToolkitCompiler, build_services};
pub use error::{
    ApiError, BuildError, FilterError, LoadError, MigrationError, PipelineError, PolicyError,
    PromptError, ProvisionError, ReconcileError, ReleaseError, ResourceFailure, SchemaRejection,
};
pub use filter::{ensure_filters_match, filter_to_string, parse_resource_filters};
pub use load::{
    CONNECTOR_MANIFEST, ManifestLoader, SERVICE_MANIFEST, ServiceLoader, discover_manifests,
};
pub use migrate::{
    MigrationOutcome, diff_errors, diff_schema, migrate_schema, migrate_schemas_sequentially,
};
pub use options::{DeployFlags, DeployOptions};
pub use pipeline::{
    DeployOutcome, DeployState, deploy, pick_service, plan, prepare, run_deploy, run_sql_diff,
    run_sql_migrate,
};
pub use policy::{Decision, decide, enforce};
pub use prompt::{NonInteractive, Prompter};
pub use provision::{
    ProvisionMode, VECTOR_ROLE, bootstrap_statements, provision_cloud_sql, provision_services,
};
pub use reconcile::{ReconcileOutcome, ServiceDiff, diff_services, reconcile_services};
pub use release::{ReleaseOutcome, console_url, release, wanted_connectors, wanted_schemas};
pub use remote::{
    AI_PLATFORM_API, ApiResult, Backends, CloudSqlAdmin, ControlPlane, DATA_CONNECT_API,
    DeployContext, Platform, SQL_ADMIN_API,
};
