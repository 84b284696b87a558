use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use dcdeploy_domain::{
    DeployStatsSnapshot, DomainValidationError, GraphqlError, IncompatibleSqlSchema,
};
use thiserror::Error;

/// Structured detail of a rejected schema upsert, decoded once at the HTTP boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRejection {
    pub message: String,
    pub incompatible: Option<IncompatibleSqlSchema>,
    /// Resource names of deployed connectors the new schema would break.
    pub invalid_connectors: Vec<String>,
    pub graphql_errors: Vec<GraphqlError>,
}

impl SchemaRejection {
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.incompatible.is_some() || !self.invalid_connectors.is_empty()
    }
}

impl fmt::Display for SchemaRejection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("already exists: {message}")]
    AlreadyExists { message: String },
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },
    #[error("failed precondition: {message}")]
    FailedPrecondition { message: String },
    #[error("schema rejected: {0}")]
    SchemaRejected(SchemaRejection),
    #[error("operation {operation} did not complete within {waited_secs}s")]
    OperationTimeout { operation: String, waited_secs: u64 },
    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
}

impl ApiError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read confirmation from the terminal: {message}")]
    Terminal { message: String },
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid --only filter \"{segment}\" (expected dataconnect:<service>[:<connector>|:schema])")]
    InvalidFilter { segment: String },
    #[error("invalid --only filter \"{segment}\"")]
    InvalidIdentifier {
        segment: String,
        #[source]
        source: DomainValidationError,
    },
    #[error("the following filters were specified in --only but didn't match anything in this project: {filters}")]
    Unmatched { filters: String },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("project root does not exist: {root}")]
    RootDoesNotExist { root: PathBuf },
    #[error("project root must be a directory: {root}")]
    RootIsNotDirectory { root: PathBuf },
    #[error("failed while walking project directory")]
    Walk {
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to canonicalize path: {path}")]
    CanonicalizePath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}")]
    ParseManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no Data Connect services found under {root} (expected dataconnect.json manifests)")]
    NoServices { root: PathBuf },
    #[error("service \"{service_id}\" is declared twice: {first} and {second}")]
    DuplicateService {
        service_id: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("{path}: schema must declare a postgresql datasource with a database and a Cloud SQL instance")]
    MissingDatasource { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{reason}")]
    Aborted {
        reason: String,
        errors: Vec<GraphqlError>,
    },
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dataconnect-toolkit not found (set DATACONNECT_TOOLKIT_PATH or add it to PATH)")]
    ToolkitNotFound,
    #[error("failed to execute {program}")]
    CommandSpawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("failed to decode build output for {directory}")]
    DecodeOutput {
        directory: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("build of service \"{service_id}\" failed")]
    Policy {
        service_id: String,
        #[source]
        source: PolicyError,
    },
}

/// One failed remote mutation within a fan-out batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    pub resource: String,
    pub error: ApiError,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.resource, self.error)
    }
}

pub(crate) fn describe_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n  - ")
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("failed to create {} service(s):\n  - {}", .failures.len(), describe_failures(.failures))]
    CreateServices { failures: Vec<ResourceFailure> },
    #[error("failed to delete {} service(s):\n  - {}", .failures.len(), describe_failures(.failures))]
    DeleteServices { failures: Vec<ResourceFailure> },
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to {action} {resource}")]
    Api {
        action: &'static str,
        resource: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("schema {schema} has no postgresql datasource with a database and a Cloud SQL instance")]
    MissingDatasource { schema: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("there are errors in your schema files")]
    SchemaErrors { errors: Vec<GraphqlError> },
    #[error("SQL migration of {schema} aborted")]
    Policy {
        schema: String,
        #[source]
        source: PolicyError,
    },
    #[error("command aborted: the schema is incompatible with connectors {connectors}. Try deploying those connectors first with `{command}`")]
    InvalidConnectors { connectors: String, command: String },
    #[error("failed to execute SQL against {instance_id}:{database_id}")]
    ExecuteSql {
        instance_id: String,
        database_id: String,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("failed to deploy {} connector(s) after the schema migration:\n  - {}", .failures.len(), describe_failures(.failures))]
    Connectors { failures: Vec<ResourceFailure> },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error(
        "Cloud billing is not enabled for project {project}. Upgrade to the Blaze plan: https://console.firebase.google.com/project/{project}/usage/details"
    )]
    BillingDisabled {
        project: String,
        /// Counters at the time of the abort, with the missing-billing flag set.
        stats: Box<DeployStatsSnapshot>,
    },
    #[error("no service named \"{service_id}\" is declared. Found: {found}")]
    UnknownService { service_id: String, found: String },
    #[error("multiple services are declared; specify a service id from: {found}")]
    AmbiguousService { found: String },
}

impl PolicyError {
    #[must_use]
    pub fn graphql_errors(&self) -> Option<&[GraphqlError]> {
        match self {
            Self::Aborted { errors, .. } if !errors.is_empty() => Some(errors),
            Self::Aborted { .. } | Self::Prompt(_) => None,
        }
    }
}

impl MigrationError {
    #[must_use]
    pub fn graphql_errors(&self) -> Option<&[GraphqlError]> {
        match self {
            Self::SchemaErrors { errors } => Some(errors),
            Self::Policy { source, .. } => source.graphql_errors(),
            _ => None,
        }
    }
}

impl PipelineError {
    /// The error batch to render as a table, when this failure carries one.
    #[must_use]
    pub fn graphql_errors(&self) -> Option<&[GraphqlError]> {
        match self {
            Self::Build(BuildError::Policy { source, .. }) => source.graphql_errors(),
            Self::Migration(error) | Self::Release(ReleaseError::Migration(error)) => {
                error.graphql_errors()
            }
            _ => None,
        }
    }
}
