use std::path::PathBuf;

use dcdeploy_domain::GraphqlError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no project given (pass --project, set DCDEPLOY_PROJECT or add \"project\" to dcdeploy.json)")]
    MissingProject,
    #[error(
        "no access token given (pass --access-token, set DCDEPLOY_ACCESS_TOKEN or add \"accessToken\" to dcdeploy.json)"
    )]
    MissingAccessToken,
    #[error("invalid {name} origin \"{value}\"")]
    InvalidOrigin {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    ArgumentParse(#[from] clap::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Toolkit(#[from] dcdeploy_engine::BuildError),
    #[error(transparent)]
    Api(#[from] dcdeploy_engine::ApiError),
    #[error(transparent)]
    Pipeline(#[from] dcdeploy_engine::PipelineError),
    #[error(transparent)]
    Report(#[from] dcdeploy_report::ReportError),
}

impl CliError {
    /// Compiler or migration errors to show as a table under the message.
    #[must_use]
    pub fn graphql_errors(&self) -> Option<&[GraphqlError]> {
        match self {
            Self::Pipeline(error) => error.graphql_errors(),
            _ => None,
        }
    }
}
