use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use dcdeploy_domain::{BuildOutput, DeployStats, GraphqlError, ServiceInfo};

use crate::error::BuildError;
use crate::policy;
use crate::remote::DeployContext;

pub const TOOLKIT_BINARY: &str = "dataconnect-toolkit";

/// External schema compiler.
pub trait SchemaCompiler: Send + Sync {
    /// Compile the sources of one service directory.
    ///
    /// # Errors
    ///
    /// Returns an error when the compiler cannot run or its output is unreadable.
    /// Schema problems are reported inside [`BuildOutput::errors`], not as `Err`.
    fn build(&self, source_directory: &Path) -> Result<BuildOutput, BuildError>;
}

/// Runs `<toolkit> build --config_dir <dir>` and decodes its JSON stdout.
#[derive(Debug, Clone)]
pub struct ToolkitCompiler {
    binary: PathBuf,
}

impl ToolkitCompiler {
    #[must_use]
    pub const fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Use `explicit` when given, otherwise find the toolkit on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ToolkitNotFound`] when neither resolves.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, BuildError> {
        if let Some(path) = explicit {
            return Ok(Self::new(path.to_path_buf()));
        }
        which::which(TOOLKIT_BINARY)
            .map(Self::new)
            .map_err(|_| BuildError::ToolkitNotFound)
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl SchemaCompiler for ToolkitCompiler {
    fn build(&self, source_directory: &Path) -> Result<BuildOutput, BuildError> {
        tracing::debug!(directory = %source_directory.display(), "building service sources");
        let output = Command::new(&self.binary)
            .arg("build")
            .arg("--config_dir")
            .arg(source_directory)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BuildError::CommandSpawn {
                program: self.binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            if output.status.success() {
                return Ok(BuildOutput::default());
            }
            return Err(BuildError::CommandFailed {
                program: self.binary.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // Validation failures exit non-zero but still print the error list.
        serde_json::from_str(&stdout).map_err(|source| {
            if output.status.success() {
                BuildError::DecodeOutput {
                    directory: source_directory.to_path_buf(),
                    source,
                }
            } else {
                BuildError::CommandFailed {
                    program: self.binary.clone(),
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }
            }
        })
    }
}

/// Compile every service in order, record the metadata on each and gate the
/// reported errors through the warning policy.
///
/// Returns the warnings that were allowed through.
///
/// # Errors
///
/// Returns an error when a compile fails or the policy aborts.
pub fn build_services(
    ctx: &DeployContext<'_>,
    service_infos: &mut [ServiceInfo],
    stats: &DeployStats,
) -> Result<Vec<GraphqlError>, BuildError> {
    let mut warnings = Vec::new();
    for info in service_infos.iter_mut() {
        let output = ctx.backends.compiler.build(&info.source_directory)?;
        stats.record_errors(&output.errors);
        policy::enforce(&output.errors, ctx.flags, ctx.backends.prompter).map_err(|source| {
            BuildError::Policy {
                service_id: info.service_id().to_string(),
                source,
            }
        })?;
        tracing::info!(
            service = %info.service_name,
            warnings = output.errors.len(),
            "built service"
        );
        info.deployment_metadata = output.metadata;
        warnings.extend(output.errors);
    }
    Ok(warnings)
}
