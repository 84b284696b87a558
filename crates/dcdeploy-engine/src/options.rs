use std::path::PathBuf;

/// Flags that change how risky steps are gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployFlags {
    pub force: bool,
    pub dry_run: bool,
    pub non_interactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    pub project: String,
    pub root: PathBuf,
    /// Raw `--only` value; `None` deploys everything.
    pub only: Option<String>,
    pub flags: DeployFlags,
}
