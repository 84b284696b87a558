use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use serde_json::json;

static BUILD_DCDEPLOY: OnceLock<Result<(), String>> = OnceLock::new();

/// Variables the binary reads; cleared so the caller's shell cannot leak in.
const INHERITED_VARS: [&str; 8] = [
    "DCDEPLOY_PROJECT",
    "DCDEPLOY_ROOT",
    "DCDEPLOY_ACCESS_TOKEN",
    "DCDEPLOY_LOG",
    "DATACONNECT_TOOLKIT_PATH",
    "RUST_LOG",
    "XDG_CONFIG_HOME",
    "HOME",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command_line: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    #[must_use]
    pub fn transcript(&self) -> String {
        format!(
            "$ {}\n[exit: {}]\n[stdout]\n{}[stderr]\n{}",
            self.command_line, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Run `dcdeploy` as an external process from `root`.
///
/// The user config directory points inside `root`, the toolkit at a path
/// that does not exist and `NO_PAGER=1` is set, so runs never touch the
/// caller's environment. `env_overrides` are applied last.
///
/// # Errors
///
/// Returns an error if building or running the `dcdeploy` binary fails.
pub fn run_dcdeploy(
    root: &Path,
    args: &[&str],
    env_overrides: &[(&str, &str)],
) -> Result<RunResult, String> {
    ensure_dcdeploy_built()?;
    let bin = dcdeploy_bin()?;

    let mut command = Command::new(bin);
    for name in INHERITED_VARS {
        command.env_remove(name);
    }
    command.current_dir(root);
    command.env("NO_PAGER", "1");
    command.env("HOME", root.join(".home"));
    command.env("XDG_CONFIG_HOME", root.join(".home").join(".config"));
    command.env("DATACONNECT_TOOLKIT_PATH", root.join(".toolkit-missing"));
    for (name, value) in env_overrides {
        command.env(name, value);
    }
    command.args(args);

    let mut command_parts = vec!["dcdeploy".to_string()];
    command_parts.extend(args.iter().map(|arg| (*arg).to_string()));

    let output = command
        .output()
        .map_err(|error| format!("failed to run dcdeploy: {error}"))?;

    Ok(RunResult {
        command_line: command_parts.join(" "),
        exit_code: output.status.code().unwrap_or(1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Write a text file, creating parent directories if needed.
///
/// # Errors
///
/// Returns an error if directories or file contents cannot be written.
pub fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Lay out a service under `directory`: `dataconnect.json`, a one-table
/// schema and one connector directory per id.
///
/// # Errors
///
/// Returns an error if any fixture file cannot be written.
pub fn write_service(
    directory: &Path,
    service_id: &str,
    connector_ids: &[&str],
) -> std::io::Result<()> {
    let connector_dirs: Vec<String> = connector_ids
        .iter()
        .map(|id| format!("./{id}"))
        .collect();
    let manifest = json!({
        "serviceId": service_id,
        "location": "us-central1",
        "schema": {
            "source": "./schema",
            "datasource": {
                "postgresql": {
                    "database": format!("{service_id}-db"),
                    "cloudSql": { "instanceId": format!("{service_id}-fdc") }
                }
            }
        },
        "connectorDirs": connector_dirs,
    });
    write_file(
        &directory.join("dataconnect.json"),
        &format!("{manifest:#}\n"),
    )?;
    write_file(
        &directory.join("schema").join("schema.gql"),
        "type Movie @table {\n  title: String!\n}\n",
    )?;
    for id in connector_ids {
        let connector = directory.join(id);
        write_file(
            &connector.join("connector.json"),
            &format!("{:#}\n", json!({ "connectorId": id })),
        )?;
        write_file(
            &connector.join("queries.gql"),
            "query ListMovies @auth(level: PUBLIC) {\n  movies { title }\n}\n",
        )?;
    }
    Ok(())
}

fn ensure_dcdeploy_built() -> Result<(), String> {
    match BUILD_DCDEPLOY.get_or_init(|| {
        let status = Command::new("cargo")
            .arg("build")
            .arg("-q")
            .arg("-p")
            .arg("dcdeploy")
            .status()
            .map_err(|error| format!("failed to build dcdeploy binary: {error}"))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!(
                "failed to build dcdeploy binary: cargo exited with status {status}"
            ))
        }
    }) {
        Ok(()) => Ok(()),
        Err(error) => Err(error.clone()),
    }
}

fn dcdeploy_bin() -> Result<PathBuf, String> {
    let mut path = std::env::current_exe()
        .map_err(|error| format!("failed to determine current executable: {error}"))?;
    if !path.pop() {
        return Err("failed to resolve test executable directory".to_string());
    }
    if path.ends_with("deps") {
        let _ = path.pop();
    }
    Ok(path.join(format!("dcdeploy{}", std::env::consts::EXE_SUFFIX)))
}
