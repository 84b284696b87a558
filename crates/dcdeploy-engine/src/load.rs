use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use dcdeploy_domain::{
    CloudSqlRef, Connector, ConnectorInfo, ConnectorYaml, DataConnectYaml, Datasource,
    GraphqlSource, PostgresDatasource, Schema, ServiceInfo, ServiceName, SourceFile,
};
use serde_json::from_str;
use walkdir::{DirEntry, WalkDir};

use crate::error::LoadError;

pub const SERVICE_MANIFEST: &str = "dataconnect.json";
pub const CONNECTOR_MANIFEST: &str = "connector.json";

/// Produces the declared services of a project.
pub trait ServiceLoader {
    /// Load every declared service.
    ///
    /// # Errors
    ///
    /// Returns an error when declarations are missing or malformed.
    fn load(&self, project: &str) -> Result<Vec<ServiceInfo>, LoadError>;
}

/// Loads services from `dataconnect.json` manifests found under a project root.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    root: PathBuf,
}

impl ManifestLoader {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ServiceLoader for ManifestLoader {
    fn load(&self, project: &str) -> Result<Vec<ServiceInfo>, LoadError> {
        let manifests = discover_manifests(&self.root)?;
        if manifests.is_empty() {
            return Err(LoadError::NoServices {
                root: self.root.clone(),
            });
        }

        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut services = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let service = load_service(project, &manifest)?;
            let service_id = service.service_id().to_string();
            if let Some(first) = seen.get(&service_id) {
                return Err(LoadError::DuplicateService {
                    service_id,
                    first: first.clone(),
                    second: manifest,
                });
            }
            seen.insert(service_id, manifest);
            services.push(service);
        }
        Ok(services)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.') || name == "node_modules")
}

/// Recursively discover service manifests under a root directory, sorted.
///
/// # Errors
///
/// Returns an error if `root` is invalid, directory walking fails, or a manifest
/// path cannot be canonicalized.
pub fn discover_manifests(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    if !root.exists() {
        return Err(LoadError::RootDoesNotExist {
            root: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(LoadError::RootIsNotDirectory {
            root: root.to_path_buf(),
        });
    }

    let mut manifests = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| !is_skipped_dir(e)) {
        let entry = entry.map_err(|source| LoadError::Walk { source })?;
        if !entry.file_type().is_file() || entry.file_name() != SERVICE_MANIFEST {
            continue;
        }
        let canonical =
            fs::canonicalize(entry.path()).map_err(|source| LoadError::CanonicalizePath {
                path: entry.path().to_path_buf(),
                source,
            })?;
        manifests.push(canonical);
    }

    manifests.sort();
    Ok(manifests)
}

fn read_to_string(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let raw = read_to_string(path)?;
    from_str(&raw).map_err(|source| LoadError::ParseManifest {
        path: path.to_path_buf(),
        source,
    })
}

/// All `*.gql` files under `directory`, with paths relative to it.
fn read_gql_sources(directory: &Path) -> Result<GraphqlSource, LoadError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(directory) {
        let entry = entry.map_err(|source| LoadError::Walk { source })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "gql")
        {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(directory)
            .unwrap_or(&path)
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(SourceFile {
            path: relative,
            content: read_to_string(&path)?,
        });
    }
    Ok(GraphqlSource { files })
}

fn load_service(project: &str, manifest: &Path) -> Result<ServiceInfo, LoadError> {
    let yaml: DataConnectYaml = read_json(manifest)?;
    let directory = manifest.parent().unwrap_or(manifest).to_path_buf();
    let Some(postgresql) = yaml.schema.datasource.postgresql.as_ref() else {
        return Err(LoadError::MissingDatasource {
            path: manifest.to_path_buf(),
        });
    };
    if postgresql.database.trim().is_empty() || postgresql.cloud_sql.instance_id.trim().is_empty()
    {
        return Err(LoadError::MissingDatasource {
            path: manifest.to_path_buf(),
        });
    }

    let service_name = ServiceName::new(
        project.to_string(),
        yaml.location.clone(),
        yaml.service_id.clone(),
    );
    let schema = Schema {
        name: service_name.main_schema_name(),
        source: read_gql_sources(&directory.join(&yaml.schema.source))?,
        datasources: vec![Datasource {
            postgresql: Some(PostgresDatasource {
                database: Some(postgresql.database.clone()),
                cloud_sql: Some(CloudSqlRef {
                    instance: service_name.instance_name(&postgresql.cloud_sql.instance_id),
                }),
                ..PostgresDatasource::default()
            }),
        }],
        reconciling: None,
    };

    let mut connector_info = Vec::with_capacity(yaml.connector_dirs.len());
    for connector_dir in &yaml.connector_dirs {
        let connector_directory = directory.join(connector_dir);
        let connector_yaml: ConnectorYaml =
            read_json(&connector_directory.join(CONNECTOR_MANIFEST))?;
        let connector = Connector {
            name: service_name.connector_name(&connector_yaml.connector_id),
            source: read_gql_sources(&connector_directory)?,
        };
        connector_info.push(ConnectorInfo {
            directory: connector_directory,
            connector,
            connector_yaml,
        });
    }

    Ok(ServiceInfo {
        service_name,
        source_directory: directory,
        schema,
        connector_info,
        data_connect_yaml: yaml,
        deployment_metadata: None,
    })
}
