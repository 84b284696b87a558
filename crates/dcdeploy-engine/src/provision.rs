use dcdeploy_domain::{Instance, PlanAction, PlannedChange, Selection, ServiceInfo};
use rayon::prelude::*;

use crate::error::{ApiError, ProvisionError};
use crate::reconcile::tolerate_exists;
use crate::remote::DeployContext;

pub const VECTOR_ROLE: &str = "roles/aiplatform.user";
const UUID_EXTENSION: &str = "uuid-ossp";
const ML_EXTENSION: &str = "google_ml_integration";

/// Whether provisioning reports what it would do or does it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionMode {
    Plan,
    Apply,
}

impl ProvisionMode {
    const fn applies(self) -> bool {
        matches!(self, Self::Apply)
    }
}

fn change(resource: String, action: PlanAction, summary: String) -> PlannedChange {
    PlannedChange {
        resource,
        action,
        summary,
        destructive: false,
        hint: None,
        content_hash: None,
    }
}

fn api_error(action: &'static str, resource: &str) -> impl FnOnce(ApiError) -> ProvisionError {
    let resource = resource.to_string();
    move |source| ProvisionError::Api {
        action,
        resource,
        source,
    }
}

/// Idempotent statements that prepare a fresh database.
#[must_use]
pub fn bootstrap_statements(required_extensions: &[String], requires_vector: bool) -> Vec<String> {
    let mut extensions = vec![UUID_EXTENSION.to_string()];
    for extension in required_extensions {
        if !extensions.contains(extension) {
            extensions.push(extension.clone());
        }
    }
    if requires_vector && !extensions.iter().any(|extension| extension == ML_EXTENSION) {
        extensions.push(ML_EXTENSION.to_string());
    }

    let mut statements = vec![r#"CREATE SCHEMA IF NOT EXISTS "public""#.to_string()];
    statements.extend(
        extensions
            .iter()
            .map(|extension| format!(r#"CREATE EXTENSION IF NOT EXISTS "{extension}""#)),
    );
    statements
}

struct InstanceOutcome {
    instance: Option<Instance>,
    creating: bool,
}

fn upsert_instance(
    ctx: &DeployContext<'_>,
    info: &ServiceInfo,
    instance_id: &str,
    mode: ProvisionMode,
    changes: &mut Vec<PlannedChange>,
) -> Result<InstanceOutcome, ProvisionError> {
    let cloud_sql = ctx.backends.cloud_sql;
    let resource = format!("projects/{}/instances/{instance_id}", ctx.project);
    let requires_vector = info.requires_vector();

    match cloud_sql.get_instance(ctx.project, instance_id) {
        Ok(existing) => {
            let reasons = existing.update_reasons(requires_vector);
            if reasons.is_empty() {
                tracing::debug!(instance = instance_id, "found compatible Cloud SQL instance");
                changes.push(change(
                    resource,
                    PlanAction::InstanceNoop,
                    "compatible with Data Connect".to_string(),
                ));
                return Ok(InstanceOutcome {
                    instance: Some(existing),
                    creating: false,
                });
            }

            let summary = format!("update settings: {}", reasons.join(", "));
            if mode.applies() {
                tracing::info!(instance = instance_id, %summary, "updating Cloud SQL instance");
                let patched = existing.patched_for_data_connect(requires_vector);
                cloud_sql
                    .update_instance(ctx.project, &patched)
                    .map_err(api_error("update", &resource))?;
                changes.push(change(resource, PlanAction::InstanceUpdate, summary));
                return Ok(InstanceOutcome {
                    instance: Some(patched),
                    creating: false,
                });
            }
            changes.push(change(resource, PlanAction::InstanceUpdate, summary));
            Ok(InstanceOutcome {
                instance: Some(existing),
                creating: false,
            })
        }
        Err(error) if error.is_not_found() => {
            let instance = Instance::new_for_data_connect(
                instance_id,
                &info.service_name.location,
                requires_vector,
            );
            if mode.applies() {
                tracing::info!(instance = instance_id, "creating Cloud SQL instance");
                tolerate_exists(cloud_sql.create_instance(ctx.project, &instance))
                    .map_err(api_error("create", &resource))?;
                tracing::warn!(
                    instance = instance_id,
                    "Cloud SQL instance is being created; data is kept in a temporary database until it is ready"
                );
            }
            changes.push(change(
                resource,
                PlanAction::InstanceCreate,
                format!(
                    "create {} {} instance in {}",
                    instance.database_version.as_deref().unwrap_or_default(),
                    instance.settings.tier.as_deref().unwrap_or_default(),
                    info.service_name.location
                ),
            ));
            Ok(InstanceOutcome {
                instance: None,
                creating: true,
            })
        }
        Err(source) => Err(ProvisionError::Api {
            action: "look up",
            resource,
            source,
        }),
    }
}

/// Returns whether the database was created by this call.
fn upsert_database(
    ctx: &DeployContext<'_>,
    instance_id: &str,
    database_id: &str,
    mode: ProvisionMode,
    changes: &mut Vec<PlannedChange>,
) -> Result<bool, ProvisionError> {
    let cloud_sql = ctx.backends.cloud_sql;
    let resource = format!(
        "projects/{}/instances/{instance_id}/databases/{database_id}",
        ctx.project
    );

    match cloud_sql.get_database(ctx.project, instance_id, database_id) {
        Ok(_) => {
            changes.push(change(resource, PlanAction::DatabaseNoop, "exists".to_string()));
            Ok(false)
        }
        Err(error) if error.is_not_found() => {
            if mode.applies() {
                tracing::info!(instance = instance_id, database = database_id, "creating database");
                tolerate_exists(cloud_sql.create_database(ctx.project, instance_id, database_id))
                    .map_err(api_error("create", &resource))?;
            }
            changes.push(change(
                resource,
                PlanAction::DatabaseCreate,
                "create database".to_string(),
            ));
            Ok(mode.applies())
        }
        Err(error) => {
            tracing::debug!(%error, "unexpected error from Cloud SQL");
            tracing::warn!(database = database_id, "Postgres database is not accessible");
            changes.push(change(resource, PlanAction::DatabaseInaccessible, error.to_string()));
            Ok(false)
        }
    }
}

fn grant_vector_role(
    ctx: &DeployContext<'_>,
    instance_id: &str,
    known: Option<Instance>,
) -> Result<(), ProvisionError> {
    let instance = match known {
        Some(instance) => instance,
        None => ctx
            .backends
            .cloud_sql
            .get_instance(ctx.project, instance_id)
            .map_err(api_error("look up", instance_id))?,
    };
    let Some(service_account) = instance.service_account_email_address.as_deref() else {
        tracing::warn!(
            instance = instance_id,
            "Cloud SQL instance has no service account yet; grant {VECTOR_ROLE} manually"
        );
        return Ok(());
    };
    tracing::info!(service_account, role = VECTOR_ROLE, "granting role");
    ctx.backends
        .platform
        .ensure_role_granted(ctx.project, service_account, VECTOR_ROLE)
        .map_err(api_error("grant role to", service_account))
}

/// Make sure the Cloud SQL instance and database behind one service exist and
/// are compatible. In [`ProvisionMode::Plan`] nothing is mutated.
///
/// # Errors
///
/// Returns an error when a lookup or mutation fails. Databases that cannot be
/// read are reported as inaccessible instead.
pub fn provision_cloud_sql(
    ctx: &DeployContext<'_>,
    info: &ServiceInfo,
    mode: ProvisionMode,
) -> Result<Vec<PlannedChange>, ProvisionError> {
    let Some((instance_id, database_id)) = info.cloud_sql_target() else {
        return Ok(Vec::new());
    };
    let mut changes = Vec::new();

    let outcome = upsert_instance(ctx, info, instance_id, mode, &mut changes)?;
    if outcome.creating {
        // The database can only be created once the instance is runnable.
        changes.push(change(
            format!(
                "projects/{}/instances/{instance_id}/databases/{database_id}",
                ctx.project
            ),
            PlanAction::DatabaseCreate,
            "create database once the instance is ready".to_string(),
        ));
    } else {
        let created = upsert_database(ctx, instance_id, database_id, mode, &mut changes)?;
        let runnable = outcome.instance.as_ref().is_some_and(Instance::is_runnable);
        if created && runnable {
            let required = info
                .deployment_metadata
                .as_ref()
                .map(|metadata| metadata.required_extensions().to_vec())
                .unwrap_or_default();
            let statements = bootstrap_statements(&required, info.requires_vector());
            tracing::info!(
                instance = instance_id,
                database = database_id,
                "bootstrapping database"
            );
            ctx.backends
                .cloud_sql
                .execute_sql(ctx.project, instance_id, database_id, &statements)
                .map_err(api_error("bootstrap", database_id))?;
        }
    }

    if info.requires_vector() && mode.applies() {
        grant_vector_role(ctx, instance_id, outcome.instance)?;
    }

    Ok(changes)
}

/// [`provision_cloud_sql`] for every service whose schema is selected, in parallel.
///
/// # Errors
///
/// Returns the first failure in service order.
pub fn provision_services(
    ctx: &DeployContext<'_>,
    service_infos: &[ServiceInfo],
    selection: &Selection,
    mode: ProvisionMode,
) -> Result<Vec<PlannedChange>, ProvisionError> {
    let selected: Vec<&ServiceInfo> = service_infos
        .iter()
        .filter(|info| selection.selects_schema(info.service_id()))
        .collect();

    let mut results = selected
        .par_iter()
        .enumerate()
        .map(|(index, info)| (index, provision_cloud_sql(ctx, info, mode)))
        .collect::<Vec<_>>();
    results.sort_by_key(|(index, _)| *index);

    let mut changes = Vec::new();
    for (_index, result) in results {
        changes.extend(result?);
    }
    Ok(changes)
}
