use dcdeploy_domain::{DeployStats, RemoteService, Selection, ServiceInfo, ServiceName};
use rayon::prelude::*;

use crate::error::{ApiError, ReconcileError, ResourceFailure};
use crate::prompt;
use crate::remote::{AI_PLATFORM_API, ApiResult, DeployContext};

/// Declared services missing remotely, and remote services nobody declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDiff<'a> {
    pub to_create: Vec<&'a ServiceInfo>,
    pub to_delete: Vec<&'a RemoteService>,
}

/// Created and deleted service names, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: Vec<ServiceName>,
    pub deleted: Vec<ServiceName>,
}

/// Match declared services against remote ones by resource name.
///
/// Deletion candidates are only computed for unfiltered deploys.
#[must_use]
pub fn diff_services<'a>(
    desired: &'a [ServiceInfo],
    remote: &'a [RemoteService],
    selection: &Selection,
) -> ServiceDiff<'a> {
    let to_create = desired
        .iter()
        .filter(|info| selection.selects_service(info.service_id()))
        .filter(|info| !remote.iter().any(|service| service.name == info.service_name))
        .collect();

    let to_delete = if selection.is_filtered() {
        Vec::new()
    } else {
        remote
            .iter()
            .filter(|service| !desired.iter().any(|info| info.service_name == service.name))
            .collect()
    };

    ServiceDiff {
        to_create,
        to_delete,
    }
}

/// Run `action` over `items` in parallel and collect every failure, in input order.
pub(crate) fn fan_out<T, R, F>(items: &[T], resource: R, action: F) -> Vec<ResourceFailure>
where
    T: Sync,
    R: Fn(&T) -> String + Sync,
    F: Fn(&T) -> ApiResult<()> + Sync,
{
    let mut failures = items
        .par_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            action(item).err().map(|error| {
                (
                    index,
                    ResourceFailure {
                        resource: resource(item),
                        error,
                    },
                )
            })
        })
        .collect::<Vec<_>>();
    failures.sort_by_key(|(index, _)| *index);
    failures.into_iter().map(|(_, failure)| failure).collect()
}

fn deletion_prompt(services: &[&RemoteService]) -> String {
    let names = services
        .iter()
        .map(|service| format!(" - {}", service.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The following services exist on {} but are not declared locally:\n{names}\nWould you like to delete them?",
        services
            .first()
            .map_or_else(String::new, |service| service.name.project.clone())
    )
}

/// Bring the remote service set in line with the declared one.
///
/// # Errors
///
/// Returns an error when listing fails, a prompt fails, or any create or
/// delete in the batch fails.
pub fn reconcile_services(
    ctx: &DeployContext<'_>,
    service_infos: &[ServiceInfo],
    selection: &Selection,
    stats: &DeployStats,
) -> Result<ReconcileOutcome, ReconcileError> {
    let backends = ctx.backends;
    if service_infos.iter().any(ServiceInfo::requires_vector) {
        tracing::info!(api = AI_PLATFORM_API, "vector support required, enabling API");
        backends.platform.ensure_api_enabled(ctx.project, AI_PLATFORM_API)?;
    }

    let remote = backends.control_plane.list_services(ctx.project)?;
    let diff = diff_services(service_infos, &remote, selection);

    let failures = fan_out(
        &diff.to_create,
        |info| info.service_name.to_string(),
        |info| {
            tracing::info!(service = %info.service_name, "creating service");
            backends.control_plane.create_service(&info.service_name)?;
            stats.service_created();
            Ok(())
        },
    );
    if !failures.is_empty() {
        return Err(ReconcileError::CreateServices { failures });
    }
    let created = diff
        .to_create
        .iter()
        .map(|info| info.service_name.clone())
        .collect();

    let mut deleted = Vec::new();
    if !diff.to_delete.is_empty() {
        let message = deletion_prompt(&diff.to_delete);
        if prompt::confirm(backends.prompter, ctx.flags, &message, false)? {
            let failures = fan_out(
                &diff.to_delete,
                |service| service.name.to_string(),
                |service| {
                    tracing::info!(service = %service.name, "deleting service");
                    backends.control_plane.delete_service(&service.name)
                },
            );
            let succeeded = diff.to_delete.len() - failures.len();
            stats.services_deleted(succeeded);
            if !failures.is_empty() {
                return Err(ReconcileError::DeleteServices { failures });
            }
            deleted = diff
                .to_delete
                .iter()
                .map(|service| service.name.clone())
                .collect();
        } else {
            tracing::info!(count = diff.to_delete.len(), "keeping undeclared services");
        }
    }

    Ok(ReconcileOutcome { created, deleted })
}

/// Treat "already exists" as success; creates may race with another deployer.
pub(crate) fn tolerate_exists(result: ApiResult<()>) -> ApiResult<()> {
    match result {
        Err(ApiError::AlreadyExists { .. }) => Ok(()),
        other => other,
    }
}
