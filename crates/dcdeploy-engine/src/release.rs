use std::collections::BTreeSet;

use dcdeploy_domain::{
    Connector, ConnectorPhase, DeployStats, DeployedConnector, MigratedSchema, Schema,
    SchemaValidation, Selection, ServiceInfo,
};
use rayon::prelude::*;

use crate::error::ReleaseError;
use crate::migrate::migrate_schemas_sequentially;
use crate::prompt;
use crate::reconcile::fan_out;
use crate::remote::DeployContext;

const CONSOLE_ORIGIN: &str = "https://console.firebase.google.com";

/// Everything the release stage changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub connectors: Vec<DeployedConnector>,
    pub schemas_migrated: Vec<MigratedSchema>,
    pub connectors_deleted: Vec<String>,
}

/// Schemas selected for this deploy, with their declared validation mode.
#[must_use]
pub fn wanted_schemas<'a>(
    service_infos: &'a [ServiceInfo],
    selection: &Selection,
) -> Vec<(&'a Schema, Option<SchemaValidation>)> {
    service_infos
        .iter()
        .filter(|info| selection.selects_schema(info.service_id()))
        .map(|info| (&info.schema, info.declared_validation()))
        .collect()
}

/// Connectors selected for this deploy.
#[must_use]
pub fn wanted_connectors<'a>(
    service_infos: &'a [ServiceInfo],
    selection: &Selection,
) -> Vec<&'a Connector> {
    service_infos
        .iter()
        .flat_map(|info| {
            info.connector_info
                .iter()
                .filter(|connector| {
                    selection.selects_connector(info.service_id(), connector.connector_id())
                })
                .map(|connector| &connector.connector)
        })
        .collect()
}

/// Upsert connectors against the live schema; returns the ones that failed.
fn deploy_before_schema<'a>(
    ctx: &DeployContext<'_>,
    connectors: &[&'a Connector],
    stats: &DeployStats,
    deployed: &mut Vec<DeployedConnector>,
) -> Vec<&'a Connector> {
    let mut results = connectors
        .par_iter()
        .enumerate()
        .map(|(index, connector)| {
            (
                index,
                ctx.backends.control_plane.upsert_connector(connector),
            )
        })
        .collect::<Vec<_>>();
    results.sort_by_key(|(index, _)| *index);

    let mut remaining = Vec::new();
    for (index, result) in results {
        let connector = connectors[index];
        match result {
            Ok(()) => {
                stats.connector_before_schema();
                deployed.push(DeployedConnector {
                    name: connector.name.clone(),
                    phase: ConnectorPhase::BeforeSchema,
                });
            }
            Err(error) => {
                tracing::debug!(
                    connector = %connector.name,
                    %error,
                    "connector deploy deferred until after the schema migration"
                );
                remaining.push(connector);
            }
        }
    }
    remaining
}

fn remove_orphans(
    ctx: &DeployContext<'_>,
    service_infos: &[ServiceInfo],
    wanted: &[&Connector],
    stats: &DeployStats,
) -> Result<Vec<String>, ReleaseError> {
    let mut listed = service_infos
        .par_iter()
        .enumerate()
        .map(|(index, info)| {
            (
                index,
                ctx.backends.control_plane.list_connectors(&info.service_name),
            )
        })
        .collect::<Vec<_>>();
    listed.sort_by_key(|(index, _)| *index);

    let wanted: BTreeSet<&str> = wanted.iter().map(|connector| connector.name.as_str()).collect();
    let mut deleted = Vec::new();
    for (_index, remote) in listed {
        for connector in remote? {
            if wanted.contains(connector.name.as_str()) {
                continue;
            }
            tracing::warn!(
                connector = %connector.name,
                "connector is deployed but not declared in any dataconnect.json"
            );
            let message = format!("Do you want to delete {}?", connector.name);
            if prompt::confirm(ctx.backends.prompter, ctx.flags, &message, false)? {
                tracing::info!(connector = %connector.name, "deleting connector");
                ctx.backends.control_plane.delete_connector(&connector.name)?;
                stats.connectors_deleted(1);
                deleted.push(connector.name);
            }
        }
    }
    Ok(deleted)
}

/// Console link; points at the schema page when exactly one service was targeted.
#[must_use]
pub fn console_url(project: &str, service_infos: &[ServiceInfo], selection: &Selection) -> String {
    let base = format!("{CONSOLE_ORIGIN}/project/{project}/dataconnect");
    let mut targeted = service_infos
        .iter()
        .filter(|info| selection.selects_service(info.service_id()));
    match (targeted.next(), targeted.next()) {
        (Some(info), None) => format!(
            "{base}/locations/{}/services/{}/schema",
            info.service_name.location, info.service_name.service_id
        ),
        _ => base,
    }
}

/// Deploy connectors around the schema migrations.
///
/// Connectors are first upserted against the live schema. Those that fail are
/// retried once every selected schema has been migrated, and only then does a
/// failure abort. Undeclared connectors are offered for deletion on
/// unfiltered deploys.
///
/// # Errors
///
/// Returns an error when a migration fails, a retried connector fails, or
/// orphan cleanup fails.
pub fn release(
    ctx: &DeployContext<'_>,
    service_infos: &[ServiceInfo],
    selection: &Selection,
    stats: &DeployStats,
) -> Result<ReleaseOutcome, ReleaseError> {
    let schemas = wanted_schemas(service_infos, selection);
    let connectors = wanted_connectors(service_infos, selection);
    tracing::info!(
        schemas = schemas.len(),
        connectors = connectors.len(),
        "releasing schemas and connectors"
    );

    let mut deployed = Vec::with_capacity(connectors.len());
    let remaining = deploy_before_schema(ctx, &connectors, stats, &mut deployed);

    let schemas_migrated = migrate_schemas_sequentially(ctx, &schemas, false, stats)?;

    let failures = fan_out(
        &remaining,
        |connector| connector.name.clone(),
        |connector| {
            ctx.backends.control_plane.upsert_connector(connector)?;
            stats.connector_after_schema();
            Ok(())
        },
    );
    if !failures.is_empty() {
        return Err(ReleaseError::Connectors { failures });
    }
    deployed.extend(remaining.iter().map(|connector| DeployedConnector {
        name: connector.name.clone(),
        phase: ConnectorPhase::AfterSchema,
    }));

    let connectors_deleted = if selection.is_filtered() {
        Vec::new()
    } else {
        remove_orphans(ctx, service_infos, &connectors, stats)?
    };

    Ok(ReleaseOutcome {
        connectors: deployed,
        schemas_migrated,
        connectors_deleted,
    })
}
