use std::path::Path;

use dcdeploy_domain::{
    DeployPlan, DeployReport, DeployStats, GraphqlError, MigratedSchema, PlanAction,
    PlannedChange, SchemaPlan, Selection, ServiceInfo, SourceFile,
};
use sha2::{Digest, Sha256};

use crate::compile::build_services;
use crate::error::{ApiError, LoadError, MigrationError, PipelineError};
use crate::filter::{ensure_filters_match, parse_resource_filters};
use crate::load::ServiceLoader;
use crate::migrate::{MigrationOutcome, diff_schema, migrate_schema};
use crate::options::DeployOptions;
use crate::provision::{ProvisionMode, provision_services};
use crate::reconcile::{diff_services, reconcile_services};
use crate::release::{console_url, release, wanted_connectors};
use crate::remote::{Backends, DATA_CONNECT_API, DeployContext, SQL_ADMIN_API};

/// Loaded, built and validated services, ready to be planned or deployed.
#[derive(Debug)]
pub struct DeployState {
    pub service_infos: Vec<ServiceInfo>,
    pub selection: Selection,
    pub stats: DeployStats,
    pub warnings: Vec<GraphqlError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Planned(DeployPlan),
    Deployed(DeployReport),
}

fn context<'a>(options: &'a DeployOptions, backends: Backends<'a>) -> DeployContext<'a> {
    DeployContext {
        project: options.project.as_str(),
        flags: options.flags,
        backends,
    }
}

fn ensure_apis(ctx: &DeployContext<'_>) -> Result<(), ApiError> {
    for api in [DATA_CONNECT_API, SQL_ADMIN_API] {
        ctx.backends.platform.ensure_api_enabled(ctx.project, api)?;
    }
    Ok(())
}

/// Resolve filters, load and build every declared service.
///
/// Configuration problems surface before the first remote call.
///
/// # Errors
///
/// Returns an error for malformed or unmatched filters, unreadable manifests,
/// disabled billing, compile failures and policy aborts.
pub fn prepare(
    ctx: &DeployContext<'_>,
    only: Option<&str>,
    loader: &dyn ServiceLoader,
) -> Result<DeployState, PipelineError> {
    let selection = parse_resource_filters(only)?;
    let mut service_infos = loader.load(ctx.project)?;
    ensure_filters_match(&selection, &service_infos)?;
    tracing::info!(
        project = ctx.project,
        services = service_infos.len(),
        filtered = selection.is_filtered(),
        "loaded services"
    );

    let stats = DeployStats::new(ctx.flags.force, ctx.flags.dry_run);
    if !ctx.backends.platform.check_billing_enabled(ctx.project)? {
        stats.mark_missing_billing();
        return Err(PipelineError::BillingDisabled {
            project: ctx.project.to_string(),
            stats: Box::new(stats.snapshot()),
        });
    }
    ensure_apis(ctx)?;

    let warnings = build_services(ctx, &mut service_infos, &stats)?;
    Ok(DeployState {
        service_infos,
        selection,
        stats,
        warnings,
    })
}

fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn connector_hash(files: &[SourceFile]) -> String {
    let mut buffer = Vec::new();
    for file in files {
        buffer.extend_from_slice(file.path.as_bytes());
        buffer.push(0);
        buffer.extend_from_slice(file.content.as_bytes());
        buffer.push(0);
    }
    sha256_bytes(&buffer)
}

fn planned(resource: String, action: PlanAction, summary: &str) -> PlannedChange {
    PlannedChange {
        resource,
        action,
        summary: summary.to_string(),
        destructive: false,
        hint: None,
        content_hash: None,
    }
}

fn plan_schemas(
    ctx: &DeployContext<'_>,
    state: &DeployState,
    existing: &[&ServiceInfo],
    changes: &mut Vec<PlannedChange>,
) -> Result<Vec<SchemaPlan>, MigrationError> {
    let mut schemas = Vec::new();
    for info in state
        .service_infos
        .iter()
        .filter(|info| state.selection.selects_schema(info.service_id()))
    {
        if !existing.iter().any(|known| known.service_name == info.service_name) {
            changes.push(planned(
                info.schema.name.clone(),
                PlanAction::SchemaMigrate,
                "deploy schema with the new service",
            ));
            schemas.push(SchemaPlan {
                schema: info.schema.name.clone(),
                diffs: Vec::new(),
            });
            continue;
        }
        let diffs = match diff_schema(ctx, &info.schema, info.declared_validation()) {
            Ok(diffs) => diffs,
            Err(MigrationError::Api(ApiError::NotFound { .. })) => Vec::new(),
            Err(error) => return Err(error),
        };

        let mut change = if diffs.is_empty() {
            planned(info.schema.name.clone(), PlanAction::SchemaNoop, "schema is up to date")
        } else {
            planned(
                info.schema.name.clone(),
                PlanAction::SchemaMigrate,
                &format!("{} SQL change(s) required", diffs.len()),
            )
        };
        change.destructive = diffs.iter().any(|diff| diff.destructive);
        if change.destructive {
            change.hint = Some("rerun with --force to apply destructive changes".to_string());
        }
        changes.push(change);
        schemas.push(SchemaPlan {
            schema: info.schema.name.clone(),
            diffs,
        });
    }
    Ok(schemas)
}

/// Work out what a deploy would change without changing anything.
///
/// # Errors
///
/// Returns an error when a remote lookup fails.
pub fn plan(ctx: &DeployContext<'_>, state: &DeployState) -> Result<DeployPlan, PipelineError> {
    let remote = ctx.backends.control_plane.list_services(ctx.project)?;
    let diff = diff_services(&state.service_infos, &remote, &state.selection);

    let mut changes: Vec<PlannedChange> = diff
        .to_create
        .iter()
        .map(|info| {
            planned(
                info.service_name.to_string(),
                PlanAction::ServiceCreate,
                "create service",
            )
        })
        .collect();
    changes.extend(diff.to_delete.iter().map(|service| PlannedChange {
        destructive: true,
        hint: Some("deletion asks for confirmation".to_string()),
        ..planned(
            service.name.to_string(),
            PlanAction::ServiceDelete,
            "delete undeclared service",
        )
    }));

    changes.extend(provision_services(
        ctx,
        &state.service_infos,
        &state.selection,
        ProvisionMode::Plan,
    )?);

    let existing: Vec<&ServiceInfo> = state
        .service_infos
        .iter()
        .filter(|info| remote.iter().any(|service| service.name == info.service_name))
        .collect();
    let schemas = plan_schemas(ctx, state, &existing, &mut changes)?;

    changes.extend(
        wanted_connectors(&state.service_infos, &state.selection)
            .into_iter()
            .map(|connector| PlannedChange {
                content_hash: Some(connector_hash(&connector.source.files)),
                ..planned(
                    connector.name.clone(),
                    PlanAction::ConnectorDeploy,
                    "deploy connector",
                )
            }),
    );

    Ok(DeployPlan {
        project: ctx.project.to_string(),
        services: state
            .service_infos
            .iter()
            .map(|info| info.service_id().clone())
            .collect(),
        selection: state.selection.clone(),
        changes,
        schemas,
        warnings: state.warnings.clone(),
        stats: state.stats.snapshot(),
    })
}

/// Reconcile services, provision Cloud SQL, then release schemas and connectors.
///
/// # Errors
///
/// Returns the first stage failure.
pub fn deploy(ctx: &DeployContext<'_>, state: DeployState) -> Result<DeployReport, PipelineError> {
    let reconciled =
        reconcile_services(ctx, &state.service_infos, &state.selection, &state.stats)?;
    provision_services(
        ctx,
        &state.service_infos,
        &state.selection,
        ProvisionMode::Apply,
    )?;
    let released = release(ctx, &state.service_infos, &state.selection, &state.stats)?;

    let console_url = console_url(ctx.project, &state.service_infos, &state.selection);
    tracing::info!(project = ctx.project, url = %console_url, "deploy complete");
    Ok(DeployReport {
        project: ctx.project.to_string(),
        services_created: reconciled.created.iter().map(ToString::to_string).collect(),
        services_deleted: reconciled.deleted.iter().map(ToString::to_string).collect(),
        schemas_migrated: released.schemas_migrated,
        connectors: released.connectors,
        connectors_deleted: released.connectors_deleted,
        warnings: state.warnings,
        console_url,
        stats: state.stats.snapshot(),
    })
}

/// Run the whole deploy, or only plan it when `--dry-run` is set.
///
/// # Errors
///
/// Returns the first failing stage.
pub fn run_deploy(
    options: &DeployOptions,
    loader: &dyn ServiceLoader,
    backends: Backends<'_>,
) -> Result<DeployOutcome, PipelineError> {
    let ctx = context(options, backends);
    let state = prepare(&ctx, options.only.as_deref(), loader)?;
    if ctx.flags.dry_run {
        tracing::info!("dry run, nothing will be changed");
        return Ok(DeployOutcome::Planned(plan(&ctx, &state)?));
    }
    Ok(DeployOutcome::Deployed(deploy(&ctx, state)?))
}

/// Choose the service a `sql` command works on.
///
/// # Errors
///
/// Fails when nothing is declared, the named service is unknown, or several
/// services exist and none was named.
pub fn pick_service<'a>(
    service_infos: &'a [ServiceInfo],
    service_id: Option<&str>,
    root: &Path,
) -> Result<&'a ServiceInfo, PipelineError> {
    let found = || {
        service_infos
            .iter()
            .map(|info| info.service_id().as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    match (service_id, service_infos) {
        (_, []) => Err(LoadError::NoServices {
            root: root.to_path_buf(),
        }
        .into()),
        (None, [only]) => Ok(only),
        (None, _) => Err(PipelineError::AmbiguousService { found: found() }),
        (Some(wanted), infos) => infos
            .iter()
            .find(|info| info.service_id().as_str() == wanted)
            .ok_or_else(|| PipelineError::UnknownService {
                service_id: wanted.to_string(),
                found: found(),
            }),
    }
}

fn load_one(
    ctx: &DeployContext<'_>,
    options: &DeployOptions,
    service_id: Option<&str>,
    loader: &dyn ServiceLoader,
) -> Result<ServiceInfo, PipelineError> {
    let service_infos = loader.load(ctx.project)?;
    let info = pick_service(&service_infos, service_id, &options.root)?.clone();
    ensure_apis(ctx)?;
    Ok(info)
}

/// SQL changes the service's schema would need, applying nothing.
///
/// # Errors
///
/// Returns an error when the service cannot be picked or the diff fails.
pub fn run_sql_diff(
    options: &DeployOptions,
    service_id: Option<&str>,
    loader: &dyn ServiceLoader,
    backends: Backends<'_>,
) -> Result<SchemaPlan, PipelineError> {
    let ctx = context(options, backends);
    let info = load_one(&ctx, options, service_id, loader)?;
    let diffs = diff_schema(&ctx, &info.schema, info.declared_validation())?;
    Ok(SchemaPlan {
        schema: info.schema.name,
        diffs,
    })
}

/// Bring the database in line with the service's schema without replacing
/// the deployed schema itself.
///
/// # Errors
///
/// Returns an error when the service cannot be picked or the migration fails.
pub fn run_sql_migrate(
    options: &DeployOptions,
    service_id: Option<&str>,
    loader: &dyn ServiceLoader,
    backends: Backends<'_>,
) -> Result<MigratedSchema, PipelineError> {
    let ctx = context(options, backends);
    let info = load_one(&ctx, options, service_id, loader)?;
    let stats = DeployStats::new(ctx.flags.force, ctx.flags.dry_run);
    let validation = info.declared_validation();
    let diffs = match migrate_schema(&ctx, &info.schema, validation, true, &stats)? {
        MigrationOutcome::Migrated(diffs) => diffs,
        MigrationOutcome::SkippedPendingCreate => Vec::new(),
    };
    Ok(MigratedSchema {
        schema: info.schema.name,
        diffs,
    })
}
