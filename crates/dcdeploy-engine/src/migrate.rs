use dcdeploy_domain::{
    DeployStats, GraphqlError, IncompatibleSqlSchema, MigratedSchema, ResourceFilter, Schema,
    SchemaDiff, SchemaMigration, SchemaValidation, ServiceName, ViolationType, WarningLevel,
    Workaround, connector_id_of,
};

use crate::error::{ApiError, MigrationError, SchemaRejection};
use crate::filter::filter_to_string;
use crate::policy;
use crate::remote::{ApiResult, DeployContext};

/// Result of migrating one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Diffs that were executed against the database, possibly none.
    Migrated(Vec<SchemaDiff>),
    /// The Cloud SQL instance is still being created; the migration runs server-side later.
    SkippedPendingCreate,
}

struct Target {
    instance_id: String,
    database_id: String,
}

fn target(schema: &Schema) -> Result<Target, MigrationError> {
    match (schema.instance_id(), schema.database_id()) {
        (Some(instance_id), Some(database_id)) => Ok(Target {
            instance_id: instance_id.to_string(),
            database_id: database_id.to_string(),
        }),
        _ => Err(MigrationError::MissingDatasource {
            schema: schema.name.clone(),
        }),
    }
}

/// Split an upsert result into success, an actionable rejection, or an error.
fn classify(result: ApiResult<()>) -> Result<Option<SchemaRejection>, MigrationError> {
    match result {
        Ok(()) => Ok(None),
        Err(ApiError::SchemaRejected(rejection)) if rejection.is_actionable() => {
            Ok(Some(rejection))
        }
        Err(ApiError::SchemaRejected(rejection)) if !rejection.graphql_errors.is_empty() => {
            Err(MigrationError::SchemaErrors {
                errors: rejection.graphql_errors,
            })
        }
        Err(error) => Err(error.into()),
    }
}

fn render_diffs(diffs: &[SchemaDiff]) -> String {
    diffs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn log_changes(incompatible: &IncompatibleSqlSchema, label: &str) {
    let intro = match (incompatible.violation_type, label) {
        (ViolationType::InaccessibleSchema, _) => {
            "Cannot access your database schema. The following SQL statements will set it up"
        }
        (_, "STRICT_AFTER_COMPATIBLE") => {
            "Your database schema has extra objects. The following optional SQL statements will make it match your schema exactly"
        }
        _ => "Your new schema is incompatible with your database schema. The following SQL statements will migrate it",
    };
    tracing::warn!(mode = label, "{intro}:\n{}", render_diffs(&incompatible.diffs));
}

/// Show what the database needs for `schema` without changing anything.
///
/// With no validation mode the strict diff is computed first and the
/// compatible diff is shown alongside it; the strict diffs are returned.
///
/// # Errors
///
/// Returns an error when the schema has no SQL datasource, has GraphQL
/// errors, or the control plane fails.
pub fn diff_schema(
    ctx: &DeployContext<'_>,
    schema: &Schema,
    validation: Option<SchemaValidation>,
) -> Result<Vec<SchemaDiff>, MigrationError> {
    let control_plane = ctx.backends.control_plane;
    let mut schema = schema.clone();
    let mode = validation.unwrap_or(SchemaValidation::Strict);
    schema.set_validation_mode(Some(mode));
    let target = target(&schema)?;
    tracing::info!(schema = %schema.name, mode = mode.as_str(), "diffing schema");

    let Some(rejection) = classify(control_plane.upsert_schema(&schema, true, true))? else {
        tracing::info!(
            instance = %target.instance_id,
            database = %target.database_id,
            "database schema is up to date"
        );
        return Ok(Vec::new());
    };
    if !rejection.invalid_connectors.is_empty() {
        tracing::warn!(
            connectors = ?rejection.invalid_connectors,
            "schema is incompatible with deployed connectors"
        );
    }
    let Some(strict) = rejection.incompatible else {
        return Ok(Vec::new());
    };
    if validation.is_some() {
        log_changes(&strict, mode.as_str());
        return Ok(strict.diffs);
    }

    schema.set_validation_mode(Some(SchemaValidation::Compatible));
    let compatible = classify(control_plane.upsert_schema(&schema, true, true))?
        .and_then(|rejection| rejection.incompatible);
    match compatible {
        Some(compatible) if compatible.diffs != strict.diffs => {
            log_changes(&compatible, SchemaValidation::Compatible.as_str());
            log_changes(&strict, "STRICT_AFTER_COMPATIBLE");
        }
        _ => log_changes(&strict, SchemaValidation::Strict.as_str()),
    }
    Ok(strict.diffs)
}

fn owner_role(database_id: &str) -> String {
    format!("firebaseowner_{database_id}_public")
}

/// Run `diffs` in one session per role: superuser statements first, then the rest as the owner.
fn execute_diffs(
    ctx: &DeployContext<'_>,
    target: &Target,
    diffs: &[SchemaDiff],
) -> Result<(), MigrationError> {
    let cloud_sql = ctx.backends.cloud_sql;
    let execute = |statements: &[String]| {
        cloud_sql
            .execute_sql(ctx.project, &target.instance_id, &target.database_id, statements)
            .map_err(|source| MigrationError::ExecuteSql {
                instance_id: target.instance_id.clone(),
                database_id: target.database_id.clone(),
                source,
            })
    };

    let (superuser, owner): (Vec<&SchemaDiff>, Vec<&SchemaDiff>) =
        diffs.iter().partition(|diff| diff.requires_superuser());
    if !superuser.is_empty() {
        tracing::info!(count = superuser.len(), "executing admin SQL as superuser");
        let statements: Vec<String> = superuser.iter().map(|diff| diff.sql.clone()).collect();
        execute(&statements)?;
    }
    if !owner.is_empty() {
        let mut statements = vec![format!(r#"SET ROLE "{}""#, owner_role(&target.database_id))];
        statements.extend(owner.iter().map(|diff| diff.sql.clone()));
        tracing::info!(count = owner.len(), "executing SQL migration");
        execute(&statements)?;
    }
    Ok(())
}

/// Required migration steps as policy errors: destructive ones need `--force`.
#[must_use]
pub fn diff_errors(target_label: &str, incompatible: &IncompatibleSqlSchema) -> Vec<GraphqlError> {
    incompatible
        .diffs
        .iter()
        .map(|diff| {
            let level = if diff.destructive {
                WarningLevel::RequireForce
            } else {
                WarningLevel::InteractiveAck
            };
            GraphqlError::new(diff.description.clone())
                .with_level(level)
                .with_workaround(Workaround {
                    description: format!("Execute the SQL migration against {target_label}"),
                    reason: if diff.destructive {
                        "This change may delete data.".to_string()
                    } else {
                        "The database schema must match your schema.".to_string()
                    },
                    replace_with: Some(diff.sql.clone()),
                })
        })
        .collect()
}

fn suggested_command(connectors: &[String]) -> String {
    let filters: Vec<_> = connectors
        .iter()
        .filter_map(|name| {
            let service = ServiceName::parse(name).ok()?;
            let connector_id = connector_id_of(name).try_into().ok()?;
            Some(ResourceFilter::connector(service.service_id, connector_id))
        })
        .collect();
    format!(
        "dcdeploy deploy --only {}",
        filter_to_string(&filters).replace(", ", ",")
    )
}

fn should_delete_invalid_connectors(
    ctx: &DeployContext<'_>,
    connectors: &[String],
    validate_only: bool,
) -> Result<bool, MigrationError> {
    if connectors.is_empty() {
        return Ok(false);
    }
    tracing::warn!(
        "Schema is incompatible with the following connectors:\n  - {}",
        connectors.join("\n  - ")
    );
    if validate_only {
        return Ok(false);
    }
    if ctx.flags.force {
        return Ok(true);
    }
    if !ctx.flags.non_interactive
        && ctx.backends.prompter.confirm(
            "Would you like to delete and recreate these connectors? This will cause downtime.",
            false,
        )?
    {
        return Ok(true);
    }
    Err(MigrationError::InvalidConnectors {
        connectors: connectors.join(", "),
        command: suggested_command(connectors),
    })
}

fn delete_connectors(
    ctx: &DeployContext<'_>,
    connectors: &[String],
    stats: &DeployStats,
) -> Result<(), MigrationError> {
    for name in connectors {
        tracing::info!(connector = %name, "deleting incompatible connector");
        ctx.backends.control_plane.delete_connector(name)?;
        stats.connectors_deleted(1);
    }
    Ok(())
}

/// Offer the optional diffs left after a compatible migration.
fn strict_cleanup(
    ctx: &DeployContext<'_>,
    target: &Target,
    incompatible: &IncompatibleSqlSchema,
) -> Result<Vec<SchemaDiff>, MigrationError> {
    log_changes(incompatible, "STRICT_AFTER_COMPATIBLE");
    let execute = if ctx.flags.force {
        true
    } else if ctx.flags.non_interactive {
        false
    } else {
        ctx.backends.prompter.confirm(
            &format!(
                "Would you like to execute these optional changes against {}:{}?",
                target.instance_id, target.database_id
            ),
            false,
        )?
    };
    if !execute {
        tracing::info!("skipping optional SQL changes");
        return Ok(Vec::new());
    }
    execute_diffs(ctx, target, &incompatible.diffs)?;
    Ok(incompatible.diffs.clone())
}

/// Bring the database behind `schema` in line with it and upsert the schema.
///
/// With `validate_only` the schema itself is only validated, never replaced,
/// and incompatible connectors are left alone.
///
/// # Errors
///
/// Returns an error when the warning policy aborts, incompatible connectors
/// cannot be resolved, SQL execution fails, or the control plane fails.
pub fn migrate_schema(
    ctx: &DeployContext<'_>,
    schema: &Schema,
    validation: Option<SchemaValidation>,
    validate_only: bool,
    stats: &DeployStats,
) -> Result<MigrationOutcome, MigrationError> {
    let control_plane = ctx.backends.control_plane;
    let mut schema = schema.clone();
    let mode = validation.unwrap_or(SchemaValidation::Compatible);
    schema.set_validation_mode(Some(mode));
    let target = target(&schema)?;
    tracing::info!(schema = %schema.name, mode = mode.as_str(), validate_only, "migrating schema");

    let instance = ctx
        .backends
        .cloud_sql
        .get_instance(ctx.project, &target.instance_id)?;
    if instance.is_pending_create() {
        if let Some(postgresql) = schema.postgresql_mut() {
            postgresql.schema_validation = Some(SchemaValidation::None);
            postgresql.schema_migration = None;
        }
        control_plane.upsert_schema(&schema, validate_only, true)?;
        if let Some(postgresql) = schema.postgresql_mut() {
            postgresql.schema_validation = None;
            postgresql.schema_migration = Some(SchemaMigration::MigrateCompatible);
        }
        control_plane.upsert_schema(&schema, validate_only, false)?;
        tracing::warn!(
            instance = %target.instance_id,
            "skipping SQL schema migration because Cloud SQL is still being created"
        );
        stats.schema_skipped_pending_create();
        return Ok(MigrationOutcome::SkippedPendingCreate);
    }

    let mut executed = Vec::new();
    if let Some(rejection) = classify(control_plane.upsert_schema(&schema, validate_only, true))? {
        let label = format!("{}:{}", target.instance_id, target.database_id);
        if let Some(incompatible) = &rejection.incompatible {
            log_changes(incompatible, mode.as_str());
            let errors = diff_errors(&label, incompatible);
            stats.record_errors(&errors);
            policy::enforce(&errors, ctx.flags, ctx.backends.prompter).map_err(|source| {
                MigrationError::Policy {
                    schema: schema.name.clone(),
                    source,
                }
            })?;
        }
        let delete =
            should_delete_invalid_connectors(ctx, &rejection.invalid_connectors, validate_only)?;

        if let Some(incompatible) = rejection.incompatible {
            execute_diffs(ctx, &target, &incompatible.diffs)?;
            executed = incompatible.diffs;
        }
        if delete {
            delete_connectors(ctx, &rejection.invalid_connectors, stats)?;
        }
        if !validate_only {
            control_plane.upsert_schema(&schema, validate_only, true)?;
        }
    } else {
        tracing::info!(
            instance = %target.instance_id,
            database = %target.database_id,
            "database schema is up to date"
        );
    }

    if validation.is_none() {
        schema.set_validation_mode(Some(SchemaValidation::Strict));
        let leftover = classify(control_plane.upsert_schema(&schema, validate_only, true))?
            .and_then(|rejection| rejection.incompatible);
        if let Some(leftover) = leftover {
            executed.extend(strict_cleanup(ctx, &target, &leftover)?);
        }
    }

    Ok(MigrationOutcome::Migrated(executed))
}

/// Migrate each schema in turn; migrations never overlap.
///
/// # Errors
///
/// Stops at the first schema that fails.
pub fn migrate_schemas_sequentially(
    ctx: &DeployContext<'_>,
    schemas: &[(&Schema, Option<SchemaValidation>)],
    validate_only: bool,
    stats: &DeployStats,
) -> Result<Vec<MigratedSchema>, MigrationError> {
    let mut migrated = Vec::with_capacity(schemas.len());
    for (schema, validation) in schemas {
        match migrate_schema(ctx, schema, *validation, validate_only, stats)? {
            MigrationOutcome::Migrated(diffs) => {
                stats.schema_migrated();
                migrated.push(MigratedSchema {
                    schema: schema.name.clone(),
                    diffs,
                });
            }
            MigrationOutcome::SkippedPendingCreate => {}
        }
    }
    Ok(migrated)
}
