#![allow(clippy::expect_used)]

use dcdeploy_domain::{
    ConnectorId, ConnectorPhase, DeployPlan, DeployReport, DeployStatsSnapshot,
    DeployedConnector, GraphqlError, MigratedSchema, PlanAction, PlannedChange, ResourceFilter,
    SchemaDiff, SchemaPlan, Selection, ServiceId, WarningLevel, Workaround,
};

use super::{
    ColorChoice, OutputFormat, RenderOptions, render_error_table, render_errors,
    render_migrated, render_plan, render_report, render_schema_plan,
};

const SERVICE: &str = "projects/demo/locations/us-east4/services/movies";
const SCHEMA: &str = "projects/demo/locations/us-east4/services/movies/schemas/main";
const INSTANCE: &str = "projects/demo/instances/movies-fdc";
const CONNECTOR: &str = "projects/demo/locations/us-east4/services/movies/connectors/api";

fn base_options() -> RenderOptions {
    RenderOptions {
        color: ColorChoice::Never,
        verbose: false,
        target: None,
    }
}

fn verbose_options() -> RenderOptions {
    RenderOptions {
        verbose: true,
        ..base_options()
    }
}

fn change(resource: &str, action: PlanAction, summary: &str) -> PlannedChange {
    PlannedChange {
        resource: resource.to_string(),
        action,
        summary: summary.to_string(),
        destructive: false,
        hint: None,
        content_hash: None,
    }
}

fn diff(description: &str, sql: &str, destructive: bool) -> SchemaDiff {
    SchemaDiff {
        description: description.to_string(),
        sql: sql.to_string(),
        destructive,
    }
}

fn plan(changes: Vec<PlannedChange>, schemas: Vec<SchemaPlan>) -> DeployPlan {
    DeployPlan {
        project: "demo".to_string(),
        services: vec![ServiceId::try_from("movies").expect("id")],
        selection: Selection::Everything,
        changes,
        schemas,
        warnings: Vec::new(),
        stats: DeployStatsSnapshot {
            dry_run: true,
            ..DeployStatsSnapshot::default()
        },
    }
}

fn report() -> DeployReport {
    DeployReport {
        project: "demo".to_string(),
        services_created: vec![SERVICE.to_string()],
        services_deleted: Vec::new(),
        schemas_migrated: vec![MigratedSchema {
            schema: SCHEMA.to_string(),
            diffs: vec![diff(
                "add column year",
                "ALTER TABLE \"movie\" ADD COLUMN \"year\" integer",
                false,
            )],
        }],
        connectors: vec![DeployedConnector {
            name: CONNECTOR.to_string(),
            phase: ConnectorPhase::AfterSchema,
        }],
        connectors_deleted: Vec::new(),
        warnings: Vec::new(),
        console_url: "https://console.firebase.google.com/project/demo/dataconnect".to_string(),
        stats: DeployStatsSnapshot::default(),
    }
}

fn workaround(description: &str, reason: &str) -> Workaround {
    Workaround {
        description: description.to_string(),
        reason: reason.to_string(),
        replace_with: None,
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[test]
fn plan_lists_changes_and_collapses_noops() {
    let plan = plan(
        vec![
            change(SERVICE, PlanAction::ServiceCreate, "create service"),
            change(INSTANCE, PlanAction::InstanceNoop, "instance is ready"),
            change(
                "projects/demo/instances/movies-fdc/databases/fdcdb",
                PlanAction::DatabaseNoop,
                "database exists",
            ),
            change(SCHEMA, PlanAction::SchemaMigrate, "1 SQL change(s) required"),
            change(CONNECTOR, PlanAction::ConnectorDeploy, "deploy connector"),
        ],
        Vec::new(),
    );

    let output = render_plan(&plan, OutputFormat::Text, &base_options()).expect("render");

    assert!(output.starts_with("plan demo\n"));
    assert!(output.contains(&format!("  + create service      {SERVICE}")));
    assert!(output.contains(&format!("  ~ migrate schema      {SCHEMA}")));
    assert!(output.contains("    1 SQL change(s) required"));
    assert!(output.contains(&format!("  + deploy connector    {CONNECTOR}")));
    assert!(!output.contains(INSTANCE));
    assert!(output.contains("  2 unchanged (1 instance, 1 database)"));
    assert!(output.ends_with("Plan: 2 to add, 1 to change, 2 unchanged\n"));
}

#[test]
fn verbose_plan_shows_noops_and_content_hashes() {
    let mut connector = change(CONNECTOR, PlanAction::ConnectorDeploy, "deploy connector");
    connector.content_hash = Some("0123456789abcdef0123".to_string());
    let plan = plan(
        vec![
            connector,
            change(INSTANCE, PlanAction::InstanceNoop, "instance is ready"),
        ],
        Vec::new(),
    );

    let output = render_plan(&plan, OutputFormat::Text, &verbose_options()).expect("render");

    assert!(output.contains(&format!("  = instance ready      {INSTANCE}")));
    assert!(output.contains("    content: sha256:0123456789ab\n"));
    assert!(!output.contains("unchanged ("));
}

#[test]
fn plan_marks_deletions_and_unreachable_databases() {
    let mut delete = change(
        "projects/demo/locations/us-east4/services/legacy",
        PlanAction::ServiceDelete,
        "delete undeclared service",
    );
    delete.destructive = true;
    delete.hint = Some("deletion asks for confirmation".to_string());
    let plan = plan(
        vec![
            delete,
            change(
                "projects/demo/instances/movies-fdc/databases/fdcdb",
                PlanAction::DatabaseInaccessible,
                "database is not accessible",
            ),
        ],
        Vec::new(),
    );

    let output = render_plan(&plan, OutputFormat::Text, &base_options()).expect("render");

    assert!(
        output.contains(
            "  - delete service      projects/demo/locations/us-east4/services/legacy"
        )
    );
    assert!(output.contains("    warn: deletion asks for confirmation"));
    assert!(output.contains("  ! database unreachable"));
    assert!(output.contains("    database is not accessible"));
    assert!(output.contains("Plan: 1 to delete, 1 unreachable"));
}

#[test]
fn plan_prints_pending_sql_under_its_schema() {
    let plan = plan(
        vec![change(SCHEMA, PlanAction::SchemaMigrate, "2 SQL change(s) required")],
        vec![SchemaPlan {
            schema: SCHEMA.to_string(),
            diffs: vec![
                diff("add column year", "ALTER TABLE \"movie\" ADD COLUMN \"year\" integer", false),
                diff("drop table legacy", "DROP TABLE \"legacy\"", true),
            ],
        }],
    );

    let output = render_plan(&plan, OutputFormat::Text, &base_options()).expect("render");

    assert!(output.contains(&format!("  schema {SCHEMA}\n")));
    assert!(
        output.contains(
            "    /** add column year */\n    ALTER TABLE \"movie\" ADD COLUMN \"year\" integer\n"
        )
    );
    assert!(
        output.contains(
            "    /** Destructive: drop table legacy */\n    DROP TABLE \"legacy\"\n"
        )
    );
}

#[test]
fn filtered_plan_names_the_filter_in_the_header() {
    let mut plan = plan(Vec::new(), Vec::new());
    plan.selection = Selection::from_filters(vec![ResourceFilter::connector(
        ServiceId::try_from("movies").expect("id"),
        ConnectorId::try_from("api").expect("id"),
    )]);
    let options = RenderOptions {
        target: Some("staging".to_string()),
        ..base_options()
    };

    let output = render_plan(&plan, OutputFormat::Text, &options).expect("render");

    assert_eq!(
        output,
        "plan staging (only dataconnect:movies:api)\n  Nothing to do.\n"
    );
}

#[test]
fn plan_warnings_are_one_line_each_unless_verbose() {
    let mut plan = plan(
        vec![change(SCHEMA, PlanAction::SchemaNoop, "schema is up to date")],
        Vec::new(),
    );
    plan.warnings = vec![
        GraphqlError::new("column type changes")
            .with_level(WarningLevel::RequireAck)
            .with_workaround(workaround("keep the old type", "clients break")),
    ];

    let output = render_plan(&plan, OutputFormat::Text, &base_options()).expect("render");
    assert!(output.contains("  warn: [REQUIRE_ACK] column type changes\n"));

    let verbose = render_plan(&plan, OutputFormat::Text, &verbose_options()).expect("render");
    assert!(verbose.contains("Changes that need acknowledgement (1)"));
    assert!(verbose.contains("keep the old type"));
}

#[test]
fn plan_json_is_the_serialized_plan() {
    let plan = plan(
        vec![change(SERVICE, PlanAction::ServiceCreate, "create service")],
        Vec::new(),
    );

    let output = render_plan(&plan, OutputFormat::Json, &base_options()).expect("render");
    let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");

    assert_eq!(value["project"], "demo");
    assert_eq!(value["changes"][0]["action"], "service_create");
    assert_eq!(value["stats"]["dry_run"], true);
}

// ---------------------------------------------------------------------------
// Deploy report
// ---------------------------------------------------------------------------

#[test]
fn report_lists_what_changed_and_links_the_console() {
    let output = render_report(&report(), OutputFormat::Text, &base_options()).expect("render");

    assert!(output.starts_with("deploy demo\n"));
    assert!(output.contains(&format!("  + created service     {SERVICE}")));
    assert!(output.contains(&format!("  ~ deployed schema     {SCHEMA} (1 SQL change applied)")));
    assert!(output.contains(&format!(
        "  + deployed connector  {CONNECTOR} (after schema migration)"
    )));
    assert!(!output.contains("ALTER TABLE"));
    assert!(output.contains(
        "Deployed: 1 service created, 1 schema deployed, 1 connector deployed\n"
    ));
    assert!(
        output.ends_with(
            "Console: https://console.firebase.google.com/project/demo/dataconnect\n"
        )
    );
}

#[test]
fn verbose_report_includes_executed_sql() {
    let output = render_report(&report(), OutputFormat::Text, &verbose_options()).expect("render");
    assert!(output.contains("    ALTER TABLE \"movie\" ADD COLUMN \"year\" integer\n"));
}

#[test]
fn report_warns_about_schemas_waiting_for_a_new_instance() {
    let mut report = report();
    report.schemas_migrated.clear();
    report.stats.schemas_skipped_pending_create = 1;

    let output = render_report(&report, OutputFormat::Text, &base_options()).expect("render");

    assert!(output.contains(
        "  warn: 1 schema will be migrated once the new Cloud SQL instance is ready"
    ));
}

#[test]
fn empty_report_says_nothing_changed() {
    let report = DeployReport {
        services_created: Vec::new(),
        schemas_migrated: Vec::new(),
        connectors: Vec::new(),
        ..report()
    };

    let output = render_report(&report, OutputFormat::Text, &base_options()).expect("render");

    assert!(output.contains("  Nothing changed.\n"));
    assert!(output.contains("Deployed: nothing changed\n"));
}

#[test]
fn report_json_keeps_connector_phases() {
    let output = render_report(&report(), OutputFormat::Json, &base_options()).expect("render");
    let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");
    assert_eq!(value["connectors"][0]["phase"], "after_schema");
}

// ---------------------------------------------------------------------------
// SQL commands
// ---------------------------------------------------------------------------

#[test]
fn schema_plan_counts_destructive_changes() {
    let plan = SchemaPlan {
        schema: SCHEMA.to_string(),
        diffs: vec![
            diff("drop table legacy", "DROP TABLE \"legacy\"", true),
            diff("add column year", "ALTER TABLE \"movie\" ADD COLUMN \"year\" integer", false),
        ],
    };

    let output = render_schema_plan(&plan, OutputFormat::Text, &base_options()).expect("render");

    assert!(
        output.starts_with(
            &format!("sql diff {SCHEMA}\n\n  /** Destructive: drop table legacy */\n")
        )
    );
    assert!(output.ends_with("Plan: 2 SQL changes, 1 destructive\n"));
}

#[test]
fn up_to_date_schema_has_nothing_to_migrate() {
    let migrated = MigratedSchema {
        schema: SCHEMA.to_string(),
        diffs: Vec::new(),
    };

    let output = render_migrated(&migrated, OutputFormat::Text, &base_options()).expect("render");

    assert_eq!(
        output,
        format!("sql migrate {SCHEMA}\n\n  Schema is up to date.\n\nMigrated: nothing to do\n")
    );
}

// ---------------------------------------------------------------------------
// Error table
// ---------------------------------------------------------------------------

#[test]
fn error_table_groups_hard_errors_before_warnings() {
    let errors = vec![
        GraphqlError::new("renamed field").with_level(WarningLevel::InteractiveAck),
        GraphqlError::new("unknown type Foo"),
        GraphqlError::new("dropped table").with_level(WarningLevel::RequireForce),
    ];

    let output = render_error_table(&errors, &base_options());

    let errors_at = output.find("Errors (1)").expect("hard errors");
    let force_at = output.find("Changes that need --force (1)").expect("force group");
    let interactive_at = output
        .find("Changes that may affect existing operations (1)")
        .expect("interactive group");
    assert!(errors_at < force_at);
    assert!(force_at < interactive_at);
    assert!(output.contains("  Issue\n  ----------------\n  unknown type Foo\n"));
}

#[test]
fn error_table_aligns_workaround_columns() {
    let error = GraphqlError::new("drop column price")
        .with_level(WarningLevel::RequireForce)
        .with_workaround(workaround("keep the column", "data loss"))
        .with_workaround(Workaround {
            description: "mark it optional".to_string(),
            reason: "old clients".to_string(),
            replace_with: Some("price: Float".to_string()),
        });

    let output = render_error_table(&[error], &base_options());
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines[0], "Changes that need --force (1)");
    assert_eq!(lines[1], "  Issue             | Workaround       | Reason");
    assert_eq!(lines[2], "  ------------------+------------------+------------");
    assert_eq!(lines[3], "  drop column price | keep the column  | data loss");
    assert_eq!(lines[4], "                    | mark it optional | old clients");
    assert_eq!(lines[5], "                    | Replace with:    |");
    assert_eq!(lines[6], "                    | price: Float     |");
}

#[test]
fn errors_render_as_json_when_asked() {
    let errors = vec![GraphqlError::new("boom").with_level(WarningLevel::LogOnly)];
    let output = render_errors(&errors, OutputFormat::Json, &base_options()).expect("render");
    let value: serde_json::Value = serde_json::from_str(&output).expect("valid json");
    assert_eq!(value[0]["message"], "boom");
    assert_eq!(value[0]["extensions"]["warningLevel"], "LOG_ONLY");
}
