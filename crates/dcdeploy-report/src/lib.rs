use std::fmt::Write;

use dcdeploy_domain::{
    ConnectorPhase, DeployPlan, DeployReport, GraphqlError, MigratedSchema, PlanAction,
    PlannedChange, SchemaDiff, SchemaPlan, Selection, WarningLevel,
};

mod error;
mod options;
mod style;
mod table;

pub use error::ReportError;
pub use options::{ColorChoice, OutputFormat, RenderOptions};
pub use table::render_error_table;

use style::{Mark, TextStyle};

/// Render a dry-run plan in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_plan(
    plan: &DeployPlan,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(plan)
            .map_err(|source| ReportError::JsonSerialize { what: "plan", source }),
        OutputFormat::Text => Ok(render_plan_text(plan, options)),
    }
}

/// Render the outcome of a completed deploy in the requested output format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_report(
    report: &DeployReport,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|source| ReportError::JsonSerialize { what: "report", source }),
        OutputFormat::Text => Ok(render_report_text(report, options)),
    }
}

/// Render the SQL a schema would need (`sql diff`).
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_schema_plan(
    plan: &SchemaPlan,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(plan).map_err(|source| {
            ReportError::JsonSerialize {
                what: "schema plan",
                source,
            }
        }),
        OutputFormat::Text => Ok(render_diff_text(
            "sql diff",
            &plan.schema,
            &plan.diffs,
            "Plan:",
            options,
        )),
    }
}

/// Render the SQL that `sql migrate` executed.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_migrated(
    migrated: &MigratedSchema,
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(migrated).map_err(|source| {
            ReportError::JsonSerialize {
                what: "migration",
                source,
            }
        }),
        OutputFormat::Text => Ok(render_diff_text(
            "sql migrate",
            &migrated.schema,
            &migrated.diffs,
            "Migrated:",
            options,
        )),
    }
}

/// Render a batch of compiler or migration errors.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_errors(
    errors: &[GraphqlError],
    format: OutputFormat,
    options: &RenderOptions,
) -> Result<String, ReportError> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(errors)
            .map_err(|source| ReportError::JsonSerialize { what: "errors", source }),
        OutputFormat::Text => Ok(render_error_table(errors, options)),
    }
}

// ---------------------------------------------------------------------------
// Plan text
// ---------------------------------------------------------------------------

fn render_plan_text(plan: &DeployPlan, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    let target = options.target.as_deref().unwrap_or(&plan.project);
    append_header(
        &mut output,
        "plan",
        target,
        only_suffix(&plan.selection).as_deref(),
        style,
    );

    if plan.changes.is_empty() {
        let _ = writeln!(output, "  Nothing to do.");
        append_warnings(&mut output, &plan.warnings, options, style);
        return output;
    }

    let (shown, noops): (Vec<&PlannedChange>, Vec<&PlannedChange>) = plan
        .changes
        .iter()
        .partition(|change| action_mark(change.action).0 != Mark::Noop);

    let _ = writeln!(output);
    for change in &shown {
        append_change_line(&mut output, change, options, style);
    }
    if options.verbose {
        for change in &noops {
            append_change_line(&mut output, change, options, style);
        }
    } else if !noops.is_empty() {
        if !shown.is_empty() {
            let _ = writeln!(output);
        }
        let _ = writeln!(output, "  {}", style.dim(&noop_summary(&noops)));
    }

    for schema in plan.schemas.iter().filter(|schema| !schema.diffs.is_empty()) {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "  {} {}",
            style.header_command("schema"),
            style.primary(&schema.schema)
        );
        append_diffs(&mut output, &schema.diffs, "    ", style);
    }

    append_warnings(&mut output, &plan.warnings, options, style);

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", PlanTally::from_changes(&plan.changes).format(style));
    output
}

fn append_change_line(
    output: &mut String,
    change: &PlannedChange,
    options: &RenderOptions,
    style: TextStyle,
) {
    let (mark, label) = action_mark(change.action);
    let _ = writeln!(
        output,
        "  {} {}{}",
        style.symbol(mark),
        TextStyle::pad_label(&style.label(mark, label)),
        style.primary(&change.resource)
    );

    let informative = matches!(mark, Mark::Change | Mark::Warn);
    if (options.verbose || informative) && !change.summary.is_empty() {
        let _ = writeln!(output, "    {}", style.dim(&change.summary));
    }
    if options.verbose {
        if let Some(hash) = &change.content_hash {
            let short = &hash[..hash.len().min(12)];
            let _ = writeln!(output, "    {}", style.dim(&format!("content: sha256:{short}")));
        }
    }
    if let Some(hint) = &change.hint {
        let _ = writeln!(output, "    {} {hint}", style.warn_prefix("warn:"));
    }
}

const fn action_mark(action: PlanAction) -> (Mark, &'static str) {
    match action {
        PlanAction::ServiceCreate => (Mark::Add, "create service"),
        PlanAction::ServiceDelete => (Mark::Remove, "delete service"),
        PlanAction::InstanceCreate => (Mark::Add, "create instance"),
        PlanAction::InstanceUpdate => (Mark::Change, "update instance"),
        PlanAction::InstanceNoop => (Mark::Noop, "instance ready"),
        PlanAction::DatabaseCreate => (Mark::Add, "create database"),
        PlanAction::DatabaseNoop => (Mark::Noop, "database ready"),
        PlanAction::DatabaseInaccessible => (Mark::Warn, "database unreachable"),
        PlanAction::SchemaMigrate => (Mark::Change, "migrate schema"),
        PlanAction::SchemaNoop => (Mark::Noop, "schema up to date"),
        PlanAction::ConnectorDeploy => (Mark::Add, "deploy connector"),
    }
}

fn noop_summary(noops: &[&PlannedChange]) -> String {
    let of = |wanted: PlanAction| noops.iter().filter(|change| change.action == wanted).count();
    let parts = [
        (of(PlanAction::InstanceNoop), "instance", "instances"),
        (of(PlanAction::DatabaseNoop), "database", "databases"),
        (of(PlanAction::SchemaNoop), "schema", "schemas"),
    ]
    .into_iter()
    .filter(|(count, _, _)| *count > 0)
    .map(|(count, one, many)| plural(count, one, many))
    .collect::<Vec<_>>();

    if parts.is_empty() {
        format!("{} unchanged", noops.len())
    } else {
        format!("{} unchanged ({})", noops.len(), parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Deploy report text
// ---------------------------------------------------------------------------

fn render_report_text(report: &DeployReport, options: &RenderOptions) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    let target = options.target.as_deref().unwrap_or(&report.project);
    append_header(&mut output, "deploy", target, None, style);
    let _ = writeln!(output);

    let mut line = |mark: Mark, label: &str, resource: &str, detail: Option<String>| {
        let detail = detail.map_or_else(String::new, |text| format!(" {}", style.dim(&text)));
        let _ = writeln!(
            output,
            "  {} {}{}{detail}",
            style.symbol(mark),
            TextStyle::pad_label(&style.label(mark, label)),
            style.primary(resource)
        );
    };

    for name in &report.services_created {
        line(Mark::Add, "created service", name, None);
    }
    for name in &report.services_deleted {
        line(Mark::Remove, "deleted service", name, None);
    }
    for schema in &report.schemas_migrated {
        let detail = (!schema.diffs.is_empty()).then(|| {
            let changes = plural(schema.diffs.len(), "SQL change", "SQL changes");
            format!("({changes} applied)")
        });
        line(Mark::Change, "deployed schema", &schema.schema, detail);
    }
    for connector in &report.connectors {
        let detail = (connector.phase == ConnectorPhase::AfterSchema)
            .then(|| "(after schema migration)".to_string());
        line(Mark::Add, "deployed connector", &connector.name, detail);
    }
    for name in &report.connectors_deleted {
        line(Mark::Remove, "deleted connector", name, None);
    }

    let tally = ReportTally::from_report(report);
    if tally.is_empty() {
        let _ = writeln!(output, "  Nothing changed.");
    }

    if options.verbose {
        for schema in report.schemas_migrated.iter().filter(|schema| !schema.diffs.is_empty()) {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "  {} {}",
                style.header_command("schema"),
                style.primary(&schema.schema)
            );
            append_diffs(&mut output, &schema.diffs, "    ", style);
        }
    }

    let pending = report.stats.schemas_skipped_pending_create;
    if pending > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "  {} {} will be migrated once the new Cloud SQL instance is ready",
            style.warn_prefix("warn:"),
            plural(pending, "schema", "schemas")
        );
    }

    append_warnings(&mut output, &report.warnings, options, style);

    let _ = writeln!(output);
    let _ = writeln!(output, "{}", tally.format(style));
    let _ = writeln!(output, "{} {}", style.bold("Console:"), report.console_url);
    output
}

// ---------------------------------------------------------------------------
// SQL diff text
// ---------------------------------------------------------------------------

fn render_diff_text(
    command: &str,
    schema: &str,
    diffs: &[SchemaDiff],
    tally_label: &str,
    options: &RenderOptions,
) -> String {
    let mut output = String::new();
    let style = TextStyle::new(options.color);
    let target = options.target.as_deref().unwrap_or(schema);
    append_header(&mut output, command, target, None, style);
    let _ = writeln!(output);

    if diffs.is_empty() {
        let _ = writeln!(output, "  Schema is up to date.");
        let _ = writeln!(output);
        let _ = writeln!(output, "{} nothing to do", style.bold(tally_label));
        return output;
    }

    append_diffs(&mut output, diffs, "  ", style);

    let destructive = diffs.iter().filter(|diff| diff.destructive).count();
    let mut parts = vec![style.label(
        Mark::Change,
        &plural(diffs.len(), "SQL change", "SQL changes"),
    )];
    if destructive > 0 {
        parts.push(style.label(Mark::Remove, &format!("{destructive} destructive")));
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "{} {}", style.bold(tally_label), parts.join(", "));
    output
}

fn append_diffs(output: &mut String, diffs: &[SchemaDiff], indent: &str, style: TextStyle) {
    for diff in diffs {
        for line in diff.to_string().lines() {
            let painted = if !line.starts_with("/**") {
                line.to_string()
            } else if diff.destructive {
                style.label(Mark::Remove, line)
            } else {
                style.dim(line)
            };
            let _ = writeln!(output, "{indent}{painted}");
        }
    }
}

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

fn append_header(
    output: &mut String,
    command: &str,
    target: &str,
    suffix: Option<&str>,
    style: TextStyle,
) {
    let _ = write!(output, "{} {}", style.header_command(command), style.dim(target));
    if let Some(suffix) = suffix {
        let _ = write!(output, " {suffix}");
    }
    let _ = writeln!(output);
}

fn only_suffix(selection: &Selection) -> Option<String> {
    selection.is_filtered().then(|| {
        let filters = selection
            .filters()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        format!("(only {})", filters.join(","))
    })
}

/// Compact one-line warnings; the full table in verbose mode.
fn append_warnings(
    output: &mut String,
    warnings: &[GraphqlError],
    options: &RenderOptions,
    style: TextStyle,
) {
    if warnings.is_empty() {
        return;
    }
    let _ = writeln!(output);
    if options.verbose {
        for line in render_error_table(warnings, options).lines() {
            let _ = writeln!(output, "  {line}");
        }
        return;
    }
    for warning in warnings {
        let level = warning.warning_level().map_or("ERROR", WarningLevel::as_str);
        let _ = writeln!(
            output,
            "  {} {} {warning}",
            style.warn_prefix("warn:"),
            style.dim(&format!("[{level}]"))
        );
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    format!("{count} {}", if count == 1 { one } else { many })
}

// ---------------------------------------------------------------------------
// Tallies
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PlanTally {
    adds: usize,
    changes: usize,
    deletes: usize,
    unreachable: usize,
    unchanged: usize,
}

impl PlanTally {
    fn from_changes(changes: &[PlannedChange]) -> Self {
        let mut tally = Self::default();
        for change in changes {
            match action_mark(change.action).0 {
                Mark::Add => tally.adds += 1,
                Mark::Change => tally.changes += 1,
                Mark::Remove => tally.deletes += 1,
                Mark::Warn => tally.unreachable += 1,
                Mark::Noop => tally.unchanged += 1,
            }
        }
        tally
    }

    fn format(&self, style: TextStyle) -> String {
        let mut parts = Vec::new();
        if self.adds > 0 {
            parts.push(style.label(Mark::Add, &format!("{} to add", self.adds)));
        }
        if self.changes > 0 {
            parts.push(style.label(Mark::Change, &format!("{} to change", self.changes)));
        }
        if self.deletes > 0 {
            parts.push(style.label(Mark::Remove, &format!("{} to delete", self.deletes)));
        }
        if self.unreachable > 0 {
            parts.push(style.label(Mark::Warn, &format!("{} unreachable", self.unreachable)));
        }
        if self.unchanged > 0 {
            parts.push(style.dim(&format!("{} unchanged", self.unchanged)));
        }
        if parts.is_empty() {
            format!("{} nothing to do", style.bold("Plan:"))
        } else {
            format!("{} {}", style.bold("Plan:"), parts.join(", "))
        }
    }
}

struct ReportTally {
    services_created: usize,
    services_deleted: usize,
    schemas: usize,
    connectors: usize,
    connectors_deleted: usize,
}

impl ReportTally {
    fn from_report(report: &DeployReport) -> Self {
        Self {
            services_created: report.services_created.len(),
            services_deleted: report.services_deleted.len(),
            schemas: report.schemas_migrated.len(),
            connectors: report.connectors.len(),
            connectors_deleted: report.connectors_deleted.len(),
        }
    }

    const fn is_empty(&self) -> bool {
        self.services_created
            + self.services_deleted
            + self.schemas
            + self.connectors
            + self.connectors_deleted
            == 0
    }

    fn format(&self, style: TextStyle) -> String {
        let mut parts = Vec::new();
        if self.services_created > 0 {
            let text = plural(self.services_created, "service created", "services created");
            parts.push(style.label(Mark::Add, &text));
        }
        if self.services_deleted > 0 {
            let text = plural(self.services_deleted, "service deleted", "services deleted");
            parts.push(style.label(Mark::Remove, &text));
        }
        if self.schemas > 0 {
            let text = plural(self.schemas, "schema deployed", "schemas deployed");
            parts.push(style.label(Mark::Change, &text));
        }
        if self.connectors > 0 {
            let text = plural(self.connectors, "connector deployed", "connectors deployed");
            parts.push(style.label(Mark::Add, &text));
        }
        if self.connectors_deleted > 0 {
            let text = plural(
                self.connectors_deleted,
                "connector deleted",
                "connectors deleted",
            );
            parts.push(style.label(Mark::Remove, &text));
        }
        if parts.is_empty() {
            format!("{} nothing changed", style.bold("Deployed:"))
        } else {
            format!("{} {}", style.bold("Deployed:"), parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests;
