use std::fmt::Write;

use dcdeploy_domain::{GraphqlError, WarningLevel};

use crate::options::RenderOptions;
use crate::style::TextStyle;

const HEADINGS: [&str; 3] = ["Issue", "Workaround", "Reason"];

const fn group_title(level: Option<WarningLevel>) -> &'static str {
    match level {
        None => "Errors",
        Some(WarningLevel::RequireForce) => "Changes that need --force",
        Some(WarningLevel::RequireAck) => "Changes that need acknowledgement",
        Some(WarningLevel::InteractiveAck) => "Changes that may affect existing operations",
        Some(WarningLevel::LogOnly) => "Notices",
    }
}

/// Render errors as `Issue | Workaround | Reason` tables, one group per
/// warning level, hard errors first and notices last.
///
/// Groups without any workaround collapse to the `Issue` column.
#[must_use]
pub fn render_error_table(errors: &[GraphqlError], options: &RenderOptions) -> String {
    let style = TextStyle::new(options.color);
    let mut output = String::new();
    let levels =
        std::iter::once(None).chain(WarningLevel::ALL.iter().rev().map(|level| Some(*level)));

    for level in levels {
        let rows: Vec<[String; 3]> = errors
            .iter()
            .filter(|error| error.warning_level() == level)
            .flat_map(GraphqlError::table_rows)
            .collect();
        if rows.is_empty() {
            continue;
        }
        if !output.is_empty() {
            let _ = writeln!(output);
        }
        let count = errors
            .iter()
            .filter(|error| error.warning_level() == level)
            .count();
        let title = format!("{} ({count})", group_title(level));
        let title = if level.is_none() {
            style.error_prefix(&title)
        } else {
            style.warn_prefix(&title)
        };
        let _ = writeln!(output, "{title}");
        append_table(&mut output, &rows, style);
    }
    output
}

fn append_table(output: &mut String, rows: &[[String; 3]], style: TextStyle) {
    let columns = if rows
        .iter()
        .any(|row| !row[1].is_empty() || !row[2].is_empty())
    {
        3
    } else {
        1
    };

    let mut widths = [0_usize; 3];
    for (index, heading) in HEADINGS.iter().enumerate().take(columns) {
        widths[index] = heading.len();
    }
    for row in rows {
        for (index, cell) in row.iter().enumerate().take(columns) {
            for line in cell.lines() {
                widths[index] = widths[index].max(console::measure_text_width(line));
            }
        }
    }
    let widths = &widths[..columns];

    append_row(output, &HEADINGS.map(ToString::to_string), widths, style, true);
    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join("-+-");
    let _ = writeln!(output, "  {}", style.dim(&rule));
    for row in rows {
        append_row(output, row, widths, style, false);
    }
}

/// Cells may span several lines; the row is as tall as its tallest cell.
fn append_row(
    output: &mut String,
    row: &[String; 3],
    widths: &[usize],
    style: TextStyle,
    heading: bool,
) {
    let cells: Vec<Vec<&str>> = row
        .iter()
        .take(widths.len())
        .map(|cell| cell.lines().collect())
        .collect();
    let height = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);

    for line in 0..height {
        let rendered = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| {
                let text = cell.get(line).copied().unwrap_or("");
                let padding = width.saturating_sub(console::measure_text_width(text));
                let text = if heading {
                    style.bold(text)
                } else {
                    text.to_string()
                };
                format!("{text}{}", " ".repeat(padding))
            })
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = writeln!(output, "  {}", rendered.trim_end());
    }
}
