pub mod types;

pub use types::{CountsReport, Row, TableReport};

use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::annotations::AnnotationBundle;
use crate::reconcile::{TypeLabel, ViewRecord};
use crate::view::{Column, QueryState, SortDirection, TypeFilter, ValueFilter};

/// Longest description shown in the terminal before it is cut.
const DESCRIPTION_WIDTH: usize = 60;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build the visible page of the table from the query state.
pub fn build_table(state: &QueryState) -> TableReport {
    let columns = state.visible_columns();
    let visible = state.visible();
    let rows = visible
        .rows
        .iter()
        .map(|record| Row {
            enabled: record.enabled,
            type_label: record.type_label,
            cells: columns.iter().map(|c| cell(record, *c)).collect(),
        })
        .collect();

    TableReport {
        columns,
        rows,
        page: visible.page,
        page_count: visible.page_count,
        filtered_total: visible.filtered_total,
        total: visible.total,
        summary: summarize(state),
    }
}

pub fn build_counts(state: &QueryState, annotations: &AnnotationBundle) -> CountsReport {
    let aggregates = state.aggregates();
    CountsReport {
        total: state.records().len(),
        languages: aggregates.languages.clone(),
        owners: aggregates.owners.clone(),
        types: aggregates
            .types
            .iter()
            .map(|(label, count)| (label.to_string(), *count))
            .collect(),
        sources: aggregates.count_for_type(TypeFilter::Sources),
        classes: aggregates.classes.clone(),
        dangling_classes: annotations
            .dangling_classes()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

fn cell(record: &ViewRecord, column: Column) -> String {
    match column {
        Column::Enabled => (if record.enabled { "yes" } else { "no" }).to_string(),
        Column::Name => record.name.clone(),
        Column::Owner => record.owner.clone(),
        Column::Type => record.type_label.to_string(),
        Column::Language => record.primary_language.clone().unwrap_or_default(),
        Column::Class => record.class_label.clone(),
        Column::Stars => record.star_count.to_string(),
        Column::Created => record.created_at.format("%Y-%m-%d").to_string(),
        Column::Size => record.disk_usage_kb.to_string(),
        Column::Commits => record
            .default_branch_commit_count
            .map(|c| c.to_string())
            .unwrap_or_default(),
        Column::Urls => record.resolved_urls.join(" "),
        Column::Description => record.resolved_description.clone(),
    }
}

fn summarize(state: &QueryState) -> String {
    let filters = state.filters();
    let mut parts = Vec::new();
    if let Some(name) = filters.name.as_deref().filter(|n| !n.is_empty()) {
        parts.push(format!("name~{name}"));
    }
    if let Some(owner) = &filters.owner {
        parts.push(format!("owner={owner}"));
    }
    if let Some(language) = &filters.language {
        parts.push(format!("language={}", describe_value(language)));
    }
    if let Some(type_category) = &filters.type_category {
        parts.push(format!("type={type_category}"));
    }
    if let Some(class) = &filters.class {
        parts.push(format!("class={}", describe_value(class)));
    }
    let sort = state.sort();
    let direction = match sort.direction {
        SortDirection::Ascending => "asc",
        SortDirection::Descending => "desc",
    };
    parts.push(format!("sort={:?} {direction}", sort.key).to_lowercase());
    parts.join(", ")
}

fn describe_value(filter: &ValueFilter) -> &str {
    match filter {
        ValueFilter::Missing => crate::view::types::NONE_VALUE,
        ValueFilter::Equals(value) => value,
    }
}

/// Output the table to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(rows = report.rows.len(), page = report.page))]
pub fn output(report: &TableReport, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing table to terminal");
            print_terminal_table(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing table to file");
            std::fs::write(path, render_markdown_table(report))?;
            Ok(())
        }
    }
}

fn print_terminal_table(report: &TableReport) {
    let display_rows: Vec<Vec<String>> = report
        .rows
        .iter()
        .map(|row| {
            row.cells
                .iter()
                .zip(&report.columns)
                .map(|(value, column)| match column {
                    Column::Description => truncate(value, DESCRIPTION_WIDTH),
                    _ => value.clone(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = report
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            display_rows
                .iter()
                .map(|cells| cells[i].chars().count())
                .chain(std::iter::once(column.title().chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    println!();
    let header: Vec<String> = report
        .columns
        .iter()
        .zip(&widths)
        .map(|(column, width)| format!("{:<width$}", column.title(), width = *width))
        .collect();
    println!("{}", header.join("  ").bold());

    for (row, cells) in report.rows.iter().zip(&display_rows) {
        let line: Vec<String> = cells
            .iter()
            .zip(&report.columns)
            .zip(&widths)
            .map(|((value, column), width)| {
                let padded = format!("{:<width$}", value, width = *width);
                match column {
                    Column::Enabled if row.enabled => padded.green().to_string(),
                    Column::Enabled => padded.dimmed().to_string(),
                    Column::Type => colorize_type(row.type_label, &padded).to_string(),
                    _ => padded,
                }
            })
            .collect();
        println!("{}", line.join("  "));
    }

    println!();
    println!("{}", footer(report).dimmed());
}

fn render_markdown_table(report: &TableReport) -> String {
    let mut md = String::new();
    md.push_str("# Repositories\n\n");
    md.push_str(&format!("_{}_\n\n", report.summary));

    let titles: Vec<&str> = report.columns.iter().map(|c| c.title()).collect();
    md.push_str(&format!("| {} |\n", titles.join(" | ")));
    md.push_str(&format!("|{}\n", "---|".repeat(report.columns.len())));
    for row in &report.rows {
        let cells: Vec<String> = row.cells.iter().map(|c| escape_markdown(c)).collect();
        md.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    md.push('\n');
    md.push_str(&footer(report));
    md.push('\n');
    md
}

fn footer(report: &TableReport) -> String {
    format!(
        "Page {} of {} | showing {} of {} matching ({} total) | {}",
        report.page + 1,
        report.page_count.max(1),
        report.rows.len(),
        report.filtered_total,
        report.total,
        report.summary
    )
}

/// Print option counts to the terminal.
pub fn print_counts(counts: &CountsReport) {
    println!();
    println!("{} repositories", counts.total.to_string().bold());
    print_count_section("Types", &counts.types);
    let sources = format!("{:<30}", TypeFilter::Sources.to_string());
    println!("  {} {}", sources.italic(), counts.sources);
    print_count_section("Owners", &counts.owners);
    print_count_section("Languages", &counts.languages);
    print_count_section("Classes", &counts.classes);
    if !counts.dangling_classes.is_empty() {
        println!(
            "{} {}",
            "Not in taxonomy:".yellow(),
            counts.dangling_classes.join(", ")
        );
    }
    println!();
}

fn print_count_section(title: &str, counts: &std::collections::BTreeMap<String, usize>) {
    println!();
    println!("═══ {} ═══", title);
    for (value, count) in counts {
        println!("  {:<30} {}", value, count);
    }
}

fn colorize_type(label: TypeLabel, text: &str) -> colored::ColoredString {
    match label {
        TypeLabel::Public => text.green(),
        TypeLabel::Private => text.yellow(),
        TypeLabel::Fork => text.dimmed(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
