use std::collections::BTreeMap;

use crate::reconcile::TypeLabel;
use crate::view::Column;

/// One rendered table row; cells line up with `TableReport::columns`.
#[derive(Debug, Clone)]
pub struct Row {
    pub enabled: bool,
    pub type_label: TypeLabel,
    pub cells: Vec<String>,
}

/// A single page of the repository table, ready to print.
#[derive(Debug)]
pub struct TableReport {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    /// Zero-based
    pub page: usize,
    pub page_count: usize,
    pub filtered_total: usize,
    pub total: usize,
    /// Human summary of active filters and sort, e.g. "type=Sources, sort=name asc"
    pub summary: String,
}

/// Counts shown next to filter options.
#[derive(Debug, Default)]
pub struct CountsReport {
    pub total: usize,
    pub languages: BTreeMap<String, usize>,
    pub owners: BTreeMap<String, usize>,
    pub types: BTreeMap<String, usize>,
    /// Public plus private, what the default type filter admits
    pub sources: usize,
    pub classes: BTreeMap<String, usize>,
    /// Labels assigned to repos but no longer in the taxonomy
    pub dangling_classes: Vec<String>,
}
