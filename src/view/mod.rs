pub mod types;

pub use types::{
    Aggregates, Column, Filters, SortDirection, SortKey, SortOrder, TypeFilter, ValueFilter,
    VisiblePage,
};

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::debug;

use crate::reconcile::ViewRecord;

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Filter, sort and pagination state over a list of view records.
///
/// The filtered+sorted index is rebuilt whenever the records, filters or
/// sort change, and the page index is clamped right after, so the visible
/// window never points past the end while earlier rows exist. Aggregates
/// only follow the records, never the filters.
#[derive(Debug)]
pub struct QueryState {
    records: Vec<ViewRecord>,
    filters: Filters,
    sort: SortOrder,
    hidden_columns: BTreeSet<Column>,
    page: usize,
    page_size: usize,
    aggregates: Aggregates,
    /// Indices into `records`, filtered then sorted
    order: Vec<usize>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            records: Vec::new(),
            filters: Filters::default(),
            sort: SortOrder::default(),
            hidden_columns: BTreeSet::new(),
            page: 0,
            page_size: page_size.max(1),
            aggregates: Aggregates::default(),
            order: Vec::new(),
        }
    }

    /// Replace the underlying list. Recomputes aggregates and the index.
    pub fn set_records(&mut self, records: Vec<ViewRecord>) {
        self.records = records;
        self.aggregates = Aggregates::from_records(&self.records);
        self.refresh();
    }

    pub fn records(&self) -> &[ViewRecord] {
        &self.records
    }

    pub fn aggregates(&self) -> &Aggregates {
        &self.aggregates
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn set_filters(&mut self, filters: Filters) {
        self.filters = filters;
        self.refresh();
    }

    /// Tweak the current filters in place.
    pub fn update_filters(&mut self, update: impl FnOnce(&mut Filters)) {
        update(&mut self.filters);
        self.refresh();
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn set_sort(&mut self, key: SortKey, direction: SortDirection) {
        self.sort = SortOrder { key, direction };
        self.refresh();
    }

    /// Column-header behaviour: the active key flips direction, any other
    /// key becomes active ascending.
    pub fn toggle_sort(&mut self, key: SortKey) {
        let direction = if self.sort.key == key && self.sort.direction == SortDirection::Ascending
        {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        self.set_sort(key, direction);
    }

    pub fn hide_column(&mut self, column: Column) {
        self.hidden_columns.insert(column);
    }

    pub fn show_column(&mut self, column: Column) {
        self.hidden_columns.remove(&column);
    }

    pub fn is_visible(&self, column: Column) -> bool {
        !self.hidden_columns.contains(&column)
    }

    pub fn visible_columns(&self) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|c| self.is_visible(*c))
            .collect()
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Jump to a page; out-of-range requests land on the last page.
    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.clamp_page();
    }

    pub fn next_page(&mut self) {
        self.set_page(self.page.saturating_add(1));
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.page.saturating_sub(1));
    }

    pub fn filtered_count(&self) -> usize {
        self.order.len()
    }

    pub fn page_count(&self) -> usize {
        self.order.len().div_ceil(self.page_size)
    }

    /// All records passing the filters, in sort order.
    pub fn filtered(&self) -> impl Iterator<Item = &ViewRecord> {
        self.order.iter().map(|&i| &self.records[i])
    }

    pub fn visible(&self) -> VisiblePage<'_> {
        let page = self.page.min(self.last_page());
        let rows = self
            .order
            .iter()
            .skip(page * self.page_size)
            .take(self.page_size)
            .map(|&i| &self.records[i])
            .collect();
        VisiblePage {
            rows,
            page,
            page_count: self.page_count(),
            filtered_total: self.order.len(),
            total: self.records.len(),
        }
    }

    fn last_page(&self) -> usize {
        self.page_count().saturating_sub(1)
    }

    fn clamp_page(&mut self) {
        let last = self.last_page();
        if self.page > last {
            debug!(from = self.page, to = last, "clamping page index");
            self.page = last;
        }
    }

    fn refresh(&mut self) {
        let records = &self.records;
        let mut order: Vec<usize> = (0..records.len())
            .filter(|&i| self.filters.matches(&records[i]))
            .collect();

        let SortOrder { key, direction } = self.sort;
        // sort_by is stable, and reversing an Equal keeps ties in input order
        order.sort_by(|&a, &b| {
            let ordering = compare(key, &records[a], &records[b]);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        });

        self.order = order;
        self.clamp_page();
    }
}

fn compare(key: SortKey, a: &ViewRecord, b: &ViewRecord) -> Ordering {
    match key {
        SortKey::Name => compare_text(&a.name, &b.name),
        SortKey::Owner => compare_text(&a.owner, &b.owner),
        SortKey::Language => a.primary_language.cmp(&b.primary_language),
        SortKey::Type => a.type_label.cmp(&b.type_label),
        SortKey::Class => compare_text(&a.class_label, &b.class_label),
        SortKey::Stars => a.star_count.cmp(&b.star_count),
        SortKey::Created => a.created_at.cmp(&b.created_at),
        SortKey::Size => a.disk_usage_kb.cmp(&b.disk_usage_kb),
        SortKey::Commits => a
            .default_branch_commit_count
            .cmp(&b.default_branch_commit_count),
        SortKey::Enabled => a.enabled.cmp(&b.enabled),
    }
}

/// Case-insensitive first, so "alpha" and "Beta" sort naturally.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
