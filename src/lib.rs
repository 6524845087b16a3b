//! Fetch a GitHub account's repositories, fold in locally kept
//! annotations and browse the result as a filterable, sortable table.

pub mod annotations;
pub mod codec;
pub mod config;
pub mod dashboard;
pub mod fetch;
pub mod reconcile;
pub mod report;
pub mod store;
pub mod view;
