//! Filterable feature-adoption reporting.
//!
//! Load the event table once with [`data::loader::load_file`], then call
//! [`aggregate::compute`] for every filter selection.

pub mod aggregate;
pub mod data;
pub mod error;
pub mod report;
pub mod session;

pub use aggregate::{compute, DashboardView};
pub use data::filter::FilterSelection;
pub use data::model::{CategoricalColumn, Dataset, Record};
pub use error::DataLoadError;
