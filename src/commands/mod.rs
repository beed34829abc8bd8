//! CLI command implementations.

pub mod details;
pub mod report;
pub mod search;

pub use details::DetailsCommand;
pub use report::ReportCommand;
pub use search::{SearchCommand, SearchOptions};
