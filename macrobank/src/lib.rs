// Re-exports
pub use column_names as COL;
pub use panel::{BuildSummary, Macrobank, WorkingPanel};

// Modules
pub mod column_names;
pub mod config;
pub mod coverage;
pub mod derive;
pub mod error;
pub mod figures;
pub mod harmonize;
pub mod merge;
pub mod models;
pub mod panel;
pub mod schema;
pub mod source;
