//! Leak reports: ordering, JSON schema, and terminal rendering

pub mod report;
pub mod render;


pub use report::{Report, ReportEntry, emit, emit_at};
pub use render::{render_table, to_json_pretty};
