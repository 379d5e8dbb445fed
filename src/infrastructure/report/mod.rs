// ============================================================
// REPORT OUTPUT LAYER
// ============================================================
// Dashboard files and console rendering

mod report_writer;

pub use report_writer::{render_table, ReportWriter, MANIFEST_FILE};
