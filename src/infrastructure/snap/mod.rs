// ============================================================
// SNAP DATASET INFRASTRUCTURE LAYER
// ============================================================
// Reading the Amazon co-purchase metadata file

mod snap_parser;

pub use snap_parser::{open_input, ParseStats, SnapReader};
