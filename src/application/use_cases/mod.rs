pub mod dashboard;
pub mod load_catalog;
