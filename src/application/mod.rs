pub mod use_cases;

pub use use_cases::dashboard::{DashboardLimits, DashboardOptions, DashboardUseCase};
pub use use_cases::load_catalog::{LoadCatalogUseCase, LoadOptions, LoadSummary};
