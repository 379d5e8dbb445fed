pub mod catalog_repository;
pub mod connection;
pub mod dashboard_repository;
pub mod schema;

pub use catalog_repository::{
    BatchCounts, CatalogBatch, CatalogLoad, CatalogRepository, LoadTracker, SimilarResolution,
};
pub use connection::connect_pool;
pub use dashboard_repository::DashboardRepository;
