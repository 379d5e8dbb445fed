use std::path::PathBuf;

use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::catalog::is_valid_asin;
use crate::domain::dashboard::{DashboardManifest, ReportFile};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::schema::verify_schema;
use crate::infrastructure::db::DashboardRepository;
use crate::infrastructure::report::{render_table, ReportWriter};

pub const DEFAULT_OUTPUT_DIR: &str = "out";

/// Row limits of the list reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardLimits {
    pub top_reviews: i64,
    pub group_leaders: i64,
    pub helpful_products: i64,
    pub helpful_categories: i64,
    pub top_customers: i64,
}

impl Default for DashboardLimits {
    fn default() -> Self {
        Self {
            top_reviews: 5,
            group_leaders: 10,
            helpful_products: 10,
            helpful_categories: 5,
            top_customers: 10,
        }
    }
}

impl DashboardLimits {
    /// The same limit for every list report.
    pub fn uniform(limit: i64) -> Self {
        Self {
            top_reviews: limit,
            group_leaders: limit,
            helpful_products: limit,
            helpful_categories: limit,
            top_customers: limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardOptions {
    pub product_asin: Option<String>,
    pub output_dir: PathBuf,
    pub limits: DashboardLimits,
    /// Also print every report as a text table on stdout.
    pub print_tables: bool,
}

impl DashboardOptions {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            product_asin: None,
            output_dir,
            limits: DashboardLimits::default(),
            print_tables: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(asin) = &self.product_asin {
            if !is_valid_asin(asin) {
                return Err(AppError::ValidationError(format!("Invalid ASIN: '{}'", asin)));
            }
        }
        let limits = self.limits;
        let all = [
            limits.top_reviews,
            limits.group_leaders,
            limits.helpful_products,
            limits.helpful_categories,
            limits.top_customers,
        ];
        if all.iter().any(|l| *l < 1) {
            return Err(AppError::ValidationError(
                "Report limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runs the fixed battery of read-only dashboard queries.
pub struct DashboardUseCase {
    pool: PgPool,
    repository: DashboardRepository,
}

impl DashboardUseCase {
    pub fn new(pool: &PgPool) -> Self {
        Self {
            pool: pool.clone(),
            repository: DashboardRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &DashboardRepository {
        &self.repository
    }

    pub async fn run(&self, options: &DashboardOptions) -> Result<DashboardManifest> {
        options.validate()?;
        verify_schema(&self.pool).await?;

        let writer = ReportWriter::new(&options.output_dir)?;
        let mut emitter = Emitter {
            writer: &writer,
            print: options.print_tables,
            reports: Vec::new(),
        };
        let limits = options.limits;

        if let Some(asin) = options.product_asin.as_deref() {
            let overview = self
                .repository
                .product_overview(asin)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("product {}", asin)))?;
            emitter.emit("product_overview", &[overview])?;
            emitter.emit("similar_products", &self.repository.similar_products(asin).await?)?;
            emitter.emit(
                "similar_better_sales",
                &self.repository.similar_better_sales(asin).await?,
            )?;
            emitter.emit(
                "top_reviews",
                &self.repository.top_reviews(asin, limits.top_reviews).await?,
            )?;
            emitter.emit("rating_evolution", &self.repository.rating_evolution(asin).await?)?;
            emitter.emit(
                "product_categories",
                &self.repository.product_categories(asin).await?,
            )?;
        } else {
            info!("no product ASIN given; skipping product reports");
        }

        emitter.emit("dataset_overview", &self.repository.table_counts().await?)?;
        emitter.emit(
            "group_sales_leaders",
            &self.repository.group_sales_leaders(limits.group_leaders).await?,
        )?;
        emitter.emit(
            "top_helpful_products",
            &self
                .repository
                .top_helpful_products(limits.helpful_products)
                .await?,
        )?;
        emitter.emit(
            "top_helpful_categories",
            &self
                .repository
                .top_helpful_categories(limits.helpful_categories)
                .await?,
        )?;
        emitter.emit(
            "top_customers_by_group",
            &self
                .repository
                .top_customers_by_group(limits.top_customers)
                .await?,
        )?;

        let manifest = DashboardManifest {
            product_asin: options.product_asin.clone(),
            generated_at: chrono::Utc::now(),
            reports: emitter.reports,
        };
        let path = writer.write_manifest(&manifest)?;
        info!(
            reports = manifest.reports.len(),
            manifest = %path.display(),
            "dashboard written"
        );
        Ok(manifest)
    }
}

struct Emitter<'a> {
    writer: &'a ReportWriter,
    print: bool,
    reports: Vec<ReportFile>,
}

impl Emitter<'_> {
    fn emit<T: Serialize + Default>(&mut self, name: &str, rows: &[T]) -> Result<()> {
        let report = self.writer.write_csv(name, rows)?;
        if self.print {
            println!("{}", render_table(name, rows)?);
        }
        info!(report = name, rows = report.rows, "report written");
        self.reports.push(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = DashboardLimits::default();
        assert_eq!(limits.top_reviews, 5);
        assert_eq!(limits.group_leaders, 10);
        assert_eq!(limits.helpful_categories, 5);
        assert_eq!(DashboardLimits::uniform(3).top_customers, 3);
    }

    #[test]
    fn test_options_validation() {
        let mut options = DashboardOptions::new(PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert!(options.validate().is_ok());

        options.product_asin = Some("1559362022".to_string());
        assert!(options.validate().is_ok());

        options.product_asin = Some("not an asin".to_string());
        assert!(matches!(options.validate(), Err(AppError::ValidationError(_))));

        options.product_asin = None;
        options.limits = DashboardLimits::uniform(0);
        assert!(options.validate().is_err());
    }
}
