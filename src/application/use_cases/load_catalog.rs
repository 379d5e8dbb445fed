use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::{info, warn};

use crate::domain::catalog::ProductRecord;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::{
    BatchCounts, CatalogBatch, CatalogLoad, CatalogRepository, LoadTracker,
};
use crate::infrastructure::snap::{open_input, ParseStats, SnapReader};

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_PROGRESS_EVERY: u64 = 50_000;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub input: PathBuf,
    /// Product records per round of multi-row inserts.
    pub batch_size: usize,
    pub progress_every: u64,
    pub dry_run: bool,
}

impl LoadOptions {
    pub fn new(input: PathBuf) -> Self {
        Self {
            input,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
            dry_run: false,
        }
    }

    /// Checks that need no database: the input exists and the batch is non-empty.
    pub fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            return Err(AppError::ValidationError(format!(
                "Input file not found: {}",
                self.input.display()
            )));
        }
        if self.batch_size == 0 {
            return Err(AppError::ValidationError(
                "Batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadSummary {
    pub dry_run: bool,
    pub declared_items: Option<u64>,
    pub records_read: u64,
    pub records_skipped: u64,
    pub malformed_fields: u64,
    pub products: u64,
    pub duplicate_products: u64,
    pub categories: u64,
    pub customers: u64,
    pub product_categories: u64,
    pub reviews: u64,
    pub duplicate_reviews: u64,
    pub reviews_skipped: u64,
    /// Edges listed in the file (dry run) or staged for resolution.
    pub similar_listed: u64,
    pub similar_kept: u64,
    pub similar_dropped: u64,
    pub elapsed_ms: u64,
}

impl LoadSummary {
    fn add_batch(&mut self, counts: &BatchCounts) {
        self.products += counts.products;
        self.duplicate_products += counts.duplicate_products;
        self.categories += counts.categories;
        self.customers += counts.customers;
        self.product_categories += counts.links;
        self.reviews += counts.reviews;
        self.duplicate_reviews += counts.duplicate_reviews;
        self.similar_listed += counts.similar_staged;
    }

    fn add_parse_stats(&mut self, stats: &ParseStats) {
        self.declared_items = stats.declared_items;
        self.records_read = stats.records_read;
        self.records_skipped = stats.records_skipped;
        self.malformed_fields = stats.malformed_fields;
        self.reviews_skipped = stats.reviews_skipped;
    }

    pub fn log(&self) {
        info!(
            dry_run = self.dry_run,
            records = self.records_read,
            skipped_records = self.records_skipped,
            products = self.products,
            duplicate_products = self.duplicate_products,
            categories = self.categories,
            customers = self.customers,
            product_categories = self.product_categories,
            reviews = self.reviews,
            duplicate_reviews = self.duplicate_reviews,
            skipped_reviews = self.reviews_skipped,
            similar_kept = self.similar_kept,
            similar_dropped = self.similar_dropped,
            malformed_fields = self.malformed_fields,
            elapsed_ms = self.elapsed_ms,
            "catalog load finished"
        );
    }
}

/// Replace the catalog with a SNAP metadata file in one transaction. A failed
/// load leaves the previous catalog in place.
pub struct LoadCatalogUseCase {
    pool: PgPool,
    schema: Option<String>,
}

impl LoadCatalogUseCase {
    pub fn new(pool: &PgPool, schema: Option<String>) -> Self {
        Self {
            pool: pool.clone(),
            schema,
        }
    }

    pub async fn run(&self, options: &LoadOptions) -> Result<LoadSummary> {
        options.validate()?;
        let started = Instant::now();

        let mut reader = SnapReader::new(open_input(&options.input)?);
        let repository = CatalogRepository::new(&self.pool);
        let mut load = repository.begin_load(self.schema.as_deref()).await?;
        let mut summary = LoadSummary::default();

        info!(
            input = %options.input.display(),
            batch_size = options.batch_size,
            "loading catalog"
        );

        if let Err(err) = stream_into(&mut load, &mut reader, options, &mut summary).await {
            warn!("catalog load failed, rolling back: {}", err);
            if let Err(rollback_err) = load.rollback().await {
                warn!("rollback failed: {}", rollback_err);
            }
            return Err(err);
        }

        let resolution = match load.resolve_similar().await {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!("resolving similar edges failed, rolling back: {}", err);
                if let Err(rollback_err) = load.rollback().await {
                    warn!("rollback failed: {}", rollback_err);
                }
                return Err(err);
            }
        };
        summary.similar_kept = resolution.kept;
        summary.similar_dropped = resolution.dropped;
        if resolution.dropped > 0 {
            warn!(
                dropped = resolution.dropped,
                "similar edges point at products missing from the file"
            );
        }

        load.commit().await?;

        summary.add_parse_stats(reader.stats());
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
    }
}

async fn stream_into<R: BufRead>(
    load: &mut CatalogLoad,
    reader: &mut SnapReader<R>,
    options: &LoadOptions,
    summary: &mut LoadSummary,
) -> Result<()> {
    let mut tracker = LoadTracker::new();
    let mut batch = CatalogBatch::new();
    let mut seen: u64 = 0;

    for record in reader.by_ref() {
        batch.push(record?, &mut tracker);
        seen += 1;

        if batch.len() >= options.batch_size {
            let counts = load.insert_batch(&batch).await?;
            summary.add_batch(&counts);
            batch = CatalogBatch::new();
        }

        if options.progress_every > 0 && seen % options.progress_every == 0 {
            info!(
                records = seen,
                products = summary.products,
                reviews = summary.reviews,
                "load progress"
            );
        }
    }

    if !batch.is_empty() || batch.duplicate_count() > 0 {
        let counts = load.insert_batch(&batch).await?;
        summary.add_batch(&counts);
    }
    Ok(())
}

/// Parse the whole file without touching the database.
pub fn scan_catalog(options: &LoadOptions) -> Result<LoadSummary> {
    options.validate()?;
    let started = Instant::now();
    let mut reader = SnapReader::new(open_input(&options.input)?);
    let mut summary = scan_records(&mut reader)?;
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(summary)
}

fn scan_records<R: BufRead>(reader: &mut SnapReader<R>) -> Result<LoadSummary> {
    let mut summary = LoadSummary {
        dry_run: true,
        ..LoadSummary::default()
    };
    let mut asins: HashSet<String> = HashSet::new();
    let mut categories: HashSet<i32> = HashSet::new();
    let mut customers: HashSet<String> = HashSet::new();
    let mut reviews: HashSet<(String, String, chrono::NaiveDate)> = HashSet::new();
    let mut similar: Vec<(String, String)> = Vec::new();

    for record in reader.by_ref() {
        let record: ProductRecord = record?;
        if !asins.insert(record.asin.clone()) {
            summary.duplicate_products += 1;
            continue;
        }
        summary.products += 1;

        for path in &record.categories {
            for node in &path.nodes {
                categories.insert(node.id);
            }
        }
        summary.product_categories += record
            .categories
            .iter()
            .filter_map(|p| p.leaf().map(|leaf| leaf.id))
            .collect::<HashSet<i32>>()
            .len() as u64;

        for review in &record.reviews {
            customers.insert(review.customer_id.clone());
            if reviews.insert((record.asin.clone(), review.customer_id.clone(), review.date)) {
                summary.reviews += 1;
            } else {
                summary.duplicate_reviews += 1;
            }
        }

        for target in record.similar {
            similar.push((record.asin.clone(), target));
        }
    }

    summary.categories = categories.len() as u64;
    summary.customers = customers.len() as u64;
    summary.similar_listed = similar.len() as u64;

    let distinct: HashSet<(String, String)> = similar.into_iter().collect();
    for (_, target) in &distinct {
        if asins.contains(target) {
            summary.similar_kept += 1;
        } else {
            summary.similar_dropped += 1;
        }
    }

    summary.add_parse_stats(reader.stats());
    Ok(summary)
}
