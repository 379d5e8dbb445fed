use std::collections::HashSet;

use chrono::NaiveDate;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{QueryBuilder, Transaction};

use crate::domain::catalog::ProductRecord;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::schema::reset_schema;

/// PostgreSQL accepts at most 65535 bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

fn rows_per_statement(columns: usize) -> usize {
    MAX_BIND_PARAMS / columns
}

#[derive(Debug, Clone)]
struct ProductRow {
    asin: String,
    source_id: Option<i32>,
    title: Option<String>,
    product_group: Option<String>,
    salesrank: Option<i32>,
    total_reviews: Option<i32>,
    downloaded_reviews: Option<i32>,
    avg_rating: Option<f64>,
    discontinued: bool,
}

#[derive(Debug, Clone)]
struct CategoryRow {
    category_id: i32,
    name: String,
    parent_id: Option<i32>,
}

#[derive(Debug, Clone)]
struct ReviewRow {
    asin: String,
    customer_id: String,
    review_date: NaiveDate,
    rating: Option<i16>,
    votes: Option<i32>,
    helpful: Option<i32>,
}

/// Keys already sent during one load, shared by every batch of it.
#[derive(Debug, Default)]
pub struct LoadTracker {
    asins: HashSet<String>,
    categories: HashSet<i32>,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Rows extracted from a run of product records, ready for multi-row inserts.
#[derive(Debug, Default)]
pub struct CatalogBatch {
    products: Vec<ProductRow>,
    duplicates: u64,
    categories: Vec<CategoryRow>,
    customers: Vec<String>,
    customer_seen: HashSet<String>,
    links: Vec<(String, i32)>,
    reviews: Vec<ReviewRow>,
    similar: Vec<(String, String)>,
}

impl CatalogBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of product records in the batch.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn review_count(&self) -> usize {
        self.reviews.len()
    }

    /// Records skipped because their ASIN was already loaded.
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }

    /// Flatten a record into table rows. Returns false, adding nothing, when
    /// `tracker` has seen the ASIN before: the first record wins.
    pub fn push(&mut self, record: ProductRecord, tracker: &mut LoadTracker) -> bool {
        if !tracker.asins.insert(record.asin.clone()) {
            self.duplicates += 1;
            return false;
        }
        let asin = record.asin;

        for path in &record.categories {
            for (node, parent_id) in path.with_parents() {
                if tracker.categories.insert(node.id) {
                    self.categories.push(CategoryRow {
                        category_id: node.id,
                        name: node.name.clone(),
                        parent_id,
                    });
                }
            }
            if let Some(leaf) = path.leaf() {
                self.links.push((asin.clone(), leaf.id));
            }
        }

        for review in record.reviews {
            if self.customer_seen.insert(review.customer_id.clone()) {
                self.customers.push(review.customer_id.clone());
            }
            self.reviews.push(ReviewRow {
                asin: asin.clone(),
                customer_id: review.customer_id,
                review_date: review.date,
                rating: review.rating,
                votes: review.votes,
                helpful: review.helpful,
            });
        }

        for similar in record.similar {
            self.similar.push((asin.clone(), similar));
        }

        self.products.push(ProductRow {
            asin,
            source_id: record.source_id,
            title: record.title,
            product_group: record.group,
            salesrank: record.salesrank,
            total_reviews: record.review_summary.total,
            downloaded_reviews: record.review_summary.downloaded,
            avg_rating: record.review_summary.avg_rating,
            discontinued: record.discontinued,
        });
        true
    }
}

/// Rows written by one [`CatalogLoad::insert_batch`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub products: u64,
    pub duplicate_products: u64,
    pub categories: u64,
    pub customers: u64,
    pub links: u64,
    pub reviews: u64,
    pub duplicate_reviews: u64,
    pub similar_staged: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilarResolution {
    pub kept: u64,
    pub dropped: u64,
}

pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Open the load transaction, recreate the catalog tables inside it and
    /// create the similarity staging table.
    pub async fn begin_load(&self, schema: Option<&str>) -> Result<CatalogLoad> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin load: {e}")))?;

        reset_schema(&mut *tx, schema).await?;

        sqlx::query(
            "CREATE TEMP TABLE similar_staging (
                asin VARCHAR(20) NOT NULL,
                similar_asin VARCHAR(20) NOT NULL
            ) ON COMMIT DROP",
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create staging table: {e}")))?;

        Ok(CatalogLoad { tx })
    }
}

/// The single transaction a catalog load runs in. Foreign keys are checked
/// when it commits.
pub struct CatalogLoad {
    tx: Transaction<'static, Postgres>,
}

impl CatalogLoad {
    pub async fn insert_batch(&mut self, batch: &CatalogBatch) -> Result<BatchCounts> {
        let mut counts = BatchCounts {
            duplicate_products: batch.duplicates,
            ..BatchCounts::default()
        };

        for chunk in batch.products.chunks(rows_per_statement(9)) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO product (asin, source_id, title, product_group, salesrank, \
                 total_reviews, downloaded_reviews, avg_rating, discontinued) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.asin.clone())
                    .push_bind(row.source_id)
                    .push_bind(row.title.clone())
                    .push_bind(row.product_group.clone())
                    .push_bind(row.salesrank)
                    .push_bind(row.total_reviews)
                    .push_bind(row.downloaded_reviews)
                    .push_bind(row.avg_rating)
                    .push_bind(row.discontinued);
            });
            qb.push(" ON CONFLICT (asin) DO NOTHING");
            let inserted = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert products: {e}")))?
                .rows_affected();
            counts.products += inserted;
            counts.duplicate_products += chunk.len() as u64 - inserted;
        }

        for chunk in batch.categories.chunks(rows_per_statement(3)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO category (category_id, name, parent_id) ");
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.category_id)
                    .push_bind(row.name.clone())
                    .push_bind(row.parent_id);
            });
            qb.push(" ON CONFLICT (category_id) DO NOTHING");
            counts.categories += qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert categories: {e}")))?
                .rows_affected();
        }

        for chunk in batch.customers.chunks(rows_per_statement(1)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO customer (customer_id) ");
            qb.push_values(chunk, |mut b, customer_id| {
                b.push_bind(customer_id.clone());
            });
            qb.push(" ON CONFLICT (customer_id) DO NOTHING");
            counts.customers += qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert customers: {e}")))?
                .rows_affected();
        }

        for chunk in batch.links.chunks(rows_per_statement(2)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO product_category (asin, category_id) ");
            qb.push_values(chunk, |mut b, (asin, category_id)| {
                b.push_bind(asin.clone()).push_bind(*category_id);
            });
            qb.push(" ON CONFLICT (asin, category_id) DO NOTHING");
            counts.links += qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to insert product categories: {e}"))
                })?
                .rows_affected();
        }

        for chunk in batch.reviews.chunks(rows_per_statement(6)) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO review (asin, customer_id, review_date, rating, votes, helpful) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.asin.clone())
                    .push_bind(row.customer_id.clone())
                    .push_bind(row.review_date)
                    .push_bind(row.rating)
                    .push_bind(row.votes)
                    .push_bind(row.helpful);
            });
            qb.push(" ON CONFLICT ON CONSTRAINT review_identity DO NOTHING");
            let inserted = qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to insert reviews: {e}")))?
                .rows_affected();
            counts.reviews += inserted;
            counts.duplicate_reviews += chunk.len() as u64 - inserted;
        }

        for chunk in batch.similar.chunks(rows_per_statement(2)) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new("INSERT INTO similar_staging (asin, similar_asin) ");
            qb.push_values(chunk, |mut b, (asin, similar_asin)| {
                b.push_bind(asin.clone()).push_bind(similar_asin.clone());
            });
            counts.similar_staged += qb
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to stage similar edges: {e}")))?
                .rows_affected();
        }

        Ok(counts)
    }

    /// Move staged edges whose target is a loaded product into `product_similar`.
    /// Edges pointing outside the catalog are dropped.
    pub async fn resolve_similar(&mut self) -> Result<SimilarResolution> {
        let dropped: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM (SELECT DISTINCT asin, similar_asin FROM similar_staging) s \
             WHERE NOT EXISTS (SELECT 1 FROM product p WHERE p.asin = s.similar_asin)",
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count dangling edges: {e}")))?;

        let kept = sqlx::query(
            "INSERT INTO product_similar (asin, similar_asin) \
             SELECT DISTINCT s.asin, s.similar_asin FROM similar_staging s \
             WHERE EXISTS (SELECT 1 FROM product p WHERE p.asin = s.similar_asin) \
             ON CONFLICT (asin, similar_asin) DO NOTHING",
        )
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to resolve similar edges: {e}")))?
        .rows_affected();

        Ok(SimilarResolution {
            kept,
            dropped: dropped as u64,
        })
    }

    /// Commit; deferred foreign-key violations surface here.
    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to commit catalog load: {e}")))
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to roll back catalog load: {e}")))
    }
}
