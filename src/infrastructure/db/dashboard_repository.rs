use chrono::NaiveDate;
use sqlx::postgres::PgPool;

use crate::domain::dashboard::{
    CategoryLineage, GroupSalesLeader, GroupTopCustomer, HelpfulCategory, HelpfulProduct,
    ProductOverview, RatingPoint, ReviewBucket, ReviewHighlight, SimilarProduct, TableCount,
};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::db::schema::CATALOG_TABLES;

/// Ancestor walks stop here even if the category tree contains a cycle.
pub const MAX_CATEGORY_DEPTH: i32 = 64;

/// Read-only queries behind the dashboard reports.
pub struct DashboardRepository {
    pool: PgPool,
}

impl DashboardRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    pub async fn product_overview(&self, asin: &str) -> Result<Option<ProductOverview>> {
        let row = sqlx::query_as::<_, ProductOverviewEntity>(
            "SELECT asin, source_id, title, product_group, salesrank, total_reviews, \
             downloaded_reviews, avg_rating, discontinued FROM product WHERE asin = $1",
        )
        .bind(asin)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch product {asin}: {e}")))?;

        Ok(row.map(Into::into))
    }

    /// Every `product_similar` row of `asin`, joined to the similar product.
    pub async fn similar_products(&self, asin: &str) -> Result<Vec<SimilarProduct>> {
        let rows = sqlx::query_as::<_, SimilarProductEntity>(
            "SELECT s.asin, s.similar_asin, p.title, p.product_group, p.salesrank \
             FROM product_similar s \
             JOIN product p ON p.asin = s.similar_asin \
             WHERE s.asin = $1 \
             ORDER BY p.salesrank ASC NULLS LAST, s.similar_asin",
        )
        .bind(asin)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list similar products: {e}")))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Similar products with a better (lower, positive) sales rank than `asin`.
    /// An unranked target is outsold by every ranked similar product.
    pub async fn similar_better_sales(&self, asin: &str) -> Result<Vec<SimilarProduct>> {
        let rows = sqlx::query_as::<_, SimilarProductEntity>(
            "SELECT s.asin, s.similar_asin, p.title, p.product_group, p.salesrank \
             FROM product_similar s \
             JOIN product p ON p.asin = s.similar_asin \
             JOIN product t ON t.asin = s.asin \
             WHERE s.asin = $1 \
               AND p.salesrank > 0 \
               AND (t.salesrank IS NULL OR t.salesrank <= 0 OR p.salesrank < t.salesrank) \
             ORDER BY p.salesrank ASC, s.similar_asin",
        )
        .bind(asin)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!("Failed to list better-selling similar products: {e}"))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The most helpful reviews at the top and at the bottom of the rating scale.
    pub async fn top_reviews(&self, asin: &str, limit: i64) -> Result<Vec<ReviewHighlight>> {
        let rows = sqlx::query_as::<_, ReviewHighlightEntity>(
            "(SELECT 'highest'::text AS bucket, review_date, customer_id, rating, votes, helpful \
              FROM review WHERE asin = $1 AND rating IS NOT NULL \
              ORDER BY rating DESC, helpful DESC NULLS LAST, review_date LIMIT $2) \
             UNION ALL \
             (SELECT 'lowest'::text AS bucket, review_date, customer_id, rating, votes, helpful \
              FROM review WHERE asin = $1 AND rating IS NOT NULL \
              ORDER BY rating ASC, helpful DESC NULLS LAST, review_date LIMIT $2)",
        )
        .bind(asin)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to fetch top reviews: {e}")))?;

        rows.into_iter()
            .map(|row| {
                let bucket = ReviewBucket::parse(&row.bucket).ok_or_else(|| {
                    AppError::ParseError(format!("Unexpected review bucket: {}", row.bucket))
                })?;
                Ok(ReviewHighlight {
                    bucket,
                    review_date: row.review_date,
                    customer_id: row.customer_id,
                    rating: row.rating,
                    votes: row.votes,
                    helpful: row.helpful,
                })
            })
            .collect()
    }

    /// Daily and running average rating over the review history of `asin`.
    pub async fn rating_evolution(&self, asin: &str) -> Result<Vec<RatingPoint>> {
        let rows = sqlx::query_as::<_, RatingPointEntity>(
            "SELECT review_date, \
                    COUNT(*) AS reviews, \
                    AVG(rating)::float8 AS daily_avg, \
                    (SUM(SUM(rating)) OVER w / NULLIF(SUM(COUNT(rating)) OVER w, 0))::float8 \
                        AS running_avg \
             FROM review \
             WHERE asin = $1 \
             GROUP BY review_date \
             WINDOW w AS (ORDER BY review_date) \
             ORDER BY review_date",
        )
        .bind(asin)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to compute rating evolution: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| RatingPoint {
                review_date: row.review_date,
                reviews: row.reviews,
                daily_avg: row.daily_avg,
                running_avg: row.running_avg,
            })
            .collect())
    }

    /// Root-to-leaf path of every category linked to `asin`.
    pub async fn product_categories(&self, asin: &str) -> Result<Vec<CategoryLineage>> {
        let rows: Vec<(i32, String)> = sqlx::query_as(
            "WITH RECURSIVE lineage AS ( \
                 SELECT pc.category_id AS leaf_id, c.category_id, c.name, c.parent_id, 0 AS depth \
                 FROM product_category pc \
                 JOIN category c ON c.category_id = pc.category_id \
                 WHERE pc.asin = $1 \
               UNION ALL \
                 SELECT l.leaf_id, p.category_id, p.name, p.parent_id, l.depth + 1 \
                 FROM lineage l \
                 JOIN category p ON p.category_id = l.parent_id \
                 WHERE l.depth < $2 \
             ) \
             SELECT leaf_id, \
                    '|' || string_agg(name || '[' || category_id || ']', '|' ORDER BY depth DESC) \
             FROM lineage \
             GROUP BY leaf_id \
             ORDER BY leaf_id",
        )
        .bind(asin)
        .bind(MAX_CATEGORY_DEPTH)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to walk product categories: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(category_id, path)| CategoryLineage { category_id, path })
            .collect())
    }

    pub async fn table_counts(&self) -> Result<Vec<TableCount>> {
        let mut counts = Vec::with_capacity(CATALOG_TABLES.len());
        for table in CATALOG_TABLES.iter().rev() {
            let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to count {table}: {e}")))?;
            counts.push(TableCount {
                table_name: table.to_string(),
                rows,
            });
        }
        Ok(counts)
    }

    /// Best sales ranks per product group.
    pub async fn group_sales_leaders(&self, limit: i64) -> Result<Vec<GroupSalesLeader>> {
        let rows = sqlx::query_as::<_, GroupSalesLeaderEntity>(
            "SELECT product_group, rank, asin, title, salesrank FROM ( \
                 SELECT product_group, asin, title, salesrank, \
                        ROW_NUMBER() OVER (PARTITION BY product_group \
                                           ORDER BY salesrank ASC, asin) AS rank \
                 FROM product \
                 WHERE product_group IS NOT NULL AND salesrank > 0 \
             ) ranked \
             WHERE rank <= $1 \
             ORDER BY product_group, rank",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to rank group sales: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| GroupSalesLeader {
                product_group: row.product_group,
                rank: row.rank,
                asin: row.asin,
                title: row.title,
                salesrank: row.salesrank,
            })
            .collect())
    }

    /// Products whose positive (rating >= 4) reviews collect the most helpful votes on average.
    pub async fn top_helpful_products(&self, limit: i64) -> Result<Vec<HelpfulProduct>> {
        let rows = sqlx::query_as::<_, HelpfulProductEntity>(
            "SELECT r.asin, p.title, AVG(r.helpful)::float8 AS avg_helpful, \
                    COUNT(*) AS positive_reviews \
             FROM review r \
             JOIN product p ON p.asin = r.asin \
             WHERE r.rating >= 4 AND r.helpful IS NOT NULL \
             GROUP BY r.asin, p.title \
             ORDER BY avg_helpful DESC, positive_reviews DESC, r.asin \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to rank helpful products: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| HelpfulProduct {
                asin: row.asin,
                title: row.title,
                avg_helpful: row.avg_helpful,
                positive_reviews: row.positive_reviews,
            })
            .collect())
    }

    /// Categories ranked by the mean of their products' positive-review helpfulness.
    pub async fn top_helpful_categories(&self, limit: i64) -> Result<Vec<HelpfulCategory>> {
        let rows = sqlx::query_as::<_, HelpfulCategoryEntity>(
            "WITH product_score AS ( \
                 SELECT asin, AVG(helpful)::float8 AS avg_helpful \
                 FROM review \
                 WHERE rating >= 4 AND helpful IS NOT NULL \
                 GROUP BY asin \
             ) \
             SELECT c.category_id, c.name, AVG(ps.avg_helpful)::float8 AS avg_helpful, \
                    COUNT(*) AS products \
             FROM product_category pc \
             JOIN category c ON c.category_id = pc.category_id \
             JOIN product_score ps ON ps.asin = pc.asin \
             GROUP BY c.category_id, c.name \
             ORDER BY avg_helpful DESC, products DESC, c.category_id \
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to rank helpful categories: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| HelpfulCategory {
                category_id: row.category_id,
                name: row.name,
                avg_helpful: row.avg_helpful,
                products: row.products,
            })
            .collect())
    }

    /// Customers with the most reviews in each product group.
    pub async fn top_customers_by_group(&self, limit: i64) -> Result<Vec<GroupTopCustomer>> {
        let rows = sqlx::query_as::<_, GroupTopCustomerEntity>(
            "SELECT product_group, rank, customer_id, reviews FROM ( \
                 SELECT p.product_group, r.customer_id, COUNT(*) AS reviews, \
                        ROW_NUMBER() OVER (PARTITION BY p.product_group \
                                           ORDER BY COUNT(*) DESC, r.customer_id) AS rank \
                 FROM review r \
                 JOIN product p ON p.asin = r.asin \
                 WHERE p.product_group IS NOT NULL \
                 GROUP BY p.product_group, r.customer_id \
             ) ranked \
             WHERE rank <= $1 \
             ORDER BY product_group, rank",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to rank customers: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| GroupTopCustomer {
                product_group: row.product_group,
                rank: row.rank,
                customer_id: row.customer_id,
                reviews: row.reviews,
            })
            .collect())
    }
}

// Internal entities for database mapping

#[derive(sqlx::FromRow)]
struct ProductOverviewEntity {
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

impl From<ProductOverviewEntity> for ProductOverview {
    fn from(e: ProductOverviewEntity) -> Self {
        Self {
            asin: e.asin,
            source_id: e.source_id,
            title: e.title,
            product_group: e.product_group,
            salesrank: e.salesrank,
            total_reviews: e.total_reviews,
            downloaded_reviews: e.downloaded_reviews,
            avg_rating: e.avg_rating,
            discontinued: e.discontinued,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SimilarProductEntity {
    asin: String,
    similar_asin: String,
    title: Option<String>,
    product_group: Option<String>,
    salesrank: Option<i32>,
}

impl From<SimilarProductEntity> for SimilarProduct {
    fn from(e: SimilarProductEntity) -> Self {
        Self {
            asin: e.asin,
            similar_asin: e.similar_asin,
            title: e.title,
            product_group: e.product_group,
            salesrank: e.salesrank,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewHighlightEntity {
    bucket: String,
    review_date: NaiveDate,
    customer_id: String,
    rating: Option<i16>,
    votes: Option<i32>,
    helpful: Option<i32>,
}

#[derive(sqlx::FromRow)]
struct RatingPointEntity {
    review_date: NaiveDate,
    reviews: i64,
    daily_avg: Option<f64>,
    running_avg: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct GroupSalesLeaderEntity {
    product_group: String,
    rank: i64,
    asin: String,
    title: Option<String>,
    salesrank: i32,
}

#[derive(sqlx::FromRow)]
struct HelpfulProductEntity {
    asin: String,
    title: Option<String>,
    avg_helpful: f64,
    positive_reviews: i64,
}

#[derive(sqlx::FromRow)]
struct HelpfulCategoryEntity {
    category_id: i32,
    name: String,
    avg_helpful: f64,
    products: i64,
}

#[derive(sqlx::FromRow)]
struct GroupTopCustomerEntity {
    product_group: String,
    rank: i64,
    customer_id: String,
    reviews: i64,
}
