use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductOverview {
    pub asin: String,
    pub source_id: Option<i32>,
    pub title: Option<String>,
    pub product_group: Option<String>,
    pub salesrank: Option<i32>,
    pub total_reviews: Option<i32>,
    pub downloaded_reviews: Option<i32>,
    pub avg_rating: Option<f64>,
    pub discontinued: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarProduct {
    pub asin: String,
    pub similar_asin: String,
    pub title: Option<String>,
    pub product_group: Option<String>,
    pub salesrank: Option<i32>,
}

/// Which end of the rating scale a highlighted review was picked from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewBucket {
    #[default]
    Highest,
    Lowest,
}

impl ReviewBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewBucket::Highest => "highest",
            ReviewBucket::Lowest => "lowest",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "highest" => Some(ReviewBucket::Highest),
            "lowest" => Some(ReviewBucket::Lowest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewHighlight {
    pub bucket: ReviewBucket,
    pub review_date: NaiveDate,
    pub customer_id: String,
    pub rating: Option<i16>,
    pub votes: Option<i32>,
    pub helpful: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingPoint {
    pub review_date: NaiveDate,
    pub reviews: i64,
    pub daily_avg: Option<f64>,
    pub running_avg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryLineage {
    pub category_id: i32,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCount {
    pub table_name: String,
    pub rows: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSalesLeader {
    pub product_group: String,
    pub rank: i64,
    pub asin: String,
    pub title: Option<String>,
    pub salesrank: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelpfulProduct {
    pub asin: String,
    pub title: Option<String>,
    pub avg_helpful: f64,
    pub positive_reviews: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelpfulCategory {
    pub category_id: i32,
    pub name: String,
    pub avg_helpful: f64,
    pub products: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTopCustomer {
    pub product_group: String,
    pub rank: i64,
    pub customer_id: String,
    pub reviews: i64,
}

/// Manifest entry written for every rendered report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFile {
    pub name: String,
    pub file: String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardManifest {
    pub product_asin: Option<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub reports: Vec<ReportFile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_bucket_round_trip_names() {
        assert_eq!(ReviewBucket::parse("highest"), Some(ReviewBucket::Highest));
        assert_eq!(ReviewBucket::Lowest.as_str(), "lowest");
        assert_eq!(ReviewBucket::parse("middle"), None);
    }

    #[test]
    fn test_review_bucket_serializes_snake_case() {
        let json = serde_json::to_string(&ReviewBucket::Highest).unwrap();
        assert_eq!(json, "\"highest\"");
    }
}
