use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Longest identifier accepted as an ASIN. Real ASINs are 10 characters.
pub const MAX_ASIN_LEN: usize = 20;

/// Returns true when `value` looks like an ASIN (non-empty ASCII alphanumeric).
pub fn is_valid_asin(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ASIN_LEN
        && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// One product block of the SNAP metadata file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub source_id: Option<i32>,
    pub asin: String,
    pub title: Option<String>,
    pub group: Option<String>,
    pub salesrank: Option<i32>,
    pub similar: Vec<String>,
    pub categories: Vec<CategoryPath>,
    pub review_summary: ReviewSummary,
    pub reviews: Vec<ReviewEntry>,
    pub discontinued: bool,
}

/// The `reviews:` header line of a product block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total: Option<i32>,
    pub downloaded: Option<i32>,
    pub avg_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: i32,
    pub name: String,
}

/// A root-to-leaf category path such as `|Books[283155]|Subjects[1000]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPath {
    pub nodes: Vec<CategoryNode>,
}

impl CategoryPath {
    pub fn new(nodes: Vec<CategoryNode>) -> Self {
        Self { nodes }
    }

    pub fn leaf(&self) -> Option<&CategoryNode> {
        self.nodes.last()
    }

    /// Each node paired with its parent id; the first node is a root.
    pub fn with_parents(&self) -> impl Iterator<Item = (&CategoryNode, Option<i32>)> {
        self.nodes.iter().enumerate().map(move |(idx, node)| {
            let parent = idx.checked_sub(1).map(|p| self.nodes[p].id);
            (node, parent)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub date: NaiveDate,
    pub customer_id: String,
    pub rating: Option<i16>,
    pub votes: Option<i32>,
    pub helpful: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i32, name: &str) -> CategoryNode {
        CategoryNode {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_valid_asin() {
        assert!(is_valid_asin("0827229534"));
        assert!(is_valid_asin("B00004R99S"));
        assert!(!is_valid_asin(""));
        assert!(!is_valid_asin("0827-29534"));
        assert!(!is_valid_asin(&"A".repeat(MAX_ASIN_LEN + 1)));
    }

    #[test]
    fn test_category_path_parents() {
        let path = CategoryPath::new(vec![
            node(283155, "Books"),
            node(1000, "Subjects"),
            node(22, "Religion & Spirituality"),
        ]);

        let pairs: Vec<(i32, Option<i32>)> =
            path.with_parents().map(|(n, parent)| (n.id, parent)).collect();
        assert_eq!(pairs, vec![(283155, None), (1000, Some(283155)), (22, Some(1000))]);
        assert_eq!(path.leaf().map(|n| n.id), Some(22));
    }

    #[test]
    fn test_empty_path_has_no_leaf() {
        let path = CategoryPath::default();
        assert!(path.is_empty());
        assert!(path.leaf().is_none());
        assert_eq!(path.with_parents().count(), 0);
    }
}
