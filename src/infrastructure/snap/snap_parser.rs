// ============================================================
// SNAP METADATA PARSER
// ============================================================
// Streams product blocks out of the SNAP `amazon-meta.txt` layout

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use flate2::read::MultiGzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::catalog::{
    is_valid_asin, CategoryNode, CategoryPath, ProductRecord, ReviewEntry, ReviewSummary,
};
use crate::domain::error::{AppError, Result};

static REVIEW_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid date pattern"));

/// Counters for everything the parser tolerated instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// `Total items:` from the file header, when present.
    pub declared_items: Option<u64>,
    pub records_read: u64,
    pub records_skipped: u64,
    pub reviews_skipped: u64,
    pub malformed_fields: u64,
}

/// Open a dataset file, transparently decompressing `.gz` inputs.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| {
        AppError::IoError(format!("Failed to open {}: {}", path.display(), e))
    })?;

    let gzipped = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::with_capacity(1 << 16, file)))
    }
}

/// Streaming reader yielding one [`ProductRecord`] per `Id:` block.
pub struct SnapReader<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    line_no: u64,
    current: Option<RecordBuilder>,
    stats: ParseStats,
    finished: bool,
}

impl<R: BufRead> SnapReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(256),
            line_no: 0,
            current: None,
            stats: ParseStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buffer)
            .map_err(|e| {
                AppError::IoError(format!("Failed to read line {}: {}", self.line_no + 1, e))
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }

    fn finish_current(&mut self) -> Option<ProductRecord> {
        let builder = self.current.take()?;
        self.stats.records_read += 1;
        match builder.build() {
            Some(record) => Some(record),
            None => {
                self.stats.records_skipped += 1;
                None
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Option<ProductRecord> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(rest) = line.strip_prefix("Id:") {
            let finished = self.finish_current();
            let source_id = rest.trim().parse::<i32>().ok();
            if source_id.is_none() {
                self.stats.malformed_fields += 1;
                debug!(line = self.line_no, "unparseable record id");
            }
            self.current = Some(RecordBuilder::new(source_id, self.line_no));
            return finished;
        }

        let Some(builder) = self.current.as_mut() else {
            if let Some(rest) = line.strip_prefix("Total items:") {
                self.stats.declared_items = rest.trim().parse().ok();
            }
            return None;
        };

        let outcome = builder.apply(line);
        self.stats.malformed_fields += outcome.malformed;
        self.stats.reviews_skipped += outcome.reviews_skipped;
        if outcome.malformed > 0 || outcome.reviews_skipped > 0 {
            debug!(line = self.line_no, content = %line, "tolerated malformed input");
        }
        None
    }
}

impl<R: BufRead> Iterator for SnapReader<R> {
    type Item = Result<ProductRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.read_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.finished = true;
                    return self.finish_current().map(Ok);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            if let Some(record) = self.handle_line(&line) {
                return Some(Ok(record));
            }
        }
    }
}

#[derive(Debug, Default)]
struct LineOutcome {
    malformed: u64,
    reviews_skipped: u64,
}

impl LineOutcome {
    fn malformed() -> Self {
        Self {
            malformed: 1,
            reviews_skipped: 0,
        }
    }

    fn skipped_review() -> Self {
        Self {
            malformed: 0,
            reviews_skipped: 1,
        }
    }
}

struct RecordBuilder {
    started_at: u64,
    record: ProductRecord,
    asin: Option<String>,
}

impl RecordBuilder {
    fn new(source_id: Option<i32>, started_at: u64) -> Self {
        Self {
            started_at,
            record: ProductRecord {
                source_id,
                ..ProductRecord::default()
            },
            asin: None,
        }
    }

    fn build(self) -> Option<ProductRecord> {
        match self.asin {
            Some(asin) => Some(ProductRecord {
                asin,
                ..self.record
            }),
            None => {
                warn!(
                    line = self.started_at,
                    source_id = ?self.record.source_id,
                    "skipping record without a valid ASIN"
                );
                None
            }
        }
    }

    fn apply(&mut self, line: &str) -> LineOutcome {
        if line.starts_with('|') {
            return match parse_category_path(line) {
                Some(path) => {
                    self.record.categories.push(path);
                    LineOutcome::default()
                }
                None => LineOutcome::malformed(),
            };
        }

        if line.eq_ignore_ascii_case("discontinued product") {
            self.record.discontinued = true;
            return LineOutcome::default();
        }

        let first = line.split_whitespace().next().unwrap_or("");
        if REVIEW_DATE.is_match(first) {
            return match parse_review(line) {
                Some(review) => {
                    self.record.reviews.push(review);
                    LineOutcome::default()
                }
                None => LineOutcome::skipped_review(),
            };
        }

        let Some((key, value)) = line.split_once(':') else {
            return LineOutcome::malformed();
        };
        let value = value.trim();

        match key.trim() {
            "ASIN" => {
                if is_valid_asin(value) {
                    self.asin = Some(value.to_string());
                    LineOutcome::default()
                } else {
                    LineOutcome::malformed()
                }
            }
            "title" => {
                self.record.title = non_empty(value);
                LineOutcome::default()
            }
            "group" => {
                self.record.group = non_empty(value);
                LineOutcome::default()
            }
            "salesrank" => {
                self.record.salesrank = value.parse().ok();
                if self.record.salesrank.is_none() {
                    LineOutcome::malformed()
                } else {
                    LineOutcome::default()
                }
            }
            "similar" => {
                let mut tokens = value.split_whitespace();
                let _declared = tokens.next();
                let mut outcome = LineOutcome::default();
                for token in tokens {
                    if is_valid_asin(token) {
                        self.record.similar.push(token.to_string());
                    } else {
                        outcome.malformed += 1;
                    }
                }
                outcome
            }
            // Paths follow on their own lines; the declared count is not trusted.
            "categories" => LineOutcome::default(),
            "reviews" => {
                let (summary, malformed) = parse_review_summary(value);
                self.record.review_summary = summary;
                LineOutcome {
                    malformed,
                    reviews_skipped: 0,
                }
            }
            _ => LineOutcome::malformed(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Pairs every `key:` token with the token that follows it.
fn labelled_values(text: &str) -> Vec<(&str, &str)> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut pairs = Vec::new();
    let mut idx = 0;
    while idx < tokens.len() {
        if let Some(key) = tokens[idx].strip_suffix(':') {
            if let Some(value) = tokens.get(idx + 1) {
                pairs.push((key, *value));
                idx += 2;
                continue;
            }
        }
        idx += 1;
    }
    pairs
}

fn parse_review_summary(text: &str) -> (ReviewSummary, u64) {
    let mut summary = ReviewSummary::default();
    let mut malformed = 0;

    for (key, value) in labelled_values(text) {
        match key {
            "total" => summary.total = value.parse().ok(),
            "downloaded" => summary.downloaded = value.parse().ok(),
            "rating" => summary.avg_rating = value.parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => continue,
        }
    }

    malformed += summary.total.is_none() as u64;
    malformed += summary.downloaded.is_none() as u64;
    malformed += summary.avg_rating.is_none() as u64;
    (summary, malformed)
}

/// Parse `|Books[283155]|Subjects[1000]|...`. Segment names may contain
/// brackets or be empty; the id is always the last bracketed number.
pub(crate) fn parse_category_path(line: &str) -> Option<CategoryPath> {
    let body = line.trim().strip_prefix('|')?;
    let raw_segments: Vec<&str> = body.split("]|").collect();
    let last = raw_segments.len() - 1;

    let mut nodes = Vec::with_capacity(raw_segments.len());
    for (idx, raw) in raw_segments.into_iter().enumerate() {
        let segment = if idx == last {
            raw.strip_suffix(']')?
        } else {
            raw
        };
        let open = segment.rfind('[')?;
        let id = segment[open + 1..].trim().parse::<i32>().ok()?;
        nodes.push(CategoryNode {
            id,
            name: segment[..open].to_string(),
        });
    }

    if nodes.is_empty() {
        None
    } else {
        Some(CategoryPath::new(nodes))
    }
}

/// Parse `2000-7-28  cutomer: A2JW67OY8U6HHK  rating: 5  votes:  10  helpful:   9`.
/// Returns `None` when the date or the customer cannot be recovered.
pub(crate) fn parse_review(line: &str) -> Option<ReviewEntry> {
    let first = line.split_whitespace().next()?;
    let caps = REVIEW_DATE.captures(first)?;
    let date = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;

    let mut customer_id = None;
    let mut rating = None;
    let mut votes = None;
    let mut helpful = None;

    for (key, value) in labelled_values(line) {
        match key {
            "cutomer" | "customer" => customer_id = Some(value.to_string()),
            "rating" => rating = value.parse::<i16>().ok().filter(|r| (1..=5).contains(r)),
            "votes" => votes = value.parse::<i32>().ok().filter(|v| *v >= 0),
            "helpful" => helpful = value.parse::<i32>().ok().filter(|v| *v >= 0),
            _ => {}
        }
    }

    Some(ReviewEntry {
        date,
        customer_id: customer_id.filter(|c| !c.is_empty())?,
        rating,
        votes,
        helpful,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const SAMPLE: &str = "# Full information about Amazon Share the Love products
Total items: 3

Id:   0
ASIN: 0771044445
  discontinued product

Id:   1
ASIN: 0827229534
  title: Patterns of Preaching: A Sermon Sampler
  group: Book
  salesrank: 396585
  similar: 5  0804215715  156101074X  0687023955  0687074231  082721619X
  categories: 2
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]|Christianity[12290]|Clergy[12360]|Preaching[12368]
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]|Christianity[12290]|Clergy[12360]|Sermons[12370]
  reviews: total: 2  downloaded: 2  avg rating: 5
    2000-7-28  cutomer: A2JW67OY8U6HHK  rating: 5  votes:  10  helpful:   9
    2003-12-14  cutomer: A2VE83MZF98ITY  rating: 5  votes:   6  helpful:   5

Id:   2
ASIN: 0738700797
  title: Candlemas: Feast of Flames
  group: Book
  salesrank: 168596
  similar: 0
  categories: 1
   |Books[283155]|Subjects[1000]|Religion & Spirituality[22]|Earth-Based Religions[12472]|Wicca[12484]
  reviews: total: 12  downloaded: 1  avg rating: 4.5
    2001-12-16  cutomer: A11NCO6YTE4BTJ  rating: 5  votes:   5  helpful:   4
";

    fn parse_all(content: &str) -> (Vec<ProductRecord>, ParseStats) {
        let mut reader = SnapReader::new(Cursor::new(content.as_bytes().to_vec()));
        let records: Vec<ProductRecord> = reader.by_ref().map(|r| r.unwrap()).collect();
        (records, reader.stats().clone())
    }

    #[test]
    fn test_parse_sample_blocks() {
        let (records, stats) = parse_all(SAMPLE);

        assert_eq!(records.len(), 3);
        assert_eq!(stats.declared_items, Some(3));
        assert_eq!(stats.records_read, 3);
        assert_eq!(stats.records_skipped, 0);

        let discontinued = &records[0];
        assert_eq!(discontinued.asin, "0771044445");
        assert_eq!(discontinued.source_id, Some(0));
        assert!(discontinued.discontinued);
        assert!(discontinued.title.is_none());
        assert!(discontinued.salesrank.is_none());

        let preaching = &records[1];
        assert_eq!(preaching.title.as_deref(), Some("Patterns of Preaching: A Sermon Sampler"));
        assert_eq!(preaching.group.as_deref(), Some("Book"));
        assert_eq!(preaching.salesrank, Some(396585));
        assert_eq!(preaching.similar.len(), 5);
        assert_eq!(preaching.similar[1], "156101074X");
        assert_eq!(preaching.categories.len(), 2);
        assert_eq!(preaching.categories[0].leaf().map(|n| n.id), Some(12368));
        assert_eq!(preaching.review_summary.total, Some(2));
        assert_eq!(preaching.review_summary.avg_rating, Some(5.0));
        assert_eq!(preaching.reviews.len(), 2);
        assert_eq!(
            preaching.reviews[0].date,
            NaiveDate::from_ymd_opt(2000, 7, 28).unwrap()
        );
        assert_eq!(preaching.reviews[0].customer_id, "A2JW67OY8U6HHK");
        assert_eq!(preaching.reviews[0].votes, Some(10));
        assert_eq!(preaching.reviews[0].helpful, Some(9));

        let candlemas = &records[2];
        assert!(candlemas.similar.is_empty());
        assert_eq!(candlemas.review_summary.downloaded, Some(1));
        assert_eq!(candlemas.review_summary.avg_rating, Some(4.5));
    }

    #[test]
    fn test_malformed_optional_fields_become_none() {
        let content = "Id: 7
ASIN: 1559362022
  title: Wake Up and Smell the Coffee
  group: Book
  salesrank: n/a
  reviews: total: ?  downloaded: 0  avg rating: 0
";
        let (records, stats) = parse_all(content);

        assert_eq!(records.len(), 1);
        assert!(records[0].salesrank.is_none());
        assert!(records[0].review_summary.total.is_none());
        assert_eq!(records[0].review_summary.downloaded, Some(0));
        assert_eq!(stats.malformed_fields, 2);
    }

    #[test]
    fn test_missing_salesrank_line() {
        let content = "Id: 9\nASIN: B000067D0Y\n  title: Dead Ringers\n  group: DVD\n";
        let (records, _) = parse_all(content);
        assert_eq!(records.len(), 1);
        assert!(records[0].salesrank.is_none());
        assert_eq!(records[0].group.as_deref(), Some("DVD"));
    }

    #[test]
    fn test_record_without_asin_is_skipped() {
        let content = "Id: 1\n  title: Orphan\n\nId: 2\nASIN: 0738700797\n";
        let (records, stats) = parse_all(content);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].asin, "0738700797");
        assert_eq!(stats.records_read, 2);
        assert_eq!(stats.records_skipped, 1);
    }

    #[test]
    fn test_review_spellings_and_missing_fields() {
        let review = parse_review("2004-1-5  customer: ABC123  rating: 3  votes: 1  helpful: 0")
            .unwrap();
        assert_eq!(review.customer_id, "ABC123");
        assert_eq!(review.rating, Some(3));
        assert_eq!(review.helpful, Some(0));

        let review = parse_review("2004-1-5  cutomer: ABC123  rating: 9  votes: -1").unwrap();
        assert_eq!(review.rating, None);
        assert_eq!(review.votes, None);
        assert_eq!(review.helpful, None);

        assert!(parse_review("2004-1-5  rating: 5  votes: 1  helpful: 1").is_none());
        assert!(parse_review("2004-2-31  cutomer: ABC123  rating: 5").is_none());
    }

    #[test]
    fn test_bad_review_line_is_counted_not_fatal() {
        let content = "Id: 1
ASIN: 0827229534
  reviews: total: 2  downloaded: 2  avg rating: 5
    2000-13-28  cutomer: A2JW67OY8U6HHK  rating: 5  votes:  10  helpful:   9
    2003-12-14  cutomer: A2VE83MZF98ITY  rating: 5  votes:   6  helpful:   5
";
        let (records, stats) = parse_all(content);
        assert_eq!(records[0].reviews.len(), 1);
        assert_eq!(stats.reviews_skipped, 1);
    }

    #[test]
    fn test_category_names_with_brackets_and_pipes() {
        let path = parse_category_path("|Music[5174]|Styles[301668]|Rock [Live][40]|a|b[99]").unwrap();
        let ids: Vec<i32> = path.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![5174, 301668, 40, 99]);
        assert_eq!(path.nodes[2].name, "Rock [Live]");
        assert_eq!(path.nodes[3].name, "a|b");

        let empty_name = parse_category_path("|[265523]|Amazon.com Stores[285080]").unwrap();
        assert_eq!(empty_name.nodes[0].name, "");

        assert!(parse_category_path("|Books[abc]").is_none());
        assert!(parse_category_path("|Books").is_none());
    }

    #[test]
    fn test_gzip_input() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amazon-meta.txt.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let reader = SnapReader::new(open_input(&path).unwrap());
        let asins: Vec<String> = reader.map(|r| r.unwrap().asin).collect();
        assert_eq!(asins, vec!["0771044445", "0827229534", "0738700797"]);
    }

    #[test]
    fn test_missing_input_file() {
        let err = match open_input(Path::new("/definitely/not/here.txt")) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, AppError::IoError(_)));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut bytes = b"Id: 1\nASIN: 0827229534\n  title: Caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b" Society\n");
        let mut reader = SnapReader::new(Cursor::new(bytes));
        let record = reader.next().unwrap().unwrap();
        assert!(record.title.unwrap().starts_with("Caf"));
    }
}
