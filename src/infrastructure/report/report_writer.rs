// ============================================================
// REPORT WRITER
// ============================================================
// CSV files, the JSON manifest and console tables for dashboard reports

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::Serialize;

use crate::domain::dashboard::{DashboardManifest, ReportFile};
use crate::domain::error::{AppError, Result};

pub const MANIFEST_FILE: &str = "dashboard.json";

/// Widest a console cell may get before it is cut with an ellipsis.
const MAX_CELL_WIDTH: usize = 48;

pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    /// Create the output directory if needed.
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir).map_err(|e| {
            AppError::IoError(format!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `rows` to `<name>.csv`. The header comes from the row's field
    /// names, so an empty report still carries it.
    pub fn write_csv<T: Serialize + Default>(&self, name: &str, rows: &[T]) -> Result<ReportFile> {
        let file_name = format!("{name}.csv");
        let path = self.output_dir.join(&file_name);
        let file = File::create(&path).map_err(|e| {
            AppError::IoError(format!("Failed to create {}: {}", path.display(), e))
        })?;

        let mut writer = WriterBuilder::new().from_writer(BufWriter::new(file));
        if rows.is_empty() {
            writer
                .write_record(&header_of::<T>()?)
                .map_err(|e| AppError::IoError(format!("Failed to write {file_name}: {e}")))?;
        }
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| AppError::IoError(format!("Failed to write {file_name}: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::IoError(format!("Failed to flush {file_name}: {e}")))?;

        Ok(ReportFile {
            name: name.to_string(),
            file: file_name,
            rows: rows.len(),
        })
    }

    pub fn write_manifest(&self, manifest: &DashboardManifest) -> Result<PathBuf> {
        let path = self.output_dir.join(MANIFEST_FILE);
        let file = File::create(&path).map_err(|e| {
            AppError::IoError(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, manifest)
            .map_err(|e| AppError::IoError(format!("Failed to write manifest: {e}")))?;
        writer
            .flush()
            .map_err(|e| AppError::IoError(format!("Failed to flush manifest: {e}")))?;
        Ok(path)
    }
}

/// Column names of `T`, taken from serializing its default value.
fn header_of<T: Serialize + Default>() -> Result<StringRecord> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer
        .serialize(T::default())
        .map_err(|e| AppError::Internal(format!("Failed to derive report header: {e}")))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to derive report header: {e}")))?;

    let mut reader = ReaderBuilder::new().from_reader(bytes.as_slice());
    reader
        .headers()
        .cloned()
        .map_err(|e| AppError::Internal(format!("Failed to derive report header: {e}")))
}

/// Render rows as an aligned plain-text table headed by `title`.
pub fn render_table<T: Serialize>(title: &str, rows: &[T]) -> Result<String> {
    let mut out = format!("== {} ({} rows)\n", title, rows.len());
    if rows.is_empty() {
        out.push_str("(no rows)\n");
        return Ok(out);
    }

    // Serialize through csv so headers and cell text match the CSV files.
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::Internal(format!("Failed to render {title}: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to render {title}: {e}")))?;

    let mut reader = ReaderBuilder::new().from_reader(bytes.as_slice());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::Internal(format!("Failed to render {title}: {e}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len());
    for record in reader.records() {
        let record =
            record.map_err(|e| AppError::Internal(format!("Failed to render {title}: {e}")))?;
        cells.push(record.iter().map(truncate_cell).collect());
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(idx) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    push_row(&mut out, &headers, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &cells {
        push_row(&mut out, row, &widths);
    }
    Ok(out)
}

fn truncate_cell(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    let mut cut: String = cell.chars().take(MAX_CELL_WIDTH - 1).collect();
    cut.push('…');
    cut
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dashboard::{ReviewBucket, ReviewHighlight, SimilarProduct};
    use chrono::NaiveDate;

    fn similar(similar_asin: &str, salesrank: Option<i32>) -> SimilarProduct {
        SimilarProduct {
            asin: "1559362022".to_string(),
            similar_asin: similar_asin.to_string(),
            title: Some("A \"quoted\", title".to_string()),
            product_group: Some("Book".to_string()),
            salesrank,
        }
    }

    #[test]
    fn test_write_csv_with_header_and_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(&dir.path().join("out")).unwrap();

        let report = writer
            .write_csv("similar_products", &[similar("0804215715", Some(12)), similar("156101074X", None)])
            .unwrap();
        assert_eq!(report.file, "similar_products.csv");
        assert_eq!(report.rows, 2);

        let content = fs::read_to_string(writer.output_dir().join("similar_products.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "asin,similar_asin,title,product_group,salesrank");
        assert_eq!(lines[1], "1559362022,0804215715,\"A \"\"quoted\"\", title\",Book,12");
        assert_eq!(lines[2], "1559362022,156101074X,\"A \"\"quoted\"\", title\",Book,");
    }

    #[test]
    fn test_enum_and_date_cells() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let rows = vec![ReviewHighlight {
            bucket: ReviewBucket::Lowest,
            review_date: NaiveDate::from_ymd_opt(2000, 7, 28).unwrap(),
            customer_id: "A2JW67OY8U6HHK".to_string(),
            rating: Some(1),
            votes: Some(10),
            helpful: Some(9),
        }];
        writer.write_csv("top_reviews", &rows).unwrap();

        let content = fs::read_to_string(dir.path().join("top_reviews.csv")).unwrap();
        assert!(content.contains("lowest,2000-07-28,A2JW67OY8U6HHK,1,10,9"));
    }

    #[test]
    fn test_empty_report_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let rows: Vec<ReviewHighlight> = Vec::new();

        let report = writer.write_csv("top_reviews", &rows).unwrap();
        assert_eq!(report.rows, 0);

        let content = fs::read_to_string(dir.path().join("top_reviews.csv")).unwrap();
        assert_eq!(content, "bucket,review_date,customer_id,rating,votes,helpful\n");
    }

    #[test]
    fn test_manifest_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path()).unwrap();
        let manifest = DashboardManifest {
            product_asin: Some("1559362022".to_string()),
            generated_at: chrono::Utc::now(),
            reports: vec![ReportFile {
                name: "similar_products".to_string(),
                file: "similar_products.csv".to_string(),
                rows: 5,
            }],
        };
        let path = writer.write_manifest(&manifest).unwrap();

        let parsed: DashboardManifest =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.reports.len(), 1);
        assert_eq!(parsed.product_asin.as_deref(), Some("1559362022"));
    }

    #[test]
    fn test_render_table_alignment() {
        let table = render_table(
            "similar",
            &[similar("0804215715", Some(12)), similar("156101074X", Some(396585))],
        )
        .unwrap();
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "== similar (2 rows)");
        assert!(lines[1].starts_with("asin        similar_asin"));
        assert!(lines[2].starts_with("----------  ------------"));
        assert!(lines[4].ends_with("396585"));
    }

    #[test]
    fn test_render_empty_table() {
        let rows: Vec<SimilarProduct> = Vec::new();
        let table = render_table("similar", &rows).unwrap();
        assert_eq!(table, "== similar (0 rows)\n(no rows)\n");
    }

    #[test]
    fn test_truncate_long_cells() {
        let long = "x".repeat(MAX_CELL_WIDTH + 10);
        let cut = truncate_cell(&long);
        assert_eq!(cut.chars().count(), MAX_CELL_WIDTH);
        assert!(cut.ends_with('…'));
    }
}
