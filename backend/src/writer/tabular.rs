//! Tabular formatters: CSV, TSV and ODS.
//!
//! One header row, then one row per resource. Multi-valued cells are joined
//! with the export separator.

use super::{Exporter, Formatter};
use crate::error::{WriterError, WriterResult};
use spreadsheet_ods::{Sheet, Value, WorkBook};
use std::io::Write;

/// Delimited text (CSV or TSV).
#[derive(Debug, Clone, Copy)]
pub struct CsvFormatter {
    format: &'static str,
    delimiter: u8,
}

impl CsvFormatter {
    pub fn csv() -> Self {
        Self {
            format: "csv",
            delimiter: b',',
        }
    }

    /// Tab-separated, unquoted; tabs and line breaks inside values become
    /// spaces.
    pub fn tsv() -> Self {
        Self {
            format: "tsv",
            delimiter: b'\t',
        }
    }

    fn is_tsv(&self) -> bool {
        self.delimiter == b'\t'
    }

    fn clean(&self, cell: String) -> String {
        if self.is_tsv() && cell.contains(['\t', '\n', '\r']) {
            cell.replace("\r\n", " ").replace(['\t', '\n', '\r'], " ")
        } else {
            cell
        }
    }
}

impl Formatter for CsvFormatter {
    fn format(&self) -> &'static str {
        self.format
    }

    fn extension(&self) -> &'static str {
        self.format
    }

    fn media_type(&self) -> &'static str {
        if self.is_tsv() {
            "text/tab-separated-values"
        } else {
            "text/csv"
        }
    }

    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(self.delimiter);
        if self.is_tsv() {
            builder.quote_style(csv::QuoteStyle::Never);
        }
        let mut writer = builder.from_writer(out);

        writer.write_record(exporter.available_fields())?;
        let mut count = 0;
        for row in exporter.rows()? {
            let row = row?;
            let cells: Vec<String> = row
                .joined(exporter.separator())
                .into_iter()
                .map(|cell| self.clean(cell))
                .collect();
            writer.write_record(&cells)?;
            count += 1;
        }
        writer.flush()?;
        tracing::debug!(format = self.format, rows = count, "tabular export written");
        Ok(count)
    }
}

/// OpenDocument spreadsheet, one sheet.
#[derive(Debug, Clone, Copy)]
pub struct OdsFormatter;

pub const ODS_SHEET_NAME: &str = "Export";

impl Formatter for OdsFormatter {
    fn format(&self) -> &'static str {
        "ods"
    }

    fn extension(&self) -> &'static str {
        "ods"
    }

    fn media_type(&self) -> &'static str {
        "application/vnd.oasis.opendocument.spreadsheet"
    }

    fn write(&self, exporter: &Exporter<'_>, out: &mut dyn Write) -> WriterResult<usize> {
        let mut sheet = Sheet::new(ODS_SHEET_NAME);
        for (col, header) in exporter.available_fields().into_iter().enumerate() {
            sheet.set_value(0, col as u32, Value::Text(header.to_string()));
        }

        let mut count = 0;
        for row in exporter.rows()? {
            let row = row?;
            count += 1;
            for (col, cell) in row.joined(exporter.separator()).into_iter().enumerate() {
                if !cell.is_empty() {
                    sheet.set_value(count as u32, col as u32, Value::Text(cell));
                }
            }
        }

        let mut workbook = WorkBook::new_empty();
        workbook.push_sheet(sheet);
        let buffer = spreadsheet_ods::write_ods_buf(&mut workbook, Vec::new())
            .map_err(|e| WriterError::Spreadsheet(e.to_string()))?;
        out.write_all(&buffer)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PropertyValue, Resource, ResourceType, VocabularySet};
    use crate::reader::{Reader, ReaderOptions};
    use crate::reader::csv::CsvReader;
    use crate::reader::spreadsheet::OdsReader;
    use crate::store::MemoryStore;
    use crate::writer::tests::sample_store;
    use crate::writer::ExportConfig;

    fn config(include: &[&str]) -> ExportConfig {
        ExportConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            ..ExportConfig::default()
        }
    }

    #[test]
    fn test_csv_output() {
        let store = sample_store();
        let exporter = Exporter::new(&store, config(&["o:id", "dcterms:title", "dcterms:subject"])).unwrap();
        let mut out = Vec::new();
        let count = CsvFormatter::csv().write(&exporter, &mut out).unwrap();
        assert_eq!(count, 2);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "o:id,dcterms:title,dcterms:subject");
        assert!(lines[1].ends_with(",A,x|y"));
        assert!(lines[2].ends_with(",B,"));
    }

    #[test]
    fn test_tsv_cleans_values() {
        let store = MemoryStore::new(VocabularySet::builtin());
        let mut item = Resource::new(ResourceType::Items);
        item.add_value("dcterms:description", PropertyValue::literal("one\ttwo\nthree \"q\""));
        store.insert(item).unwrap();

        let exporter = Exporter::new(&store, config(&["dcterms:description"])).unwrap();
        let mut out = Vec::new();
        CsvFormatter::tsv().write(&exporter, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "dcterms:description\none two three \"q\"\n"
        );
    }

    #[test]
    fn test_csv_reads_back_with_separator() {
        let store = sample_store();
        let exporter = Exporter::new(&store, config(&["dcterms:title", "dcterms:subject"])).unwrap();
        let mut out = Vec::new();
        CsvFormatter::csv().write(&exporter, &mut out).unwrap();

        let options = ReaderOptions {
            separator: Some("|".to_string()),
            ..ReaderOptions::default()
        };
        let mut reader = CsvReader::from_bytes("export.csv", &out, options);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.get("dcterms:subject"), ["x", "y"]);
    }

    #[test]
    fn test_ods_output() {
        let store = sample_store();
        let exporter = Exporter::new(&store, config(&["dcterms:title", "dcterms:subject"])).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.ods");
        let mut file = std::fs::File::create(&path).unwrap();
        assert_eq!(OdsFormatter.write(&exporter, &mut file).unwrap(), 2);
        drop(file);

        let mut reader = OdsReader::open(&path, ReaderOptions::default());
        assert!(reader.is_valid());
        assert_eq!(reader.fields(), ["dcterms:title", "dcterms:subject"]);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.get("dcterms:subject"), ["x|y"]);
    }
}
