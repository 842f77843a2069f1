//! OpenDocument spreadsheet reader.
//!
//! Reads the first sheet with `calamine`; the first non-empty row is the
//! header. The workbook cannot be rewound in place, so [`Reader::rewind`]
//! runs the whole open sequence again.

use super::{invalid_source, is_blank_row, prepare_header, Reader, ReaderOptions};
use crate::entry::Entry;
use crate::error::{ReaderError, ReaderResult};
use calamine::{open_workbook_from_rs, Data, Ods, OdsError, Range, Reader as _};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader for `.ods` sources.
pub struct OdsReader {
    path: PathBuf,
    options: ReaderOptions,
    fields: Arc<[String]>,
    rows: Option<std::vec::IntoIter<(usize, Vec<String>)>>,
    count: Option<usize>,
    last_error: Option<String>,
}

impl OdsReader {
    /// Open an ODS file.
    pub fn open(path: &Path, options: ReaderOptions) -> Self {
        let mut reader = Self {
            path: path.to_path_buf(),
            options,
            fields: Arc::from(Vec::new()),
            rows: None,
            count: None,
            last_error: None,
        };
        if let Err(e) = reader.reopen() {
            tracing::warn!(path = %reader.path.display(), error = %e, "cannot open source");
            reader.last_error = Some(e.to_string());
        }
        reader
    }

    fn reopen(&mut self) -> ReaderResult<()> {
        self.rows = None;
        if !self.path.exists() {
            return Err(ReaderError::NotFound {
                path: self.path.clone(),
            });
        }
        let bytes = std::fs::read(&self.path).map_err(|source| ReaderError::Unreadable {
            path: self.path.clone(),
            source,
        })?;
        let range = first_sheet(&bytes)?;

        let mut rows = range
            .rows()
            .enumerate()
            .map(|(index, row)| (index, row.iter().map(cell_to_string).collect::<Vec<_>>()));

        // Blank rows above the header are always skipped.
        let (header_index, header) = rows
            .by_ref()
            .find(|(_, cells)| !is_blank_row(cells))
            .ok_or_else(|| ReaderError::NoHeader {
                path: self.path.clone(),
            })?;
        self.fields = prepare_header(&self.path, header, &self.options)?.into();

        // Row numbers count from the line after the header.
        let data: Vec<(usize, Vec<String>)> = rows
            .map(|(index, cells)| (index - header_index, cells))
            .filter(|(_, cells)| !(self.options.skip_empty_rows && is_blank_row(cells)))
            .collect();
        self.count = Some(data.len());
        self.rows = Some(data.into_iter());
        Ok(())
    }
}

fn first_sheet(bytes: &[u8]) -> ReaderResult<Range<Data>> {
    let spreadsheet_error = |message: String| ReaderError::Parse {
        format: "ods",
        row: 0,
        message,
    };
    let mut workbook: Ods<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: OdsError| spreadsheet_error(e.to_string()))?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_error("workbook has no sheet".to_string()))?
        .map_err(|e| spreadsheet_error(e.to_string()))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Reader for OdsReader {
    fn format(&self) -> &'static str {
        "ods"
    }

    fn is_valid(&self) -> bool {
        self.last_error.is_none()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_entry(&mut self) -> ReaderResult<Option<Entry>> {
        if !self.is_valid() {
            return Err(invalid_source(self.last_error.as_deref()));
        }
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        Ok(rows.next().map(|(row, cells)| {
            Entry::from_cells(
                Arc::clone(&self.fields),
                cells,
                self.options.separator.as_deref(),
                row,
            )
        }))
    }

    fn rewind(&mut self) -> ReaderResult<()> {
        if !self.is_valid() {
            return Err(invalid_source(self.last_error.as_deref()));
        }
        self.reopen().map_err(|e| {
            self.last_error = Some(e.to_string());
            e
        })
    }

    fn is_restartable(&self) -> bool {
        false
    }

    fn count(&mut self) -> ReaderResult<usize> {
        match self.count {
            Some(count) if self.is_valid() => Ok(count),
            _ => Err(invalid_source(self.last_error.as_deref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spreadsheet_ods::{Sheet, Value, WorkBook};
    use tempfile::TempDir;

    fn write_ods(dir: &TempDir, rows: &[&[&str]]) -> PathBuf {
        let mut workbook = WorkBook::new_empty();
        let mut sheet = Sheet::new("Items");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if !cell.is_empty() {
                    sheet.set_value(r as u32, c as u32, Value::Text(cell.to_string()));
                }
            }
        }
        workbook.push_sheet(sheet);
        let path = dir.path().join("items.ods");
        spreadsheet_ods::write_ods(&mut workbook, &path).unwrap();
        path
    }

    #[test]
    fn test_read_ods() {
        let dir = TempDir::new().unwrap();
        let path = write_ods(
            &dir,
            &[&["title", "tags"], &["A", "x|y"], &["", ""], &["B", "z"]],
        );
        let mut reader = OdsReader::open(&path, ReaderOptions::default().with_separator("|"));
        assert!(reader.is_valid(), "{:?}", reader.last_error());
        assert_eq!(reader.fields(), ["title", "tags"]);
        assert_eq!(reader.count().unwrap(), 2);

        let entries: Vec<Entry> = reader.entries().collect::<Result<_, _>>().unwrap();
        assert_eq!(entries[0].get("tags"), ["x", "y"]);
        assert_eq!(entries[1].first("title"), Some("B"));
    }

    #[test]
    fn test_keep_blank_rows_after_header() {
        let dir = TempDir::new().unwrap();
        let path = write_ods(&dir, &[&["", ""], &["title", "tags"], &["A", "x"], &["", ""], &["B", "z"]]);
        let options = ReaderOptions {
            skip_empty_rows: false,
            ..ReaderOptions::default()
        };
        let mut reader = OdsReader::open(&path, options);
        assert!(reader.is_valid(), "{:?}", reader.last_error());
        assert_eq!(reader.fields(), ["title", "tags"]);
        assert_eq!(reader.count().unwrap(), 3);

        let entries: Vec<Entry> = reader.entries().collect::<Result<_, _>>().unwrap();
        assert!(entries[1].get("title").is_empty());
        assert_eq!(entries[2].first("title"), Some("B"));
        assert_eq!(entries[2].row(), 3);
    }

    #[test]
    fn test_rewind_reopens() {
        let dir = TempDir::new().unwrap();
        let path = write_ods(&dir, &[&["title"], &["A"]]);
        let mut reader = OdsReader::open(&path, ReaderOptions::default());
        assert!(!reader.is_restartable());
        assert!(reader.next_entry().unwrap().is_some());
        assert!(reader.next_entry().unwrap().is_none());
        reader.rewind().unwrap();
        assert_eq!(reader.next_entry().unwrap().unwrap().first("title"), Some("A"));
    }

    #[test]
    fn test_not_a_spreadsheet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.ods");
        std::fs::write(&path, b"not a zip").unwrap();
        let mut reader = OdsReader::open(&path, ReaderOptions::default());
        assert!(!reader.is_valid());
        assert!(reader.next_entry().is_err());
    }
}
