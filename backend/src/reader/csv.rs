//! Delimited text reader (CSV and TSV).
//!
//! The source is decoded once (encoding detected with chardet unless forced),
//! then parsed lazily with the `csv` crate. Rewinding seeks back to the first
//! data row, so these readers are restartable.

use super::encoding::{decode_content, detect_delimiter, detect_encoding};
use super::{invalid_source, is_blank_row, prepare_header, Reader, ReaderOptions};
use crate::entry::Entry;
use crate::error::{ReaderError, ReaderResult};
use csv::{Position, ReaderBuilder, StringRecord};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Source = csv::Reader<Cursor<Arc<[u8]>>>;

/// Reader for CSV and TSV sources.
pub struct CsvReader {
    format: &'static str,
    path: PathBuf,
    options: ReaderOptions,
    fields: Arc<[String]>,
    data: Option<Arc<[u8]>>,
    source: Option<Source>,
    data_start: Position,
    row: usize,
    count: Option<usize>,
    last_error: Option<String>,
}

impl CsvReader {
    /// Open a CSV file.
    pub fn open(path: &Path, options: ReaderOptions) -> Self {
        Self::open_as("csv", path, options)
    }

    /// Open a TSV file.
    pub fn open_tsv(path: &Path, options: ReaderOptions) -> Self {
        Self::open_as("tsv", path, options)
    }

    /// Read CSV content already in memory; `name` is used in messages.
    pub fn from_bytes(name: &str, bytes: &[u8], options: ReaderOptions) -> Self {
        let mut reader = Self::unopened("csv", Path::new(name), options);
        if let Err(e) = reader.load(bytes) {
            reader.fail(e);
        }
        reader
    }

    fn open_as(format: &'static str, path: &Path, options: ReaderOptions) -> Self {
        let mut reader = Self::unopened(format, path, options);
        let bytes = if path.exists() {
            std::fs::read(path).map_err(|source| ReaderError::Unreadable {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Err(ReaderError::NotFound {
                path: path.to_path_buf(),
            })
        };
        if let Err(e) = bytes.and_then(|bytes| reader.load(&bytes)) {
            reader.fail(e);
        }
        reader
    }

    fn unopened(format: &'static str, path: &Path, options: ReaderOptions) -> Self {
        Self {
            format,
            path: path.to_path_buf(),
            options,
            fields: Arc::from(Vec::new()),
            data: None,
            source: None,
            data_start: Position::new(),
            row: 0,
            count: None,
            last_error: None,
        }
    }

    fn fail(&mut self, error: ReaderError) {
        tracing::warn!(path = %self.path.display(), error = %error, "cannot open source");
        self.source = None;
        self.data = None;
        self.last_error = Some(error.to_string());
    }

    fn load(&mut self, bytes: &[u8]) -> ReaderResult<()> {
        let encoding = match self.options.encoding {
            Some(ref forced) => forced.clone(),
            None => detect_encoding(bytes),
        };
        let content = decode_content(&self.path, bytes, &encoding)?;
        if self.options.delimiter.is_none() {
            self.options.delimiter = Some(detect_delimiter(&content));
        }

        let data: Arc<[u8]> = Arc::from(content.into_bytes());
        let mut source = self.builder()?.from_reader(Cursor::new(Arc::clone(&data)));

        let mut record = StringRecord::new();
        let has_header = source
            .read_record(&mut record)
            .map_err(|e| self.parse_error(0, e))?;
        if !has_header {
            return Err(ReaderError::NoHeader {
                path: self.path.clone(),
            });
        }
        let header = record.iter().map(String::from).collect();
        self.fields = prepare_header(&self.path, header, &self.options)?.into();
        self.data_start = source.position().clone();
        self.source = Some(source);
        self.data = Some(data);
        tracing::debug!(
            path = %self.path.display(),
            encoding = %encoding,
            fields = self.fields.len(),
            "source opened"
        );
        Ok(())
    }

    fn builder(&self) -> ReaderResult<ReaderBuilder> {
        let delimiter = self.options.delimiter.unwrap_or(',');
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.ascii(delimiter, "delimiter")?);
        if self.options.enclosure == '\0' {
            builder.quoting(false);
        } else {
            builder.quote(self.ascii(self.options.enclosure, "enclosure")?);
        }
        if self.options.escape != '\0' && self.options.escape != self.options.enclosure {
            builder.escape(Some(self.ascii(self.options.escape, "escape")?));
        }
        Ok(builder)
    }

    fn ascii(&self, c: char, what: &str) -> ReaderResult<u8> {
        if c.is_ascii() {
            Ok(c as u8)
        } else {
            Err(ReaderError::Parse {
                format: self.format,
                row: 0,
                message: format!("{} '{}' must be a single ASCII character", what, c),
            })
        }
    }

    fn parse_error(&self, row: usize, error: csv::Error) -> ReaderError {
        ReaderError::Parse {
            format: self.format,
            row,
            message: error.to_string(),
        }
    }
}

impl Reader for CsvReader {
    fn format(&self) -> &'static str {
        self.format
    }

    fn is_valid(&self) -> bool {
        self.source.is_some()
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn next_entry(&mut self) -> ReaderResult<Option<Entry>> {
        let Some(source) = self.source.as_mut() else {
            return Err(invalid_source(self.last_error.as_deref()));
        };
        let mut record = StringRecord::new();
        loop {
            let more = match source.read_record(&mut record) {
                Ok(more) => more,
                Err(e) => {
                    return Err(ReaderError::Parse {
                        format: self.format,
                        row: self.row + 1,
                        message: e.to_string(),
                    })
                }
            };
            if !more {
                return Ok(None);
            }
            self.row += 1;
            let cells: Vec<String> = record.iter().map(String::from).collect();
            if self.options.skip_empty_rows && is_blank_row(&cells) {
                continue;
            }
            return Ok(Some(Entry::from_cells(
                Arc::clone(&self.fields),
                cells,
                self.options.separator.as_deref(),
                self.row,
            )));
        }
    }

    fn rewind(&mut self) -> ReaderResult<()> {
        let Some(source) = self.source.as_mut() else {
            return Err(invalid_source(self.last_error.as_deref()));
        };
        let start = self.data_start.clone();
        source.seek(start).map_err(|e| ReaderError::Parse {
            format: self.format,
            row: 0,
            message: e.to_string(),
        })?;
        self.row = 0;
        Ok(())
    }

    fn is_restartable(&self) -> bool {
        true
    }

    fn count(&mut self) -> ReaderResult<usize> {
        if let Some(count) = self.count {
            return Ok(count);
        }
        let Some(data) = self.data.as_ref().map(Arc::clone) else {
            return Err(invalid_source(self.last_error.as_deref()));
        };
        let mut scan = self.builder()?.from_reader(Cursor::new(data));
        scan.seek(self.data_start.clone())
            .map_err(|e| self.parse_error(0, e))?;

        let mut count = 0;
        let mut record = StringRecord::new();
        while scan
            .read_record(&mut record)
            .map_err(|e| self.parse_error(count + 1, e))?
        {
            if !(self.options.skip_empty_rows && record.iter().all(|c| c.trim().is_empty())) {
                count += 1;
            }
        }
        self.count = Some(count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn read_all(reader: &mut CsvReader) -> Vec<Entry> {
        reader.entries().collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn test_header_and_multi_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "title,creator,description,tags,file").unwrap();
        writeln!(file, r#""A","B","C","x|y","f.jpg""#).unwrap();

        let mut reader = CsvReader::open(file.path(), ReaderOptions::default().with_separator("|"));
        assert!(reader.is_valid());
        assert_eq!(reader.fields(), ["title", "creator", "description", "tags", "file"]);

        let entries = read_all(&mut reader);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get("tags"), ["x", "y"]);
        assert_eq!(entries[0].get("file"), ["f.jpg"]);
    }

    #[test]
    fn test_short_and_long_rows() {
        let content = "a,b,c,d,e\n1,2,3\n1,2,3,4,5,6,7\n";
        let mut reader = CsvReader::from_bytes("rows.csv", content.as_bytes(), ReaderOptions::default());
        let entries = read_all(&mut reader);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].get("d").is_empty());
        assert!(entries[0].get("e").is_empty());
        assert_eq!(entries[1].get("e"), ["5"]);
        assert_eq!(entries[1].iter().count(), 5);
    }

    #[test]
    fn test_rewind_and_count() {
        let content = "title\nA\n\nB\nC\n";
        let mut reader = CsvReader::from_bytes("t.csv", content.as_bytes(), ReaderOptions::default());
        assert_eq!(reader.count().unwrap(), 3);

        let first = read_all(&mut reader);
        reader.rewind().unwrap();
        let second = read_all(&mut reader);
        assert_eq!(first, second);
        assert_eq!(second[2].first("title"), Some("C"));
        assert!(reader.is_restartable());
    }

    #[test]
    fn test_tsv_ignores_quotes() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "title\tnote\n\"Quoted\"\tit's \"fine\"\n").unwrap();

        let mut reader = CsvReader::open_tsv(file.path(), ReaderOptions::tsv());
        let entries = read_all(&mut reader);
        assert_eq!(entries[0].get("title"), ["\"Quoted\""]);
        assert_eq!(entries[0].get("note"), ["it's \"fine\""]);
    }

    #[test]
    fn test_detected_delimiter() {
        let options = ReaderOptions {
            delimiter: None,
            ..ReaderOptions::default()
        };
        let mut reader = CsvReader::from_bytes("s.csv", b"a;b\n1;2\n", options);
        let entries = read_all(&mut reader);
        assert_eq!(entries[0].get("b"), ["2"]);
    }

    #[test]
    fn test_missing_file_is_invalid() {
        let reader = CsvReader::open(Path::new("/nonexistent/a.csv"), ReaderOptions::default());
        assert!(!reader.is_valid());
        assert!(reader.last_error().unwrap().contains("not found"));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let mut reader = CsvReader::from_bytes("e.csv", b"", ReaderOptions::default());
        assert!(!reader.is_valid());
        assert!(reader.last_error().unwrap().contains("no header"));
        assert!(reader.count().is_err());
    }

    #[test]
    fn test_latin1_source() {
        let mut bytes = b"title\n".to_vec();
        bytes.extend_from_slice(&[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9, b'\n']);
        let options = ReaderOptions {
            encoding: Some("iso-8859-1".into()),
            ..ReaderOptions::default()
        };
        let mut reader = CsvReader::from_bytes("l.csv", &bytes, options);
        let entries = read_all(&mut reader);
        assert_eq!(entries[0].first("title"), Some("Société"));
    }
}
