//! Input readers.
//!
//! A [`Reader`] turns one source (CSV, TSV, ODS, JSON) into a lazy sequence
//! of [`Entry`] values. Opening never fails: an unusable source produces an
//! invalid reader carrying a human-readable error, and the first attempt to
//! iterate it returns [`ReaderError::InvalidSource`].
//!
//! # Example
//! ```ignore
//! use bulkport::reader::{ReaderOptions, ReaderRegistry};
//!
//! let registry = ReaderRegistry::default();
//! let mut reader = registry.open_path("items.csv".as_ref(), &ReaderOptions::default())?;
//! assert!(reader.is_valid());
//! for entry in reader.entries() {
//!     println!("{:?}", entry?.get("dcterms:title"));
//! }
//! ```

pub mod csv;
pub mod encoding;
pub mod json;
pub mod spreadsheet;

use crate::entry::Entry;
use crate::error::{ReaderError, ReaderResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use self::csv::CsvReader;
pub use self::json::JsonReader;
pub use self::spreadsheet::OdsReader;
pub use encoding::{decode_content, detect_delimiter, detect_encoding};

// =============================================================================
// Options
// =============================================================================

/// Options shared by all readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderOptions {
    /// Cell delimiter; `None` detects it from the header line.
    pub delimiter: Option<char>,
    /// Enclosure (quote) character; `'\0'` disables quoting.
    pub enclosure: char,
    /// Escape character inside enclosures; `'\0'` disables escaping.
    pub escape: char,
    /// Multi-value separator; `None` keeps each cell as one value.
    pub separator: Option<String>,
    /// Forced source encoding; detected when absent.
    pub encoding: Option<String>,
    /// Trim whitespace around header names.
    pub trim_headers: bool,
    /// Skip rows where every cell is blank.
    pub skip_empty_rows: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: Some(','),
            enclosure: '"',
            escape: '\\',
            separator: None,
            encoding: None,
            trim_headers: true,
            skip_empty_rows: true,
        }
    }
}

impl ReaderOptions {
    /// Tab-separated options: tab delimiter, null-byte enclosure and escape.
    pub fn tsv() -> Self {
        Self {
            delimiter: Some('\t'),
            enclosure: '\0',
            escape: '\0',
            ..Self::default()
        }
    }

    /// Set the multi-value separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into()).filter(|s: &String| !s.is_empty());
        self
    }
}

// =============================================================================
// Reader Trait
// =============================================================================

/// A source of entries.
pub trait Reader: Send {
    /// Format id (`csv`, `tsv`, `ods`, `json`).
    fn format(&self) -> &'static str;

    /// Whether the source opened correctly.
    fn is_valid(&self) -> bool;

    /// Message explaining why the source is invalid.
    fn last_error(&self) -> Option<&str>;

    /// Raw field names, in source order.
    fn fields(&self) -> &[String];

    /// Next entry, or `None` at the end of the source.
    fn next_entry(&mut self) -> ReaderResult<Option<Entry>>;

    /// Restart iteration from the first entry.
    fn rewind(&mut self) -> ReaderResult<()>;

    /// Whether rewinding is a seek rather than a full reopen.
    fn is_restartable(&self) -> bool;

    /// Number of entries, header excluded.
    fn count(&mut self) -> ReaderResult<usize>;

    /// Iterate over the remaining entries.
    fn entries(&mut self) -> Entries<'_>
    where
        Self: Sized,
    {
        Entries::new(self)
    }
}

/// Iterator adapter over a reader.
///
/// Stops after the first error.
pub struct Entries<'a> {
    reader: &'a mut dyn Reader,
    done: bool,
}

impl<'a> Entries<'a> {
    pub fn new(reader: &'a mut dyn Reader) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl Iterator for Entries<'_> {
    type Item = ReaderResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Error returned when iterating an invalid source.
pub(crate) fn invalid_source(last_error: Option<&str>) -> ReaderError {
    ReaderError::InvalidSource(last_error.unwrap_or("source was not opened").to_string())
}

/// Normalize header names and reject header rows without any name.
pub(crate) fn prepare_header(
    path: &Path,
    cells: Vec<String>,
    options: &ReaderOptions,
) -> ReaderResult<Vec<String>> {
    let header: Vec<String> = cells
        .into_iter()
        .map(|c| if options.trim_headers { c.trim().to_string() } else { c })
        .collect();
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(ReaderError::NoHeader {
            path: path.to_path_buf(),
        });
    }
    Ok(header)
}

/// Whether every cell is blank.
pub(crate) fn is_blank_row(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

// =============================================================================
// Reader Registry
// =============================================================================

/// Constructor of a reader for a path.
pub type ReaderConstructor = fn(&Path, &ReaderOptions) -> Box<dyn Reader>;

/// Maps format ids and file extensions to reader constructors.
pub struct ReaderRegistry {
    formats: IndexMap<&'static str, ReaderConstructor>,
    extensions: IndexMap<&'static str, &'static str>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("csv", &["csv", "txt"], |path, options| {
            Box::new(CsvReader::open(path, options.clone()))
        });
        registry.register("tsv", &["tsv", "tab"], |path, options| {
            let options = ReaderOptions {
                separator: options.separator.clone(),
                encoding: options.encoding.clone(),
                ..ReaderOptions::tsv()
            };
            Box::new(CsvReader::open_tsv(path, options))
        });
        registry.register("ods", &["ods"], |path, options| {
            Box::new(OdsReader::open(path, options.clone()))
        });
        registry.register("json", &["json", "jsonld"], |path, options| {
            Box::new(JsonReader::open(path, options.clone()))
        });
        registry
    }
}

impl ReaderRegistry {
    /// Registry without any format.
    pub fn empty() -> Self {
        Self {
            formats: IndexMap::new(),
            extensions: IndexMap::new(),
        }
    }

    /// Register a format under its id and file extensions.
    pub fn register(
        &mut self,
        format: &'static str,
        extensions: &[&'static str],
        constructor: ReaderConstructor,
    ) {
        self.formats.insert(format, constructor);
        for ext in extensions {
            self.extensions.insert(*ext, format);
        }
    }

    /// Registered format ids.
    pub fn formats(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.formats.keys().copied()
    }

    /// Format id for a path, from its extension.
    pub fn format_for_path(&self, path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        self.extensions.get(ext.as_str()).copied()
    }

    /// Open a source with an explicit format id.
    pub fn open(
        &self,
        format: &str,
        path: &Path,
        options: &ReaderOptions,
    ) -> ReaderResult<Box<dyn Reader>> {
        let constructor = self
            .formats
            .get(format.to_lowercase().as_str())
            .ok_or_else(|| ReaderError::UnsupportedFormat(format.to_string()))?;
        Ok(constructor(path, options))
    }

    /// Open a source, choosing the format from its extension.
    pub fn open_path(&self, path: &Path, options: &ReaderOptions) -> ReaderResult<Box<dyn Reader>> {
        let format = self
            .format_for_path(path)
            .ok_or_else(|| ReaderError::UnsupportedFormat(path.display().to_string()))?;
        self.open(format, path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_registry_formats() {
        let registry = ReaderRegistry::default();
        let formats: Vec<_> = registry.formats().collect();
        assert_eq!(formats, vec!["csv", "tsv", "ods", "json"]);
        assert_eq!(registry.format_for_path(Path::new("a.TSV")), Some("tsv"));
        assert_eq!(registry.format_for_path(Path::new("a.jsonld")), Some("json"));
        assert_eq!(registry.format_for_path(Path::new("a.xml")), None);
    }

    #[test]
    fn test_unknown_format() {
        let registry = ReaderRegistry::default();
        let result = registry.open("xml", Path::new("a.xml"), &ReaderOptions::default());
        assert!(matches!(result, Err(ReaderError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_open_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".tsv").tempfile().unwrap();
        write!(file, "title\ttags\nA\tx|y\n").unwrap();

        let registry = ReaderRegistry::default();
        let options = ReaderOptions::default().with_separator("|");
        let mut reader = registry.open_path(file.path(), &options).unwrap();
        assert_eq!(reader.format(), "tsv");
        let entries: Vec<_> = Entries::new(reader.as_mut()).collect::<Result<_, _>>().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get("tags"), ["x", "y"]);
    }

    #[test]
    fn test_invalid_source_fails_on_iteration() {
        let registry = ReaderRegistry::default();
        let mut reader = registry
            .open("csv", Path::new("/nonexistent/file.csv"), &ReaderOptions::default())
            .unwrap();
        assert!(!reader.is_valid());
        assert!(reader.last_error().is_some());
        assert!(matches!(
            reader.next_entry(),
            Err(ReaderError::InvalidSource(_))
        ));
    }

    #[test]
    fn test_options_from_json() {
        let options: ReaderOptions = serde_json::from_str(r#"{"separator": "|"}"#).unwrap();
        assert_eq!(options.separator.as_deref(), Some("|"));
        assert_eq!(options.delimiter, Some(','));
    }
}
