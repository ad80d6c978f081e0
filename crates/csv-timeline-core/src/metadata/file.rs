//! Descriptor of one physical data file.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

use super::descriptor::{self, DescriptorError};

/// Parsing rules, side-file locations and statistics of one data file.
///
/// Column names are fixed once known: either supplied up front with
/// [`FileMetadata::with_column_names`] or taken from the header line by the
/// first scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub(crate) data_path: PathBuf,
    pub(crate) cache_path: PathBuf,
    pub(crate) descriptor_path: PathBuf,

    #[serde(flatten)]
    pub(crate) dialect: Dialect,

    #[serde(default)]
    pub(crate) column_names: Vec<String>,

    /// Rows indexed by the last scan.
    #[serde(default)]
    pub(crate) row_count: u64,

    /// Size of the line index side file in bytes.
    #[serde(default)]
    pub(crate) cache_size: u64,
}

/// `<path><suffix>`, keeping any existing extension (`a.csv` -> `a.csv.cache`).
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

impl FileMetadata {
    /// Describe `data_path` with the default dialect.
    ///
    /// The line index goes to `<data_path>.cache` and the descriptor to
    /// `<data_path>.json` unless overridden.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        let data_path = data_path.into();
        Self {
            cache_path: with_suffix(&data_path, ".cache"),
            descriptor_path: with_suffix(&data_path, ".json"),
            data_path,
            dialect: Dialect::default(),
            column_names: Vec::new(),
            row_count: 0,
            cache_size: 0,
        }
    }

    /// Store the line index at `path` instead of the default location.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Persist the descriptor at `path` instead of the default location.
    pub fn with_descriptor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor_path = path.into();
        self
    }

    /// Use `dialect` to classify and split lines.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Use explicit column names. A header line, if the dialect has one, is
    /// still skipped but no longer names the columns.
    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Load a descriptor previously written by [`FileMetadata::persist`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        descriptor::read_descriptor(path.as_ref())
    }

    /// Write this descriptor to its descriptor path, atomically.
    pub fn persist(&self) -> Result<(), DescriptorError> {
        descriptor::write_descriptor(&self.descriptor_path, self)
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Path of the line index side file.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Path of the JSON descriptor.
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Parsing rules.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Column names in file order; empty until known.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Rows indexed by the last scan.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Size of the line index side file in bytes.
    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }
}

impl fmt::Display for FileMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data file: '{}'", self.data_path.display())?;
        writeln!(f, "Line index: '{}'", self.cache_path.display())?;
        writeln!(f, "Descriptor: '{}'", self.descriptor_path.display())?;
        writeln!(f, "Comment characters: '{}'", self.dialect.comment)?;
        writeln!(f, "Delimiter characters: '{}'", self.dialect.delimiter)?;
        writeln!(f, "Collapse delimiters: {}", self.dialect.multi_delimiter)?;
        writeln!(f, "Header line: {}", self.dialect.header)?;
        writeln!(f, "Columns: {}", self.column_names.join(", "))?;
        writeln!(f, "Rows: {}", self.row_count)?;
        write!(f, "Line index size: {} bytes", self.cache_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn side_file_paths_default_next_to_the_data() {
        let meta = FileMetadata::new("/data/run_01.csv");
        assert_eq!(meta.cache_path(), Path::new("/data/run_01.csv.cache"));
        assert_eq!(meta.descriptor_path(), Path::new("/data/run_01.csv.json"));
        assert_eq!(meta.dialect(), &Dialect::default());
        assert!(meta.column_names().is_empty());
    }

    #[test]
    fn persisted_descriptor_loads_back() -> TestResult {
        let tmp = TempDir::new()?;
        let data = tmp.path().join("freq.txt");
        let mut meta = FileMetadata::new(&data)
            .with_dialect(Dialect {
                delimiter: " ".to_string(),
                multi_delimiter: true,
                header: false,
                ..Dialect::default()
            })
            .with_column_names(["Day", "Time", "Freq"]);
        meta.row_count = 42;
        meta.cache_size = 42 * 8;

        meta.persist()?;
        let loaded = FileMetadata::load(tmp.path().join("freq.txt.json"))?;
        assert_eq!(loaded, meta);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(meta.descriptor_path())?)?;
        assert_eq!(json["delimiter"], " ");
        assert_eq!(json["multi_delimiter"], true);
        assert_eq!(json["row_count"], 42);
        Ok(())
    }

    #[test]
    fn unwritable_descriptor_path_is_an_io_error() -> TestResult {
        let tmp = TempDir::new()?;
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, "file, not dir")?;

        let meta = FileMetadata::new(tmp.path().join("a.csv"))
            .with_descriptor_path(blocker.join("a.json"));
        let err = meta.persist().expect_err("parent is a regular file");
        assert_eq!(err.class(), crate::error::ErrorClass::Io);
        Ok(())
    }

    #[test]
    fn garbage_descriptor_is_a_parse_error() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json")?;

        let err = FileMetadata::load(&path).expect_err("invalid JSON");
        assert!(matches!(err, DescriptorError::Decode { .. }));
        assert_eq!(err.class(), crate::error::ErrorClass::Parse);
        Ok(())
    }
}
