//! Random access to the rows of one growing data file.
//!
//! An [`IndexedFile`] pairs a [`FileMetadata`] with a [`LineIndex`] and an
//! open read handle on the data. [`IndexedFile::update`] scans the data for
//! new rows; when the index already holds rows the scan resumes at the last
//! indexed row, so a file that only grew costs a read of the appended bytes.
//!
//! Lines are classified by the file's [`crate::dialect::Dialect`]:
//!
//! - blank lines and comment lines are never indexed;
//! - with `header` set, the first remaining line names the columns (unless
//!   names are already known) and is not indexed either;
//! - every other line is a row and its starting byte offset is appended to
//!   the index.
//!
//! A byte-order mark at the start of the file is skipped on a scan from the
//! beginning.

use std::{
    collections::HashSet,
    fmt,
    fs::File,
    io::{BufRead, BufReader, Seek, SeekFrom},
    path::Path,
    sync::Arc,
};

use log::{debug, info, warn};
use snafu::prelude::*;

use crate::{
    config::IndexOptions,
    error::ErrorClass,
    line_index::{LineIndex, LineIndexError},
    metadata::{DescriptorError, FileMetadata},
    row::Row,
    storage::{self, StorageError},
};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors raised by [`IndexedFile`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FileError {
    /// The line index failed.
    #[snafu(display("{source}"))]
    Index {
        /// Underlying line index error.
        source: LineIndexError,
    },

    /// Opening, seeking or reading the data file failed.
    #[snafu(display("Data file I/O failed: {source}"))]
    Data {
        /// Underlying storage error carrying the path.
        source: StorageError,
    },

    /// The requested row has not been indexed.
    #[snafu(display("Row {row} is out of range for a file of {len} rows"))]
    OutOfRange {
        /// Requested row.
        row: u64,
        /// Rows indexed so far.
        len: u64,
    },

    /// A row has a different number of fields than there are columns.
    #[snafu(display(
        "Row at byte {offset} of {path} has {found} fields, expected {expected}"
    ))]
    SchemaMismatch {
        /// Data file path.
        path: String,
        /// Byte offset of the offending line.
        offset: u64,
        /// Number of columns.
        expected: usize,
        /// Number of fields found.
        found: usize,
    },

    /// The header names the same column twice.
    #[snafu(display("Header of {path} repeats column '{column}'"))]
    DuplicateColumn {
        /// Data file path.
        path: String,
        /// The repeated name.
        column: String,
    },

    /// The data file is shorter than the index says it should be.
    #[snafu(display(
        "{path} is {len} bytes but the line index points at byte {last_offset}; rebuild the index"
    ))]
    Truncated {
        /// Data file path.
        path: String,
        /// Current length of the data file.
        len: u64,
        /// Offset of the last indexed row.
        last_offset: u64,
    },

    /// An indexed row could not be read back.
    #[snafu(display("No data at byte {offset} of {path} for row {row}"))]
    UnexpectedEof {
        /// Data file path.
        path: String,
        /// Requested row.
        row: u64,
        /// Offset the index gave for it.
        offset: u64,
    },

    /// Loading or persisting the descriptor failed.
    #[snafu(display("{source}"))]
    Descriptor {
        /// Underlying descriptor error.
        source: DescriptorError,
    },
}

impl FileError {
    /// Classify this error for caller-side handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            FileError::Index { source } => source.class(),
            FileError::Descriptor { source } => source.class(),
            FileError::Data { .. }
            | FileError::Truncated { .. }
            | FileError::UnexpectedEof { .. } => ErrorClass::Io,
            FileError::OutOfRange { .. } => ErrorClass::OutOfRange,
            FileError::SchemaMismatch { .. } | FileError::DuplicateColumn { .. } => {
                ErrorClass::SchemaMismatch
            }
        }
    }
}

/// One data file with its persisted line index.
///
/// Owns its data read handle and its [`LineIndex`]; neither is shared with
/// clones (see [`IndexedFile::try_clone`]).
#[derive(Debug)]
pub struct IndexedFile {
    metadata: FileMetadata,
    reader: BufReader<File>,
    index: LineIndex,
    columns: Arc<[String]>,
    descriptor_stale: bool,
    /// Rows or names gained since the last successful persist.
    pending_change: bool,
}

impl IndexedFile {
    /// Open the data file and its line index with default options.
    ///
    /// Nothing is scanned until [`IndexedFile::update`] is called.
    pub fn open(metadata: FileMetadata) -> Result<Self, FileError> {
        Self::open_with_options(metadata, IndexOptions::default())
    }

    /// Open the data file and its line index.
    ///
    /// The descriptor's row count is reconciled with the index, which is
    /// authoritative.
    pub fn open_with_options(
        mut metadata: FileMetadata,
        options: IndexOptions,
    ) -> Result<Self, FileError> {
        let file = storage::local(File::open(&metadata.data_path), &metadata.data_path)
            .context(DataSnafu)?;
        let index =
            LineIndex::open_with_options(&metadata.cache_path, options).context(IndexSnafu)?;

        let descriptor_stale =
            metadata.row_count != index.len() || metadata.cache_size != index.byte_len();
        if descriptor_stale && metadata.row_count != 0 {
            warn!(
                "{}: descriptor records {} rows but the line index holds {}",
                metadata.data_path.display(),
                metadata.row_count,
                index.len()
            );
        }
        metadata.row_count = index.len();
        metadata.cache_size = index.byte_len();

        Ok(Self {
            columns: Arc::from(metadata.column_names.as_slice()),
            metadata,
            reader: BufReader::new(file),
            index,
            descriptor_stale,
            pending_change: false,
        })
    }

    /// Reopen a file from a descriptor written by an earlier session.
    pub fn from_descriptor(path: impl AsRef<Path>) -> Result<Self, FileError> {
        Self::from_descriptor_with_options(path, IndexOptions::default())
    }

    /// Reopen a file from a descriptor, with explicit index options.
    pub fn from_descriptor_with_options(
        path: impl AsRef<Path>,
        options: IndexOptions,
    ) -> Result<Self, FileError> {
        let metadata = FileMetadata::load(path).context(DescriptorSnafu)?;
        Self::open_with_options(metadata, options)
    }

    /// The file's descriptor as of the last scan.
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Path of the data file.
    pub fn data_path(&self) -> &Path {
        &self.metadata.data_path
    }

    /// Rows indexed so far.
    pub fn row_count(&self) -> u64 {
        self.index.len()
    }

    /// Column names; empty until supplied or read from the header.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// The underlying line index.
    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    /// Index rows added to the data file since the last scan.
    ///
    /// With `rebuild` the index is cleared and the whole file is scanned
    /// again. Returns whether rows were added or column names discovered.
    /// The descriptor is persisted when something changed or it does not
    /// exist yet. A change whose persist failed is reported again by the
    /// next call.
    ///
    /// # Errors
    ///
    /// On [`FileError::SchemaMismatch`] (strict columns) or any read failure
    /// the index is rolled back to its length before the scan, so earlier
    /// rows stay available.
    pub fn update(&mut self, rebuild: bool) -> Result<bool, FileError> {
        if rebuild {
            debug!("{}: rebuilding line index", self.data_path().display());
            if !self.index.is_empty() {
                self.pending_change = true;
            }
            self.index.clear().context(IndexSnafu)?;
        }

        let known_columns = self.metadata.column_names.clone();
        let start_len = self.index.len();

        let appended = match self.scan() {
            Ok(appended) => appended,
            Err(err) => {
                self.roll_back(start_len, known_columns);
                return Err(err);
            }
        };

        if appended > 0 || self.metadata.column_names != known_columns {
            self.pending_change = true;
        }
        self.metadata.row_count = self.index.len();
        self.metadata.cache_size = self.index.byte_len();
        if appended > 0 && start_len < 2 {
            self.index.detect_uniform_spacing().context(IndexSnafu)?;
        }

        let changed = self.pending_change;
        if appended > 0 {
            info!(
                "{}: indexed {appended} new rows ({} total)",
                self.data_path().display(),
                self.index.len()
            );
        } else {
            debug!("{}: no new rows", self.data_path().display());
        }

        if changed || self.descriptor_stale || !self.metadata.descriptor_path.exists() {
            self.persist()?;
        }
        self.pending_change = false;
        Ok(changed)
    }

    /// Write the descriptor to disk.
    pub fn persist(&mut self) -> Result<(), FileError> {
        self.metadata.persist().context(DescriptorSnafu)?;
        self.descriptor_stale = false;
        Ok(())
    }

    /// Text of row `row` without its line terminator.
    ///
    /// # Errors
    ///
    /// [`FileError::OutOfRange`] if the row has not been indexed.
    pub fn get_raw_line(&mut self, row: u64) -> Result<String, FileError> {
        let len = self.index.len();
        ensure!(row < len, OutOfRangeSnafu { row, len });

        let offset = self.index.get(row).context(IndexSnafu)?;
        self.seek(offset)?;

        let mut buf = Vec::new();
        let read = self.read_line(&mut buf)?;
        ensure!(
            read > 0,
            UnexpectedEofSnafu {
                path: self.data_path().display().to_string(),
                row,
                offset,
            }
        );
        while buf.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Row `row` split into fields and zipped with the column names.
    pub fn get_row(&mut self, row: u64) -> Result<Row, FileError> {
        let line = self.get_raw_line(row)?;
        let values = self.metadata.dialect.split_fields(&line);
        Ok(Row::new(Arc::clone(&self.columns), values))
    }

    /// Open independent handles on the same data and index files.
    pub fn try_clone(&mut self) -> Result<Self, FileError> {
        let index = self.index.try_clone().context(IndexSnafu)?;
        let file = storage::local(
            File::open(&self.metadata.data_path),
            &self.metadata.data_path,
        )
        .context(DataSnafu)?;

        Ok(Self {
            metadata: self.metadata.clone(),
            reader: BufReader::new(file),
            index,
            columns: Arc::clone(&self.columns),
            descriptor_stale: self.descriptor_stale,
            pending_change: self.pending_change,
        })
    }

    /// Read new lines and append row offsets. Returns the number of rows added.
    fn scan(&mut self) -> Result<u64, FileError> {
        let dialect = self.metadata.dialect.clone();
        let mut header_pending = dialect.header;
        let mut buf = Vec::new();

        let mut pos = if self.index.is_empty() {
            debug!("{}: scanning from the start", self.data_path().display());
            self.rewind()?
        } else {
            if header_pending && self.metadata.column_names.is_empty() {
                self.recover_header()?;
            }
            header_pending = false;

            let data_len = storage::file_len(&self.metadata.data_path).context(DataSnafu)?;
            let last = self.index.back().context(IndexSnafu)?;
            ensure!(
                last < data_len,
                TruncatedSnafu {
                    path: self.data_path().display().to_string(),
                    len: data_len,
                    last_offset: last,
                }
            );

            // Step over the last indexed row; it is already in the index.
            self.seek(last)?;
            last + self.read_line(&mut buf)? as u64
        };

        let mut appended = 0;
        loop {
            buf.clear();
            let read = self.read_line(&mut buf)?;
            if read == 0 {
                break;
            }
            let offset = pos;
            pos += read as u64;

            let line = String::from_utf8_lossy(&buf);
            if dialect.is_skipped(&line) {
                continue;
            }
            if header_pending {
                header_pending = false;
                if self.metadata.column_names.is_empty() {
                    self.set_columns(dialect.split_fields(&line))?;
                }
                continue;
            }
            if dialect.strict_columns && !self.columns.is_empty() {
                let found = dialect.split_fields(&line).len();
                ensure!(
                    found == self.columns.len(),
                    SchemaMismatchSnafu {
                        path: self.data_path().display().to_string(),
                        offset,
                        expected: self.columns.len(),
                        found,
                    }
                );
            }

            self.index.append(offset).context(IndexSnafu)?;
            appended += 1;
        }

        self.index.flush().context(IndexSnafu)?;
        Ok(appended)
    }

    /// Name the columns from the header of a file whose rows were indexed by
    /// a session that did not keep the names.
    fn recover_header(&mut self) -> Result<(), FileError> {
        self.rewind()?;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.read_line(&mut buf)? == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            if !self.metadata.dialect.is_skipped(&line) {
                let names = self.metadata.dialect.split_fields(&line);
                return self.set_columns(names);
            }
        }
    }

    fn set_columns(&mut self, names: Vec<String>) -> Result<(), FileError> {
        let mut seen = HashSet::new();
        if let Some(repeated) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return DuplicateColumnSnafu {
                path: self.data_path().display().to_string(),
                column: repeated.clone(),
            }
            .fail();
        }

        debug!(
            "{}: columns from header: {}",
            self.data_path().display(),
            names.join(", ")
        );
        self.columns = Arc::from(names.as_slice());
        self.metadata.column_names = names;
        Ok(())
    }

    fn roll_back(&mut self, len: u64, columns: Vec<String>) {
        if let Err(err) = self.index.truncate(len) {
            warn!(
                "{}: failed to roll back line index to {len} rows: {err}",
                self.data_path().display()
            );
        }
        self.columns = Arc::from(columns.as_slice());
        self.metadata.column_names = columns;
        self.metadata.row_count = self.index.len();
        self.metadata.cache_size = self.index.byte_len();
    }

    /// Seek to the start of the data, past a byte-order mark if present.
    fn rewind(&mut self) -> Result<u64, FileError> {
        self.seek(0)?;
        let has_bom = storage::local(self.reader.fill_buf(), &self.metadata.data_path)
            .context(DataSnafu)?
            .starts_with(BOM);
        if has_bom {
            self.reader.consume(BOM.len());
            return Ok(BOM.len() as u64);
        }
        Ok(0)
    }

    fn seek(&mut self, offset: u64) -> Result<(), FileError> {
        storage::local(
            self.reader.seek(SeekFrom::Start(offset)),
            &self.metadata.data_path,
        )
        .context(DataSnafu)?;
        Ok(())
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, FileError> {
        storage::local(
            self.reader.read_until(b'\n', buf),
            &self.metadata.data_path,
        )
        .context(DataSnafu)
    }
}

impl fmt::Display for IndexedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.metadata)?;
        write!(f, "{}", self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn byte_order_mark_is_skipped_once() -> TestResult {
        let tmp = TempDir::new()?;
        let data = tmp.path().join("bom.csv");
        fs::write(&data, b"\xEF\xBB\xBFTime,Value\n1,2\n")?;

        let mut file = IndexedFile::open(FileMetadata::new(&data))?;
        assert!(file.update(false)?);
        assert_eq!(file.column_names(), ["Time", "Value"]);
        assert_eq!(file.line_index().back()?, 14);
        assert_eq!(file.get_row(0)?.get("Time"), Some("1"));
        Ok(())
    }

    #[test]
    fn header_names_are_recovered_from_an_existing_index() -> TestResult {
        let tmp = TempDir::new()?;
        let data = tmp.path().join("h.csv");
        fs::write(&data, "# log\nA,B\n1,2\n3,4\n")?;

        let mut first = IndexedFile::open(FileMetadata::new(&data))?;
        first.update(false)?;
        drop(first);

        // Same side files, but a descriptor that never saw the header.
        let mut again = IndexedFile::open(FileMetadata::new(&data))?;
        assert!(again.column_names().is_empty());
        assert!(again.update(false)?, "discovering names is a change");
        assert_eq!(again.column_names(), ["A", "B"]);
        assert_eq!(again.row_count(), 2);
        assert_eq!(again.get_row(1)?.get("B"), Some("4"));
        Ok(())
    }

    #[test]
    fn duplicate_header_columns_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let data = tmp.path().join("dup.csv");
        fs::write(&data, "a,b,a\n1,2,3\n")?;

        let mut file = IndexedFile::open(FileMetadata::new(&data))?;
        let err = file.update(false).expect_err("column 'a' appears twice");
        assert!(matches!(err, FileError::DuplicateColumn { ref column, .. } if column == "a"));
        assert_eq!(err.class(), ErrorClass::SchemaMismatch);
        assert_eq!(file.row_count(), 0);
        assert!(file.column_names().is_empty());
        Ok(())
    }

    #[test]
    fn shrunk_data_file_is_reported() -> TestResult {
        let tmp = TempDir::new()?;
        let data = tmp.path().join("s.csv");
        fs::write(&data, "x\n1\n2\n3\n")?;

        let mut file = IndexedFile::open(FileMetadata::new(&data))?;
        file.update(false)?;
        fs::write(&data, "x\n1\n")?;

        let err = file.update(false).expect_err("last row offset is past the end");
        assert!(matches!(err, FileError::Truncated { last_offset: 6, len: 4, .. }));
        assert_eq!(err.class(), ErrorClass::Io);

        assert!(file.update(true)?);
        assert_eq!(file.row_count(), 1);
        Ok(())
    }
}
