//! Persisted byte offsets of the rows of one data file.
//!
//! The side file is a flat sequence of 8-byte little-endian signed integers,
//! one per data row, in row order, with no header. It only ever grows by
//! appending, except for an explicit [`LineIndex::clear`] (full rebuild) or a
//! [`LineIndex::truncate`] rollback after a failed scan.
//!
//! # Uniform spacing
//!
//! Instruments that log fixed-width records produce offsets
//! `first + i * stride`. When the index is opened (and after every
//! from-scratch scan) a sample of stored offsets is checked against that
//! formula; if every sample agrees, lookups are answered arithmetically
//! without touching the side file.
//!
//! Every [`LineIndex::append`] checks the new offset against the formula as
//! well and leaves arithmetic mode as soon as the data stops following it.
//! Rows already stored between two samples are not re-read, so a file that
//! was non-uniform *only* between sample points at open time is still
//! misclassified; that is the residual risk of sampling.
//!
//! For non-uniform files a bounded LRU cache of resolved offsets avoids
//! repeated random reads for hot rows.

use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::debug;
use lru::LruCache;
use snafu::prelude::*;

use crate::{
    config::IndexOptions,
    error::ErrorClass,
    storage::{self, StorageError},
};

/// Width in bytes of one stored offset.
pub const OFFSET_WIDTH: u64 = 8;

/// Errors raised by [`LineIndex`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LineIndexError {
    /// Reading, writing or opening the side file failed.
    #[snafu(display("Line index I/O failed: {source}"))]
    Storage {
        /// Underlying storage error carrying the path.
        source: StorageError,
    },

    /// The requested row is not in the index.
    #[snafu(display("Row {index} is out of range for a line index of {len} rows"))]
    OutOfRange {
        /// Requested row.
        index: u64,
        /// Number of rows in the index.
        len: u64,
    },

    /// An operation needing at least one row was called on an empty index.
    #[snafu(display("Line index {path} is empty"))]
    Empty {
        /// Path of the side file.
        path: String,
    },

    /// The side file does not contain a whole number of valid offsets.
    #[snafu(display("Line index {path} is corrupt: {detail}"))]
    Corrupt {
        /// Path of the side file.
        path: String,
        /// What was wrong with it.
        detail: String,
    },
}

impl LineIndexError {
    /// Classify this error for caller-side handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            LineIndexError::Storage { .. } | LineIndexError::Corrupt { .. } => ErrorClass::Io,
            LineIndexError::OutOfRange { .. } => ErrorClass::OutOfRange,
            LineIndexError::Empty { .. } => ErrorClass::Empty,
        }
    }
}

/// Parameters of a uniformly spaced index: `offset(i) = first + i * stride`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSpacing {
    /// Offset of row 0.
    pub first: u64,
    /// Distance in bytes between consecutive rows.
    pub stride: u64,
}

impl UniformSpacing {
    fn offset(&self, index: u64) -> u64 {
        self.first + index * self.stride
    }
}

/// Byte offset of every data row of one physical file, backed by a side file.
///
/// The index exclusively owns its two handles (a reader and an append-mode
/// writer). [`LineIndex::try_clone`] reopens both by path instead of sharing
/// them.
pub struct LineIndex {
    path: PathBuf,
    reader: File,
    writer: BufWriter<File>,
    len: u64,
    last: Option<u64>,
    unflushed: bool,
    spacing: Option<UniformSpacing>,
    cache: LruCache<u64, u64>,
    options: IndexOptions,
}

impl fmt::Debug for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineIndex")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("spacing", &self.spacing)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line index {} ({} rows", self.path.display(), self.len)?;
        match self.spacing {
            Some(s) => write!(f, ", uniform from {} every {} bytes)", s.first, s.stride),
            None => write!(f, ", {} cached offsets)", self.cache.len()),
        }
    }
}

impl LineIndex {
    /// Open (creating if needed) the side file at `path` with default options.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LineIndexError> {
        Self::open_with_options(path, IndexOptions::default())
    }

    /// Open (creating if needed) the side file at `path`.
    ///
    /// Uniform spacing is detected here from the stored offsets.
    pub fn open_with_options(
        path: impl Into<PathBuf>,
        options: IndexOptions,
    ) -> Result<Self, LineIndexError> {
        let path = path.into();

        let writer = storage::local(
            OpenOptions::new().create(true).append(true).open(&path),
            &path,
        )
        .context(StorageSnafu)?;
        let reader = storage::local(File::open(&path), &path).context(StorageSnafu)?;

        let bytes = storage::local(reader.metadata(), &path)
            .context(StorageSnafu)?
            .len();
        ensure!(
            bytes % OFFSET_WIDTH == 0,
            CorruptSnafu {
                path: path.display().to_string(),
                detail: format!("length {bytes} is not a multiple of {OFFSET_WIDTH}"),
            }
        );

        let mut index = Self {
            cache: LruCache::new(options.offset_cache_capacity()),
            path,
            reader,
            writer: BufWriter::new(writer),
            len: bytes / OFFSET_WIDTH,
            last: None,
            unflushed: false,
            spacing: None,
            options,
        };

        if index.len > 0 {
            index.last = Some(index.read_stored(index.len - 1)?);
        }
        index.detect_uniform_spacing()?;

        Ok(index)
    }

    /// Path of the side file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows in the index.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the index holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether lookups are currently answered arithmetically.
    pub fn is_uniform(&self) -> bool {
        self.spacing.is_some()
    }

    /// The detected spacing, if the index is uniformly spaced.
    pub fn spacing(&self) -> Option<UniformSpacing> {
        self.spacing
    }

    /// Size of the side file in bytes once pending writes are flushed.
    pub fn byte_len(&self) -> u64 {
        self.len * OFFSET_WIDTH
    }

    /// Byte offset of row `index`.
    ///
    /// # Errors
    ///
    /// [`LineIndexError::OutOfRange`] if `index >= len()`, or a storage error
    /// if the side file cannot be read.
    pub fn get(&mut self, index: u64) -> Result<u64, LineIndexError> {
        ensure!(
            index < self.len,
            OutOfRangeSnafu {
                index,
                len: self.len
            }
        );

        if let Some(spacing) = self.spacing {
            return Ok(spacing.offset(index));
        }
        if let Some(&offset) = self.cache.get(&index) {
            return Ok(offset);
        }

        let offset = self.read_stored(index)?;
        self.cache.put(index, offset);
        Ok(offset)
    }

    /// Byte offset of the last row.
    ///
    /// # Errors
    ///
    /// [`LineIndexError::Empty`] if the index holds no rows.
    pub fn back(&self) -> Result<u64, LineIndexError> {
        self.last.context(EmptySnafu {
            path: self.path.display().to_string(),
        })
    }

    /// Append the offset of a new row.
    ///
    /// Offsets must be strictly increasing; this is only checked in debug
    /// builds. Writes are buffered until [`LineIndex::flush`] or the next
    /// read from the side file.
    pub fn append(&mut self, offset: u64) -> Result<(), LineIndexError> {
        debug_assert!(
            self.last.is_none_or(|last| offset > last),
            "line index offsets must be strictly increasing"
        );

        if let Some(spacing) = self.spacing
            && spacing.offset(self.len) != offset
        {
            debug!(
                "{}: row {} at {offset} breaks uniform stride {}, leaving arithmetic mode",
                self.path.display(),
                self.len,
                spacing.stride
            );
            self.spacing = None;
        }

        let stored = i64::try_from(offset).ok().context(CorruptSnafu {
            path: self.path.display().to_string(),
            detail: format!("offset {offset} does not fit a signed 64-bit integer"),
        })?;
        storage::local(self.writer.write_all(&stored.to_le_bytes()), &self.path)
            .context(StorageSnafu)?;

        self.len += 1;
        self.last = Some(offset);
        self.unflushed = true;
        Ok(())
    }

    /// Push buffered appends to the side file.
    pub fn flush(&mut self) -> Result<(), LineIndexError> {
        if self.unflushed {
            storage::local(self.writer.flush(), &self.path).context(StorageSnafu)?;
            self.unflushed = false;
        }
        Ok(())
    }

    /// Discard every offset and the derived spacing (full rebuild).
    pub fn clear(&mut self) -> Result<(), LineIndexError> {
        self.truncate(0)?;
        self.spacing = None;
        Ok(())
    }

    /// Drop every row at or after `len`.
    ///
    /// Used to roll back a scan that failed part way. Truncating to a prefix
    /// keeps a detected spacing valid.
    pub fn truncate(&mut self, len: u64) -> Result<(), LineIndexError> {
        if len >= self.len {
            return Ok(());
        }
        self.flush()?;
        storage::local(self.writer.get_ref().set_len(len * OFFSET_WIDTH), &self.path)
            .context(StorageSnafu)?;

        self.len = len;
        self.cache.clear();
        self.last = None;
        if len > 0 {
            self.last = Some(self.read_stored(len - 1)?);
        }
        Ok(())
    }

    /// Re-run uniform spacing detection over the stored offsets.
    ///
    /// Samples every `max(1, len / uniform_segments)`-th row plus the last
    /// row. Returns whether arithmetic mode is now active.
    pub fn detect_uniform_spacing(&mut self) -> Result<bool, LineIndexError> {
        self.spacing = None;
        if self.len < 2 {
            return Ok(false);
        }

        let first = self.read_stored(0)?;
        let Some(stride) = self.read_stored(1)?.checked_sub(first) else {
            return Ok(false);
        };
        let spacing = UniformSpacing { first, stride };

        let step = usize::try_from(self.len / self.options.uniform_segments() as u64)
            .unwrap_or(usize::MAX)
            .max(1);
        let samples = (0..self.len).step_by(step).chain(std::iter::once(self.len - 1));
        for i in samples {
            if self.read_stored(i)? != spacing.offset(i) {
                debug!(
                    "{}: not uniformly spaced (row {i} off stride {stride})",
                    self.path.display()
                );
                return Ok(false);
            }
        }

        debug!(
            "{}: {} rows uniformly spaced from {first} every {stride} bytes",
            self.path.display(),
            self.len
        );
        self.spacing = Some(spacing);
        Ok(true)
    }

    /// Open independent handles on the same side file.
    ///
    /// Pending appends are flushed first so the copy sees them. The copy
    /// starts with an empty offset cache and detects spacing from the
    /// stored offsets, including those appended since this index last did.
    pub fn try_clone(&mut self) -> Result<Self, LineIndexError> {
        self.flush()?;
        Self::open_with_options(&self.path, self.options.clone())
    }

    /// Read row `index` from the side file, ignoring spacing and cache.
    fn read_stored(&mut self, index: u64) -> Result<u64, LineIndexError> {
        self.flush()?;

        let mut buf = [0u8; OFFSET_WIDTH as usize];
        storage::local(
            self.reader.seek(SeekFrom::Start(index * OFFSET_WIDTH)),
            &self.path,
        )
        .context(StorageSnafu)?;
        storage::local(self.reader.read_exact(&mut buf), &self.path).context(StorageSnafu)?;

        let stored = i64::from_le_bytes(buf);
        u64::try_from(stored).ok().context(CorruptSnafu {
            path: self.path.display().to_string(),
            detail: format!("row {index} has negative offset {stored}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn filled(dir: &TempDir, name: &str, offsets: &[u64]) -> Result<LineIndex, LineIndexError> {
        let mut index = LineIndex::open(dir.path().join(name))?;
        for &offset in offsets {
            index.append(offset)?;
        }
        index.flush()?;
        Ok(index)
    }

    #[test]
    fn appended_offsets_survive_reopen() -> TestResult {
        let tmp = TempDir::new()?;
        let offsets = [10, 25, 41, 70];
        drop(filled(&tmp, "a.cache", &offsets)?);

        let mut index = LineIndex::open(tmp.path().join("a.cache"))?;
        assert_eq!(index.len(), 4);
        assert!(!index.is_uniform());
        for (i, &expected) in offsets.iter().enumerate() {
            assert_eq!(index.get(i as u64)?, expected);
        }
        assert_eq!(index.back()?, 70);
        assert_eq!(fs::metadata(tmp.path().join("a.cache"))?.len(), 32);
        Ok(())
    }

    #[test]
    fn out_of_range_and_empty_are_reported() -> TestResult {
        let tmp = TempDir::new()?;
        let mut index = filled(&tmp, "e.cache", &[])?;

        assert!(matches!(index.back(), Err(LineIndexError::Empty { .. })));
        let err = index.get(0).expect_err("empty index");
        assert!(matches!(err, LineIndexError::OutOfRange { index: 0, len: 0 }));
        assert_eq!(err.class(), ErrorClass::OutOfRange);

        index.append(5)?;
        assert!(index.get(1).is_err());
        Ok(())
    }

    #[test]
    fn fixed_width_rows_switch_to_arithmetic_mode() -> TestResult {
        let tmp = TempDir::new()?;
        let offsets: Vec<u64> = (0..1000).map(|i| 12 + i * 31).collect();
        drop(filled(&tmp, "u.cache", &offsets)?);

        let mut index = LineIndex::open(tmp.path().join("u.cache"))?;
        assert_eq!(
            index.spacing(),
            Some(UniformSpacing {
                first: 12,
                stride: 31
            })
        );
        for i in 0..1000u64 {
            let arithmetic = index.get(i)?;
            assert_eq!(arithmetic, index.read_stored(i)?);
            assert_eq!(arithmetic, offsets[i as usize]);
        }
        Ok(())
    }

    #[test]
    fn irregular_tail_is_caught_by_last_row_sample() -> TestResult {
        let tmp = TempDir::new()?;
        let mut offsets: Vec<u64> = (0..500).map(|i| i * 20).collect();
        offsets.push(500 * 20 + 7);
        drop(filled(&tmp, "t.cache", &offsets)?);

        let index = LineIndex::open(tmp.path().join("t.cache"))?;
        assert!(!index.is_uniform());
        Ok(())
    }

    #[test]
    fn append_breaking_the_stride_leaves_arithmetic_mode() -> TestResult {
        let tmp = TempDir::new()?;
        let offsets: Vec<u64> = (0..50).map(|i| i * 16).collect();
        drop(filled(&tmp, "g.cache", &offsets)?);

        let mut index = LineIndex::open(tmp.path().join("g.cache"))?;
        assert!(index.is_uniform());

        index.append(50 * 16)?;
        assert!(index.is_uniform(), "on-stride append keeps arithmetic mode");

        // A logging gap: the next record starts later than the stride predicts.
        index.append(51 * 16 + 100)?;
        assert!(!index.is_uniform());
        assert_eq!(index.get(51)?, 51 * 16 + 100);
        assert_eq!(index.get(50)?, 50 * 16);
        Ok(())
    }

    #[test]
    fn clear_and_truncate_reset_state() -> TestResult {
        let tmp = TempDir::new()?;
        let mut index = filled(&tmp, "c.cache", &[3, 9, 27, 81])?;

        index.truncate(2)?;
        assert_eq!(index.len(), 2);
        assert_eq!(index.back()?, 9);
        index.append(12)?;
        assert_eq!(index.get(2)?, 12);

        index.clear()?;
        assert!(index.is_empty());
        assert!(!index.is_uniform());
        index.flush()?;
        assert_eq!(fs::metadata(index.path())?.len(), 0);
        Ok(())
    }

    #[test]
    fn ragged_side_file_is_corrupt() -> TestResult {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("r.cache");
        fs::write(&path, [0u8; 12])?;

        let err = LineIndex::open(&path).expect_err("12 bytes is not a whole offset count");
        assert!(matches!(err, LineIndexError::Corrupt { .. }));
        assert_eq!(err.class(), ErrorClass::Io);
        Ok(())
    }

    #[test]
    fn clone_reopens_and_sees_pending_appends() -> TestResult {
        let tmp = TempDir::new()?;
        let mut index = LineIndex::open(tmp.path().join("k.cache"))?;
        index.append(4)?;
        index.append(11)?;

        let mut copy = index.try_clone()?;
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(1)?, 11);

        drop(index);
        assert_eq!(copy.get(0)?, 4);
        Ok(())
    }

    #[test]
    fn clone_detects_spacing_from_the_stored_offsets() -> TestResult {
        let tmp = TempDir::new()?;
        let mut index = LineIndex::open(tmp.path().join("s.cache"))?;
        for offset in [0, 10, 20] {
            index.append(offset)?;
        }
        // Never re-detected since the index was opened empty.
        assert!(!index.is_uniform());
        let mut copy = index.try_clone()?;
        assert!(copy.is_uniform());
        assert_eq!(copy.get(2)?, 20);

        index.append(35)?;
        let mut copy = index.try_clone()?;
        assert!(!copy.is_uniform());
        assert_eq!(copy.get(3)?, 35);
        assert_eq!(copy.get(2)?, 20);
        Ok(())
    }
}
