//! Several same-schema data files viewed as one row space.
//!
//! A [`FileGroup`] tracks every file below a parent directory whose relative
//! path fully matches a regular expression. Members are kept sorted by path,
//! and that order defines the global row order: row `r` of the group is row
//! `r - starting_rows[f]` of member `f`, where `starting_rows` is the prefix
//! sum of the members' row counts. Callers that need chronological order must
//! name their files so that path order is time order.
//!
//! [`FileGroup::update`] finds new members, lets existing ones index their
//! appended rows, checks that all members agree on column names and only
//! then commits the new layout.

use std::{
    collections::HashSet,
    fmt,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use regex::Regex;
use snafu::prelude::*;
use walkdir::WalkDir;

use crate::{
    config::IndexOptions,
    error::ErrorClass,
    indexed_file::{FileError, IndexedFile},
    metadata::{DescriptorError, GroupMetadata, file::with_suffix},
    row::Row,
};

/// Errors raised by [`FileGroup`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum GroupError {
    /// A member file failed.
    #[snafu(display("{source}"))]
    File {
        /// Underlying member error.
        source: FileError,
    },

    /// The parent directory could not be walked.
    #[snafu(display("Failed to list {path}: {source}"))]
    Walk {
        /// Parent directory.
        path: String,
        /// Underlying directory walk error.
        source: walkdir::Error,
    },

    /// The filename pattern is not a valid regular expression.
    #[snafu(display("Invalid file pattern '{pattern}': {source}"))]
    Pattern {
        /// The pattern as given.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A member's column names differ from the group's.
    #[snafu(display("{path} has columns {found:?}, the group has {expected:?}"))]
    SchemaMismatch {
        /// Offending member.
        path: String,
        /// Column names of the group.
        expected: Vec<String>,
        /// Column names of the member.
        found: Vec<String>,
    },

    /// The requested row is beyond the group's rows.
    #[snafu(display("Row {row} is out of range for a group of {len} rows"))]
    OutOfRange {
        /// Requested global row.
        row: u64,
        /// Rows in the group.
        len: u64,
    },

    /// Loading or persisting the group descriptor failed.
    #[snafu(display("{source}"))]
    Descriptor {
        /// Underlying descriptor error.
        source: DescriptorError,
    },
}

impl GroupError {
    /// Classify this error for caller-side handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            GroupError::File { source } => source.class(),
            GroupError::Descriptor { source } => source.class(),
            GroupError::Walk { .. } => ErrorClass::Io,
            GroupError::Pattern { .. } => ErrorClass::Parse,
            GroupError::SchemaMismatch { .. } => ErrorClass::SchemaMismatch,
            GroupError::OutOfRange { .. } => ErrorClass::OutOfRange,
        }
    }
}

/// Sorted member files with a shared schema and one global row numbering.
#[derive(Debug)]
pub struct FileGroup {
    metadata: GroupMetadata,
    pattern: Regex,
    files: Vec<IndexedFile>,
    starting_rows: Vec<u64>,
    options: IndexOptions,
    descriptor_stale: bool,
    /// Member growth or new members not yet committed by a successful update.
    pending_change: bool,
}

fn compile_pattern(pattern: &str) -> Result<Regex, GroupError> {
    Regex::new(&format!("^(?:{pattern})$")).context(PatternSnafu { pattern })
}

impl FileGroup {
    /// Open a group with default index options.
    ///
    /// Members recorded in the descriptor are reopened (not scanned); call
    /// [`FileGroup::update`] to discover files and index rows.
    pub fn open(metadata: GroupMetadata) -> Result<Self, GroupError> {
        Self::open_with_options(metadata, IndexOptions::default())
    }

    /// Open a group, passing `options` to every member's line index.
    pub fn open_with_options(
        mut metadata: GroupMetadata,
        options: IndexOptions,
    ) -> Result<Self, GroupError> {
        let pattern = compile_pattern(&metadata.pattern)?;

        let mut descriptor_stale = false;
        let mut paths = std::mem::take(&mut metadata.data_paths);
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            if !path.is_file() {
                warn!(
                    "{}: listed in the group descriptor but no longer exists",
                    path.display()
                );
                descriptor_stale = true;
                continue;
            }
            // Recorded members were checked against the group's columns when
            // they joined.
            let member = metadata
                .member_metadata(&path)
                .with_column_names(metadata.column_names.iter().cloned());
            files.push(
                IndexedFile::open_with_options(member, options.clone()).context(FileSnafu)?,
            );
        }

        let recorded_rows = metadata.row_count;
        let mut group = Self {
            metadata,
            pattern,
            files,
            starting_rows: Vec::new(),
            options,
            descriptor_stale,
            pending_change: false,
        };
        group.refresh_layout();

        if group.metadata.row_count != recorded_rows {
            warn!(
                "{}: group descriptor records {recorded_rows} rows but the members hold {}",
                group.metadata.parent_path.display(),
                group.metadata.row_count
            );
            group.descriptor_stale = true;
        }
        Ok(group)
    }

    /// Reopen a group from a descriptor written by an earlier session.
    pub fn from_descriptor(path: impl AsRef<Path>) -> Result<Self, GroupError> {
        Self::from_descriptor_with_options(path, IndexOptions::default())
    }

    /// Reopen a group from a descriptor, with explicit index options.
    pub fn from_descriptor_with_options(
        path: impl AsRef<Path>,
        options: IndexOptions,
    ) -> Result<Self, GroupError> {
        let metadata = GroupMetadata::load(path).context(DescriptorSnafu)?;
        Self::open_with_options(metadata, options)
    }

    /// The group's descriptor as of the last update.
    pub fn metadata(&self) -> &GroupMetadata {
        &self.metadata
    }

    /// Members in global row order.
    pub fn files(&self) -> &[IndexedFile] {
        &self.files
    }

    /// First global row of each member.
    pub fn starting_rows(&self) -> &[u64] {
        &self.starting_rows
    }

    /// Total rows over all members.
    pub fn row_count(&self) -> u64 {
        self.metadata.row_count
    }

    /// Column names shared by every member; empty until known.
    pub fn column_names(&self) -> &[String] {
        &self.metadata.column_names
    }

    /// Discover new members and index rows appended to existing ones.
    ///
    /// With `rebuild` every member's index is rebuilt from scratch. Returns
    /// whether any member gained rows or column names, or new members were
    /// found. The group descriptor is persisted only in that case (or when
    /// it is missing or out of date). Growth seen by an update that then
    /// failed is reported by the next successful one.
    ///
    /// # Errors
    ///
    /// [`GroupError::SchemaMismatch`] when a member's column names differ
    /// from the group's. New members are then discarded and the group's
    /// layout stays as it was.
    pub fn update(&mut self, rebuild: bool) -> Result<bool, GroupError> {
        let found = self.discover()?;
        let on_disk: HashSet<&Path> = found.iter().map(PathBuf::as_path).collect();
        for file in &mut self.files {
            if !on_disk.contains(file.data_path()) {
                warn!(
                    "{}: member no longer matches on disk, keeping its indexed rows",
                    file.data_path().display()
                );
                continue;
            }
            if file.update(rebuild).context(FileSnafu)? {
                self.pending_change = true;
            }
        }

        let tracked: HashSet<PathBuf> = self
            .files
            .iter()
            .map(|file| file.data_path().to_path_buf())
            .collect();
        let mut staged = Vec::new();
        for path in found.iter().filter(|path| !tracked.contains(*path)) {
            debug!("{}: new group member", path.display());
            let member = self.metadata.member_metadata(path);
            let mut file =
                IndexedFile::open_with_options(member, self.options.clone()).context(FileSnafu)?;
            file.update(rebuild).context(FileSnafu)?;
            staged.push(file);
        }

        let columns = self.check_columns(&staged)?;

        if !staged.is_empty() {
            info!(
                "{}: {} new member file(s)",
                self.metadata.parent_path.display(),
                staged.len()
            );
            self.pending_change = true;
        }
        self.files.extend(staged);
        self.files.sort_by(|a, b| a.data_path().cmp(b.data_path()));
        if let Some(columns) = columns {
            self.metadata.column_names = columns;
        }
        self.refresh_layout();

        let changed = self.pending_change;
        if changed || self.descriptor_stale || !self.metadata.descriptor_path.exists() {
            self.persist()?;
        }
        self.pending_change = false;
        Ok(changed)
    }

    /// Write the group descriptor to disk.
    pub fn persist(&mut self) -> Result<(), GroupError> {
        self.metadata.persist().context(DescriptorSnafu)?;
        self.descriptor_stale = false;
        Ok(())
    }

    /// Member index and member-local row of global row `row`.
    ///
    /// # Errors
    ///
    /// [`GroupError::OutOfRange`] if `row >= row_count()`.
    pub fn get_file_index_and_row(&self, row: u64) -> Result<(usize, u64), GroupError> {
        let len = self.metadata.row_count;
        ensure!(row < len, OutOfRangeSnafu { row, len });

        // Last member starting at or before `row`; members without rows share
        // their start with the next one and are skipped this way.
        let file = self
            .starting_rows
            .partition_point(|&start| start <= row)
            .checked_sub(1)
            .context(OutOfRangeSnafu { row, len })?;
        Ok((file, row - self.starting_rows[file]))
    }

    /// Global row `row` split into fields.
    pub fn get_row(&mut self, row: u64) -> Result<Row, GroupError> {
        let (file, local) = self.get_file_index_and_row(row)?;
        self.files[file].get_row(local).context(FileSnafu)
    }

    /// Text of global row `row` without its line terminator.
    pub fn get_raw_line(&mut self, row: u64) -> Result<String, GroupError> {
        let (file, local) = self.get_file_index_and_row(row)?;
        self.files[file].get_raw_line(local).context(FileSnafu)
    }

    /// Open independent handles on every member.
    pub fn try_clone(&mut self) -> Result<Self, GroupError> {
        let files = self
            .files
            .iter_mut()
            .map(IndexedFile::try_clone)
            .collect::<Result<Vec<_>, _>>()
            .context(FileSnafu)?;

        Ok(Self {
            metadata: self.metadata.clone(),
            pattern: self.pattern.clone(),
            files,
            starting_rows: self.starting_rows.clone(),
            options: self.options.clone(),
            descriptor_stale: self.descriptor_stale,
            pending_change: self.pending_change,
        })
    }

    /// Every matching regular file below the parent, sorted, without the
    /// side files this crate writes next to them.
    fn discover(&self) -> Result<Vec<PathBuf>, GroupError> {
        let parent = &self.metadata.parent_path;
        let mut found = Vec::new();

        for entry in WalkDir::new(parent).follow_links(true) {
            let entry = entry.context(WalkSnafu {
                path: parent.display().to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(parent) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if self.pattern.is_match(&relative) {
                found.push(entry.into_path());
            }
        }

        let side_files: HashSet<PathBuf> = found
            .iter()
            .flat_map(|path| [with_suffix(path, ".cache"), with_suffix(path, ".json")])
            .chain(std::iter::once(self.metadata.descriptor_path.clone()))
            .collect();
        found.retain(|path| !side_files.contains(path));
        found.sort();

        debug!(
            "{}: {} file(s) match '{}'",
            parent.display(),
            found.len(),
            self.metadata.pattern
        );
        Ok(found)
    }

    /// Column names every member agrees on, or `None` while unknown.
    ///
    /// Members without column names and without rows have not written their
    /// header yet and are not checked.
    fn check_columns(&self, staged: &[IndexedFile]) -> Result<Option<Vec<String>>, GroupError> {
        let mut expected = (!self.metadata.column_names.is_empty())
            .then(|| self.metadata.column_names.clone());

        for file in self.files.iter().chain(staged) {
            if file.column_names().is_empty() && file.row_count() == 0 {
                continue;
            }
            match &expected {
                Some(names) => ensure!(
                    file.column_names() == names.as_slice(),
                    SchemaMismatchSnafu {
                        path: file.data_path().display().to_string(),
                        expected: names.clone(),
                        found: file.column_names().to_vec(),
                    }
                ),
                None => expected = Some(file.column_names().to_vec()),
            }
        }
        Ok(expected)
    }

    fn refresh_layout(&mut self) {
        self.starting_rows.clear();
        let mut total = 0;
        for file in &self.files {
            self.starting_rows.push(total);
            total += file.row_count();
        }
        self.metadata.data_paths = self
            .files
            .iter()
            .map(|file| file.data_path().to_path_buf())
            .collect();
        self.metadata.row_count = total;
    }
}

impl fmt::Display for FileGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.metadata)?;
        for file in &self.files {
            write!(f, "\n\n{file}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn invalid_pattern_is_a_parse_error() {
        let err = FileGroup::open(GroupMetadata::new("/nowhere", "run_(\\d+"))
            .expect_err("unbalanced parenthesis");
        assert!(matches!(err, GroupError::Pattern { .. }));
        assert_eq!(err.class(), ErrorClass::Parse);
    }

    #[test]
    fn pattern_must_match_the_whole_relative_path() -> TestResult {
        let tmp = TempDir::new()?;
        fs::create_dir(tmp.path().join("2024"))?;
        fs::write(tmp.path().join("2024/a.csv"), "x\n1\n")?;
        fs::write(tmp.path().join("a.csv"), "x\n1\n")?;
        fs::write(tmp.path().join("a.csv.bak"), "x\n1\n")?;

        let mut group = FileGroup::open(GroupMetadata::new(tmp.path(), r"\d{4}/.*\.csv"))?;
        group.update(false)?;

        assert_eq!(
            group.metadata().data_paths(),
            [tmp.path().join("2024/a.csv")]
        );
        Ok(())
    }

    #[test]
    fn side_files_are_not_members() -> TestResult {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join("a.csv"), "x\n1\n")?;

        let mut group = FileGroup::open(GroupMetadata::new(tmp.path(), ".*"))?;
        group.update(false)?;
        // The first pass wrote a.csv.cache, a.csv.json and group_metadata.json.
        assert!(!group.update(false)?);
        assert_eq!(group.files().len(), 1);
        assert_eq!(group.row_count(), 1);
        Ok(())
    }

    #[test]
    fn missing_parent_is_an_io_error() -> TestResult {
        let tmp = TempDir::new()?;
        let mut group = FileGroup::open(GroupMetadata::new(tmp.path().join("gone"), ".*"))?;
        let err = group.update(false).expect_err("parent does not exist");
        assert!(matches!(err, GroupError::Walk { .. }));
        assert_eq!(err.class(), ErrorClass::Io);
        Ok(())
    }
}
