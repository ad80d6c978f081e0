//! Descriptor of a set of same-schema data files.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

use super::{
    descriptor::{self, DescriptorError},
    file::FileMetadata,
};

/// File name of the group descriptor inside the parent directory.
pub const GROUP_DESCRIPTOR_NAME: &str = "group_metadata.json";

/// Discovery rule, shared parsing rules and statistics of a file group.
///
/// Members are every file below `parent_path` (recursively) whose path
/// relative to the parent, with `/` separators, fully matches `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub(crate) parent_path: PathBuf,
    pub(crate) pattern: String,

    /// Matched members, sorted by path.
    #[serde(default)]
    pub(crate) data_paths: Vec<PathBuf>,

    pub(crate) descriptor_path: PathBuf,

    #[serde(flatten)]
    pub(crate) dialect: Dialect,

    #[serde(default)]
    pub(crate) column_names: Vec<String>,

    /// Set when `column_names` came from the caller rather than a header.
    #[serde(default)]
    pub(crate) explicit_columns: bool,

    #[serde(default)]
    pub(crate) row_count: u64,
}

impl GroupMetadata {
    /// Describe the files below `parent_path` matching `pattern`.
    ///
    /// The descriptor defaults to `<parent_path>/group_metadata.json`.
    pub fn new(parent_path: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        let parent_path = parent_path.into();
        Self {
            descriptor_path: parent_path.join(GROUP_DESCRIPTOR_NAME),
            parent_path,
            pattern: pattern.into(),
            data_paths: Vec::new(),
            dialect: Dialect::default(),
            column_names: Vec::new(),
            explicit_columns: false,
            row_count: 0,
        }
    }

    /// Persist the descriptor at `path` instead of the default location.
    pub fn with_descriptor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.descriptor_path = path.into();
        self
    }

    /// Parsing rules applied to every member.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Explicit column names for every member. They take precedence over
    /// header lines, which are then skipped.
    pub fn with_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.column_names = names.into_iter().map(Into::into).collect();
        self.explicit_columns = true;
        self
    }

    /// Load a descriptor previously written by [`GroupMetadata::persist`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DescriptorError> {
        descriptor::read_descriptor(path.as_ref())
    }

    /// Write this descriptor to its descriptor path, atomically.
    pub fn persist(&self) -> Result<(), DescriptorError> {
        descriptor::write_descriptor(&self.descriptor_path, self)
    }

    /// Metadata for a newly discovered member at `data_path`, with default
    /// side-file paths and the group's dialect.
    ///
    /// Names given with [`GroupMetadata::with_column_names`] are handed
    /// down, as are the known names of a group without header lines. Names
    /// the group learned from headers are not: every member then reads its
    /// own, so the group can check them against each other.
    pub fn member_metadata(&self, data_path: impl Into<PathBuf>) -> FileMetadata {
        let member = FileMetadata::new(data_path).with_dialect(self.dialect.clone());
        if self.explicit_columns || !self.dialect.header {
            member.with_column_names(self.column_names.iter().cloned())
        } else {
            member
        }
    }

    /// Directory searched for members.
    pub fn parent_path(&self) -> &Path {
        &self.parent_path
    }

    /// Pattern matched against member paths relative to the parent.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Matched members, sorted by path.
    pub fn data_paths(&self) -> &[PathBuf] {
        &self.data_paths
    }

    /// Path of the JSON descriptor.
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Parsing rules shared by every member.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Column names shared by every member; empty until known.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Whether the column names were given explicitly.
    pub fn explicit_columns(&self) -> bool {
        self.explicit_columns
    }

    /// Sum of the members' row counts.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }
}

impl fmt::Display for GroupMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parent directory: '{}'", self.parent_path.display())?;
        writeln!(f, "Pattern: '{}'", self.pattern)?;
        writeln!(f, "Descriptor: '{}'", self.descriptor_path.display())?;
        writeln!(f, "Comment characters: '{}'", self.dialect.comment)?;
        writeln!(f, "Delimiter characters: '{}'", self.dialect.delimiter)?;
        writeln!(f, "Collapse delimiters: {}", self.dialect.multi_delimiter)?;
        writeln!(f, "Header line: {}", self.dialect.header)?;
        writeln!(f, "Columns: {}", self.column_names.join(", "))?;
        if self.explicit_columns {
            writeln!(f, "Column names given explicitly")?;
        }
        writeln!(f, "Rows: {}", self.row_count)?;
        write!(f, "Files: {}", self.data_paths.len())?;
        for path in &self.data_paths {
            write!(f, "\n  {}", path.display())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn descriptor_defaults_into_the_parent() {
        let meta = GroupMetadata::new("/logs/station", r"\d{8}\.csv");
        assert_eq!(
            meta.descriptor_path(),
            Path::new("/logs/station/group_metadata.json")
        );
        assert!(meta.data_paths().is_empty());
    }

    #[test]
    fn members_inherit_dialect_and_columns() {
        let dialect = Dialect {
            header: false,
            ..Dialect::default()
        };
        let group = GroupMetadata::new("/logs", ".*")
            .with_dialect(dialect.clone())
            .with_column_names(["Time", "Phase"]);

        let member = group.member_metadata("/logs/a/1.csv");
        assert_eq!(member.dialect(), &dialect);
        assert_eq!(member.column_names(), ["Time", "Phase"]);
        assert_eq!(member.cache_path(), Path::new("/logs/a/1.csv.cache"));
    }

    #[test]
    fn members_with_headers_name_their_own_columns() {
        let mut group = GroupMetadata::new("/logs", ".*");
        group.column_names = vec!["Time".to_string(), "Phase".to_string()];
        let member = group.member_metadata("/logs/2.csv");
        assert!(member.column_names().is_empty());
        assert!(member.dialect().header);
    }

    #[test]
    fn explicit_names_reach_members_with_headers() {
        let group = GroupMetadata::new("/logs", ".*").with_column_names(["Time", "Phase"]);
        assert!(group.explicit_columns());
        let member = group.member_metadata("/logs/2.csv");
        assert_eq!(member.column_names(), ["Time", "Phase"]);
        assert!(member.dialect().header);
    }

    #[test]
    fn persisted_descriptor_loads_back() -> TestResult {
        let tmp = TempDir::new()?;
        let mut meta = GroupMetadata::new(tmp.path(), r"run_\d+\.csv").with_column_names(["Time"]);
        meta.data_paths = vec![tmp.path().join("run_1.csv"), tmp.path().join("run_2.csv")];
        meta.row_count = 7;

        meta.persist()?;
        let loaded = GroupMetadata::load(tmp.path().join(GROUP_DESCRIPTOR_NAME))?;
        assert_eq!(loaded, meta);

        let rendered = loaded.to_string();
        assert!(rendered.contains("Files: 2"));
        assert!(rendered.contains("run_2.csv"));
        Ok(())
    }
}
