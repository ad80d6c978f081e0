//! Descriptors of data files and file groups.
//!
//! A descriptor records how a dataset is parsed (its [`crate::dialect::Dialect`]),
//! where its side files live, the column names once known, and the row count
//! reached by the last scan. Descriptors are persisted as JSON sidecars next
//! to the data and can be loaded back to reopen a dataset without restating
//! its parsing rules.
//!
//! Descriptors are only written by explicit `persist` calls, which the
//! `update` operations of [`crate::indexed_file`] and [`crate::file_group`]
//! make after a scan; constructing a descriptor never touches the disk.

pub mod descriptor;
pub mod file;
pub mod group;

pub use descriptor::DescriptorError;
pub use file::FileMetadata;
pub use group::GroupMetadata;
