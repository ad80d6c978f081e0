//! Core engine for out-of-core access to growing delimited text datasets.
//!
//! This crate provides the foundational pieces for `csv-timeline`:
//!
//! - A persisted line-offset index per data file, with arithmetic addressing
//!   for uniformly spaced records (`line_index` module).
//! - JSON descriptors recording how a file or a group of files is parsed and
//!   how far it has been indexed (`metadata` module).
//! - Random row access to one file with incremental re-indexing as the file
//!   grows (`indexed_file` module).
//! - A single row space over every file matching a pattern below a directory
//!   (`file_group` module).
//! - Time-keyed lookup with binary search, interpolation and least-squares
//!   extrapolation over extended-precision decimals (`time_series` module).
//!
//! Everything is synchronous and single-threaded per instance. The engine
//! never writes to data files, only to its own side files.
#![deny(missing_docs)]
pub mod config;
pub mod dialect;
pub mod error;
pub mod file_group;
pub mod indexed_file;
pub mod line_index;
pub mod metadata;
pub mod row;
pub mod storage;
pub mod time_series;
