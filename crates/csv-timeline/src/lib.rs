//! # csv-timeline
//!
//! Random access and time-keyed lookup over very large delimited text files
//! that keep growing.
//!
//! This crate is the supported public entry point and provides a small, stable surface.
//!
//! ## Example
//!
//! ```rust,no_run
//! use csv_timeline::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = GroupMetadata::new("/data/clock", r"\d{8}\.csv");
//! let mut group = FileGroup::open(metadata)?;
//! group.update(false)?;
//!
//! let mut series = TimeSeriesView::new(group, TimeEncoding::one_col_standard());
//! let at = parse_time(TimeFormat::Standard, "2025-01-31 12:00:00")?;
//! let phase = series.col_at_time(at, "Phase")?;
//! println!("{phase}");
//! # Ok(())
//! # }
//! ```

/// Convenience prelude with the stable, supported surface.
pub mod prelude;

/// Tuning options.
pub mod config {
    pub use csv_timeline_core::config::{IndexOptions, TimeSeriesOptions};
}

pub use csv_timeline_core::dialect::{Dialect, tokenize};
pub use csv_timeline_core::error::ErrorClass;
pub use csv_timeline_core::file_group::{FileGroup, GroupError};
pub use csv_timeline_core::indexed_file::{FileError, IndexedFile};
pub use csv_timeline_core::line_index::{LineIndex, LineIndexError, UniformSpacing};
pub use csv_timeline_core::metadata::{DescriptorError, FileMetadata, GroupMetadata};
pub use csv_timeline_core::row::Row;
pub use csv_timeline_core::time_series::{
    Bracket, LinearFit, TimeEncoding, TimeFormat, TimeSeriesError, TimeSeriesView, parse_time,
    parse_value,
};
