//! Wrapper prelude.
//!
//! The `csv-timeline` crate is the supported public entry point.
//! Downstream code should prefer importing from this prelude instead of
//! depending on internal core module paths.

pub use crate::config;
pub use crate::{
    Bracket, Dialect, ErrorClass, FileError, FileGroup, FileMetadata, GroupError, GroupMetadata,
    IndexedFile, Row, TimeEncoding, TimeFormat, TimeSeriesError, TimeSeriesView, parse_time,
};
