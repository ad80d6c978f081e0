//! Coarse classification shared by every error type in the crate.
//!
//! Each layer keeps its own error enum with full context, but callers often
//! only need to decide between a few policies: retry after the dataset grows,
//! give up, or fix the input. Every public error exposes `class()` returning
//! an [`ErrorClass`] for that purpose.

use std::fmt;

/// Which kind of failure an error represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A file could not be opened, read or written, or a side file is
    /// inconsistent with the data it describes.
    Io,

    /// A row index beyond the rows known so far. For growing datasets this
    /// may only mean "not available yet": re-poll after an update.
    OutOfRange,

    /// Column names differ between group members, or a row does not have
    /// the expected number of fields under strict checking.
    SchemaMismatch,

    /// A time, number or filename pattern failed to parse, or a numeric
    /// computation left the representable range.
    Parse,

    /// The operation needs at least one row but there are none.
    Empty,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Io => "I/O error",
            ErrorClass::OutOfRange => "out of range",
            ErrorClass::SchemaMismatch => "schema mismatch",
            ErrorClass::Parse => "parse error",
            ErrorClass::Empty => "empty",
        };
        f.write_str(name)
    }
}
