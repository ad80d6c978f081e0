//! Errors raised by the time-series layer.

use snafu::prelude::*;

use crate::{error::ErrorClass, file_group::GroupError};

/// Errors raised by [`crate::time_series::TimeSeriesView`] and the time and
/// value parsers it uses.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TimeSeriesError {
    /// The underlying group failed.
    #[snafu(display("{source}"))]
    Group {
        /// Underlying group error.
        source: GroupError,
    },

    /// The operation needs at least one row.
    #[snafu(display("The time series has no rows"))]
    Empty,

    /// A row has no value for a column the operation needs.
    #[snafu(display("Row {row} has no value for column '{column}'"))]
    MissingColumn {
        /// Global row.
        row: u64,
        /// Requested column.
        column: String,
    },

    /// A time field did not match the configured format.
    #[snafu(display("Failed to parse time '{value}': {source}"))]
    TimeParse {
        /// The text as handed to the parser.
        value: String,
        /// Underlying chrono error.
        source: chrono::ParseError,
    },

    /// A field is not a decimal number.
    #[snafu(display("Column '{column}' value '{value}' is not a number: {source}"))]
    ValueParse {
        /// Column the value came from.
        column: String,
        /// The offending text.
        value: String,
        /// Underlying decimal error.
        source: rust_decimal::Error,
    },

    /// A computation left the representable range.
    #[snafu(display("Arithmetic overflow computing {what}"))]
    Overflow {
        /// The quantity being computed.
        what: &'static str,
    },
}

impl TimeSeriesError {
    /// Classify this error for caller-side handling.
    pub fn class(&self) -> ErrorClass {
        match self {
            TimeSeriesError::Group { source } => source.class(),
            TimeSeriesError::Empty => ErrorClass::Empty,
            TimeSeriesError::MissingColumn { .. }
            | TimeSeriesError::TimeParse { .. }
            | TimeSeriesError::ValueParse { .. }
            | TimeSeriesError::Overflow { .. } => ErrorClass::Parse,
        }
    }
}
