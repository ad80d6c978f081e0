//! Textual time layouts and how a row encodes its timestamp.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::row::Row;

use super::error::{MissingColumnSnafu, TimeParseSnafu, TimeSeriesError};

/// Layout of a timestamp field. Fractional seconds are optional and parsed
/// down to nanoseconds. Times are taken as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFormat {
    /// `2024-03-01 12:30:05.25`
    Standard,
    /// `20240301T123005.25`, with `,` or `.` before the fraction.
    Iso,
    /// `2024-03-01T12:30:05.25`
    IsoExtended,
}

impl TimeFormat {
    /// The chrono format string for this layout.
    pub fn pattern(self) -> &'static str {
        match self {
            TimeFormat::Standard => "%Y-%m-%d %H:%M:%S%.f",
            TimeFormat::Iso => "%Y%m%dT%H%M%S%.f",
            TimeFormat::IsoExtended => "%Y-%m-%dT%H:%M:%S%.f",
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeFormat::Standard => "standard",
            TimeFormat::Iso => "iso",
            TimeFormat::IsoExtended => "iso-extended",
        };
        f.write_str(name)
    }
}

/// Parse `text` (surrounding whitespace ignored) in `format`.
///
/// ```
/// use csv_timeline_core::time_series::format::{TimeFormat, parse_time};
///
/// let a = parse_time(TimeFormat::Standard, "2024-03-01 12:30:05.25").unwrap();
/// let b = parse_time(TimeFormat::Iso, "20240301T123005,25").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_time(format: TimeFormat, text: &str) -> Result<DateTime<Utc>, TimeSeriesError> {
    let text = text.trim();
    let text = match format {
        TimeFormat::Iso => text.replace(',', "."),
        TimeFormat::Standard | TimeFormat::IsoExtended => text.to_string(),
    };
    let parsed = NaiveDateTime::parse_from_str(&text, format.pattern())
        .context(TimeParseSnafu { value: text })?;
    Ok(parsed.and_utc())
}

/// Which columns of a row hold its timestamp, and in what layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoding {
    /// The whole timestamp in one column.
    SingleColumn {
        /// Column name.
        column: String,
        /// Layout of the column.
        format: TimeFormat,
    },

    /// A two-digit-year date column (`YYMMDD`, 21st century) and a time of
    /// day column (`HHMMSS` with optional fraction).
    DayAndTime {
        /// Column holding `YYMMDD`.
        day_column: String,
        /// Column holding `HHMMSS.f`.
        time_column: String,
    },
}

impl Default for TimeEncoding {
    fn default() -> Self {
        Self::one_col_standard()
    }
}

impl TimeEncoding {
    /// A `Time` column in [`TimeFormat::Standard`].
    pub fn one_col_standard() -> Self {
        TimeEncoding::SingleColumn {
            column: "Time".to_string(),
            format: TimeFormat::Standard,
        }
    }

    /// A `Day` column (`YYMMDD`) and a `Time` column (`HHMMSS.f`).
    pub fn two_col_short() -> Self {
        TimeEncoding::DayAndTime {
            day_column: "Day".to_string(),
            time_column: "Time".to_string(),
        }
    }

    /// Timestamp of `row`, which is global row `index` (for error context).
    pub fn parse_row(&self, index: u64, row: &Row) -> Result<DateTime<Utc>, TimeSeriesError> {
        let field = |column: &str| {
            row.get(column).context(MissingColumnSnafu {
                row: index,
                column,
            })
        };

        match self {
            TimeEncoding::SingleColumn { column, format } => {
                parse_time(*format, field(column.as_str())?)
            }
            TimeEncoding::DayAndTime {
                day_column,
                time_column,
            } => {
                let day = field(day_column.as_str())?.trim();
                let time = field(time_column.as_str())?.trim();
                parse_time(TimeFormat::Iso, &format!("20{day}T{time}"))
            }
        }
    }
}
