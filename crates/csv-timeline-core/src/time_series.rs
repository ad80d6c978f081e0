//! Time-keyed access to a file group.
//!
//! A [`TimeSeriesView`] treats the rows of a [`FileGroup`] as samples ordered
//! by a timestamp parsed from each row (see [`TimeEncoding`]). Rows must be
//! non-decreasing in time; this is the caller's responsibility and is not
//! verified.
//!
//! On top of that ordering the view answers:
//!
//! - which rows bracket a time ([`TimeSeriesView::bounds`]), by binary
//!   search over row indices;
//! - the row closest to a time ([`TimeSeriesView::closest_index`]);
//! - the value of a column at any time ([`TimeSeriesView::col_at_time`]):
//!   linear interpolation inside the covered range, and a least-squares line
//!   through the first or last rows outside it.
//!
//! Values are [`Decimal`]s. Parsed timestamps and fitted lines are cached;
//! [`TimeSeriesView::update`] drops the entries that new data may have
//! invalidated.

pub mod error;
pub mod format;
pub mod regression;

use std::{
    borrow::{Borrow, BorrowMut},
    collections::HashMap,
    fmt,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use log::debug;
use lru::LruCache;
use rust_decimal::Decimal;
use snafu::prelude::*;

pub use error::TimeSeriesError;
pub use format::{TimeEncoding, TimeFormat, parse_time};
pub use regression::LinearFit;

use crate::{config::TimeSeriesOptions, file_group::FileGroup, row::Row};

use error::{EmptySnafu, GroupSnafu, MissingColumnSnafu, OverflowSnafu, ValueParseSnafu};
use regression::micros_between;

/// Where a time falls relative to the rows of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    /// Before the first row.
    Below,
    /// Between rows `low` and `high` (`low + 1 == high`), or exactly at row
    /// `low == high`.
    Within {
        /// Last row at or before the time.
        low: u64,
        /// First row at or after the time.
        high: u64,
    },
    /// After the last row.
    Above,
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Below,
    Above,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Below => f.write_str("below-range"),
            Side::Above => f.write_str("above-range"),
        }
    }
}

/// Path, first global row and row count of each member.
type Layout = Vec<(PathBuf, u64, u64)>;

fn layout_of(group: &FileGroup) -> Layout {
    group
        .files()
        .iter()
        .zip(group.starting_rows())
        .map(|(file, &start)| (file.data_path().to_path_buf(), start, file.row_count()))
        .collect()
}

/// Whether every row numbered under `before` still refers to the same line
/// under `after`: same members in the same places, only the last one grown.
fn keeps_row_numbers(before: &Layout, after: &Layout) -> bool {
    before.len() <= after.len()
        && before
            .iter()
            .zip(after)
            .enumerate()
            .all(|(i, (old, new))| {
                old.0 == new.0 && old.1 == new.1 && (i + 1 == before.len() || old.2 == new.2)
            })
}

/// Parse a column value, accepting plain and scientific notation.
pub fn parse_value(column: &str, text: &str) -> Result<Decimal, TimeSeriesError> {
    let text = text.trim();
    let parsed = if text.contains(['e', 'E']) {
        Decimal::from_scientific(text)
    } else {
        text.parse::<Decimal>()
    };
    parsed.context(ValueParseSnafu {
        column,
        value: text,
    })
}

/// A [`FileGroup`] viewed as a time series.
///
/// `G` is either an owned [`FileGroup`] or a mutable borrow of one.
pub struct TimeSeriesView<G = FileGroup> {
    group: G,
    encoding: TimeEncoding,
    times: LruCache<u64, DateTime<Utc>>,
    below: HashMap<String, LinearFit>,
    above: HashMap<String, LinearFit>,
    options: TimeSeriesOptions,
}

impl<G: fmt::Debug> fmt::Debug for TimeSeriesView<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSeriesView")
            .field("group", &self.group)
            .field("encoding", &self.encoding)
            .field("cached_times", &self.times.len())
            .field("below_fits", &self.below.len())
            .field("above_fits", &self.above.len())
            .finish()
    }
}

impl<G: BorrowMut<FileGroup>> TimeSeriesView<G> {
    /// View `group` with default options.
    pub fn new(group: G, encoding: TimeEncoding) -> Self {
        Self::with_options(group, encoding, TimeSeriesOptions::default())
    }

    /// View `group` with explicit cache and extrapolation options.
    pub fn with_options(group: G, encoding: TimeEncoding, options: TimeSeriesOptions) -> Self {
        Self {
            group,
            encoding,
            times: LruCache::new(options.time_cache_capacity()),
            below: HashMap::new(),
            above: HashMap::new(),
            options,
        }
    }

    /// The underlying group.
    pub fn group(&self) -> &FileGroup {
        <G as Borrow<FileGroup>>::borrow(&self.group)
    }

    fn group_mut(&mut self) -> &mut FileGroup {
        <G as BorrowMut<FileGroup>>::borrow_mut(&mut self.group)
    }

    /// Give back the group.
    pub fn into_inner(self) -> G {
        self.group
    }

    /// How timestamps are read from rows.
    pub fn encoding(&self) -> &TimeEncoding {
        &self.encoding
    }

    /// Rows in the series.
    pub fn row_count(&self) -> u64 {
        self.group().row_count()
    }

    /// Row `index` split into fields.
    pub fn row(&mut self, index: u64) -> Result<Row, TimeSeriesError> {
        self.group_mut().get_row(index).context(GroupSnafu)
    }

    /// Text of row `index`.
    pub fn raw_line(&mut self, index: u64) -> Result<String, TimeSeriesError> {
        self.group_mut().get_raw_line(index).context(GroupSnafu)
    }

    /// Timestamp of row `index`.
    pub fn time_of_row(&mut self, index: u64) -> Result<DateTime<Utc>, TimeSeriesError> {
        if let Some(&time) = self.times.get(&index) {
            return Ok(time);
        }
        let row = self.row(index)?;
        let time = self.encoding.parse_row(index, &row)?;
        self.times.put(index, time);
        Ok(time)
    }

    /// Timestamp of the first row.
    pub fn start_time(&mut self) -> Result<DateTime<Utc>, TimeSeriesError> {
        ensure!(self.row_count() > 0, EmptySnafu);
        self.time_of_row(0)
    }

    /// Timestamp of the last row.
    pub fn end_time(&mut self) -> Result<DateTime<Utc>, TimeSeriesError> {
        let len = self.row_count();
        ensure!(len > 0, EmptySnafu);
        self.time_of_row(len - 1)
    }

    /// Locate `time` among the rows.
    ///
    /// A time equal to a row's time gives `Within { low: i, high: i }` for
    /// the first such row `i`.
    pub fn bounds(&mut self, time: DateTime<Utc>) -> Result<Bracket, TimeSeriesError> {
        let len = self.row_count();
        ensure!(len > 0, EmptySnafu);
        if time < self.start_time()? {
            return Ok(Bracket::Below);
        }
        if time > self.end_time()? {
            return Ok(Bracket::Above);
        }

        // First row whose time is not before `time`.
        let (mut lo, mut hi) = (0, len - 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.time_of_row(mid)? < time {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        if self.time_of_row(lo)? == time {
            return Ok(Bracket::Within { low: lo, high: lo });
        }
        // `time` is after row 0 here, so `lo >= 1`.
        Ok(Bracket::Within {
            low: lo - 1,
            high: lo,
        })
    }

    /// The row whose time is nearest to `time`; the earlier row on a tie.
    /// Times outside the series map to the first or last row.
    pub fn closest_index(&mut self, time: DateTime<Utc>) -> Result<u64, TimeSeriesError> {
        match self.bounds(time)? {
            Bracket::Below => Ok(0),
            Bracket::Above => Ok(self.row_count() - 1),
            Bracket::Within { low, high } if low == high => Ok(low),
            Bracket::Within { low, high } => {
                let after_low = time.signed_duration_since(self.time_of_row(low)?);
                let before_high = self.time_of_row(high)?.signed_duration_since(time);
                Ok(if before_high < after_low { high } else { low })
            }
        }
    }

    /// Value of `column` at `time`.
    ///
    /// Inside the series this interpolates linearly between the bracketing
    /// rows (an exact hit returns the row's value unchanged). Before the
    /// first row or after the last, it evaluates a least-squares line through
    /// the first or last `extrapolation_window` rows, fitted once per column
    /// and cached.
    pub fn col_at_time(
        &mut self,
        time: DateTime<Utc>,
        column: &str,
    ) -> Result<Decimal, TimeSeriesError> {
        match self.bounds(time)? {
            Bracket::Below => self.fit(Side::Below, column)?.evaluate(time),
            Bracket::Above => self.fit(Side::Above, column)?.evaluate(time),
            Bracket::Within { low, high } => {
                let v0 = self.value_at(low, column)?;
                if low == high {
                    return Ok(v0);
                }
                let v1 = self.value_at(high, column)?;

                let t0 = self.time_of_row(low)?;
                let span = micros_between(t0, self.time_of_row(high)?)?;
                if span.is_zero() {
                    return Ok(v0);
                }
                let elapsed = micros_between(t0, time)?;

                v1.checked_sub(v0)
                    .and_then(|dv| dv.checked_mul(elapsed))
                    .and_then(|scaled| scaled.checked_div(span))
                    .and_then(|dv| v0.checked_add(dv))
                    .context(OverflowSnafu {
                        what: "interpolated value",
                    })
            }
        }
    }

    /// Index new data in the group and drop the cached results it may have
    /// invalidated. Returns whether the group changed.
    pub fn update(&mut self, rebuild: bool) -> Result<bool, TimeSeriesError> {
        let before = layout_of(self.group());
        let rows_before = self.row_count();

        let changed = self.group_mut().update(rebuild).context(GroupSnafu)?;

        if rebuild {
            self.clear_caches();
        } else if changed {
            let after = layout_of(self.group());
            if keeps_row_numbers(&before, &after) {
                self.above.clear();
                if rows_before < self.options.extrapolation_window() as u64 {
                    self.below.clear();
                }
                debug!("rows appended after row {rows_before}; keeping cached times");
            } else {
                debug!("group members moved; dropping every cached time and fit");
                self.clear_caches();
            }
        }
        Ok(changed)
    }

    fn clear_caches(&mut self) {
        self.times.clear();
        self.below.clear();
        self.above.clear();
    }

    fn value_at(&mut self, index: u64, column: &str) -> Result<Decimal, TimeSeriesError> {
        let row = self.row(index)?;
        let text = row.get(column).context(MissingColumnSnafu {
            row: index,
            column,
        })?;
        parse_value(column, text)
    }

    fn fit(&mut self, side: Side, column: &str) -> Result<LinearFit, TimeSeriesError> {
        let cached = match side {
            Side::Below => self.below.get(column),
            Side::Above => self.above.get(column),
        };
        if let Some(&fit) = cached {
            return Ok(fit);
        }

        let len = self.row_count();
        ensure!(len > 0, EmptySnafu);
        let window = (self.options.extrapolation_window() as u64).min(len);
        let (rows, reference) = match side {
            Side::Below => (0..window, self.start_time()?),
            Side::Above => (len - window..len, self.end_time()?),
        };

        let mut samples = Vec::with_capacity(window as usize);
        for index in rows {
            samples.push((self.time_of_row(index)?, self.value_at(index, column)?));
        }
        let fit = LinearFit::fit(reference, &samples)?;
        debug!(
            "{side} fit for '{column}' over {window} rows: {} + {} per microsecond",
            fit.intercept, fit.slope
        );

        match side {
            Side::Below => self.below.insert(column.to_string(), fit),
            Side::Above => self.above.insert(column.to_string(), fit),
        };
        Ok(fit)
    }
}
