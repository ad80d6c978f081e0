//! Decimal least-squares fits over time.
//!
//! The abscissa of every fit is elapsed time in microseconds (with three
//! decimals, so nanosecond timestamps stay exact) from a reference
//! timestamp. All arithmetic is checked [`Decimal`] arithmetic; an overflow
//! surfaces as [`TimeSeriesError::Overflow`] instead of wrapping or
//! saturating.
//!
//! [`Decimal`] carries 28 significant digits. Intermediate products that
//! need more are rounded to 28 digits, so a fit is exact only while its
//! sums and products fit in that many. Magnitudes beyond about `7.9e28`
//! are an overflow.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use snafu::prelude::*;

use super::error::{EmptySnafu, OverflowSnafu, TimeSeriesError};

/// `value = intercept + slope * micros(t - reference)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearFit {
    /// Time the abscissa is measured from.
    pub reference: DateTime<Utc>,
    /// Value at `reference`.
    pub intercept: Decimal,
    /// Change of the value per microsecond.
    pub slope: Decimal,
}

impl LinearFit {
    /// Fit `samples` of `(time, value)` by ordinary least squares, with
    /// time measured from `reference`.
    pub fn fit(
        reference: DateTime<Utc>,
        samples: &[(DateTime<Utc>, Decimal)],
    ) -> Result<Self, TimeSeriesError> {
        let points = samples
            .iter()
            .map(|&(time, value)| Ok((micros_between(reference, time)?, value)))
            .collect::<Result<Vec<_>, TimeSeriesError>>()?;
        let (intercept, slope) = ordinary_least_squares(&points)?;
        Ok(Self {
            reference,
            intercept,
            slope,
        })
    }

    /// Value of the line at `time`.
    pub fn evaluate(&self, time: DateTime<Utc>) -> Result<Decimal, TimeSeriesError> {
        let x = micros_between(self.reference, time)?;
        self.slope
            .checked_mul(x)
            .and_then(|dy| self.intercept.checked_add(dy))
            .context(OverflowSnafu {
                what: "extrapolated value",
            })
    }
}

/// Signed microseconds from `from` to `to`, exact to the nanosecond.
///
/// Spans beyond about 292 years do not fit the nanosecond count and are an
/// overflow.
pub fn micros_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Decimal, TimeSeriesError> {
    let nanos = to
        .signed_duration_since(from)
        .num_nanoseconds()
        .context(OverflowSnafu {
            what: "time difference",
        })?;
    Ok(Decimal::new(nanos, 3))
}

/// `(intercept, slope)` of the least-squares line through `points`.
///
/// With a single point, or when every `x` is equal, the slope is zero and
/// the intercept is the mean of `y`.
pub fn ordinary_least_squares(
    points: &[(Decimal, Decimal)],
) -> Result<(Decimal, Decimal), TimeSeriesError> {
    ensure!(!points.is_empty(), EmptySnafu);
    let overflow = || OverflowSnafu {
        what: "least-squares fit",
    };

    let n = Decimal::from(points.len());
    let mut sum_x = Decimal::ZERO;
    let mut sum_y = Decimal::ZERO;
    for &(x, y) in points {
        sum_x = sum_x.checked_add(x).with_context(overflow)?;
        sum_y = sum_y.checked_add(y).with_context(overflow)?;
    }
    let mean_x = sum_x.checked_div(n).with_context(overflow)?;
    let mean_y = sum_y.checked_div(n).with_context(overflow)?;

    let mut sxx = Decimal::ZERO;
    let mut sxy = Decimal::ZERO;
    for &(x, y) in points {
        let dx = x.checked_sub(mean_x).with_context(overflow)?;
        let dy = y.checked_sub(mean_y).with_context(overflow)?;
        sxx = dx
            .checked_mul(dx)
            .and_then(|sq| sxx.checked_add(sq))
            .with_context(overflow)?;
        sxy = dx
            .checked_mul(dy)
            .and_then(|p| sxy.checked_add(p))
            .with_context(overflow)?;
    }

    if sxx.is_zero() {
        return Ok((mean_y, Decimal::ZERO));
    }
    let slope = sxy.checked_div(sxx).with_context(overflow)?;
    let intercept = slope
        .checked_mul(mean_x)
        .and_then(|shift| mean_y.checked_sub(shift))
        .with_context(overflow)?;
    Ok((intercept, slope))
}
