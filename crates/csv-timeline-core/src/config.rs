//! Runtime tuning options.
//!
//! These are knobs of the engine itself, not properties of a dataset: the
//! parsing rules of a file live in its descriptor (see [`crate::dialect`]).
//! Both structs deserialize with every field optional, so an embedding
//! application can keep them in its own configuration file and only spell
//! out what it overrides.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Options for [`crate::line_index::LineIndex`] and everything that owns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Number of evenly spread samples checked when deciding whether a file
    /// has uniformly spaced rows.
    pub uniform_segments: usize,

    /// Maximum number of resolved offsets kept in memory when the index is
    /// not uniformly spaced.
    pub offset_cache_capacity: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            uniform_segments: 100,
            offset_cache_capacity: 4096,
        }
    }
}

impl IndexOptions {
    pub(crate) fn offset_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.offset_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn uniform_segments(&self) -> usize {
        self.uniform_segments.max(1)
    }
}

/// Options for [`crate::time_series::TimeSeriesView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesOptions {
    /// Maximum number of parsed row timestamps kept in memory.
    pub time_cache_capacity: usize,

    /// Number of rows at each end of the dataset used to fit the
    /// extrapolation line.
    pub extrapolation_window: usize,
}

impl Default for TimeSeriesOptions {
    fn default() -> Self {
        Self {
            time_cache_capacity: 65536,
            extrapolation_window: 10,
        }
    }
}

impl TimeSeriesOptions {
    pub(crate) fn time_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.time_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn extrapolation_window(&self) -> usize {
        self.extrapolation_window.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let opts: IndexOptions =
            serde_json::from_str(r#"{"uniform_segments": 8}"#).expect("valid options");
        assert_eq!(opts.uniform_segments, 8);
        assert_eq!(opts.offset_cache_capacity, 4096);

        let ts: TimeSeriesOptions = serde_json::from_str("{}").expect("valid options");
        assert_eq!(ts, TimeSeriesOptions::default());
    }

    #[test]
    fn zero_capacities_are_clamped() {
        let opts = IndexOptions {
            uniform_segments: 0,
            offset_cache_capacity: 0,
        };
        assert_eq!(opts.uniform_segments(), 1);
        assert_eq!(opts.offset_cache_capacity().get(), 1);

        let ts = TimeSeriesOptions {
            time_cache_capacity: 0,
            extrapolation_window: 0,
        };
        assert_eq!(ts.time_cache_capacity().get(), 1);
        assert_eq!(ts.extrapolation_window(), 1);
    }
}
