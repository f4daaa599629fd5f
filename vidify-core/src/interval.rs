//! Sorted, merged sets of half-open time ranges.
//!
//! Tracks which seconds of a video have been loaded or watched. Ranges are
//! kept sorted by start and never overlap or touch: inserting a range that
//! overlaps or abuts existing ones collapses them into a single range.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Length of the range in seconds.
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Returns true if `point` lies in `[start, end)`.
    pub fn contains(&self, point: f64) -> bool {
        self.start <= point && point < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}, {:.2})", self.start, self.end)
    }
}

/// Set of disjoint, non-adjacent time ranges sorted by start.
///
/// Inserting is idempotent: adding a range that is already covered leaves the
/// set unchanged. Inverted or empty ranges are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSet {
    ranges: Vec<TimeRange>,
}

impl IntervalSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `[start, end)` and merges it with every range it overlaps or touches.
    ///
    /// Does nothing if `start >= end` (or either bound is NaN).
    pub fn add(&mut self, start: f64, end: f64) {
        if start.is_nan() || end.is_nan() || start >= end {
            return;
        }

        // Ranges strictly before the new one end before it starts; ranges
        // strictly after start after it ends. Everything in between merges.
        let first = self.ranges.partition_point(|range| range.end < start);
        let last = self.ranges.partition_point(|range| range.start <= end);

        if first == last {
            self.ranges.insert(first, TimeRange { start, end });
            return;
        }

        let merged = TimeRange {
            start: start.min(self.ranges[first].start),
            end: end.max(self.ranges[last - 1].end),
        };
        self.ranges.splice(first..last, std::iter::once(merged));
    }

    /// Returns true if `point` is inside any stored range.
    pub fn covers(&self, point: f64) -> bool {
        self.range_containing(point).is_some()
    }

    /// Returns the stored range containing `point`, if any.
    pub fn range_containing(&self, point: f64) -> Option<TimeRange> {
        let index = self.ranges.partition_point(|range| range.end <= point);
        self.ranges
            .get(index)
            .filter(|range| range.start <= point)
            .copied()
    }

    /// Returns the smallest value `>= point` that is not covered.
    ///
    /// Returns `point` unchanged when it is already uncovered. The set is not
    /// treated as a ring; callers that need to wrap retry from zero.
    pub fn first_uncovered_from(&self, point: f64) -> f64 {
        match self.range_containing(point) {
            Some(range) => range.end,
            None => point,
        }
    }

    /// Start of the first stored range beginning strictly after `point`.
    pub fn next_start_after(&self, point: f64) -> Option<f64> {
        let index = self.ranges.partition_point(|range| range.start <= point);
        self.ranges.get(index).map(|range| range.start)
    }

    /// True iff the ranges cover `[0, total_length)` contiguously from zero.
    pub fn is_full(&self, total_length: f64) -> bool {
        if total_length <= 0.0 {
            return true;
        }
        self.ranges
            .first()
            .is_some_and(|range| range.start <= 0.0 && range.end >= total_length)
    }

    /// True if `[start, end)` lies entirely inside one stored range.
    pub fn contains_range(&self, start: f64, end: f64) -> bool {
        if start >= end {
            return true;
        }
        self.range_containing(start)
            .is_some_and(|range| range.end >= end)
    }

    /// True if every stored range lies within `[lower, upper]`.
    pub fn is_within(&self, lower: f64, upper: f64) -> bool {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => first.start >= lower && last.end <= upper,
            _ => true,
        }
    }

    /// Total covered length in seconds.
    pub fn covered_length(&self) -> f64 {
        self.ranges.iter().map(TimeRange::length).sum()
    }

    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Removes every range.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
