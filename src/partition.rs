//! Partitioning of operator rows across the ranks of a process group.

use std::ops::Range;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Contiguous range of global row indices owned by one rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct RowRange {
    start: usize,
    end: usize,
}

impl RowRange {
    /// Creates a new row range covering `[start, end)`.
    ///
    /// # Panics
    ///
    /// If `end` is smaller than `start`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            end >= start,
            "Row range end {} is smaller than start {}",
            end,
            start
        );
        Self { start, end }
    }

    /// Returns the first global row index of the range.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Returns the global row index one past the end of the range.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Returns the number of rows in the range.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range contains no rows.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Whether the given global row index lies within the range.
    pub fn contains(&self, global_row: usize) -> bool {
        global_row >= self.start && global_row < self.end
    }

    /// Returns an iterator over the global row indices of the range.
    pub fn iter(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Divides `total_rows` rows evenly across `num_ranks` workers and returns the
/// contiguous range owned by the worker with the given rank.
///
/// Workers with rank below `total_rows mod num_ranks` receive one extra row,
/// so the ranges exactly tile `[0, total_rows)` with no gaps or overlaps and
/// pairwise differ in size by at most one. Deterministic and side-effect-free.
///
/// # Panics
///
/// If `num_ranks` is zero or `rank` is not below `num_ranks`.
pub fn partition_rows(total_rows: usize, num_ranks: usize, rank: usize) -> RowRange {
    assert!(num_ranks > 0, "Cannot partition rows across zero ranks");
    assert!(
        rank < num_ranks,
        "Rank {} is not below the number of ranks {}",
        rank,
        num_ranks
    );
    let base = total_rows / num_ranks;
    let remainder = total_rows % num_ranks;
    let mut count = base;
    let mut start = base * rank;
    if rank < remainder {
        count += 1;
        start += rank;
    } else {
        start += remainder;
    }
    RowRange::new(start, start + count)
}
