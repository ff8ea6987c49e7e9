//! Even, contiguous splitting of an item list across workers.

use crate::error::{Error, Result};

/// Half-open index interval `[begin, end)` over a work item list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkRange {
    /// First index in the range
    pub begin: usize,
    /// One past the last index in the range
    pub end: usize,
}

impl WorkRange {
    /// Number of items in the range
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Whether the range holds no items
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl From<WorkRange> for std::ops::Range<usize> {
    fn from(range: WorkRange) -> Self {
        range.begin..range.end
    }
}

/// Split `length` items into at most `workers` contiguous ranges.
///
/// Range sizes differ by at most one; the remainder goes to the earliest ranges.
/// No empty range is ever returned, so fewer than `workers` ranges come back when
/// `length < workers`, and none at all when `length == 0`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] when `workers` is zero.
///
/// # Examples
///
/// ```
/// use toolstrap::batch::partition;
///
/// let ranges = partition(10, 3).unwrap();
/// let sizes: Vec<_> = ranges.iter().map(|r| r.len()).collect();
/// assert_eq!(sizes, vec![4, 3, 3]);
/// ```
pub fn partition(length: usize, workers: usize) -> Result<Vec<WorkRange>> {
    if workers == 0 {
        return Err(Error::InvalidArgument(
            "worker count must be at least 1".into(),
        ));
    }

    let chunk_size = length / workers;
    let mut remainder = length - chunk_size * workers;

    let mut ranges = Vec::with_capacity(workers.min(length));
    let mut start = 0;
    while start < length {
        let mut end = start + chunk_size;
        if remainder > 0 {
            end += 1;
            remainder -= 1;
        }
        ranges.push(WorkRange { begin: start, end });
        start = end;
    }

    Ok(ranges)
}
