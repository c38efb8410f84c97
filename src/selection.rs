//! Hyperslab bookkeeping: which rectangular part of a dataset to read.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of rows of the last axis read by a preview.
pub const DEFAULT_PREVIEW_ROWS: u64 = 2;
/// Default number of elements read from a 1-dimensional dataset by a preview.
pub const DEFAULT_PREVIEW_LENGTH: u64 = 10;
/// Default upper bound of a chunk extent on any axis.
pub const DEFAULT_CHUNK_LIMIT: u64 = 100;

/// Per-axis extents of a dataset, slowest-varying axis first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetShape(Vec<u64>);

impl DatasetShape {
    pub fn new(extents: impl Into<Vec<u64>>) -> Self {
        Self(extents.into())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn extents(&self) -> &[u64] {
        &self.0
    }

    /// Total number of elements, or `None` on overflow.
    pub fn num_elements(&self) -> Option<u64> {
        checked_product(&self.0)
    }
}

impl From<Vec<u64>> for DatasetShape {
    fn from(value: Vec<u64>) -> Self {
        Self(value)
    }
}

impl fmt::Display for DatasetShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for extent in &self.0 {
            write!(f, "{extent} ")?;
        }
        write!(f, "]")
    }
}

/// Which selection rule to apply to a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Up to `rows` complete rows of the last axis for rank >= 2,
    /// or up to `length` elements for rank 1.
    Preview { rows: u64, length: u64 },
    /// The whole dataset.
    Whole,
}

impl Default for Region {
    fn default() -> Self {
        Self::Preview {
            rows: DEFAULT_PREVIEW_ROWS,
            length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}

/// A rectangular sub-region: per-axis offset and count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    offset: Vec<u64>,
    count: Vec<u64>,
}

impl Selection {
    /// Apply `region` to `shape`.
    pub fn for_region(shape: &DatasetShape, region: Region) -> Self {
        match region {
            Region::Preview { rows, length } => Self::preview(shape, rows, length),
            Region::Whole => Self::whole(shape),
        }
    }

    /// The leading block of a dataset: `rows` full rows of the last axis
    /// (all other leading axes pinned to index 0), or `length` elements of a
    /// 1-dimensional dataset. Never exceeds the shape.
    ///
    /// A rank-0 shape yields an empty selection addressing the single scalar.
    pub fn preview(shape: &DatasetShape, rows: u64, length: u64) -> Self {
        let extents = shape.extents();
        let rank = extents.len();
        // leading axes read index 0 only, unless they are empty
        let mut count: Vec<u64> = extents.iter().map(|&e| e.min(1)).collect();
        match rank {
            0 => {}
            1 => count[0] = length.min(extents[0]),
            _ => {
                count[rank - 1] = extents[rank - 1];
                count[rank - 2] = rows.min(extents[rank - 2]);
            }
        }
        Self {
            offset: vec![0; rank],
            count,
        }
    }

    /// The identity selection covering the whole dataset.
    pub fn whole(shape: &DatasetShape) -> Self {
        Self {
            offset: vec![0; shape.rank()],
            count: shape.extents().to_vec(),
        }
    }

    pub fn offset(&self) -> &[u64] {
        &self.offset
    }

    pub fn count(&self) -> &[u64] {
        &self.count
    }

    pub fn rank(&self) -> usize {
        self.count.len()
    }

    /// Number of elements selected, or `None` on overflow.
    pub fn num_elements(&self) -> Option<u64> {
        checked_product(&self.count)
    }

    /// Length of one row of the selection (the count along the last axis).
    pub fn row_length(&self) -> u64 {
        self.count.last().copied().unwrap_or(1)
    }

    /// Whether every axis fits inside `shape`.
    pub fn fits(&self, shape: &DatasetShape) -> bool {
        self.rank() == shape.rank()
            && self
                .offset
                .iter()
                .zip(&self.count)
                .zip(shape.extents())
                .all(|((&o, &c), &e)| o.checked_add(c).is_some_and(|end| end <= e))
    }
}

/// Chunk shape for a dataset: each axis clamped to `limit`, and never below 1.
pub fn chunk_shape(shape: &[u64], limit: u64) -> Vec<u64> {
    shape.iter().map(|&e| e.min(limit).max(1)).collect()
}

fn checked_product(values: &[u64]) -> Option<u64> {
    values.iter().try_fold(1u64, |acc, &v| acc.checked_mul(v))
}
