//! The storage seam: hierarchical containers of named `float32` datasets.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::filter::CompressionParameters;
use crate::selection::{DatasetShape, Selection};

#[cfg(feature = "hdf5")]
pub mod hdf5;
pub mod zarr;

#[cfg(feature = "hdf5")]
pub use self::hdf5::Hdf5Container;
pub use zarr::ZarrContainer;

/// A hierarchical container of datasets addressed by `/`-separated paths.
pub trait Container: Sized {
    type Dataset: DatasetHandle;

    /// Open an existing container for reading.
    fn open(path: &Path) -> crate::Result<Self>;

    /// Create a container for writing, discarding anything already there.
    fn create(path: &Path) -> crate::Result<Self>;

    /// Open a dataset, or `None` if nothing exists at `name`.
    fn open_dataset(&self, name: &str) -> crate::Result<Option<Self::Dataset>>;

    /// Create a chunked, filtered dataset at `name`, creating missing parent groups.
    fn create_dataset(&self, name: &str, layout: &DatasetLayout) -> crate::Result<Self::Dataset>;

    /// Push buffered writes down to storage.
    fn flush(&self) -> crate::Result<()>;

    fn close(self) -> crate::Result<()>;
}

/// An open dataset of `float32` elements.
pub trait DatasetHandle {
    fn shape(&self) -> crate::Result<DatasetShape>;

    /// Read `selection` into `buffer`, which holds exactly as many elements as selected.
    fn read_into(&self, selection: &Selection, buffer: &mut [f32]) -> crate::Result<()>;

    /// Overwrite the whole dataset with `values`, in C order.
    fn write(&self, values: &[f32]) -> crate::Result<()>;

    fn close(self) -> crate::Result<()>
    where
        Self: Sized,
    {
        drop(self);
        Ok(())
    }
}

/// Creation-time properties of an output dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayout {
    pub shape: DatasetShape,
    pub chunk_shape: Vec<u64>,
    pub filter: CompressionParameters,
}

/// Which storage library backs a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Zarr,
    Hdf5,
}

impl Backend {
    /// Guess the backend from a path's extension; anything not HDF5-like is zarr.
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "h5" | "hdf5" | "he5" | "hdf" => Self::Hdf5,
            _ => Self::Zarr,
        }
    }
}

/// Split `name` into its non-empty path components.
pub(crate) fn path_components(name: &str) -> impl Iterator<Item = &str> {
    name.split('/').filter(|c| !c.is_empty())
}

/// Every proper ancestor of `name`, shallowest first, without a leading `/`.
pub(crate) fn parent_paths(name: &str) -> Vec<String> {
    let components: Vec<&str> = path_components(name).collect();
    (1..components.len())
        .map(|n| components[..n].join("/"))
        .collect()
}
