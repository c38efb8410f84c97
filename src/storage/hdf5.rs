//! HDF5 files through `hdf5-metno`, compressed with the SZ3 filter plugin.

use std::path::Path;

use hdf5_metno::{Dataset, File};
use ndarray::{IxDyn, SliceInfo, SliceInfoElem};

use super::{Container, DatasetHandle, DatasetLayout, parent_paths, path_components};
use crate::filter::SZ3_FILTER_ID;
use crate::selection::{DatasetShape, Selection};

pub struct Hdf5Container {
    file: File,
}

impl Hdf5Container {
    /// Whether every component of `path` exists as a link.
    fn path_exists(&self, path: &str) -> bool {
        parent_paths(path)
            .iter()
            .all(|p| self.file.link_exists(p))
            && self.file.link_exists(path)
    }
}

impl Container for Hdf5Container {
    type Dataset = Hdf5Dataset;

    fn open(path: &Path) -> crate::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }

    fn create(path: &Path) -> crate::Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }

    fn open_dataset(&self, name: &str) -> crate::Result<Option<Self::Dataset>> {
        let path = path_components(name).collect::<Vec<_>>().join("/");
        if path.is_empty() || !self.path_exists(&path) {
            return Ok(None);
        }
        Ok(Some(Hdf5Dataset {
            dataset: self.file.dataset(&path)?,
        }))
    }

    fn create_dataset(&self, name: &str, layout: &DatasetLayout) -> crate::Result<Self::Dataset> {
        let path = path_components(name).collect::<Vec<_>>().join("/");
        for parent in parent_paths(&path) {
            if !self.file.link_exists(&parent) {
                log::debug!("creating group /{parent}");
                self.file.create_group(&parent)?;
            }
        }

        let shape = to_usize(layout.shape.extents())?;
        let chunk = to_usize(&layout.chunk_shape)?;
        let words = layout.filter.to_words();
        let dataset = self
            .file
            .new_dataset::<f32>()
            .shape(shape)
            .chunk(chunk)
            .add_filter(SZ3_FILTER_ID, &words)
            .create(path.as_str())?;
        Ok(Hdf5Dataset { dataset })
    }

    fn flush(&self) -> crate::Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn close(self) -> crate::Result<()> {
        self.file.close()?;
        Ok(())
    }
}

pub struct Hdf5Dataset {
    dataset: Dataset,
}

impl DatasetHandle for Hdf5Dataset {
    fn shape(&self) -> crate::Result<DatasetShape> {
        Ok(DatasetShape::new(
            self.dataset
                .shape()
                .into_iter()
                .map(|n| n as u64)
                .collect::<Vec<_>>(),
        ))
    }

    fn read_into(&self, selection: &Selection, buffer: &mut [f32]) -> crate::Result<()> {
        let elems = selection
            .offset()
            .iter()
            .zip(selection.count())
            .map(|(&start, &count)| {
                Ok(SliceInfoElem::Slice {
                    start: isize::try_from(start).map_err(crate::Error::wrap)?,
                    end: Some(isize::try_from(start + count).map_err(crate::Error::wrap)?),
                    step: 1,
                })
            })
            .collect::<crate::Result<Vec<_>>>()?;
        let info =
            SliceInfo::<Vec<SliceInfoElem>, IxDyn, IxDyn>::try_from(elems).map_err(crate::Error::wrap)?;
        let values = self.dataset.read_slice::<f32, _, IxDyn>(info)?;
        if values.len() != buffer.len() {
            return Err(crate::Error::general(format!(
                "read {} elements into a buffer of {}",
                values.len(),
                buffer.len()
            )));
        }
        buffer
            .iter_mut()
            .zip(values.iter())
            .for_each(|(dst, &src)| *dst = src);
        Ok(())
    }

    fn write(&self, values: &[f32]) -> crate::Result<()> {
        self.dataset.write_raw(values)?;
        Ok(())
    }
}

fn to_usize(values: &[u64]) -> crate::Result<Vec<usize>> {
    values
        .iter()
        .map(|&n| usize::try_from(n).map_err(crate::Error::wrap))
        .collect()
}
