//! Zarr V3 hierarchies through `zarrs`.

use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use zarrs::array::chunk_grid::{RegularBoundedChunkGrid, RegularBoundedChunkGridConfiguration};
use zarrs::array::codec::GzipCodec;
use zarrs::array::{Array, ArrayMetadataV3, ArraySubset, FillValueMetadata, data_type};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::GroupMetadataV3;
use zarrs::metadata::v3::{MetadataV3, NodeMetadataV3};
use zarrs::plugin::ExtensionAliasesV3;
use zarrs::storage::{
    ReadableStorageTraits, ReadableWritableListableStorage, ReadableWritableListableStorageTraits,
    StoreKey, StorePrefix, WritableStorageTraits,
};
use zarrs_codec::CodecTraits;

use super::{Container, DatasetHandle, DatasetLayout, parent_paths, path_components};
use crate::codec::ErrorBoundCodec;
use crate::selection::{DatasetShape, Selection};

const METADATA_FILE: &str = "zarr.json";
const GZIP_LEVEL: u32 = 5;

/// A zarr hierarchy in any `zarrs` store.
pub struct ZarrContainer {
    store: ReadableWritableListableStorage,
}

impl ZarrContainer {
    /// Wrap an existing hierarchy.
    pub fn new(store: ReadableWritableListableStorage) -> Self {
        Self { store }
    }

    /// Empty `store` and write a root group into it.
    pub fn create_in(store: ReadableWritableListableStorage) -> crate::Result<Self> {
        store.erase_prefix(&StorePrefix::root())?;
        let out = Self { store };
        out.put_node("", &NodeMetadataV3::Group(GroupMetadataV3::default()))?;
        Ok(out)
    }

    pub fn store(&self) -> &ReadableWritableListableStorage {
        &self.store
    }

    /// Raw node metadata at `path` (no leading `/`), if any.
    pub fn node_metadata(&self, path: &str) -> crate::Result<Option<serde_json::Value>> {
        let Some(bytes) = self.store.get(&metadata_key(path)?)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn put_node(&self, path: &str, metadata: &NodeMetadataV3) -> crate::Result<()> {
        let v = serde_json::to_vec(metadata)?;
        self.store
            .set(&metadata_key(path)?, Bytes::from_owner(v))?;
        Ok(())
    }

    /// Create a group at every missing ancestor of `name`.
    fn ensure_parents(&self, name: &str) -> crate::Result<()> {
        for parent in parent_paths(name) {
            match self.node_metadata(&parent)? {
                None => {
                    log::debug!("creating group /{parent}");
                    self.put_node(&parent, &NodeMetadataV3::Group(GroupMetadataV3::default()))?;
                }
                Some(meta) if node_type(&meta) == Some("group") => {}
                Some(_) => {
                    return Err(crate::Error::general(format!(
                        "cannot create /{name}: /{parent} is not a group"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Container for ZarrContainer {
    type Dataset = ZarrDataset;

    fn open(path: &Path) -> crate::Result<Self> {
        if !path.is_dir() {
            return Err(crate::Error::general(format!(
                "no zarr hierarchy at {}",
                path.display()
            )));
        }
        let store = FilesystemStore::new(path).map_err(crate::Error::wrap)?;
        Ok(Self::new(Arc::new(store)))
    }

    fn create(path: &Path) -> crate::Result<Self> {
        std::fs::create_dir_all(path)?;
        let store = FilesystemStore::new(path).map_err(crate::Error::wrap)?;
        Self::create_in(Arc::new(store))
    }

    fn open_dataset(&self, name: &str) -> crate::Result<Option<Self::Dataset>> {
        let path = node_path(name);
        let Some(meta) = self.node_metadata(&path)? else {
            return Ok(None);
        };
        if node_type(&meta) != Some("array") {
            return Err(crate::Error::general(format!("/{path} is not an array")));
        }
        match meta.get("data_type").and_then(|v| v.as_str()) {
            Some("float32") => {}
            other => {
                return Err(crate::Error::general(format!(
                    "/{path} has data type {}, expected float32",
                    other.unwrap_or("<unknown>")
                )));
            }
        }
        let array = Array::open(self.store.clone(), &format!("/{path}"))
            .map_err(crate::Error::wrap)?;
        Ok(Some(ZarrDataset { array }))
    }

    fn create_dataset(&self, name: &str, layout: &DatasetLayout) -> crate::Result<Self::Dataset> {
        let path = node_path(name);
        if path.is_empty() {
            return Err(crate::Error::general("a dataset cannot be the root node"));
        }
        self.ensure_parents(&path)?;

        let metadata = ArrayMetadataV3::new(
            layout.shape.extents().to_vec(),
            convert_chunk_grid(&layout.chunk_shape)?,
            float32_data_type(),
            FillValueMetadata::Number(serde_json::Number::from(0)),
            codec_chain(layout)?,
        );
        self.put_node(&path, &NodeMetadataV3::Array(metadata))?;

        let array = Array::open(self.store.clone(), &format!("/{path}"))
            .map_err(crate::Error::wrap)?;
        Ok(ZarrDataset { array })
    }

    /// Filesystem and memory stores write through; there is nothing buffered.
    fn flush(&self) -> crate::Result<()> {
        Ok(())
    }

    fn close(self) -> crate::Result<()> {
        Ok(())
    }
}

pub struct ZarrDataset {
    array: Array<dyn ReadableWritableListableStorageTraits>,
}

impl DatasetHandle for ZarrDataset {
    fn shape(&self) -> crate::Result<DatasetShape> {
        Ok(DatasetShape::new(self.array.shape().to_vec()))
    }

    fn read_into(&self, selection: &Selection, buffer: &mut [f32]) -> crate::Result<()> {
        let subset =
            ArraySubset::new_with_start_shape(selection.offset().to_vec(), selection.count().to_vec())
                .map_err(crate::Error::wrap)?;
        let values: Vec<f32> = self.array.retrieve_array_subset(&subset)?;
        if values.len() != buffer.len() {
            return Err(crate::Error::general(format!(
                "read {} elements into a buffer of {}",
                values.len(),
                buffer.len()
            )));
        }
        buffer.copy_from_slice(&values);
        Ok(())
    }

    fn write(&self, values: &[f32]) -> crate::Result<()> {
        if self.array.shape().contains(&0) {
            // a zero extent has no chunks to store
            return Ok(());
        }
        self.array
            .store_array_subset(&self.array.subset_all(), values.to_vec())?;
        Ok(())
    }
}

fn node_path(name: &str) -> String {
    path_components(name).collect::<Vec<_>>().join("/")
}

fn metadata_key(path: &str) -> crate::Result<StoreKey> {
    let key = if path.is_empty() {
        METADATA_FILE.to_string()
    } else {
        format!("{path}/{METADATA_FILE}")
    };
    StoreKey::new(key).map_err(crate::Error::wrap)
}

fn node_type(metadata: &serde_json::Value) -> Option<&str> {
    metadata.get("node_type").and_then(|v| v.as_str())
}

fn convert_chunk_grid(chunk_shape: &[u64]) -> crate::Result<MetadataV3> {
    let chunk_shape: Vec<_> = chunk_shape
        .iter()
        .map(|&n| NonZeroU64::new(n).ok_or_else(|| crate::Error::general("zero chunk extent")))
        .collect::<crate::Result<Vec<_>>>()?;
    let out = MetadataV3::new_with_serializable_configuration(
        RegularBoundedChunkGrid::aliases_v3()
            .default_name
            .clone()
            .to_string(),
        &RegularBoundedChunkGridConfiguration { chunk_shape },
    )?;
    Ok(out)
}

fn float32_data_type() -> MetadataV3 {
    let data_type = data_type::float32();
    let name = data_type
        .name_v3()
        .map_or_else(|| "float32".to_string(), |n| n.into_owned());
    MetadataV3::new(name)
}

/// The error-bound codec, followed by gzip on the quantised stream.
fn codec_chain(layout: &DatasetLayout) -> crate::Result<Vec<MetadataV3>> {
    let lossy = ErrorBoundCodec::new(layout.filter)?.metadata()?;
    let gzip = GzipCodec::new(GZIP_LEVEL).map_err(crate::Error::wrap)?;
    let gzip_meta = match gzip.configuration(
        zarrs::plugin::ZarrVersion::V3,
        &zarrs_codec::CodecMetadataOptions::default(),
    ) {
        Some(config) => MetadataV3::new_with_configuration("gzip", config),
        None => MetadataV3::new("gzip"),
    };
    Ok(vec![lossy, gzip_meta])
}
