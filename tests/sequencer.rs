use std::path::Path;
use std::sync::Arc;

use slabcopy::filter::CompressionParameters;
use slabcopy::selection::{DatasetShape, Region, Selection};
use slabcopy::sequencer::{Outcome, Sequencer, read_slab, write_slab};
use slabcopy::storage::zarr::ZarrDataset;
use slabcopy::storage::{Container, DatasetHandle, DatasetLayout, ZarrContainer};
use zarrs::storage::ReadableWritableListableStorage;
use zarrs::storage::store::MemoryStore;

const BOUND: f64 = 1e-4;
const VERTICES: [&str; 3] = ["vertex/x", "vertex/y", "vertex/z"];

fn memory_store() -> ReadableWritableListableStorage {
    env_logger::try_init().ok();
    Arc::new(MemoryStore::new())
}

fn ramp(n: usize, phase: f32) -> Vec<f32> {
    (0..n)
        .map(|i| (i as f32 * 0.002 + phase).sin() * 40.0)
        .collect()
}

/// Store `values` losslessly as a float32 dataset.
fn put(container: &ZarrContainer, name: &str, shape: &[u64], values: &[f32]) {
    let layout = DatasetLayout {
        shape: DatasetShape::new(shape.to_vec()),
        chunk_shape: shape.iter().map(|&n| n.clamp(1, 64)).collect(),
        filter: CompressionParameters::absolute(0.0),
    };
    let dataset = container
        .create_dataset(name, &layout)
        .expect("create source dataset");
    dataset.write(values).expect("write source dataset");
}

fn source_with(names: &[&str], n: usize) -> (ZarrContainer, Vec<Vec<f32>>) {
    let container = ZarrContainer::create_in(memory_store()).expect("create source");
    let mut originals = Vec::new();
    for (idx, name) in names.iter().enumerate() {
        let values = ramp(n, idx as f32);
        put(&container, name, &[n as u64], &values);
        originals.push(values);
    }
    (container, originals)
}

fn assert_within(original: &[f32], decoded: &[f32], bound: f64) {
    assert_eq!(original.len(), decoded.len());
    for (i, (&a, &b)) in original.iter().zip(decoded).enumerate() {
        let err = (f64::from(a) - f64::from(b)).abs();
        assert!(err <= bound, "element {i}: {a} vs {b}");
    }
}

/// Wraps a zarr container, panicking inside chosen calls.
struct Faulty {
    inner: ZarrContainer,
    read_faults: Vec<String>,
    write_faults: Vec<String>,
}

impl Faulty {
    fn new(inner: ZarrContainer) -> Self {
        Self {
            inner,
            read_faults: Vec::new(),
            write_faults: Vec::new(),
        }
    }
}

struct FaultyDataset {
    inner: ZarrDataset,
    fault_on_read: bool,
    fault_on_write: bool,
}

impl Container for Faulty {
    type Dataset = FaultyDataset;

    fn open(_path: &Path) -> slabcopy::Result<Self> {
        Err(slabcopy::Error::general("in-memory only"))
    }

    fn create(_path: &Path) -> slabcopy::Result<Self> {
        Err(slabcopy::Error::general("in-memory only"))
    }

    fn open_dataset(&self, name: &str) -> slabcopy::Result<Option<Self::Dataset>> {
        Ok(self.inner.open_dataset(name)?.map(|inner| FaultyDataset {
            inner,
            fault_on_read: self.read_faults.iter().any(|n| n == name),
            fault_on_write: self.write_faults.iter().any(|n| n == name),
        }))
    }

    fn create_dataset(&self, name: &str, layout: &DatasetLayout) -> slabcopy::Result<Self::Dataset> {
        Ok(FaultyDataset {
            inner: self.inner.create_dataset(name, layout)?,
            fault_on_read: self.read_faults.iter().any(|n| n == name),
            fault_on_write: self.write_faults.iter().any(|n| n == name),
        })
    }

    fn flush(&self) -> slabcopy::Result<()> {
        self.inner.flush()
    }

    fn close(self) -> slabcopy::Result<()> {
        self.inner.close()
    }
}

impl DatasetHandle for FaultyDataset {
    fn shape(&self) -> slabcopy::Result<DatasetShape> {
        self.inner.shape()
    }

    fn read_into(&self, selection: &Selection, buffer: &mut [f32]) -> slabcopy::Result<()> {
        if self.fault_on_read {
            panic!("simulated access violation in read");
        }
        self.inner.read_into(selection, buffer)
    }

    fn write(&self, values: &[f32]) -> slabcopy::Result<()> {
        if self.fault_on_write {
            panic!("simulated access violation in write");
        }
        self.inner.write(values)
    }
}

#[test]
fn three_vertices_round_trip() {
    let (input, originals) = source_with(&VERTICES, 5000);
    let out_store = memory_store();
    let output = ZarrContainer::create_in(out_store.clone()).expect("create output");

    let sequencer = Sequencer::new().with_filter(CompressionParameters::absolute(BOUND));
    let copy = sequencer.copy(&input, &output, &VERTICES);
    assert_eq!(copy.written(), 3, "{copy}");
    assert_eq!(copy.failed(), 0);

    for name in VERTICES {
        let meta = output
            .node_metadata(name)
            .expect("read metadata")
            .expect("dataset exists");
        assert_eq!(meta["shape"], serde_json::json!([5000]));
        assert_eq!(
            meta["chunk_grid"]["configuration"]["chunk_shape"],
            serde_json::json!([100])
        );
        assert_eq!(meta["codecs"][0]["name"], "slabcopy.error_bound");
        assert_eq!(meta["codecs"][0]["configuration"]["mode"], "absolute");
        assert_eq!(meta["codecs"][0]["configuration"]["error_bound"], BOUND);
    }

    let reopened = ZarrContainer::new(out_store);
    let verify = sequencer.verify(&reopened, &VERTICES);
    assert_eq!(verify.read(), 3);
    for (name, original) in VERTICES.iter().zip(&originals) {
        let slab = verify
            .get(name)
            .and_then(|r| r.slab())
            .expect("verified slab");
        assert_within(original, &slab.values, BOUND);
    }
}

#[test]
fn missing_dataset_is_skipped() {
    let (input, _) = source_with(&VERTICES[..2], 5000);
    let output = ZarrContainer::create_in(memory_store()).expect("create output");

    let copy = Sequencer::new().copy(&input, &output, &VERTICES);
    assert_eq!(copy.written(), 2);
    assert_eq!(copy.not_found(), 1);
    assert!(matches!(
        copy.get("vertex/z").map(|r| &r.outcome),
        Some(Outcome::NotFound)
    ));

    assert!(output.node_metadata("vertex/x").expect("meta").is_some());
    assert!(output.node_metadata("vertex/y").expect("meta").is_some());
    assert!(output.node_metadata("vertex/z").expect("meta").is_none());
    let group = output
        .node_metadata("vertex")
        .expect("meta")
        .expect("intermediate group created");
    assert_eq!(group["node_type"], "group");
}

#[test]
fn read_fault_is_isolated() {
    let (source, originals) = source_with(&VERTICES, 500);
    let mut input = Faulty::new(source);
    input.read_faults.push("vertex/y".into());
    let output = ZarrContainer::create_in(memory_store()).expect("create output");

    let copy = Sequencer::new().copy(&input, &output, &VERTICES);
    match &copy.get("vertex/y").expect("report").outcome {
        Outcome::ReadFailed(e) => assert!(e.is_fault(), "{e}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(copy.written(), 2);

    let slab = read_slab(&output, "vertex/z", Region::Whole)
        .expect("read")
        .expect("present");
    assert_within(&originals[2], &slab.values, 1e-4);
}

#[test]
fn write_fault_continues_to_close() {
    let (input, _) = source_with(&VERTICES, 500);
    let mut output = Faulty::new(ZarrContainer::create_in(memory_store()).expect("create output"));
    output.write_faults.push("vertex/x".into());

    let copy = Sequencer::new().copy(&input, &output, &VERTICES);
    match &copy.get("vertex/x").expect("report").outcome {
        Outcome::Written(status) => assert!(!status.is_complete()),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(copy.written(), 2);
    assert_eq!(copy.failed(), 1);
    // the dataset was created before the write faulted
    assert!(output.inner.node_metadata("vertex/x").expect("meta").is_some());
}

#[test]
fn invalid_filter_aborts_dataset_only() {
    let (input, _) = source_with(&VERTICES[..1], 50);
    let output = ZarrContainer::create_in(memory_store()).expect("create output");
    let slab = read_slab(&input, "vertex/x", Region::Whole)
        .expect("read")
        .expect("present");

    let bad = CompressionParameters::absolute(f64::NAN);
    assert!(write_slab(&output, "vertex/x", &slab, &bad, 100).is_err());
    assert!(output.node_metadata("vertex/x").expect("meta").is_none());

    let status = write_slab(&output, "vertex/x", &slab, &CompressionParameters::default(), 100)
        .expect("write");
    assert!(status.is_complete());
}

#[test]
fn preview_of_rows() {
    let container = ZarrContainer::create_in(memory_store()).expect("create");
    let values: Vec<f32> = (0..4 * 6 * 30).map(|i| i as f32).collect();
    put(&container, "simulation_data", &[4, 6, 30], &values);

    let summary = Sequencer::new().preview(&container, &["simulation_data", "absent"]);
    assert_eq!(summary.read(), 1);
    assert_eq!(summary.not_found(), 1);

    let slab = summary
        .get("simulation_data")
        .and_then(|r| r.slab())
        .expect("slab");
    assert_eq!(slab.selection.count(), &[1, 2, 30]);
    assert_eq!(slab.values.len(), 60);
    assert_eq!(slab.values, values[..60]);

    let rows = slab.preview_rows(2, 10);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], &values[..10]);
    assert_eq!(rows[1], &values[30..40]);
}

#[test]
fn repeated_reads_are_identical() {
    let (input, _) = source_with(&VERTICES[..1], 700);
    let first = read_slab(&input, "vertex/x", Region::default())
        .expect("read")
        .expect("present");
    let second = read_slab(&input, "vertex/x", Region::default())
        .expect("read")
        .expect("present");
    assert_eq!(first, second);
    assert_eq!(first.values.len(), 10);
}

#[test]
fn group_is_not_a_dataset() {
    let (input, _) = source_with(&VERTICES[..1], 10);
    let err = read_slab(&input, "vertex", Region::Whole).expect_err("group");
    assert!(!err.is_fault());
}

#[test]
fn nested_write_creates_groups() {
    let output = ZarrContainer::create_in(memory_store()).expect("create output");
    let layout = DatasetLayout {
        shape: DatasetShape::new(vec![3, 250]),
        chunk_shape: vec![3, 100],
        filter: CompressionParameters::default(),
    };
    output
        .create_dataset("/a/b/c/data", &layout)
        .expect("create nested");
    for group in ["a", "a/b", "a/b/c"] {
        let meta = output.node_metadata(group).expect("meta").expect("group");
        assert_eq!(meta["node_type"], "group");
    }
    assert!(output.open_dataset("a/b/c/data").expect("open").is_some());
    assert!(output.create_dataset("a/b/c/data/more", &layout).is_err());
}

#[test]
fn empty_dataset_is_copied() {
    let input = ZarrContainer::create_in(memory_store()).expect("create input");
    put(&input, "empty", &[0], &[]);
    let output = ZarrContainer::create_in(memory_store()).expect("create output");

    let copy = Sequencer::new().copy(&input, &output, &["empty"]);
    assert_eq!(copy.written(), 1, "{copy}");
    assert_eq!(copy.failed(), 0);

    let slab = read_slab(&output, "empty", Region::Whole)
        .expect("read")
        .expect("present");
    assert_eq!(slab.shape.extents(), &[0]);
    assert!(slab.values.is_empty());
}

#[test]
fn integer_dataset_is_a_library_failure() {
    use zarrs::storage::{StoreKey, WritableStorageTraits};

    let store = memory_store();
    let input = ZarrContainer::create_in(store.clone()).expect("create input");
    put(&input, "vertex/x", &[8], &ramp(8, 0.0));
    let meta = serde_json::json!({
        "zarr_format": 3,
        "node_type": "array",
        "shape": [8],
        "data_type": "int32",
        "chunk_grid": { "name": "regular", "configuration": { "chunk_shape": [8] } },
        "chunk_key_encoding": { "name": "default", "configuration": { "separator": "/" } },
        "fill_value": 0,
        "codecs": [{ "name": "bytes", "configuration": { "endian": "little" } }]
    });
    store
        .set(
            &StoreKey::new("vertex/ids/zarr.json").expect("key"),
            serde_json::to_vec(&meta).expect("serialize").into(),
        )
        .expect("write metadata");

    let err = read_slab(&input, "vertex/ids", Region::Whole).expect_err("int32");
    assert!(!err.is_fault(), "{err}");

    let output = ZarrContainer::create_in(memory_store()).expect("create output");
    let copy = Sequencer::new().copy(&input, &output, &["vertex/ids", "vertex/x"]);
    assert!(matches!(
        copy.get("vertex/ids").map(|r| &r.outcome),
        Some(Outcome::ReadFailed(_))
    ));
    assert_eq!(copy.written(), 1);
}
