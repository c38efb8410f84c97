//! Guarded read / write sequencing over a list of datasets.
//!
//! Every dataset is processed on its own: a missing dataset, a reported
//! failure or a caught fault ends the work on that dataset only, and the
//! sequencer moves on to the next name.

use std::fmt;
use std::thread;
use std::time::Duration;

use crate::filter::CompressionParameters;
use crate::guard::guarded;
use crate::selection::{DEFAULT_CHUNK_LIMIT, DatasetShape, Region, Selection, chunk_shape};
use crate::storage::{Container, DatasetHandle, DatasetLayout};
use crate::{Error, Result};

/// A region of a dataset held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Slab {
    /// Shape of the dataset the slab was read from.
    pub shape: DatasetShape,
    pub selection: Selection,
    /// Selected values in C order.
    pub values: Vec<f32>,
}

impl Slab {
    /// The first `length` values of each of the first `rows` rows.
    pub fn preview_rows(&self, rows: usize, length: usize) -> Vec<&[f32]> {
        let row_length = usize::try_from(self.selection.row_length()).unwrap_or(usize::MAX);
        if row_length == 0 {
            return Vec::new();
        }
        self.values
            .chunks(row_length)
            .take(rows)
            .map(|row| &row[..row.len().min(length)])
            .collect()
    }
}

/// Allocate a zeroed buffer for exactly the elements of `selection`.
pub fn allocate(selection: &Selection) -> Result<Vec<f32>> {
    let elements = selection.num_elements().ok_or(Error::Allocation { elements: u64::MAX })?;
    let len = usize::try_from(elements).map_err(|_| Error::Allocation { elements })?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| Error::Allocation { elements })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}

/// Read `region` of the dataset `name`.
///
/// Returns `Ok(None)` if there is no such dataset. A panic inside the read
/// comes back as [`Error::Fault`].
pub fn read_slab<C: Container>(container: &C, name: &str, region: Region) -> Result<Option<Slab>> {
    let Some(dataset) = container.open_dataset(name)? else {
        return Ok(None);
    };
    let shape = dataset.shape()?;
    let selection = Selection::for_region(&shape, region);
    log::debug!(
        "{name}: shape {shape}, offset {:?}, count {:?}",
        selection.offset(),
        selection.count()
    );
    let mut values = allocate(&selection)?;
    log::info!("{name}: reading {} values", values.len());

    let read = guarded("read", || dataset.read_into(&selection, &mut values));
    if let Err(e) = guarded("dataset close", || dataset.close()) {
        log::warn!("{name}: closing after read failed: {e}");
    }
    read?;

    Ok(Some(Slab {
        shape,
        selection,
        values,
    }))
}

/// How far a write got once the dataset existed.
#[derive(Debug)]
pub enum WriteStatus {
    Complete,
    /// The write itself failed or faulted; data may be partially written.
    Incomplete(Error),
}

impl WriteStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Create `name` in `container`, chunked and filtered, and write `slab` into it.
///
/// Failing to configure the filter or create the dataset is an error. After
/// creation the write, flush and close each run in their own fault boundary;
/// flush and close failures are logged and otherwise ignored.
pub fn write_slab<C: Container>(
    container: &C,
    name: &str,
    slab: &Slab,
    filter: &CompressionParameters,
    chunk_limit: u64,
) -> Result<WriteStatus> {
    let shape = DatasetShape::new(slab.selection.count().to_vec());
    let chunk_shape = chunk_shape(shape.extents(), chunk_limit);
    filter.validate()?;
    log::debug!("{name}: chunk shape {chunk_shape:?}, filter {filter:?}");

    let layout = DatasetLayout {
        shape,
        chunk_shape,
        filter: *filter,
    };
    let dataset = container.create_dataset(name, &layout)?;

    let status = match guarded("write", || dataset.write(&slab.values)) {
        Ok(()) => WriteStatus::Complete,
        Err(e) => {
            log::warn!("{name}: write did not complete, data may be partial: {e}");
            WriteStatus::Incomplete(e)
        }
    };
    if let Err(e) = guarded("flush", || container.flush()) {
        log::warn!("{name}: flush failed: {e}");
    }
    if let Err(e) = guarded("dataset close", || dataset.close()) {
        // data has been handed to the library by now
        log::warn!("{name}: ignoring failure while closing: {e}");
    }
    Ok(status)
}

/// What happened to one dataset.
#[derive(Debug)]
pub enum Outcome {
    NotFound,
    ReadFailed(Error),
    Read(Slab),
    WriteFailed(Error),
    Written(WriteStatus),
}

#[derive(Debug)]
pub struct DatasetReport {
    pub name: String,
    pub outcome: Outcome,
}

impl DatasetReport {
    pub fn slab(&self) -> Option<&Slab> {
        match &self.outcome {
            Outcome::Read(slab) => Some(slab),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = &self.name;
        match &self.outcome {
            Outcome::NotFound => write!(f, "{name}: not found, skipped"),
            Outcome::ReadFailed(e) if e.is_fault() => write!(f, "{name}: read crashed ({e})"),
            Outcome::ReadFailed(e) => write!(f, "{name}: read failed ({e})"),
            Outcome::Read(slab) => write!(f, "{name}: read {} values", slab.values.len()),
            Outcome::WriteFailed(e) => write!(f, "{name}: write aborted ({e})"),
            Outcome::Written(WriteStatus::Complete) => write!(f, "{name}: written"),
            Outcome::Written(WriteStatus::Incomplete(e)) => {
                write!(f, "{name}: written incompletely ({e})")
            }
        }
    }
}

/// Reports for every dataset of a pass, in processing order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<DatasetReport>,
}

impl RunSummary {
    pub fn get(&self, name: &str) -> Option<&DatasetReport> {
        self.reports.iter().find(|r| r.name == name)
    }

    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.reports.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn read(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Read(_)))
    }

    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Written(WriteStatus::Complete)))
    }

    pub fn not_found(&self) -> usize {
        self.count(|o| matches!(o, Outcome::NotFound))
    }

    /// Datasets that failed or were only partially written.
    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                Outcome::ReadFailed(_)
                    | Outcome::WriteFailed(_)
                    | Outcome::Written(WriteStatus::Incomplete(_))
            )
        })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} datasets: {} read, {} written, {} not found, {} failed",
            self.reports.len(),
            self.read(),
            self.written(),
            self.not_found(),
            self.failed()
        )
    }
}

/// Runs the per-dataset pipelines over a list of names.
#[derive(Debug, Clone)]
pub struct Sequencer {
    region: Region,
    chunk_limit: u64,
    filter: CompressionParameters,
    pause: Duration,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self {
            region: Region::default(),
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            filter: CompressionParameters::default(),
            pause: Duration::ZERO,
        }
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region read by [`Sequencer::preview`].
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_chunk_limit(mut self, chunk_limit: u64) -> Self {
        self.chunk_limit = chunk_limit;
        self
    }

    pub fn with_filter(mut self, filter: CompressionParameters) -> Self {
        self.filter = filter;
        self
    }

    /// Delay between consecutive datasets.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Read the configured region of every dataset.
    pub fn preview<C: Container>(&self, input: &C, names: &[impl AsRef<str>]) -> RunSummary {
        self.each(names, |name| read_outcome(input, name, self.region))
    }

    /// Read every dataset whole and write it, compressed, to `output`.
    pub fn copy<C: Container, D: Container>(
        &self,
        input: &C,
        output: &D,
        names: &[impl AsRef<str>],
    ) -> RunSummary {
        self.each(names, |name| {
            let slab = match read_outcome(input, name, Region::Whole) {
                Outcome::Read(slab) => slab,
                other => return other,
            };
            log::info!("{name}: compressing to output");
            match write_slab(output, name, &slab, &self.filter, self.chunk_limit) {
                Ok(status) => Outcome::Written(status),
                Err(e) => {
                    log::error!("{name}: could not create output dataset: {e}");
                    Outcome::WriteFailed(e)
                }
            }
        })
    }

    /// Read every dataset whole, checking that it decodes.
    pub fn verify<C: Container>(&self, container: &C, names: &[impl AsRef<str>]) -> RunSummary {
        self.each(names, |name| read_outcome(container, name, Region::Whole))
    }

    fn each(
        &self,
        names: &[impl AsRef<str>],
        mut f: impl FnMut(&str) -> Outcome,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        for (idx, name) in names.iter().enumerate() {
            if idx > 0 && !self.pause.is_zero() {
                thread::sleep(self.pause);
            }
            let name = name.as_ref();
            let outcome = f(name);
            summary.reports.push(DatasetReport {
                name: name.to_string(),
                outcome,
            });
        }
        summary
    }
}

fn read_outcome<C: Container>(container: &C, name: &str, region: Region) -> Outcome {
    match read_slab(container, name, region) {
        Ok(Some(slab)) => Outcome::Read(slab),
        Ok(None) => {
            log::warn!("{name}: not found, skipping");
            Outcome::NotFound
        }
        Err(e) if e.is_fault() => {
            log::error!("{name}: read crashed: {e}");
            Outcome::ReadFailed(e)
        }
        Err(e) => {
            log::error!("{name}: read failed: {e}");
            Outcome::ReadFailed(e)
        }
    }
}
