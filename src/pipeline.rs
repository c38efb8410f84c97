//! The two programs: preview a dataset list, or copy it into a compressed container.
//!
//! Only failing to open the input or create the output stops a run; every
//! per-dataset failure ends up in the returned [`RunSummary`].

use crate::config::RunConfig;
use crate::guard::guarded;
use crate::sequencer::{DatasetReport, RunSummary};
use crate::storage::{Backend, Container, ZarrContainer};

/// Reports of a copy-and-compress run.
#[derive(Debug, Default)]
pub struct CompressSummary {
    pub copy: RunSummary,
    /// Present when the output was reopened and read back.
    pub verify: Option<RunSummary>,
}

/// Open the input and preview every configured dataset.
pub fn run_preview(config: &RunConfig) -> crate::Result<RunSummary> {
    match config.backend() {
        Backend::Zarr => preview_with::<ZarrContainer>(config),
        #[cfg(feature = "hdf5")]
        Backend::Hdf5 => preview_with::<crate::storage::Hdf5Container>(config),
        #[cfg(not(feature = "hdf5"))]
        Backend::Hdf5 => Err(hdf5_unavailable()),
    }
}

/// Copy every configured dataset into a new compressed container,
/// then optionally read it back.
pub fn run_compress(config: &RunConfig) -> crate::Result<CompressSummary> {
    match config.backend() {
        Backend::Zarr => compress_with::<ZarrContainer>(config),
        #[cfg(feature = "hdf5")]
        Backend::Hdf5 => compress_with::<crate::storage::Hdf5Container>(config),
        #[cfg(not(feature = "hdf5"))]
        Backend::Hdf5 => Err(hdf5_unavailable()),
    }
}

#[cfg(not(feature = "hdf5"))]
fn hdf5_unavailable() -> crate::Error {
    crate::Error::general("HDF5 support was not built; enable the `hdf5` feature")
}

fn preview_with<C: Container>(config: &RunConfig) -> crate::Result<RunSummary> {
    let input = C::open(&config.input).inspect_err(|e| {
        log::error!("cannot open {}: {e}", config.input.display());
    })?;

    let summary = config.sequencer().preview(&input, config.datasets.as_slice());
    for report in &summary.reports {
        print_report(report, config);
    }
    close(input, "input");
    Ok(summary)
}

fn compress_with<C: Container>(config: &RunConfig) -> crate::Result<CompressSummary> {
    let Some(output_path) = config.output.as_deref() else {
        return Err(crate::Error::general("no output container configured"));
    };
    let input = C::open(&config.input).inspect_err(|e| {
        log::error!("cannot open {}: {e}", config.input.display());
    })?;
    let output = C::create(output_path).inspect_err(|e| {
        log::error!("cannot create {}: {e}", output_path.display());
    })?;

    let sequencer = config.sequencer();
    let copy = sequencer.copy(&input, &output, config.datasets.as_slice());
    log::info!("copy finished: {copy}");
    close(input, "input");
    close(output, "output");

    let verify = if config.verify {
        log::info!("verifying {}", output_path.display());
        match C::open(output_path) {
            Ok(reopened) => {
                let summary = sequencer.verify(&reopened, config.datasets.as_slice());
                for report in &summary.reports {
                    print_report(report, config);
                }
                close(reopened, "output");
                Some(summary)
            }
            Err(e) => {
                log::error!("cannot reopen {} for verification: {e}", output_path.display());
                None
            }
        }
    } else {
        None
    };
    Ok(CompressSummary { copy, verify })
}

fn close<C: Container>(container: C, label: &str) {
    if let Err(e) = guarded("file close", || container.close()) {
        log::warn!("closing {label} failed: {e}");
    }
}

/// Print the leading values of a successfully read dataset.
fn print_report(report: &DatasetReport, config: &RunConfig) {
    let Some(slab) = report.slab() else {
        return;
    };
    println!("{} {}", report.name, slab.shape);
    let rows = usize::try_from(config.preview_rows).unwrap_or(usize::MAX);
    let length = usize::try_from(config.preview_length).unwrap_or(usize::MAX);
    for (idx, row) in slab.preview_rows(rows, length).iter().enumerate() {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("  row {}: {}", idx + 1, values.join(" "));
    }
}
