//! Copy the configured datasets into a new container with the error-bounded filter.
//!
//! Usage: `slab-compress [config.json]`. Without a configuration the input is
//! `mesh.h5`, which needs a build with the `hdf5` feature; a default build
//! exits with status 255 unless the configuration names zarr paths.

use std::path::PathBuf;
use std::process::ExitCode;

use slabcopy::config::RunConfig;
use slabcopy::pipeline;

/// Exit status when the input or output cannot be opened (-1 as an unsigned byte).
const FATAL_EXIT: u8 = 255;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match RunConfig::load(config_path.as_deref(), RunConfig::compress_defaults()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            return ExitCode::from(FATAL_EXIT);
        }
    };
    // SAFETY: no other threads have been started yet
    unsafe { config.environment.apply() };

    log::info!(
        "compressing {} with {:?} error bound {}",
        config.input.display(),
        config.filter.mode,
        config.filter.error_bound
    );
    match pipeline::run_compress(&config) {
        Ok(summary) => {
            log::info!("copy: {}", summary.copy);
            if let Some(verify) = &summary.verify {
                log::info!("verify: {verify}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(FATAL_EXIT)
        }
    }
}
