//! Print the leading rows of each configured dataset.
//!
//! Usage: `slab-preview [config.json]`. Without a configuration the input is
//! `data_sz3_l-3.h5`, which needs a build with the `hdf5` feature; a default
//! build exits with status 255 unless the configuration names a zarr input.

use std::path::PathBuf;
use std::process::ExitCode;

use slabcopy::config::RunConfig;
use slabcopy::pipeline;

/// Exit status when the input cannot be opened (-1 as an unsigned byte).
const FATAL_EXIT: u8 = 255;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = match RunConfig::load(config_path.as_deref(), RunConfig::preview_defaults()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("invalid configuration: {e}");
            return ExitCode::from(FATAL_EXIT);
        }
    };
    // SAFETY: no other threads have been started yet
    unsafe { config.environment.apply() };

    println!("--- preview of {} ---", config.input.display());
    match pipeline::run_preview(&config) {
        Ok(summary) => {
            log::info!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(FATAL_EXIT)
        }
    }
}
