//! Preview hyperslabs of chunked `float32` datasets and re-encode them with an
//! error-bounded lossy codec, one dataset at a time, with every fragile
//! storage call run inside a fault boundary.

pub mod codec;
pub mod config;
mod error;
pub mod filter;
pub mod guard;
pub mod pipeline;
pub mod selection;
pub mod sequencer;
pub mod storage;

pub use zarrs;

pub use error::{Error, Result};
