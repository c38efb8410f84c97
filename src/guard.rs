//! Fault boundary around fragile storage calls.
//!
//! Any panic raised while the wrapped call runs (inside the bindings, a codec
//! or a filter plugin) is caught and turned into [`Error::Fault`], so that one
//! misbehaving dataset cannot end a batch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::{Error, Result};

/// Run `f`, converting a panic into [`Error::Fault`] labelled with `operation`.
pub fn guarded<T>(operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    // Handles touched by `f` are either dropped or only closed afterwards,
    // so observing them after an unwind is fine.
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::debug!("caught fault during {operation}: {message}");
            Err(Error::Fault { operation, message })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown fault".to_string()
    }
}
