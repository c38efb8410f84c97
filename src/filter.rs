//! Parameters of the error-bounded lossy filter and their wire form.

use serde::{Deserialize, Serialize};

/// Registered HDF5 filter id of the SZ3 plugin.
pub const SZ3_FILTER_ID: i32 = 32024;
/// Default absolute error bound.
pub const DEFAULT_ERROR_BOUND: f64 = 1e-4;
/// Number of words in the filter configuration protocol.
pub const FILTER_WORDS: usize = 3;

/// How the error bound is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum ErrorBoundMode {
    /// Every decoded value is within `bound` of the original.
    #[default]
    Absolute = 0,
    /// Every decoded value is within `bound * (max - min)` of the original,
    /// the range being taken over the finite values of each chunk.
    Relative = 1,
}

impl TryFrom<u32> for ErrorBoundMode {
    type Error = crate::Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Absolute),
            1 => Ok(Self::Relative),
            n => Err(crate::Error::general(format!(
                "unsupported error bound mode {n}"
            ))),
        }
    }
}

/// Configuration handed to the lossy filter when a dataset is created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionParameters {
    #[serde(default)]
    pub mode: ErrorBoundMode,
    pub error_bound: f64,
}

impl Default for CompressionParameters {
    fn default() -> Self {
        Self::absolute(DEFAULT_ERROR_BOUND)
    }
}

impl CompressionParameters {
    pub fn absolute(error_bound: f64) -> Self {
        Self {
            mode: ErrorBoundMode::Absolute,
            error_bound,
        }
    }

    pub fn relative(error_bound: f64) -> Self {
        Self {
            mode: ErrorBoundMode::Relative,
            error_bound,
        }
    }

    /// Reject bounds the filter cannot honour.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.error_bound.is_finite() || self.error_bound < 0.0 {
            return Err(crate::Error::general(format!(
                "invalid error bound {}",
                self.error_bound
            )));
        }
        Ok(())
    }

    /// Encode as filter words: the mode tag, then the high and low halves
    /// of the bound's bit pattern.
    pub fn to_words(&self) -> [u32; FILTER_WORDS] {
        let bits = self.error_bound.to_bits();
        [self.mode as u32, (bits >> 32) as u32, bits as u32]
    }

    /// Decode filter words produced by [`CompressionParameters::to_words`].
    pub fn from_words(words: &[u32]) -> crate::Result<Self> {
        let [mode, high, low] = words else {
            return Err(crate::Error::general(format!(
                "expected {FILTER_WORDS} filter words, got {}",
                words.len()
            )));
        };
        let out = Self {
            mode: ErrorBoundMode::try_from(*mode)?,
            error_bound: f64::from_bits((u64::from(*high) << 32) | u64::from(*low)),
        };
        out.validate()?;
        Ok(out)
    }
}
