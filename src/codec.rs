//! Error-bounded lossy codec for `float32` arrays.
//!
//! Values are linearly quantised onto a grid of step `2 * bound`, and the
//! differences between successive bin indices are written as zigzag LEB128
//! varints. A value whose reconstruction would fall outside the bound (NaN,
//! infinities, magnitudes beyond the exact integer range of `f64`) is stored
//! verbatim instead.
//!
//! Encoded layout: `u64` LE element count, `f64` LE step, then one token per
//! element. A token is `zigzag(delta) << 1` for a quantised value, or `1`
//! followed by the 4 raw LE bytes of the `f32`.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zarrs::metadata::v3::MetadataV3;
use zarrs::plugin::PluginCreateError;
use zarrs_codec::{
    ArrayCodecTraits, ArrayToBytesCodecTraits, Codec, CodecError, CodecPluginV3, CodecTraits,
    CodecTraitsV3,
};

use crate::filter::{CompressionParameters, ErrorBoundMode};

/// Name of the codec in zarr metadata.
pub const ERROR_BOUND_CODEC_NAME: &str = "slabcopy.error_bound";

const HEADER_LEN: usize = size_of::<u64>() + size_of::<f64>();
const OUTLIER_TOKEN: u64 = 1;
/// Quantised bins must stay exactly representable as `f64`.
const MAX_BIN: f64 = (1u64 << 52) as f64;

zarrs::plugin::impl_extension_aliases!(
    ErrorBoundCodec,
    v3: "slabcopy.error_bound",
    ["slabcopy.error_bound", "error_bound"]
);
inventory::submit! {
    CodecPluginV3::new::<ErrorBoundCodec>()
}

#[derive(Debug, Clone)]
pub struct ErrorBoundCodec {
    parameters: CompressionParameters,
}

impl ErrorBoundCodec {
    pub fn new(parameters: CompressionParameters) -> crate::Result<Self> {
        parameters.validate()?;
        Ok(Self { parameters })
    }

    pub fn new_with_configuration(
        configuration: &ErrorBoundCodecConfiguration,
    ) -> Result<Self, PluginCreateError> {
        Self::new(configuration.0).map_err(|e| PluginCreateError::Other(e.to_string()))
    }

    pub fn parameters(&self) -> &CompressionParameters {
        &self.parameters
    }

    /// Zarr V3 metadata describing this codec.
    pub fn metadata(&self) -> crate::Result<MetadataV3> {
        Ok(MetadataV3::new_with_serializable_configuration(
            ERROR_BOUND_CODEC_NAME.to_string(),
            &ErrorBoundCodecConfiguration(self.parameters),
        )?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
#[serde(transparent)]
pub struct ErrorBoundCodecConfiguration(pub CompressionParameters);

/// Encode `values` within the bound described by `parameters`.
pub fn encode_values(values: &[f32], parameters: &CompressionParameters) -> Vec<u8> {
    let bound = match parameters.mode {
        ErrorBoundMode::Absolute => parameters.error_bound,
        ErrorBoundMode::Relative => parameters.error_bound * value_range(values),
    };
    // a zero step stores every value verbatim
    let step = if bound > 0.0 && bound.is_finite() {
        2.0 * bound
    } else {
        0.0
    };

    let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 2);
    out.extend_from_slice(&(values.len() as u64).to_le_bytes());
    out.extend_from_slice(&step.to_le_bytes());

    let mut previous: i64 = 0;
    for &value in values {
        match quantise(value, step, bound) {
            Some(bin) => {
                write_varint(&mut out, zigzag(bin - previous) << 1);
                previous = bin;
            }
            None => {
                write_varint(&mut out, OUTLIER_TOKEN);
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
    }
    out
}

/// Decode bytes produced by [`encode_values`].
pub fn decode_values(bytes: &[u8]) -> crate::Result<Vec<f32>> {
    if bytes.len() < HEADER_LEN {
        return Err(crate::Error::general(format!(
            "encoded chunk of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    let (header, mut rest) = bytes.split_at(HEADER_LEN);
    let count = u64::from_le_bytes(header[..8].try_into().map_err(crate::Error::wrap)?);
    let step = f64::from_le_bytes(header[8..].try_into().map_err(crate::Error::wrap)?);
    let count = usize::try_from(count).map_err(crate::Error::wrap)?;
    if count > rest.len() {
        // every token takes at least one byte
        return Err(crate::Error::general(format!(
            "encoded chunk claims {count} elements but has {} payload bytes",
            rest.len()
        )));
    }

    let mut values = Vec::with_capacity(count);
    let mut previous: i64 = 0;
    for _ in 0..count {
        let token = read_varint(&mut rest)?;
        if token == OUTLIER_TOKEN {
            let Some((raw, tail)) = rest.split_first_chunk::<4>() else {
                return Err(crate::Error::general("truncated verbatim value"));
            };
            values.push(f32::from_le_bytes(*raw));
            rest = tail;
        } else {
            previous = previous.wrapping_add(unzigzag(token >> 1));
            values.push(reconstruct(previous, step));
        }
    }
    if !rest.is_empty() {
        return Err(crate::Error::general(format!(
            "{} trailing bytes after encoded values",
            rest.len()
        )));
    }
    Ok(values)
}

fn quantise(value: f32, step: f64, bound: f64) -> Option<i64> {
    if step == 0.0 || !value.is_finite() {
        return None;
    }
    let bin = (f64::from(value) / step).round();
    if bin.abs() >= MAX_BIN {
        return None;
    }
    let bin = bin as i64;
    let error = (f64::from(reconstruct(bin, step)) - f64::from(value)).abs();
    (error <= bound).then_some(bin)
}

fn reconstruct(bin: i64, step: f64) -> f32 {
    (bin as f64 * step) as f32
}

/// `max - min` over the finite values, or 0 if there are none.
fn value_range(values: &[f32]) -> f64 {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(f64::from(v)), hi.max(f64::from(v)))
        });
    if max >= min { max - min } else { 0.0 }
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

fn write_varint(out: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        out.push((n as u8) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

fn read_varint(bytes: &mut &[u8]) -> crate::Result<u64> {
    let mut out = 0u64;
    for shift in (0..64).step_by(7) {
        let Some((&b, tail)) = bytes.split_first() else {
            return Err(crate::Error::general("truncated varint"));
        };
        *bytes = tail;
        out |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(out);
        }
    }
    Err(crate::Error::general("varint longer than 64 bits"))
}

fn check_float32(data_type: &zarrs::array::DataType) -> Result<(), CodecError> {
    if *data_type == zarrs::array::data_type::float32() {
        Ok(())
    } else {
        Err(CodecError::Other(
            "error bound codec supports float32 arrays only".into(),
        ))
    }
}

impl CodecTraitsV3 for ErrorBoundCodec {
    fn create(metadata: &MetadataV3) -> Result<zarrs_codec::Codec, zarrs::plugin::PluginCreateError>
    where
        Self: Sized,
    {
        let configuration = metadata.to_typed_configuration()?;
        let codec = Arc::new(ErrorBoundCodec::new_with_configuration(&configuration)?);
        Ok(Codec::ArrayToBytes(codec))
    }
}

impl CodecTraits for ErrorBoundCodec {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn configuration(
        &self,
        _version: zarrs::plugin::ZarrVersion,
        _options: &zarrs_codec::CodecMetadataOptions,
    ) -> Option<zarrs::metadata::Configuration> {
        let val = serde_json::to_value(ErrorBoundCodecConfiguration(self.parameters))
            .expect("compression parameters should be serializable");
        let serde_json::Value::Object(map) = val else {
            panic!("compression parameters should serialize to a JSON object");
        };
        Some(map.into())
    }

    fn partial_decoder_capability(&self) -> zarrs_codec::PartialDecoderCapability {
        zarrs_codec::PartialDecoderCapability {
            partial_read: false,
            partial_decode: false,
        }
    }

    fn partial_encoder_capability(&self) -> zarrs_codec::PartialEncoderCapability {
        zarrs_codec::PartialEncoderCapability {
            partial_encode: false,
        }
    }
}

impl ArrayCodecTraits for ErrorBoundCodec {
    fn recommended_concurrency(
        &self,
        _shape: &[std::num::NonZeroU64],
        _data_type: &zarrs::array::DataType,
    ) -> Result<zarrs_codec::RecommendedConcurrency, zarrs_codec::CodecError> {
        Ok(zarrs_codec::RecommendedConcurrency::new_maximum(1))
    }
}

impl ArrayToBytesCodecTraits for ErrorBoundCodec {
    fn into_dyn(self: Arc<Self>) -> Arc<dyn ArrayToBytesCodecTraits> {
        self
    }

    fn encoded_representation(
        &self,
        shape: &[std::num::NonZeroU64],
        data_type: &zarrs::array::DataType,
        _fill_value: &zarrs::array::FillValue,
    ) -> Result<zarrs_codec::BytesRepresentation, zarrs_codec::CodecError> {
        check_float32(data_type)?;
        let numel: u64 = shape.iter().map(|n| n.get()).product();
        // worst case per element: a 1-byte outlier token plus 4 raw bytes,
        // or a delta of up to 54 bits in 8 varint bytes
        Ok(zarrs_codec::BytesRepresentation::BoundedSize(
            HEADER_LEN as u64 + numel * 8,
        ))
    }

    fn encode<'a>(
        &self,
        bytes: zarrs_codec::ArrayBytes<'a>,
        shape: &[std::num::NonZeroU64],
        data_type: &zarrs::array::DataType,
        _fill_value: &zarrs::array::FillValue,
        _options: &zarrs_codec::CodecOptions,
    ) -> Result<zarrs_codec::ArrayBytesRaw<'a>, zarrs_codec::CodecError> {
        check_float32(data_type)?;
        let raw = bytes
            .into_fixed()
            .map_err(|e| CodecError::Other(e.to_string()))?;
        let numel: u64 = shape.iter().map(|n| n.get()).product();
        if raw.len() as u64 != numel * size_of::<f32>() as u64 {
            return Err(CodecError::Other(format!(
                "expected {numel} float32 elements, got {} bytes",
                raw.len()
            )));
        }
        let values: Vec<f32> = raw
            .chunks_exact(size_of::<f32>())
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Cow::Owned(encode_values(&values, &self.parameters)))
    }

    fn decode<'a>(
        &self,
        bytes: zarrs_codec::ArrayBytesRaw<'a>,
        shape: &[std::num::NonZeroU64],
        data_type: &zarrs::array::DataType,
        _fill_value: &zarrs::array::FillValue,
        _options: &zarrs_codec::CodecOptions,
    ) -> Result<zarrs_codec::ArrayBytes<'a>, zarrs_codec::CodecError> {
        check_float32(data_type)?;
        let values = decode_values(&bytes)
            .map_err(|e| CodecError::Other(format!("error bound chunk could not be decoded: {e}")))?;

        let numel: u64 = shape.iter().map(|n| n.get()).product();
        if values.len() as u64 != numel {
            return Err(CodecError::Other(format!(
                "error bound chunk has {} elements, expected {numel} for shape {shape:?}",
                values.len(),
            )));
        }

        let decoded: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Ok(zarrs_codec::ArrayBytes::new_flen(Cow::Owned(decoded)))
    }
}
