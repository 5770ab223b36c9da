//! Remote-write batch codec.
//!
//! A batch is a protobuf-encoded `WriteRequest`, block-compressed with snappy
//! (raw format, no framing) as required by the remote-write protocol.

use crate::remote::proto::{TimeSeries, WriteRequest};
use prost::Message;
use thiserror::Error;

/// Errors that can occur while encoding or decoding a batch.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Protobuf serialization failed.
    #[error("Failed to marshal write request: {0}")]
    Encode(#[from] prost::EncodeError),

    /// Protobuf deserialization failed.
    #[error("Failed to unmarshal write request: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Snappy compression or decompression failed.
    #[error("Snappy error: {0}")]
    Snappy(#[from] snap::Error),
}

/// Serializes and compresses a batch of series.
///
/// # Errors
///
/// Returns an error if the request cannot be marshalled or compressed.
pub fn encode(timeseries: Vec<TimeSeries>) -> Result<Vec<u8>, CodecError> {
    let request = WriteRequest { timeseries };
    let mut buf = Vec::with_capacity(request.encoded_len());
    request.encode(&mut buf)?;

    let compressed = snap::raw::Encoder::new().compress_vec(&buf)?;
    Ok(compressed)
}

/// Decompresses and deserializes a batch.
///
/// # Errors
///
/// Returns an error if the payload is not valid snappy or not a valid `WriteRequest`.
pub fn decode(payload: &[u8]) -> Result<WriteRequest, CodecError> {
    let buf = snap::raw::Decoder::new().decompress_vec(payload)?;
    let request = WriteRequest::decode(buf.as_slice())?;
    Ok(request)
}
