//! Stream decoders for the filters found in document structure streams.
//!
//! Signing only needs to read structural streams: cross-reference streams,
//! object streams and (in tests) appearance streams. Those are virtually
//! always FlateDecode, optionally with a PNG predictor, so that is what is
//! supported here together with ASCIIHexDecode.

use crate::error::{Error, Result};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Decompression bomb guard for structural streams.
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Get the name of this decoder (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// ASCIIHexDecode filter.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&b| b == b'>').unwrap_or(input.len());
        crate::parser::decode_hex(&input[..end])
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Decode stream data through a filter pipeline, then undo any predictor.
pub fn decode_stream(data: &[u8], filters: &[String], params: Option<&DecodeParams>) -> Result<Vec<u8>> {
    let mut current = data.to_vec();

    for filter_name in filters {
        let decoder: Box<dyn StreamDecoder> = match filter_name.as_str() {
            "FlateDecode" | "Fl" => Box::new(FlateDecoder),
            "ASCIIHexDecode" | "AHx" => Box::new(AsciiHexDecoder),
            _ => return Err(Error::UnsupportedFilter(filter_name.clone())),
        };
        current = decoder.decode(&current)?;
        log::trace!("{} produced {} bytes", decoder.name(), current.len());

        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "decoded stream exceeds {} bytes",
                MAX_DECODED_SIZE
            )));
        }
    }

    if let Some(params) = params {
        if params.predictor > 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}
