//! FlateDecode (zlib/deflate) implementation.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// FlateDecode filter implementation.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => Ok(output),
            Err(e) if !output.is_empty() => {
                log::warn!(
                    "FlateDecode partial recovery: {} bytes before corruption: {}",
                    output.len(),
                    e
                );
                Ok(output)
            },
            Err(e) => {
                // Some producers write raw deflate without the zlib wrapper.
                log::debug!("Zlib decode failed ({}), trying raw deflate", e);
                output.clear();
                DeflateDecoder::new(input)
                    .read_to_end(&mut output)
                    .map_err(|raw_err| Error::Decode(format!("FlateDecode failed: {}", raw_err)))?;
                Ok(output)
            },
        }
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
