//! PNG predictor decoding (predictors 10-15).
//!
//! Cross-reference streams written by most producers use `/Predictor 12`
//! (PNG Up) with `/Columns` equal to the entry width.

use crate::error::{Error, Result};

/// Decode parameters for stream decoders.
#[derive(Debug, Clone)]
pub struct DecodeParams {
    /// Predictor algorithm (1 = none, 2 = TIFF, 10-15 = PNG)
    pub predictor: i64,
    /// Number of columns (width in samples)
    pub columns: usize,
    /// Number of color components per sample
    pub colors: usize,
    /// Bits per component
    pub bits_per_component: usize,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            columns: 1,
            colors: 1,
            bits_per_component: 8,
        }
    }
}

impl DecodeParams {
    /// Bytes of sample data per row (without the PNG tag byte).
    pub fn pixel_bytes_per_row(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }
}

/// Reverse a predictor applied to decoded stream data.
pub fn decode_predictor(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        10..=15 => decode_png(data, params),
        other => Err(Error::Decode(format!("Unsupported predictor: {}", other))),
    }
}

fn decode_png(data: &[u8], params: &DecodeParams) -> Result<Vec<u8>> {
    let row_len = params.pixel_bytes_per_row();
    let stride = row_len + 1;
    if data.len() % stride != 0 {
        log::debug!(
            "PNG predictor data length {} is not a multiple of {}; ignoring trailing bytes",
            data.len(),
            stride
        );
    }
    let bpp = params.bytes_per_pixel();
    let mut output: Vec<u8> = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for row in data.chunks_exact(stride) {
        let tag = row[0];
        let encoded = &row[1..];
        let mut current = vec![0u8; row_len];
        for i in 0..row_len {
            let left = if i >= bpp { current[i - bpp] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match tag {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, upper_left),
                other => {
                    return Err(Error::Decode(format!("Invalid PNG predictor tag: {}", other)));
                },
            };
            current[i] = encoded[i].wrapping_add(predicted);
        }
        output.extend_from_slice(&current);
        previous = current;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(columns: usize) -> DecodeParams {
        DecodeParams {
            predictor: 12,
            columns,
            ..DecodeParams::default()
        }
    }

    #[test]
    fn test_png_up_rows() {
        // Two rows of three bytes, second row encoded as difference from first.
        let data = [2, 1, 2, 3, 2, 1, 1, 1];
        let out = decode_predictor(&data, &params(3)).unwrap();
        assert_eq!(out, vec![1, 2, 3, 2, 3, 4]);
    }

    #[test]
    fn test_png_sub_row() {
        let data = [1, 5, 1, 1];
        let out = decode_predictor(&data, &params(3)).unwrap();
        assert_eq!(out, vec![5, 6, 7]);
    }

    #[test]
    fn test_invalid_tag() {
        assert!(decode_predictor(&[9, 0, 0], &params(2)).is_err());
    }

    #[test]
    fn test_no_predictor_passthrough() {
        let p = DecodeParams::default();
        assert_eq!(decode_predictor(b"abc", &p).unwrap(), b"abc");
    }
}
