//! Signed-region bookkeeping.
//!
//! A signature covers the whole revision except its own `/Contents` hex
//! string. `/ByteRange [a b c d]` names the two covered slices: `a..a+b`
//! ends right before the `<` of `/Contents`, `c..c+d` starts right after
//! its `>`.
//!
//! Neither the slices nor the CMS blob are known when the signature
//! dictionary is serialized, so both are written as fixed-width
//! placeholders and overwritten in place once the revision is complete.
//! Overwriting never shifts a byte, which keeps the xref offsets valid.

use crate::error::{Error, Result};

/// Fixed-width ByteRange written before offsets are known.
pub const BYTE_RANGE_PLACEHOLDER: &str = "[0 0000000000 0000000000 0000000000]";

/// Reserves, locates and fills the `/Contents` gap of one signature.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Width of the whole `<hex>` token.
    gap: usize,
}

impl ByteRangeCalculator {
    /// Reserve room for a DER blob of up to `estimated_signature_size` bytes.
    pub fn new(estimated_signature_size: usize) -> Self {
        Self {
            gap: 2 * estimated_signature_size + 2,
        }
    }

    /// Width of the `/Contents` token, brackets included.
    pub fn placeholder_size(&self) -> usize {
        self.gap
    }

    /// Largest DER signature that fits the placeholder.
    pub fn capacity(&self) -> usize {
        self.gap.saturating_sub(2) / 2
    }

    /// Zero-filled `<...>` hex string for the signature contents.
    pub fn generate_placeholder(&self) -> String {
        let mut token = String::with_capacity(self.gap);
        token.push('<');
        token.extend(std::iter::repeat('0').take(self.gap - 2));
        token.push('>');
        token
    }

    /// Covered slices for a revision of `file_size` bytes whose `/Contents`
    /// token starts at `contents_offset`.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let resume = contents_offset + self.gap;
        [
            0,
            contents_offset as i64,
            resume as i64,
            file_size.saturating_sub(resume) as i64,
        ]
    }

    /// PDF array syntax for a ByteRange.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
        let [a, b, c, d] = byte_range;
        format!("[{a} {b} {c} {d}]")
    }

    /// Overwrite the placeholder at `offset`, padding with trailing spaces.
    pub fn patch_byte_range(pdf_data: &mut [u8], offset: usize, byte_range: &[i64; 4]) -> Result<()> {
        let width = BYTE_RANGE_PLACEHOLDER.len();
        let target = offset
            .checked_add(width)
            .and_then(|end| pdf_data.get_mut(offset..end))
            .filter(|slot| *slot == BYTE_RANGE_PLACEHOLDER.as_bytes())
            .ok_or_else(|| Error::InvalidPdf("ByteRange placeholder not found".to_string()))?;

        let text = Self::format_byte_range(byte_range);
        if text.len() > width {
            return Err(Error::InvalidPdf(format!("ByteRange {text} does not fit its placeholder")));
        }
        target.fill(b' ');
        target[..text.len()].copy_from_slice(text.as_bytes());
        Ok(())
    }

    /// The covered bytes, concatenated.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        let (head, tail) = Self::signed_slices(pdf_data, byte_range)?;
        Ok([head, tail].concat())
    }

    /// The two covered slices, bounds-checked.
    pub fn signed_slices<'a>(
        pdf_data: &'a [u8],
        byte_range: &[i64; 4],
    ) -> Result<(&'a [u8], &'a [u8])> {
        let slice = |start: i64, len: i64| -> Result<&'a [u8]> {
            let start = usize::try_from(start).ok();
            let len = usize::try_from(len).ok();
            start
                .zip(len)
                .and_then(|(s, l)| pdf_data.get(s..s.checked_add(l)?))
                .ok_or_else(|| {
                    Error::InvalidPdf(format!(
                        "ByteRange {} falls outside the {} byte file",
                        Self::format_byte_range(byte_range),
                        pdf_data.len()
                    ))
                })
        };
        Ok((slice(byte_range[0], byte_range[1])?, slice(byte_range[2], byte_range[3])?))
    }

    /// Check the shape of a ByteRange against a file of `file_size` bytes.
    ///
    /// The first slice must start the file and the second must begin after
    /// it. The second slice may stop short of the end: later revisions can
    /// follow the one that was signed.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [start, head_len, resume, tail_len] = *byte_range;
        let problem = if start != 0 {
            Some(format!("first slice starts at {start}, not 0"))
        } else if head_len < 0 || resume < 0 || tail_len < 0 {
            Some("negative entry".to_string())
        } else if head_len >= resume {
            Some(format!("second slice at {resume} does not follow the first ({head_len} bytes)"))
        } else if resume + tail_len > file_size as i64 {
            Some(format!("ends at {} past end of file {file_size}", resume + tail_len))
        } else {
            None
        };

        match problem {
            Some(problem) => Err(Error::InvalidPdf(format!(
                "bad ByteRange {}: {problem}",
                Self::format_byte_range(byte_range)
            ))),
            None => Ok(()),
        }
    }

    /// Whether the second range ends exactly at the end of the file.
    pub fn covers_whole_document(byte_range: &[i64; 4], file_size: usize) -> bool {
        byte_range[2].checked_add(byte_range[3]) == Some(file_size as i64)
    }

    /// Write `signature_hex` into the gap at `contents_offset`, zero-padded.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature_hex: &str,
    ) -> Result<()> {
        let digits = self.gap - 2;
        if signature_hex.len() > digits {
            return Err(Error::InvalidPdf(format!(
                "signature needs {} hex digits, gap holds {digits}",
                signature_hex.len()
            )));
        }
        let slot = pdf_data
            .get_mut(contents_offset..contents_offset + self.gap)
            .ok_or_else(|| Error::InvalidPdf("/Contents gap lies past end of file".to_string()))?;

        slot.fill(b'0');
        slot[0] = b'<';
        slot[1..=signature_hex.len()].copy_from_slice(signature_hex.as_bytes());
        slot[self.gap - 1] = b'>';
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ESTIMATED_SIGNATURE_SIZE)
    }
}

/// Uppercase hex, as written into `/Contents`.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_width() {
        let calc = ByteRangeCalculator::new(1024);
        assert_eq!(calc.placeholder_size(), 2050);
        assert_eq!(calc.capacity(), 1024);
        assert_eq!(ByteRangeCalculator::new(4).generate_placeholder(), "<00000000>");
    }

    #[test]
    fn test_ranges_skip_the_gap() {
        let calc = ByteRangeCalculator::new(49);
        assert_eq!(calc.calculate_byte_range(1000, 400), [0, 400, 500, 500]);
    }

    #[test]
    fn test_patch_keeps_length() {
        let mut data = format!("/ByteRange {} /X", BYTE_RANGE_PLACEHOLDER).into_bytes();
        let before = data.len();
        ByteRangeCalculator::patch_byte_range(&mut data, 11, &[0, 10, 20, 30]).unwrap();
        assert_eq!(data.len(), before);
        let text = String::from_utf8(data).unwrap();
        assert!(text.starts_with("/ByteRange [0 10 20 30] "));
        assert!(text.ends_with(" /X"));
    }

    #[test]
    fn test_patch_refuses_non_placeholder() {
        let mut data = b"/ByteRange [0 1 2 3]".to_vec();
        assert!(ByteRangeCalculator::patch_byte_range(&mut data, 11, &[0, 1, 2, 3]).is_err());
        assert!(ByteRangeCalculator::patch_byte_range(&mut data, usize::MAX, &[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_signed_bytes_concatenate() {
        let data = b"head<sig>tail";
        assert_eq!(
            ByteRangeCalculator::extract_signed_bytes(data, &[0, 4, 9, 4]).unwrap(),
            b"headtail"
        );
        assert!(ByteRangeCalculator::extract_signed_bytes(data, &[0, 4, 9, 5]).is_err());
        assert!(ByteRangeCalculator::extract_signed_bytes(data, &[0, -1, 9, 4]).is_err());
    }

    #[test]
    fn test_validate_shapes() {
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 200).is_ok());
        // signed revision followed by a later one
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 50], 400).is_ok());
        assert!(ByteRangeCalculator::validate_byte_range(&[10, 100, 150, 50], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 100, 150, 100], 200).is_err());
        assert!(ByteRangeCalculator::validate_byte_range(&[0, 160, 150, 10], 200).is_err());
    }

    #[test]
    fn test_whole_document_coverage() {
        assert!(ByteRangeCalculator::covers_whole_document(&[0, 100, 150, 50], 200));
        assert!(!ByteRangeCalculator::covers_whole_document(&[0, 100, 150, 50], 400));
        assert!(!ByteRangeCalculator::covers_whole_document(&[0, 1, i64::MAX, 1], 10));
    }

    #[test]
    fn test_insert_pads_with_zeros() {
        let calc = ByteRangeCalculator::new(4);
        let mut data = b"XX<00000000>YY".to_vec();
        calc.insert_signature(&mut data, 2, "ABCD").unwrap();
        assert_eq!(&data, b"XX<ABCD0000>YY");
        assert!(calc.insert_signature(&mut data, 2, "AABBCCDDEE").is_err());
        assert!(calc.insert_signature(&mut data, 8, "AB").is_err());
    }

    #[test]
    fn test_hex_is_uppercase() {
        assert_eq!(bytes_to_hex(&[0x00, 0xAB, 0x5F]), "00AB5F");
    }
}
