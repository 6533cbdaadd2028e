//! Cross-reference parsing.
//!
//! Handles classic `xref` tables and PDF 1.5 cross-reference streams, and
//! follows `/Prev` (and hybrid `/XRefStm`) links so that every revision of
//! an incrementally updated file is merged, newest entries winning.

use crate::error::{Error, Result};
use crate::object::{Dict, Object};
use crate::parser::parse_indirect_object;
use std::collections::HashMap;

/// Maximum number of chained cross-reference sections followed.
const MAX_XREF_CHAIN: u32 = 100;

/// Where an object lives in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free entry
    Free,
    /// Object stored directly at a byte offset
    InFile {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream
    InStream {
        /// Object number of the containing object stream
        stream_id: u32,
        /// Index within the object stream
        index: u32,
    },
}

/// Merged cross-reference table of all revisions.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dict,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object number.
    pub fn get(&self, id: u32) -> Option<&XRefEntry> {
        self.entries.get(&id)
    }

    /// Record an entry unless a newer revision already defined it.
    fn add_if_absent(&mut self, id: u32, entry: XRefEntry) {
        self.entries.entry(id).or_insert(entry);
    }

    /// The newest trailer dictionary, with older keys filled in.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Highest object number referenced by any revision.
    pub fn max_object_id(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge an older section into this one.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (id, entry) in older.entries {
            self.add_if_absent(id, entry);
        }
        for (key, value) in older.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }
}

/// Find the offset recorded after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let window_start = data.len().saturating_sub(4096);
    let tail = &data[window_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    let digits: String = tail[pos + keyword.len()..]
        .iter()
        .skip_while(|c| c.is_ascii_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .map(|&c| c as char)
        .collect();
    digits.parse().map_err(|_| Error::InvalidXref)
}

/// Parse the whole cross-reference chain starting at `offset`.
pub fn parse_xref(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    parse_xref_chain(data, offset, 0)
}

fn parse_xref_chain(data: &[u8], offset: usize, depth: u32) -> Result<CrossRefTable> {
    if depth > MAX_XREF_CHAIN {
        return Err(Error::RecursionLimitExceeded(MAX_XREF_CHAIN));
    }
    if offset >= data.len() {
        return Err(Error::InvalidPdf(format!("xref offset {} is beyond end of file", offset)));
    }

    let section = &data[offset..];
    let start = section
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .unwrap_or(0);

    let mut table = if section[start..].starts_with(b"xref") {
        log::debug!("Classic xref section at offset {}", offset);
        let mut table = parse_classic_section(data, offset + start)?;
        // Hybrid files carry an xref stream for compressed objects.
        if let Some(stm_offset) = table.trailer.get("XRefStm").and_then(Object::as_integer) {
            match parse_stream_section(data, stm_offset as usize) {
                Ok(stream_table) => table.merge_older(stream_table),
                Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
            }
        }
        table
    } else {
        log::debug!("Cross-reference stream at offset {}", offset);
        parse_stream_section(data, offset)?
    };

    if let Some(prev) = table.trailer.get("Prev").and_then(Object::as_integer) {
        let prev = prev as usize;
        if prev == offset {
            return Err(Error::InvalidPdf("xref /Prev points at itself".to_string()));
        }
        let older = parse_xref_chain(data, prev, depth + 1)?;
        table.trailer.remove("Prev");
        table.merge_older(older);
    }

    Ok(table)
}

fn parse_classic_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut pos = offset + b"xref".len();

    loop {
        let line_start = skip_whitespace(data, pos);
        if data[line_start..].starts_with(b"trailer") {
            let (_, trailer) = crate::parser::parse_object(&data[line_start + b"trailer".len()..])
                .map_err(|_| Error::InvalidPdf("unreadable trailer dictionary".to_string()))?;
            table.trailer = match trailer {
                Object::Dictionary(dict) => dict,
                _ => return Err(Error::InvalidXref),
            };
            return Ok(table);
        }

        let (header, next) = read_line(data, line_start);
        let mut parts = header.split_whitespace();
        let (first, count) = match (
            parts.next().and_then(|s| s.parse::<u32>().ok()),
            parts.next().and_then(|s| s.parse::<u32>().ok()),
        ) {
            (Some(first), Some(count)) => (first, count),
            _ => return Err(Error::InvalidXref),
        };
        if count > 10_000_000 {
            return Err(Error::InvalidPdf("xref subsection count exceeds limit".to_string()));
        }
        pos = next;

        for i in 0..count {
            let entry_start = skip_whitespace(data, pos);
            let (line, next) = read_line(data, entry_start);
            pos = next;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                log::warn!("Malformed xref entry for object {}: {:?}", first + i, line);
                continue;
            }
            let entry = match (fields[0].parse::<usize>(), fields[1].parse::<u16>(), fields[2]) {
                (Ok(offset), Ok(gen), "n") => XRefEntry::InFile { offset, gen },
                (_, _, "f") => XRefEntry::Free,
                _ => {
                    log::warn!("Unreadable xref entry for object {}: {:?}", first + i, line);
                    continue;
                },
            };
            table.add_if_absent(first + i, entry);
        }
    }
}

fn skip_whitespace(data: &[u8], mut pos: usize) -> usize {
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Read one line (CR, LF or CRLF terminated) starting at `pos`.
fn read_line(data: &[u8], pos: usize) -> (String, usize) {
    let end = data[pos..]
        .iter()
        .position(|&c| c == b'\n' || c == b'\r')
        .map(|p| pos + p)
        .unwrap_or(data.len());
    let line = String::from_utf8_lossy(&data[pos..end]).into_owned();
    let mut next = end;
    if data.get(next) == Some(&b'\r') {
        next += 1;
    }
    if data.get(next) == Some(&b'\n') {
        next += 1;
    }
    (line, next)
}

fn parse_stream_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, object)) = parse_indirect_object(&data[offset..]).map_err(|_| Error::ParseError {
        offset,
        reason: "unreadable cross-reference stream".to_string(),
    })?;

    let dict = object.as_dict().ok_or(Error::InvalidXref)?.clone();
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(Error::InvalidXref);
    }
    let decoded = object.decode_stream_data()?;

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| w.iter().filter_map(Object::as_integer).map(|v| v.max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 {
        return Err(Error::InvalidPdf("cross-reference stream /W must have 3 entries".to_string()));
    }
    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0).max(0) as u32;
    let ranges: Vec<(u32, u32)> = match dict.get("Index").and_then(Object::as_array) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| Some((pair[0].as_integer()? as u32, pair[1].as_integer()? as u32)))
            .collect(),
        None => vec![(0, size)],
    };

    let entry_len: usize = widths.iter().sum();
    if entry_len == 0 {
        return Err(Error::InvalidPdf("cross-reference stream has zero-width entries".to_string()));
    }
    let mut rows = decoded.chunks_exact(entry_len);
    let mut table = CrossRefTable::new();

    for (first, count) in ranges {
        for id in first..first.saturating_add(count) {
            let row = match rows.next() {
                Some(row) => row,
                None => break,
            };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1.
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::InFile {
                    offset: read_be(f2) as usize,
                    gen: read_be(f3) as u16,
                },
                2 => XRefEntry::InStream {
                    stream_id: read_be(f2) as u32,
                    index: read_be(f3) as u32,
                },
                other => {
                    log::debug!("Skipping xref stream entry of unknown type {}", other);
                    continue;
                },
            };
            table.add_if_absent(id, entry);
        }
    }

    table.trailer = dict;
    table.trailer.remove("Length");
    table.trailer.remove("Filter");
    table.trailer.remove("DecodeParms");
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\nxref\n0 2\n0000000000 65535 f \n0000000009 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n45\n%%EOF\n";

    #[test]
    fn test_find_startxref() {
        assert_eq!(find_startxref(CLASSIC).unwrap(), 45);
        assert!(matches!(find_startxref(b"%PDF-1.4\nno xref"), Err(Error::InvalidXref)));
    }

    #[test]
    fn test_parse_classic_table() {
        let table = parse_xref(CLASSIC, 45).unwrap();
        assert_eq!(table.get(0), Some(&XRefEntry::Free));
        assert_eq!(table.get(1), Some(&XRefEntry::InFile { offset: 9, gen: 0 }));
        assert_eq!(table.trailer()["Size"].as_integer(), Some(2));
        assert_eq!(table.max_object_id(), 1);
    }

    #[test]
    fn test_prev_chain_newest_wins() {
        let mut data = CLASSIC.to_vec();
        let update_offset = data.len();
        data.extend_from_slice(
            b"xref\n1 1\n0000000100 00000 n \n5 1\n0000000200 00000 n \ntrailer\n<< /Size 6 /Root 1 0 R /Prev 45 >>\nstartxref\n",
        );
        data.extend_from_slice(format!("{}\n%%EOF\n", update_offset).as_bytes());

        let offset = find_startxref(&data).unwrap();
        assert_eq!(offset, update_offset);
        let table = parse_xref(&data, offset).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InFile { offset: 100, gen: 0 }));
        assert_eq!(table.get(5), Some(&XRefEntry::InFile { offset: 200, gen: 0 }));
        assert_eq!(table.get(0), Some(&XRefEntry::Free));
        assert_eq!(table.trailer()["Size"].as_integer(), Some(6));
        assert!(table.trailer().get("Prev").is_none());
    }

    #[test]
    fn test_self_referencing_prev_is_rejected() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        assert!(parse_xref(data, 0).is_err());
    }

    #[test]
    fn test_parse_xref_stream() {
        // Entries: obj 0 free, obj 1 at offset 15, obj 2 in stream 3 index 0.
        let rows: Vec<u8> = vec![0, 0, 0, 1, 0, 15, 2, 0, 3];
        let mut data = b"7 0 obj\n<< /Type /XRef /W [1 1 1] /Size 3 /Root 1 0 R /Length 9 >>\nstream\n".to_vec();
        data.extend_from_slice(&rows);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let table = parse_xref(&data, 0).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InFile { offset: 15, gen: 0 }));
        assert_eq!(table.get(2), Some(&XRefEntry::InStream { stream_id: 3, index: 0 }));
        assert!(table.trailer().contains_key("Root"));
        assert!(!table.trailer().contains_key("Length"));
    }
}
