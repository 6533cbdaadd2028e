//! PDF object parser.
//!
//! Recursive descent over lexer tokens: arrays and dictionaries recurse,
//! `N G R` triples become references, and a dictionary followed by the
//! `stream` keyword becomes a stream object.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in a literal string body (ISO 32000-1, 7.3.4.2).
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        if byte != b'\\' || i + 1 >= raw.len() {
            // A bare CR or CRLF inside a literal string reads as LF.
            if byte == b'\r' {
                result.push(b'\n');
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            } else {
                result.push(byte);
            }
            i += 1;
            continue;
        }

        let next = raw[i + 1];
        i += 2;
        match next {
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0C),
            b'(' | b')' | b'\\' => result.push(next),
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            b'0'..=b'7' => {
                let mut code = (next - b'0') as u32;
                let mut digits = 1;
                while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                    code = code * 8 + (raw[i] - b'0') as u32;
                    i += 1;
                    digits += 1;
                }
                result.push((code & 0xFF) as u8);
            },
            other => result.push(other),
        }
    }

    result
}

/// Decode a hex string body to bytes; whitespace is ignored and an odd
/// trailing digit is padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let nibble = |c: u8| -> Result<u8> {
        (c as char)
            .to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: format!("Invalid hex digit: {:?}", c as char),
            })
    };

    digits
        .chunks(2)
        .map(|chunk| {
            let high = nibble(chunk[0])?;
            let low = match chunk.get(1) {
                Some(&c) => nibble(c)?,
                None => 0,
            };
            Ok(high << 4 | low)
        })
        .collect()
}

fn fail(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
}

/// Parse a single PDF object.
///
/// ```
/// use stamp_signer::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /Type /Sig /ByteRange [0 10 20 30] >>").unwrap();
/// assert_eq!(obj.as_dict().unwrap()["Type"].as_name(), Some("Sig"));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Integer(i) => {
            if let Ok((after_gen, Token::Integer(gen))) = token(input) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if i >= 0 && (0..=u16::MAX as i64).contains(&gen) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(i as u32, gen as u16))));
                    }
                }
            }
            Ok((input, Object::Integer(i)))
        },
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::LiteralString(raw) => Ok((input, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::HexDigit))),
        },
        Token::Name(name) => Ok((input, Object::Name(name))),
        Token::ArrayStart => parse_array(input),
        Token::DictStart => {
            let (remaining, dict) = parse_dictionary(input)?;
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let (rest, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    rest,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }
            Ok((remaining, Object::Dictionary(dict)))
        },
        _ => Err(fail(input)),
    }
}

/// Parse `N G obj <object> endobj`, returning the reference and the object.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = token(input)?;
    let (rest, gen) = token(rest)?;
    let (rest, keyword) = token(rest)?;
    let obj_ref = match (id, gen, keyword) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart) if id >= 0 && gen >= 0 => {
            ObjectRef::new(id as u32, gen as u16)
        },
        _ => return Err(fail(input)),
    };
    let (rest, object) = parse_object(rest)?;
    // A missing endobj is tolerated.
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };
    Ok((rest, (obj_ref, object)))
}

fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length.max(0) as usize;
        if length <= input.len() {
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, input[..length].to_vec()));
            }
        }
        log::debug!("Stream /Length {} does not land on endstream; scanning", length);
    }

    // Indirect or wrong /Length: scan for the keyword and drop the EOL before it.
    let pos = find_keyword(input, b"endstream").ok_or_else(|| fail(input))?;
    let mut data = &input[..pos];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        data = &data[..data.len() - 1];
    }
    Ok((&input[pos + b"endstream".len()..], data.to_vec()))
}

/// Find the first occurrence of a keyword in a byte slice.
pub fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|window| window == keyword)
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(remaining) {
            return Ok((rest, Object::Array(objects)));
        }
        let (rest, obj) = parse_object(remaining)?;
        objects.push(obj);
        remaining = rest;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                // A null value is equivalent to an absent key.
                if !value.is_null() {
                    dict.insert(key, value);
                }
                remaining = rest;
            },
            _ => return Err(fail(remaining)),
        }
    }
}
