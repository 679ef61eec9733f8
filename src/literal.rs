//! Decoding of string and numeric literals, and the inverse C-style escaper.

use thiserror::Error;

/// Largest valid message field number.
pub const MAX_FIELD_NUMBER: i64 = 536_870_911;
/// Field numbers reserved for the protobuf implementation itself.
pub const IMPLEMENTATION_RESERVED: std::ops::RangeInclusive<i64> = 19_000..=19_999;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiteralError {
    #[error("string literal is not terminated")]
    Unterminated,
    #[error("'{0}' is not a string literal")]
    NotAString(String),
}

/// The raw bytes of a string literal, plus any non-fatal escape problems.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedString {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Decodes a quoted literal as it appears in source (quotes included).
pub fn unescape(literal: &str) -> Result<DecodedString, LiteralError> {
    let mut chars = literal.chars();
    let quote = match chars.next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Err(LiteralError::NotAString(literal.to_string())),
    };
    if literal.len() < 2 || !ends_with_closing_quote(literal, quote) {
        return Err(LiteralError::Unterminated);
    }
    let body: Vec<char> = literal[1..literal.len() - 1].chars().collect();
    let mut out = DecodedString::default();
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        i += 1;
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(&escape) = body.get(i) else {
            out.warnings.push("dangling '\\' at end of string".to_string());
            out.bytes.push(b'\\');
            break;
        };
        i += 1;
        match escape {
            'a' => out.bytes.push(0x07),
            'b' => out.bytes.push(0x08),
            'f' => out.bytes.push(0x0c),
            'n' => out.bytes.push(b'\n'),
            'r' => out.bytes.push(b'\r'),
            't' => out.bytes.push(b'\t'),
            'v' => out.bytes.push(0x0b),
            '\\' | '\'' | '"' | '?' => out.bytes.push(escape as u8),
            '0'..='7' => {
                let mut value = escape.to_digit(8).unwrap_or(0);
                let mut taken = 1;
                while taken < 3 {
                    match body.get(i).and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            taken += 1;
                        }
                        None => break,
                    }
                }
                if value > 0xff {
                    out.warnings.push(format!("octal escape \\{:o} is out of range", value));
                }
                out.bytes.push((value & 0xff) as u8);
            }
            'x' | 'X' => {
                let digits = take_hex(&body, &mut i, 2);
                match digits {
                    Some(value) => out.bytes.push(value as u8),
                    None => {
                        out.warnings.push("'\\x' escape without hex digits".to_string());
                        out.bytes.extend_from_slice(b"\\x");
                    }
                }
            }
            'u' | 'U' => {
                let width = if escape == 'u' { 4 } else { 8 };
                let start = i;
                let code = take_hex(&body, &mut i, width).filter(|_| i - start == width);
                match code.and_then(char::from_u32) {
                    Some(ch) => {
                        let mut buf = [0u8; 4];
                        out.bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    None => {
                        out.warnings.push(format!("invalid unicode escape '\\{escape}'"));
                        i = start;
                        out.bytes.push(b'\\');
                        out.bytes.push(escape as u8);
                    }
                }
            }
            other => {
                out.warnings.push(format!("unknown escape sequence '\\{other}'"));
                out.bytes.push(b'\\');
                let mut buf = [0u8; 4];
                out.bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    Ok(out)
}

fn ends_with_closing_quote(literal: &str, quote: char) -> bool {
    // A trailing quote is closing only if preceded by an even run of backslashes.
    if !literal.ends_with(quote) {
        return false;
    }
    let body = &literal[1..literal.len() - 1];
    let backslashes = body.chars().rev().take_while(|&c| c == '\\').count();
    backslashes % 2 == 0
}

fn take_hex(body: &[char], i: &mut usize, max: usize) -> Option<u32> {
    let mut value: Option<u32> = None;
    let mut taken = 0;
    while taken < max {
        match body.get(*i).and_then(|d| d.to_digit(16)) {
            Some(d) => {
                value = Some(value.unwrap_or(0).wrapping_mul(16).wrapping_add(d));
                *i += 1;
                taken += 1;
            }
            None => break,
        }
    }
    value
}

/// C-escapes raw bytes so that `unescape` of the quoted result yields them back.
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\'' => out.push_str("\\'"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// Parses an integer literal: decimal, `0x` hex or leading-zero octal, optionally negative.
pub fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()?
    } else if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse::<u64>().ok()?
    } else {
        return None;
    };
    let magnitude = i128::from(magnitude);
    Some(if negative { -magnitude } else { magnitude })
}

/// Parses a floating point literal, including `inf`, `-inf` and `nan`.
pub fn parse_float(text: &str) -> Option<f64> {
    let lower = text.to_ascii_lowercase();
    match lower.as_str() {
        "inf" | "infinity" => return Some(f64::INFINITY),
        "-inf" | "-infinity" => return Some(f64::NEG_INFINITY),
        "nan" | "-nan" => return Some(f64::NAN),
        _ => {}
    }
    if let Some(i) = parse_integer(text) {
        return Some(i as f64);
    }
    let first = lower.trim_start_matches('-').chars().next()?;
    if !(first.is_ascii_digit() || first == '.') {
        return None;
    }
    lower.parse::<f64>().ok()
}

/// Parses a field or range number, accepting the `max` sentinel as `max_value`.
pub fn parse_number_with_max(text: &str, max_value: i64) -> Option<i64> {
    if text == "max" {
        return Some(max_value);
    }
    parse_integer(text).and_then(|v| i64::try_from(v).ok())
}

/// True when the token text looks like the start of a numeric literal.
pub fn is_numeric(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_digit())
        || (body.starts_with('.') && body[1..].starts_with(|c: char| c.is_ascii_digit()))
        || matches!(body, "inf" | "nan" | "infinity")
}

/// True for a single, undotted protobuf identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True for a dotted name such as `foo.Bar` or `.foo.Bar`.
pub fn is_dotted_name(text: &str) -> bool {
    let body = text.strip_prefix('.').unwrap_or(text);
    !body.is_empty() && body.split('.').all(is_identifier)
}
