//! Result-set wire format.
//!
//! A result is a sequence of lines, each terminated by `\n`. The first line
//! holds the column names, every following line one row. Fields inside a
//! line are joined by `|`. A field is either the null marker `0.` or
//! `<n+1>.<n raw bytes>!`, so the length prefix alone delimits the payload
//! and nothing inside it is escaped.

use std::collections::TryReserveError;

use crate::buffer::ResultBuffer;
use crate::error::DecodeError;

pub const NULL_MARKER: &[u8] = b"0.";
pub const FIELD_SEPARATOR: u8 = b'|';
pub const LINE_TERMINATOR: u8 = b'\n';
const LENGTH_TERMINATOR: u8 = b'.';
const VALUE_SENTINEL: u8 = b'!';
const MAX_PREFIX_DIGITS: usize = 20;

/// One decoded field: `None` is SQL NULL.
pub type Field = Option<Vec<u8>>;

/// Appends one nullable text value using the length-prefixed encoding.
pub fn encode_scalar(buf: &mut ResultBuffer, value: Option<&[u8]>) -> Result<(), TryReserveError> {
    match value {
        None => buf.push_bytes(NULL_MARKER),
        Some(bytes) => {
            buf.push_decimal(bytes.len() + 1)?;
            buf.push_byte(LENGTH_TERMINATOR)?;
            buf.push_bytes(bytes)?;
            buf.push_byte(VALUE_SENTINEL)
        }
    }
}

/// Writes one header or row line, inserting separators between fields.
pub struct LineWriter<'a> {
    buf: &'a mut ResultBuffer,
    fields: usize,
}

impl<'a> LineWriter<'a> {
    pub fn new(buf: &'a mut ResultBuffer) -> Self {
        Self { buf, fields: 0 }
    }

    pub fn field(&mut self, value: Option<&[u8]>) -> Result<(), TryReserveError> {
        if self.fields > 0 {
            self.buf.push_byte(FIELD_SEPARATOR)?;
        }
        self.fields += 1;
        encode_scalar(self.buf, value)
    }

    /// Terminates the line. An empty line is just `\n`.
    pub fn finish(self) -> Result<(), TryReserveError> {
        self.buf.push_byte(LINE_TERMINATOR)
    }
}

/// A decoded result: header plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<Field>,
    pub rows: Vec<Vec<Field>>,
}

impl ResultSet {
    /// Column names as text; a null name becomes an empty string.
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                c.as_deref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&[u8]> {
        self.rows.get(row)?.get(column)?.as_deref()
    }

    pub fn text(&self, row: usize, column: usize) -> Option<String> {
        self.value(row, column)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// Reads a complete wire-format result back into a [`ResultSet`].
pub fn decode(input: &[u8]) -> Result<ResultSet, DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut reader = Reader { input, pos: 0 };
    let columns = reader.read_line()?;
    let mut rows = Vec::new();
    while !reader.at_end() {
        let row = reader.read_line()?;
        if row.len() != columns.len() {
            return Err(DecodeError::FieldCount {
                row: rows.len(),
                expected: columns.len(),
                found: row.len(),
            });
        }
        rows.push(row);
    }
    Ok(ResultSet { columns, rows })
}

/// Reads a single encoded value from the front of `input`, returning it and
/// the number of bytes consumed.
pub fn decode_scalar(input: &[u8]) -> Result<(Field, usize), DecodeError> {
    let mut reader = Reader { input, pos: 0 };
    let field = reader.read_scalar()?;
    Ok((field, reader.pos))
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn read_line(&mut self) -> Result<Vec<Field>, DecodeError> {
        let mut fields = Vec::new();
        if self.peek() == Some(LINE_TERMINATOR) {
            self.pos += 1;
            return Ok(fields);
        }
        loop {
            fields.push(self.read_scalar()?);
            match self.peek() {
                Some(FIELD_SEPARATOR) => self.pos += 1,
                Some(LINE_TERMINATOR) => {
                    self.pos += 1;
                    return Ok(fields);
                }
                _ => return Err(DecodeError::MissingSeparator(self.pos)),
            }
        }
    }

    fn read_scalar(&mut self) -> Result<Field, DecodeError> {
        let start = self.pos;
        let rest = &self.input[start..];
        let dot = rest
            .iter()
            .take(MAX_PREFIX_DIGITS + 1)
            .position(|&b| b == LENGTH_TERMINATOR)
            .ok_or(DecodeError::MissingDot(start))?;
        let digits = &rest[..dot];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(DecodeError::InvalidLength(start));
        }
        let encoded_len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DecodeError::InvalidLength(start))?;
        self.pos = start + dot + 1;
        if encoded_len == 0 {
            return Ok(None);
        }

        // The encoded length counts the payload plus one, which is exactly
        // the payload plus its sentinel.
        let payload_len = encoded_len - 1;
        let available = self.input.len() - self.pos;
        if available < encoded_len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: encoded_len,
                available,
            });
        }
        let value = self.input[self.pos..self.pos + payload_len].to_vec();
        self.pos += payload_len;
        if self.input[self.pos] != VALUE_SENTINEL {
            return Err(DecodeError::MissingSentinel(self.pos));
        }
        self.pos += 1;
        Ok(Some(value))
    }
}
