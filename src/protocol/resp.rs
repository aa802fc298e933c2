use bytes::{Buf, Bytes, BytesMut};
use memchr::memchr;
use std::str;

/// Incremental RESP2 reply parser
///
/// Bytes read from the socket are fed in as they arrive; `parse_next` yields a
/// reply once a complete one is buffered.
pub struct RespParser {
    buffer: BytesMut,
}

/// A server reply
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(Bytes),
    Error(String),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<RespValue>>),
}

/// Type tag of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Status,
    Error,
    Integer,
    String,
    Array,
    Nil,
}

impl RespValue {
    pub fn kind(&self) -> ReplyKind {
        match self {
            RespValue::SimpleString(_) => ReplyKind::Status,
            RespValue::Error(_) => ReplyKind::Error,
            RespValue::Integer(_) => ReplyKind::Integer,
            RespValue::BulkString(Some(_)) => ReplyKind::String,
            RespValue::Array(Some(_)) => ReplyKind::Array,
            RespValue::BulkString(None) | RespValue::Array(None) => ReplyKind::Nil,
        }
    }

    pub fn is_nil(&self) -> bool {
        self.kind() == ReplyKind::Nil
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Server error text, for error replies.
    pub fn error_text(&self) -> Option<&str> {
        match self {
            RespValue::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Payload of a status or bulk reply.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RespValue::SimpleString(b) | RespValue::BulkString(Some(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| str::from_utf8(b).ok())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(Some(items)) => Some(items),
            _ => None,
        }
    }

    /// True for the `+OK` status.
    pub fn is_ok(&self) -> bool {
        matches!(self, RespValue::SimpleString(s) if s.as_ref() == b"OK")
    }
}

impl RespParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// Feed data into the parser
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Drop any partially received reply.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Parse next complete reply, or `Ok(None)` when more bytes are needed
    pub fn parse_next(&mut self) -> Result<Option<RespValue>, String> {
        match parse_value(&self.buffer)? {
            Some((value, consumed)) => {
                self.buffer.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

type Parsed = Result<Option<(RespValue, usize)>, String>;

fn parse_value(buf: &[u8]) -> Parsed {
    if buf.is_empty() {
        return Ok(None);
    }

    match buf[0] {
        b'+' => Ok(line(buf).map(|end| {
            (
                RespValue::SimpleString(Bytes::copy_from_slice(&buf[1..end])),
                end + 2,
            )
        })),
        b'-' => match line(buf) {
            Some(end) => {
                let msg = String::from_utf8_lossy(&buf[1..end]).into_owned();
                Ok(Some((RespValue::Error(msg), end + 2)))
            }
            None => Ok(None),
        },
        b':' => match line(buf) {
            Some(end) => Ok(Some((RespValue::Integer(number(&buf[1..end])?), end + 2))),
            None => Ok(None),
        },
        b'$' => parse_bulk(buf),
        b'*' => parse_array(buf),
        other => Err(format!("Invalid RESP type: {}", other as char)),
    }
}

/// $6\r\nfoobar\r\n or $-1\r\n
fn parse_bulk(buf: &[u8]) -> Parsed {
    let len_end = match line(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let len = number(&buf[1..len_end])?;
    if len < 0 {
        return Ok(Some((RespValue::BulkString(None), len_end + 2)));
    }

    let data_start = len_end + 2;
    let data_end = data_start + len as usize;
    if buf.len() < data_end + 2 {
        return Ok(None);
    }
    if &buf[data_end..data_end + 2] != b"\r\n" {
        return Err("Missing CRLF after bulk string".to_string());
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
    Ok(Some((RespValue::BulkString(Some(data)), data_end + 2)))
}

/// *2\r\n... or *-1\r\n
fn parse_array(buf: &[u8]) -> Parsed {
    let len_end = match line(buf) {
        Some(pos) => pos,
        None => return Ok(None),
    };
    let len = number(&buf[1..len_end])?;
    if len < 0 {
        return Ok(Some((RespValue::Array(None), len_end + 2)));
    }

    let mut elements = Vec::with_capacity((len as usize).min(1024));
    let mut pos = len_end + 2;
    for _ in 0..len {
        match parse_value(&buf[pos..])? {
            Some((value, consumed)) => {
                elements.push(value);
                pos += consumed;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(Some(elements)), pos)))
}

/// Position of the `\r` that ends the first line.
#[inline]
fn line(buf: &[u8]) -> Option<usize> {
    let lf = memchr(b'\n', buf)?;
    if lf > 0 && buf[lf - 1] == b'\r' {
        Some(lf - 1)
    } else {
        None
    }
}

fn number(digits: &[u8]) -> Result<i64, String> {
    let text = str::from_utf8(digits).map_err(|_| "Invalid UTF-8 in length or integer")?;
    text.parse::<i64>()
        .map_err(|_| format!("Invalid integer: {}", text))
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(parts: &[&[u8]]) -> Vec<u8> {
    let size = 16 + parts.iter().map(|p| p.len() + 16).sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    write_command(&mut buf, parts);
    buf
}

/// Append the RESP encoding of `parts` to `buf`.
pub fn write_command(buf: &mut Vec<u8>, parts: &[&[u8]]) {
    let mut num_buf = itoa::Buffer::new();
    buf.push(b'*');
    buf.extend_from_slice(num_buf.format(parts.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    for part in parts {
        buf.push(b'$');
        buf.extend_from_slice(num_buf.format(part.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
}
