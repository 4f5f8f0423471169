//! Trailer codec
//!
//! Wire layout, big endian:
//!
//! ```text
//! magic(4) | pid(4) | cmd_len(1) | cmd(cmd_len) | args_len(2) | args(args_len)
//! ```
//!
//! The record is self-describing: its total size is `11 + cmd_len + args_len`.

use super::error::FormatError;
use super::types::{MAGIC, ProcessRecord};

/// Size of the fixed fields (magic, pid and both length prefixes).
pub const FIXED_LEN: usize = 4 + 4 + 1 + 2;
pub const MAX_COMMAND_LEN: usize = u8::MAX as usize;
pub const MAX_ARGUMENTS_LEN: usize = u16::MAX as usize;

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn clamp_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Number of bytes `encode` will produce for this record.
pub fn encoded_len(record: &ProcessRecord) -> usize {
    FIXED_LEN
        + clamp_str(&record.command, MAX_COMMAND_LEN).len()
        + clamp_str(&record.arguments, MAX_ARGUMENTS_LEN).len()
}

/// Serialize a record into trailer bytes.
///
/// Oversized strings are cut to the largest prefix that fits the length field,
/// never splitting a UTF-8 sequence. Losing metadata beats losing the packet.
pub fn encode(record: &ProcessRecord) -> Vec<u8> {
    let command = clamp_str(&record.command, MAX_COMMAND_LEN);
    let arguments = clamp_str(&record.arguments, MAX_ARGUMENTS_LEN);

    if command.len() < record.command.len() {
        log::debug!(
            "Truncated command for pid {} from {} to {} bytes",
            record.pid,
            record.command.len(),
            command.len()
        );
    }
    if arguments.len() < record.arguments.len() {
        log::debug!(
            "Truncated arguments for pid {} from {} to {} bytes",
            record.pid,
            record.arguments.len(),
            arguments.len()
        );
    }

    let mut out = Vec::with_capacity(FIXED_LEN + command.len() + arguments.len());
    out.extend_from_slice(&record.magic.to_be_bytes());
    out.extend_from_slice(&record.pid.to_be_bytes());
    out.push(command.len() as u8);
    out.extend_from_slice(command.as_bytes());
    out.extend_from_slice(&(arguments.len() as u16).to_be_bytes());
    out.extend_from_slice(arguments.as_bytes());
    out
}

/// Small cursor over the input so each field read reports what was short.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], FormatError> {
        let available = self.data.len() - self.pos;
        if available < len {
            return Err(FormatError::Truncated {
                what,
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, FormatError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, FormatError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, FormatError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse a trailer from the start of `data`.
///
/// Returns the record and the number of bytes it occupied; anything after that
/// (such as the zeroed FCS placeholder) is left untouched.
pub fn decode(data: &[u8]) -> Result<(ProcessRecord, usize), FormatError> {
    let mut r = Reader { data, pos: 0 };

    let magic = r.u32("magic")?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic {
            expected: MAGIC,
            found: magic,
        });
    }
    let pid = r.u32("pid")?;
    let cmd_len = r.u8("command length")? as usize;
    let command = String::from_utf8_lossy(r.take(cmd_len, "command")?).into_owned();
    let args_len = r.u16("arguments length")? as usize;
    let arguments = String::from_utf8_lossy(r.take(args_len, "arguments")?).into_owned();

    Ok((
        ProcessRecord {
            magic,
            pid,
            command,
            arguments,
        },
        r.pos,
    ))
}
