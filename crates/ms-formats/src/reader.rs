//! Integer and variable-length quantity readers.

use crate::FormatError;

/// Longest variable-length quantity allowed in track data.
pub const MAX_VAR_LEN_BYTES: usize = 4;

/// Decode up to 8 bytes as a big-endian unsigned integer.
///
/// Bytes past the eighth are ignored.
pub fn read_int_be(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode up to 8 bytes as a little-endian unsigned integer.
pub fn read_int_le(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

// ---------------------------------------------------------------------------
// TrackReader: cursor over one track's bytes
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over a byte slice.
#[derive(Clone, Debug)]
pub struct TrackReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TrackReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Move the cursor back one byte, used for running status.
    pub fn unread(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        if self.pos >= self.data.len() {
            return Err(FormatError::UnexpectedEof);
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a MIDI variable-length quantity of at most four bytes.
    ///
    /// Fails with `UnexpectedEof` if the data ends before a byte without the
    /// continuation bit, leaving the cursor at the end.
    pub fn read_var_len(&mut self) -> Result<u64, FormatError> {
        let mut result = 0u64;
        for _ in 0..MAX_VAR_LEN_BYTES {
            let byte = *self.data.get(self.pos).ok_or(FormatError::UnexpectedEof)?;
            self.pos += 1;
            result = (result << 7) | (byte & 0x7F) as u64;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(FormatError::Parse(format!(
            "variable-length value at offset {} is longer than {} bytes",
            self.pos - MAX_VAR_LEN_BYTES,
            MAX_VAR_LEN_BYTES
        )))
    }
}
