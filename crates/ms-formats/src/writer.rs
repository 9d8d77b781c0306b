//! Byte writer for emitting Standard MIDI File data.

/// Growth step for the output buffer.
const DST_CHUNK: usize = 8192;

/// Growable big-endian writer with MIDI helpers.
///
/// Used by the MUS converter, and handy for building SMF data in tests.
#[derive(Clone, Debug, Default)]
pub struct MidiWriter {
    buf: Vec<u8>,
}

impl MidiWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DST_CHUNK),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Make room for `n` more bytes, doubling capacity in chunk steps.
    fn ensure(&mut self, n: usize) {
        let free = self.buf.capacity() - self.buf.len();
        if free < n {
            let grow = self.buf.capacity().max(DST_CHUNK).max(n);
            self.buf.reserve_exact(grow);
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.ensure(1);
        self.buf.push(v);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u16_be(&mut self, v: u16) {
        self.write_bytes(&v.to_be_bytes());
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a MIDI variable-length quantity.
    pub fn write_var_len(&mut self, mut value: u64) {
        let mut tmp = [0u8; 10];
        let mut n = 0;
        loop {
            tmp[n] = (value & 0x7F) as u8;
            value >>= 7;
            n += 1;
            if value == 0 {
                break;
            }
        }
        self.ensure(n);
        for i in (0..n).rev() {
            let cont = if i > 0 { 0x80 } else { 0x00 };
            self.buf.push(tmp[i] | cont);
        }
    }

    /// Overwrite a big-endian u32 at `pos`.
    pub fn patch_u32_be(&mut self, pos: usize, v: u32) {
        if let Some(dst) = self.buf.get_mut(pos..pos + 4) {
            dst.copy_from_slice(&v.to_be_bytes());
        }
    }

    /// Write an `MThd` chunk.
    pub fn write_header(&mut self, format: u16, track_count: u16, division: u16) {
        self.write_bytes(b"MThd");
        self.write_u32_be(6);
        self.write_u16_be(format);
        self.write_u16_be(track_count);
        self.write_u16_be(division);
    }

    /// Start an `MTrk` chunk. Pass the returned offset to [`end_track`].
    ///
    /// [`end_track`]: MidiWriter::end_track
    pub fn begin_track(&mut self) -> usize {
        self.write_bytes(b"MTrk");
        let len_pos = self.buf.len();
        self.write_u32_be(0);
        len_pos
    }

    /// Patch the length of the track started at `len_pos`.
    pub fn end_track(&mut self, len_pos: usize) {
        let len = self.buf.len().saturating_sub(len_pos + 4);
        self.patch_u32_be(len_pos, len as u32);
    }

    /// Convenience: a complete SMF with the given raw track bodies.
    pub fn smf(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
        let mut w = MidiWriter::new();
        w.write_header(format, tracks.len() as u16, division);
        for body in tracks {
            let pos = w.begin_track();
            w.write_bytes(body);
            w.end_track(pos);
        }
        w.into_bytes()
    }
}
