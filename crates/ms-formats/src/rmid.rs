//! RIFF RMID container support.
//!
//! An RMID file is a RIFF form of type `RMID` whose `data` chunk holds a
//! plain Standard MIDI File.

use std::io::Cursor;

use binrw::BinRead;

use crate::smf::map_binrw_error;
use crate::FormatError;

#[derive(BinRead, Debug)]
#[br(little, magic = b"RIFF")]
struct RiffHeader {
    #[allow(dead_code)]
    size: u32,
    form: [u8; 4],
}

#[derive(BinRead, Debug)]
#[br(little)]
struct ChunkHeader {
    id: [u8; 4],
    size: u32,
}

const RIFF_HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;

/// Whether the buffer is a RIFF RMID file.
pub fn is_rmid(data: &[u8]) -> bool {
    data.len() >= RIFF_HEADER_SIZE && &data[..4] == b"RIFF" && &data[8..12] == b"RMID"
}

/// Return the embedded SMF bytes of an RMID file.
pub fn unwrap_rmid(data: &[u8]) -> Result<&[u8], FormatError> {
    if data.len() < RIFF_HEADER_SIZE {
        return Err(FormatError::InvalidHeader("RIFF file is too short"));
    }
    let mut cursor = Cursor::new(data);
    let header = RiffHeader::read(&mut cursor).map_err(|e| map_binrw_error(e, "RIFF"))?;
    if &header.form != b"RMID" {
        return Err(FormatError::BadMagic { expected: "RMID" });
    }

    let mut pos = RIFF_HEADER_SIZE;
    while data.len().saturating_sub(pos) >= CHUNK_HEADER_SIZE {
        cursor.set_position(pos as u64);
        let chunk = ChunkHeader::read(&mut cursor).map_err(|e| map_binrw_error(e, "chunk"))?;
        let body = pos + CHUNK_HEADER_SIZE;
        let end = body + chunk.size as usize;
        if &chunk.id == b"data" {
            return data.get(body..end).ok_or(FormatError::UnexpectedEof);
        }
        // Chunks are padded to even sizes
        pos = end + (chunk.size as usize & 1);
    }
    Err(FormatError::InvalidHeader("RMID file has no data chunk"))
}
