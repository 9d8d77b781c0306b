//! Standard MIDI File container parsing.
//!
//! Splits an SMF into its header fields and raw per-track byte buffers.
//! Track events are decoded later by the [`EventParser`](crate::EventParser).

use std::io::Cursor;

use binrw::BinRead;
use tracing::debug;

use crate::FormatError;

/// Size of `MThd` including its length field and body.
pub(crate) const SMF_HEADER_SIZE: usize = 14;
/// Size of an `MTrk` chunk header.
const TRACK_HEADER_SIZE: usize = 8;

#[derive(BinRead, Debug)]
#[br(big, magic = b"MThd")]
struct SmfHeader {
    length: u32,
    format: u16,
    track_count: u16,
    division: u16,
}

#[derive(BinRead, Debug)]
#[br(big, magic = b"MTrk")]
struct TrackChunkHeader {
    length: u32,
}

/// A parsed SMF container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmfData {
    /// SMF format 0, 1 or 2
    pub format: u16,
    /// Ticks per quarter note
    pub division: u16,
    /// Raw event bytes of each `MTrk` chunk
    pub tracks: Vec<Vec<u8>>,
}

/// Parse the `MThd` header and every `MTrk` chunk.
pub fn parse_smf(data: &[u8]) -> Result<SmfData, FormatError> {
    if data.len() < SMF_HEADER_SIZE {
        return Err(FormatError::InvalidHeader(
            "MIDI file is too short to hold a header",
        ));
    }

    let mut cursor = Cursor::new(data);
    let header = SmfHeader::read(&mut cursor).map_err(|e| map_binrw_error(e, "MThd"))?;
    if header.length != 6 {
        return Err(FormatError::InvalidHeader("MThd chunk length is not 6"));
    }
    if header.division == 0 {
        return Err(FormatError::InvalidHeader("MIDI division is zero"));
    }
    let format = if header.format > 2 { 1 } else { header.format };

    let mut tracks = Vec::with_capacity(header.track_count as usize);
    for track in 0..header.track_count as usize {
        let start = cursor.position() as usize;
        if data.len().saturating_sub(start) < TRACK_HEADER_SIZE {
            return Err(FormatError::TruncatedTrack(track));
        }
        let chunk =
            TrackChunkHeader::read(&mut cursor).map_err(|e| map_binrw_error(e, "MTrk"))?;

        let body = start + TRACK_HEADER_SIZE;
        let end = body
            .checked_add(chunk.length as usize)
            .filter(|&end| end <= data.len())
            .ok_or(FormatError::TruncatedTrack(track))?;
        tracks.push(data[body..end].to_vec());
        cursor.set_position(end as u64);
    }

    debug!(
        format,
        division = header.division,
        tracks = tracks.len(),
        "parsed SMF header"
    );

    Ok(SmfData {
        format,
        division: header.division,
        tracks,
    })
}

pub(crate) fn map_binrw_error(err: binrw::Error, expected: &'static str) -> FormatError {
    match err {
        binrw::Error::BadMagic { .. } => FormatError::BadMagic { expected },
        e if e.is_eof() => FormatError::UnexpectedEof,
        e => FormatError::Binary(e.to_string()),
    }
}
