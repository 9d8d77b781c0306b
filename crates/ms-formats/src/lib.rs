//! Format parsers for the midiseq sequencer.
//!
//! Parses Standard MIDI Files, DMX MUS lumps and RIFF RMID wrappers into
//! raw per-track byte buffers, and decodes track events into the IR.

mod event_parser;
mod mus;
pub mod reader;
mod rmid;
mod smf;
mod writer;

pub use event_parser::{EventParser, LoopFormat, SongMetadata};
pub use mus::{convert_mus_to_midi, is_mus, MUS_DEFAULT_FREQUENCY};
pub use reader::{read_int_be, read_int_le, TrackReader};
pub use rmid::{is_rmid, unwrap_rmid};
pub use smf::{parse_smf, SmfData};
pub use writer::MidiWriter;

use tracing::debug;

/// Error type for format parsing.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Unexpected end of file
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// Invalid or inconsistent file header
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),
    #[error("bad magic, expected {expected}")]
    BadMagic { expected: &'static str },
    /// Input is not any supported music format
    #[error("unsupported music format")]
    UnsupportedFormat,
    #[error("MUS file uses {0} channels, at most 15 are allowed")]
    TooManyChannels(u16),
    #[error("invalid MUS event at offset {offset}")]
    InvalidMusEvent { offset: usize },
    #[error("track {0} extends past end of file")]
    TruncatedTrack(usize),
    /// Malformed track event data
    #[error("{0}")]
    Parse(String),
    /// Low-level binary decoding failure
    #[error("binary read error: {0}")]
    Binary(String),
}

/// Container format a song was loaded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Midi,
    Mus,
    Rmid,
}

/// Sniff the container format from the leading bytes.
pub fn detect_format(data: &[u8]) -> Option<SourceFormat> {
    if data.starts_with(b"MThd") {
        Some(SourceFormat::Midi)
    } else if is_mus(data) {
        Some(SourceFormat::Mus)
    } else if is_rmid(data) {
        Some(SourceFormat::Rmid)
    } else {
        None
    }
}

/// Load any supported music file into SMF form.
///
/// MUS data is converted at `mus_frequency` ticks per second.
pub fn load_music(data: &[u8], mus_frequency: u16) -> Result<(SmfData, SourceFormat), FormatError> {
    let format = match detect_format(data) {
        Some(format) => format,
        None if data.len() < 4 => return Err(FormatError::UnexpectedEof),
        None => return Err(FormatError::UnsupportedFormat),
    };
    debug!(?format, bytes = data.len(), "loading music");

    let smf = match format {
        SourceFormat::Midi => parse_smf(data)?,
        SourceFormat::Mus => parse_smf(&convert_mus_to_midi(data, mus_frequency)?)?,
        SourceFormat::Rmid => parse_smf(unwrap_rmid(data)?)?,
    };
    Ok((smf, format))
}
