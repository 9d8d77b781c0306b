//! DMX MUS to Standard MIDI File conversion.
//!
//! MUS is the compact music format used by id Software's DMX sound
//! library. The converter emits a single-track format 0 SMF that is then
//! parsed like any other MIDI file.

use std::io::Cursor;

use arrayvec::ArrayVec;
use binrw::BinRead;
use tracing::{debug, trace};

use crate::reader::TrackReader;
use crate::smf::map_binrw_error;
use crate::writer::MidiWriter;
use crate::FormatError;

/// Default MUS playback rate in ticks per second.
pub const MUS_DEFAULT_FREQUENCY: u16 = 140;

const MUS_HEADER_SIZE: usize = 14;
const MUS_MAX_CHANNELS: u16 = 15;
const MUS_PERCUSSION_CHANNEL: usize = 15;
const MIDI_PERCUSSION_CHANNEL: u8 = 9;

/// Ticks per quarter note of the emitted SMF.
const MUS_DIVISION: u16 = 0x0059;
/// Tempo of the emitted SMF, 0x09A31A microseconds per quarter note.
const MUS_TEMPO: [u8; 3] = [0x09, 0xA3, 0x1A];

const MUS_DEFAULT_VELOCITY: u8 = 0x7F;

/// Largest delta time a four-byte SMF variable-length quantity can hold.
const MAX_SMF_DELAY: u64 = 0x0FFF_FFFF;

/// MUS controller number to MIDI controller number.
///
/// Index 0 is the program change and never looked up here.
const MUS_CONTROLLER_MAP: [u8; 15] = [
    0x00, 0x00, 0x01, 0x07, 0x0A, 0x0B, 0x5B, 0x5D, 0x40, 0x43, 0x78, 0x7B, 0x7E, 0x7F, 0x79,
];

#[derive(BinRead, Debug)]
#[br(little, magic = b"MUS\x1A")]
struct MusHeader {
    score_len: u16,
    score_start: u16,
    channels: u16,
    #[allow(dead_code)]
    sec_channels: u16,
    #[allow(dead_code)]
    instr_count: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MusEventKind {
    ReleaseKey,
    PressKey,
    PitchWheel,
    SystemEvent,
    Controller,
    MeasureEnd,
    ScoreEnd,
}

impl MusEventKind {
    fn from_descriptor(descriptor: u8) -> Option<Self> {
        Some(match (descriptor >> 4) & 0x07 {
            0 => MusEventKind::ReleaseKey,
            1 => MusEventKind::PressKey,
            2 => MusEventKind::PitchWheel,
            3 => MusEventKind::SystemEvent,
            4 => MusEventKind::Controller,
            5 => MusEventKind::MeasureEnd,
            6 => MusEventKind::ScoreEnd,
            _ => return None,
        })
    }
}

/// Whether the buffer starts with the MUS magic.
pub fn is_mus(data: &[u8]) -> bool {
    data.starts_with(b"MUS\x1A")
}

/// Convert a MUS lump to SMF bytes.
///
/// `frequency` is the MUS tick rate; delays are scaled by
/// `140 / frequency` so that the fixed SMF tempo plays at that rate.
pub fn convert_mus_to_midi(data: &[u8], frequency: u16) -> Result<Vec<u8>, FormatError> {
    if data.len() < MUS_HEADER_SIZE {
        return Err(FormatError::InvalidHeader("MUS file is too short"));
    }
    let header =
        MusHeader::read(&mut Cursor::new(data)).map_err(|e| map_binrw_error(e, "MUS\\x1A"))?;

    let score_start = header.score_start as usize;
    let score_end = score_start + header.score_len as usize;
    if data.len() < score_end {
        return Err(FormatError::InvalidHeader(
            "MUS score extends past end of file",
        ));
    }
    if header.channels > MUS_MAX_CHANNELS {
        return Err(FormatError::TooManyChannels(header.channels));
    }
    let frequency = if frequency == 0 {
        MUS_DEFAULT_FREQUENCY
    } else {
        frequency
    };

    let mut out = MidiWriter::new();
    out.write_header(0, 1, MUS_DIVISION);
    let track_len_pos = out.begin_track();
    out.write_bytes(&[0x00, 0xFF, 0x51, 0x03]);
    out.write_bytes(&MUS_TEMPO);
    // Percussion starts at full volume
    out.write_bytes(&[0x00, 0xB0 | MIDI_PERCUSSION_CHANNEL, 0x07, 0x7F]);

    let mut converter = MusConverter::new();
    let mut score = TrackReader::new(&data[score_start..score_end]);
    let mut pending_delay = 0u64;
    let mut ended = false;

    while !score.is_at_end() {
        let offset = score_start + score.position();
        let descriptor = score.read_u8()?;
        let kind = MusEventKind::from_descriptor(descriptor)
            .ok_or(FormatError::InvalidMusEvent { offset })?;
        let channel = (descriptor & 0x0F) as usize;

        let mut event: ArrayVec<u8, 8> = ArrayVec::new();
        match kind {
            // Bar lines carry no sound, only their delay is kept
            MusEventKind::MeasureEnd => {}
            MusEventKind::ScoreEnd => {
                out.write_var_len(pending_delay);
                out.write_bytes(&[0xFF, 0x2F, 0x00]);
                ended = true;
                break;
            }
            _ => {
                let midi_channel = converter.map_channel(channel, &mut event, offset)?;
                converter.encode(kind, channel, midi_channel, &mut score, &mut event, offset)?;
            }
        }

        if !event.is_empty() {
            out.write_var_len(pending_delay);
            out.write_bytes(&event);
            pending_delay = 0;
        }

        if descriptor & 0x80 != 0 {
            let raw = read_mus_delay(&mut score)?;
            pending_delay = raw
                .checked_mul(MUS_DEFAULT_FREQUENCY as u64)
                .map(|scaled| scaled / frequency as u64)
                .and_then(|scaled| scaled.checked_add(pending_delay))
                .filter(|&delay| delay <= MAX_SMF_DELAY)
                .ok_or_else(|| {
                    FormatError::Parse(format!("MUS delay at offset {offset} is too long"))
                })?;
        }
    }

    if !ended {
        trace!("MUS score has no end event, closing track");
        out.write_var_len(pending_delay);
        out.write_bytes(&[0xFF, 0x2F, 0x00]);
    }
    out.end_track(track_len_pos);

    debug!(
        channels = header.channels,
        score_len = header.score_len,
        midi_len = out.len(),
        "converted MUS to MIDI"
    );
    Ok(out.into_bytes())
}

/// MUS delays use 7-bit groups, most significant first, like an SMF
/// variable-length quantity.
fn read_mus_delay(score: &mut TrackReader<'_>) -> Result<u64, FormatError> {
    score.read_var_len()
}

struct MusConverter {
    /// MUS channel to MIDI channel, assigned on first use
    channel_map: [Option<u8>; 16],
    next_channel: u8,
    /// Last key-on velocity per MIDI channel
    velocity: [u8; 16],
}

impl MusConverter {
    fn new() -> Self {
        let mut channel_map = [None; 16];
        channel_map[MUS_PERCUSSION_CHANNEL] = Some(MIDI_PERCUSSION_CHANNEL);
        Self {
            channel_map,
            next_channel: 0,
            velocity: [MUS_DEFAULT_VELOCITY; 16],
        }
    }

    /// Resolve the MIDI channel, emitting a volume reset the first time a
    /// MUS channel is seen.
    fn map_channel(
        &mut self,
        channel: usize,
        event: &mut ArrayVec<u8, 8>,
        offset: usize,
    ) -> Result<u8, FormatError> {
        if let Some(mapped) = self.channel_map[channel] {
            return Ok(mapped);
        }
        if self.next_channel > 15 {
            return Err(FormatError::InvalidMusEvent { offset });
        }
        let mapped = self.next_channel;
        self.channel_map[channel] = Some(mapped);
        self.next_channel += 1;
        if self.next_channel == MIDI_PERCUSSION_CHANNEL {
            self.next_channel += 1;
        }
        // Volume reset, then a zero delay before the real event
        event.extend([0xB0 | mapped, 0x07, 0x7F, 0x00]);
        Ok(mapped)
    }

    fn encode(
        &mut self,
        kind: MusEventKind,
        channel: usize,
        midi_channel: u8,
        score: &mut TrackReader<'_>,
        event: &mut ArrayVec<u8, 8>,
        offset: usize,
    ) -> Result<(), FormatError> {
        let ch = midi_channel;
        match kind {
            MusEventKind::ReleaseKey => {
                let key = score.read_u8()? & 0x7F;
                event.extend([0x80 | ch, key, 0x7F]);
            }
            MusEventKind::PressKey => {
                let key = score.read_u8()?;
                if key & 0x80 != 0 {
                    self.velocity[ch as usize] = score.read_u8()? & 0x7F;
                }
                event.extend([0x90 | ch, key & 0x7F, self.velocity[ch as usize]]);
            }
            MusEventKind::PitchWheel => {
                let bend = score.read_u8()?;
                event.extend([0xE0 | ch, (bend & 1) << 6, bend >> 1]);
            }
            MusEventKind::SystemEvent => {
                let controller = score.read_u8()? as usize;
                let mapped = *MUS_CONTROLLER_MAP
                    .get(controller)
                    .ok_or(FormatError::InvalidMusEvent { offset })?;
                event.extend([0xB0 | ch, mapped, 0x7F]);
            }
            MusEventKind::Controller => {
                let controller = score.read_u8()? as usize;
                let value = score.read_u8()? & 0x7F;
                if controller == 0 {
                    event.extend([0xC0 | ch, value]);
                } else {
                    let mapped = *MUS_CONTROLLER_MAP
                        .get(controller)
                        .ok_or(FormatError::InvalidMusEvent { offset })?;
                    event.extend([0xB0 | ch, mapped, value]);
                }
            }
            MusEventKind::MeasureEnd | MusEventKind::ScoreEnd => {}
        }
        trace!(mus_channel = channel, midi_channel = ch, ?kind, "MUS event");
        Ok(())
    }
}
