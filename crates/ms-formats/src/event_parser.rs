//! Decoding of individual track events.
//!
//! Handles running status, sysex and meta payloads, and maps the various
//! loop conventions found in game music (marker text, CC110/111 and the
//! `FF E1..E7` meta extensions) onto loop meta events.

use ms_ir::{MetaKind, MidiEvent};
use tracing::{debug, trace};

use crate::reader::TrackReader;
use crate::FormatError;

/// Which CC-based loop convention the song appears to follow.
///
/// Detected on the fly from the order in which CC110 and CC111 show up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopFormat {
    /// CC111 marks the loop start
    #[default]
    Default,
    /// HMI style: CC110 starts the loop and CC111 ends it
    Hmi,
    /// Apogee EMIDI: CC110/111 are track designation and loop controls
    Emidi,
}

/// Text metadata gathered while parsing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SongMetadata {
    pub title: String,
    pub copyright: String,
    /// Track-title events after the first one
    pub track_titles: Vec<String>,
    pub instruments: Vec<String>,
}

/// Stateful SMF event decoder.
///
/// One parser is used across all tracks of a song: the loop format and
/// metadata persist, the running status is reset per track.
#[derive(Clone, Debug, Default)]
pub struct EventParser {
    status: u8,
    loop_format: LoopFormat,
    metadata: SongMetadata,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-track state before the first event of a track.
    pub fn begin_track(&mut self) {
        self.status = 0;
    }

    pub fn loop_format(&self) -> LoopFormat {
        self.loop_format
    }

    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> SongMetadata {
        self.metadata
    }

    /// Decode the next event. The delta time must already be consumed.
    pub fn parse_event(&mut self, r: &mut TrackReader<'_>) -> Result<MidiEvent, FormatError> {
        let mut byte = r.read_u8().map_err(|_| {
            FormatError::Parse("can't read event type byte: unexpected end of track data".into())
        })?;

        match byte {
            0xF0 | 0xF7 => return self.parse_sysex(r, byte),
            0xFF => return self.parse_meta(r),
            // Song select
            0xF3 => {
                let song = r.read_u8().map_err(|_| {
                    FormatError::Parse(
                        "can't read song select: unexpected end of track data".into(),
                    )
                })?;
                return Ok(MidiEvent::SongSelect(song));
            }
            // Song position pointer
            0xF2 => {
                let data = r.read_bytes(2).map_err(|_| {
                    FormatError::Parse(
                        "can't read song position: unexpected end of track data".into(),
                    )
                })?;
                return Ok(MidiEvent::SongPositionPointer {
                    lsb: data[0],
                    msb: data[1],
                });
            }
            _ => {}
        }

        // Running status reuses the previous status byte
        if byte < 0x80 {
            byte = self.status | 0x80;
            r.unread();
        }
        self.status = byte;

        let channel = byte & 0x0F;
        match byte >> 4 {
            0x8 | 0x9 | 0xA | 0xB | 0xE => {
                let data = r.read_bytes(2).map_err(|_| {
                    FormatError::Parse(
                        "can't read regular 2-byte event: unexpected end of track data".into(),
                    )
                })?;
                let (a, b) = (data[0], data[1]);
                Ok(match byte >> 4 {
                    0x8 => MidiEvent::NoteOff {
                        channel,
                        note: a,
                        velocity: b,
                    },
                    0x9 if b == 0 => MidiEvent::NoteOff {
                        channel,
                        note: a,
                        velocity: b,
                    },
                    0x9 => MidiEvent::NoteOn {
                        channel,
                        note: a,
                        velocity: b,
                    },
                    0xA => MidiEvent::NoteTouch {
                        channel,
                        note: a,
                        pressure: b,
                    },
                    0xB => self.controller(channel, a, b),
                    _ => MidiEvent::PitchWheel {
                        channel,
                        lsb: a,
                        msb: b,
                    },
                })
            }
            0xC | 0xD => {
                let value = r.read_u8().map_err(|_| {
                    FormatError::Parse(
                        "can't read regular 1-byte event: unexpected end of track data".into(),
                    )
                })?;
                Ok(if byte >> 4 == 0xC {
                    MidiEvent::PatchChange {
                        channel,
                        program: value,
                    }
                } else {
                    MidiEvent::ChannelAftertouch {
                        channel,
                        pressure: value,
                    }
                })
            }
            _ => Ok(MidiEvent::System(byte)),
        }
    }

    fn parse_sysex(
        &mut self,
        r: &mut TrackReader<'_>,
        status: u8,
    ) -> Result<MidiEvent, FormatError> {
        let eof =
            || FormatError::Parse("can't read SysEx event: unexpected end of track data".into());
        let length = r.read_var_len().map_err(|e| eof_or(e, eof))?;
        let payload = r.read_bytes(length as usize).map_err(|_| eof())?;

        let mut data = Vec::with_capacity(payload.len() + 1);
        data.push(status);
        data.extend_from_slice(payload);
        Ok(if status == 0xF0 {
            MidiEvent::Sysex(data)
        } else {
            MidiEvent::Sysex2(data)
        })
    }

    fn parse_meta(&mut self, r: &mut TrackReader<'_>) -> Result<MidiEvent, FormatError> {
        let eof =
            || FormatError::Parse("can't read meta event: unexpected end of track data".into());
        let subtype = r.read_u8().map_err(|_| eof())?;
        let length = r.read_var_len().map_err(|e| eof_or(e, eof))?;
        let data = r.read_bytes(length as usize).map_err(|_| eof())?;
        let kind = MetaKind::from_byte(subtype);

        match kind {
            MetaKind::Copyright => {
                let text = String::from_utf8_lossy(data);
                if self.metadata.copyright.is_empty() {
                    debug!(copyright = %text, "music copyright");
                    self.metadata.copyright = text.into_owned();
                } else {
                    debug!(copyright = %text, "extra copyright event");
                }
            }
            MetaKind::TrackTitle => {
                let text = String::from_utf8_lossy(data);
                if self.metadata.title.is_empty() {
                    debug!(title = %text, "music title");
                    self.metadata.title = text.into_owned();
                } else {
                    debug!(title = %text, "track title");
                    self.metadata.track_titles.push(text.into_owned());
                }
            }
            MetaKind::InstrumentTitle => {
                let text = String::from_utf8_lossy(data);
                debug!(instrument = %text, "instrument");
                self.metadata.instruments.push(text.into_owned());
            }
            MetaKind::Marker => {
                if let Some(event) = loop_marker(data) {
                    trace!(?event, "loop marker");
                    return Ok(event);
                }
            }
            _ => {}
        }

        Ok(MidiEvent::meta(kind, data.to_vec()))
    }

    /// Apply the CC110/111 loop conventions.
    fn controller(&mut self, channel: u8, controller: u8, value: u8) -> MidiEvent {
        let cc = MidiEvent::ControlChange {
            channel,
            controller,
            value,
        };
        match (controller, self.loop_format) {
            (110, LoopFormat::Default) => {
                // HMI uses CC110 as its loop start
                self.loop_format = LoopFormat::Hmi;
                MidiEvent::meta(MetaKind::LoopStart, Vec::new())
            }
            (110, LoopFormat::Hmi) => {
                // A second CC110 means this is really EMIDI
                self.loop_format = LoopFormat::Emidi;
                cc
            }
            (111, LoopFormat::Hmi) => MidiEvent::meta(MetaKind::LoopEnd, Vec::new()),
            (111, LoopFormat::Default) => MidiEvent::meta(MetaKind::LoopStart, Vec::new()),
            // EMIDI loop end is remapped to a volume change
            (113, LoopFormat::Emidi) => MidiEvent::ControlChange {
                channel,
                controller: 7,
                value,
            },
            _ => cc,
        }
    }
}

/// Keep an oversized-length error, replace a plain EOF with the event's message.
fn eof_or(err: FormatError, eof: impl FnOnce() -> FormatError) -> FormatError {
    match err {
        FormatError::UnexpectedEof => eof(),
        other => other,
    }
}

/// Map marker text to a loop event, case-insensitively.
fn loop_marker(text: &[u8]) -> Option<MidiEvent> {
    let lower = text.to_ascii_lowercase();
    if lower == b"loopstart" {
        return Some(MidiEvent::meta(MetaKind::LoopStart, Vec::new()));
    }
    if lower == b"loopend" {
        return Some(MidiEvent::meta(MetaKind::LoopEnd, Vec::new()));
    }
    if let Some(count) = lower.strip_prefix(b"loopstart=") {
        let loops = parse_loop_count(count);
        return Some(MidiEvent::meta(MetaKind::LoopStackBegin, vec![loops]));
    }
    if lower.starts_with(b"loopend=") {
        return Some(MidiEvent::meta(MetaKind::LoopStackEnd, Vec::new()));
    }
    None
}

/// Leading decimal integer, truncated to a byte. Garbage gives 0 (infinite).
fn parse_loop_count(text: &[u8]) -> u8 {
    let text = String::from_utf8_lossy(text);
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.wrapping_mul(10).wrapping_add((d - b'0') as i64)
        });
    let value = if negative { value.wrapping_neg() } else { value };
    value as u8
}
