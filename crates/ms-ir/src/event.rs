//! MIDI event types produced by the track parser.

use alloc::vec::Vec;

/// Meta event sub-types.
///
/// Covers the standard `FF xx` meta events, the non-standard `FF E1..E7`
/// loop and callback extensions, and `SongBeginHook` which is only ever
/// synthesized by the timeline builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaKind {
    SequenceNumber,
    Text,
    Copyright,
    TrackTitle,
    InstrumentTitle,
    Lyrics,
    Marker,
    CuePoint,
    DeviceSwitch,
    ChannelPrefix,
    EndTrack,
    TempoChange,
    SmpteOffset,
    TimeSignature,
    KeySignature,
    SequencerSpecific,
    /// Non-standard loop start point
    LoopStart,
    /// Non-standard loop end point
    LoopEnd,
    /// Raw OPL register data, not used by playback
    RawOpl,
    /// Nested loop start; `data[0]` is the loop count, 0 is infinite
    LoopStackBegin,
    /// Nested loop end
    LoopStackEnd,
    /// Leave the innermost nested loop
    LoopStackBreak,
    /// Application callback; `data[0]` is passed to the trigger handler
    CallbackTrigger,
    /// Fired once when playback reaches the first row of track 0
    SongBeginHook,
    /// Any other sub-type byte
    Unknown(u8),
}

impl MetaKind {
    /// Map a meta sub-type byte to its kind.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => MetaKind::SequenceNumber,
            0x01 => MetaKind::Text,
            0x02 => MetaKind::Copyright,
            0x03 => MetaKind::TrackTitle,
            0x04 => MetaKind::InstrumentTitle,
            0x05 => MetaKind::Lyrics,
            0x06 => MetaKind::Marker,
            0x07 => MetaKind::CuePoint,
            0x09 => MetaKind::DeviceSwitch,
            0x20 => MetaKind::ChannelPrefix,
            0x2F => MetaKind::EndTrack,
            0x51 => MetaKind::TempoChange,
            0x54 => MetaKind::SmpteOffset,
            0x58 => MetaKind::TimeSignature,
            0x59 => MetaKind::KeySignature,
            0x7F => MetaKind::SequencerSpecific,
            0xE1 => MetaKind::LoopStart,
            0xE2 => MetaKind::LoopEnd,
            0xE3 => MetaKind::RawOpl,
            0xE4 => MetaKind::LoopStackBegin,
            0xE5 => MetaKind::LoopStackEnd,
            0xE6 => MetaKind::LoopStackBreak,
            0xE7 => MetaKind::CallbackTrigger,
            other => MetaKind::Unknown(other),
        }
    }

    /// Whether this kind drives the loop state machine.
    pub fn is_loop_marker(self) -> bool {
        matches!(
            self,
            MetaKind::LoopStart
                | MetaKind::LoopEnd
                | MetaKind::LoopStackBegin
                | MetaKind::LoopStackEnd
                | MetaKind::LoopStackBreak
        )
    }
}

/// A single decoded track event.
///
/// Channel numbers are 0-15. Sysex payloads keep their leading status byte
/// so they can be forwarded to a device verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    /// Polyphonic key pressure
    NoteTouch {
        channel: u8,
        note: u8,
        pressure: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    PatchChange {
        channel: u8,
        program: u8,
    },
    ChannelAftertouch {
        channel: u8,
        pressure: u8,
    },
    PitchWheel {
        channel: u8,
        lsb: u8,
        msb: u8,
    },
    /// `F0` system exclusive message
    Sysex(Vec<u8>),
    /// `F7` escaped system exclusive message
    Sysex2(Vec<u8>),
    SongSelect(u8),
    SongPositionPointer {
        lsb: u8,
        msb: u8,
    },
    /// A system status byte with no playback meaning
    System(u8),
    Meta {
        kind: MetaKind,
        data: Vec<u8>,
        /// Absolute tick position, only filled in for tempo changes
        abs_position: u64,
    },
}

/// Sorting bucket used to order events that share a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventCategory {
    SysEx,
    NoteOff,
    Meta,
    Controller,
    Other,
}

impl MidiEvent {
    /// Create a meta event with no absolute position.
    pub fn meta(kind: MetaKind, data: Vec<u8>) -> Self {
        MidiEvent::Meta {
            kind,
            data,
            abs_position: 0,
        }
    }

    /// The synthetic event placed at the start of track 0.
    pub fn song_begin_hook() -> Self {
        Self::meta(MetaKind::SongBeginHook, Vec::new())
    }

    /// Channel of a channel-voice event.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOff { channel, .. }
            | MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteTouch { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PatchChange { channel, .. }
            | MidiEvent::ChannelAftertouch { channel, .. }
            | MidiEvent::PitchWheel { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Meta sub-type, if this is a meta event.
    pub fn meta_kind(&self) -> Option<MetaKind> {
        match self {
            MidiEvent::Meta { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is a meta event of the given kind.
    pub fn is_meta(&self, kind: MetaKind) -> bool {
        self.meta_kind() == Some(kind)
    }

    /// Payload bytes of a meta or sysex event.
    pub fn data(&self) -> &[u8] {
        match self {
            MidiEvent::Meta { data, .. } | MidiEvent::Sysex(data) | MidiEvent::Sysex2(data) => {
                data
            }
            _ => &[],
        }
    }

    /// Sorting bucket for same-tick ordering.
    pub fn category(&self) -> EventCategory {
        match self {
            MidiEvent::NoteOff { .. } => EventCategory::NoteOff,
            MidiEvent::Sysex(_) | MidiEvent::Sysex2(_) => EventCategory::SysEx,
            MidiEvent::ControlChange { .. }
            | MidiEvent::PatchChange { .. }
            | MidiEvent::PitchWheel { .. }
            | MidiEvent::ChannelAftertouch { .. } => EventCategory::Controller,
            MidiEvent::Meta { kind, .. } => match kind {
                MetaKind::Marker
                | MetaKind::DeviceSwitch
                | MetaKind::SongBeginHook
                | MetaKind::LoopStart
                | MetaKind::LoopEnd
                | MetaKind::LoopStackBegin
                | MetaKind::LoopStackEnd
                | MetaKind::LoopStackBreak => EventCategory::Meta,
                _ => EventCategory::Other,
            },
            _ => EventCategory::Other,
        }
    }
}
