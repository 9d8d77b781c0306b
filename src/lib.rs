//! midiseq: a MIDI sequencing engine.
//!
//! Loads Standard MIDI Files, RIFF RMID wrappers and DMX MUS lumps, builds a
//! tempo-mapped timeline and plays it through a caller-supplied
//! [`MidiOutput`], with loop points, nested loops, seeking and a PCM-clocked
//! streaming mode.
//!
//! ```no_run
//! use midiseq::{MidiSequencer, NullOutput};
//!
//! let data = std::fs::read("song.mid").unwrap();
//! let mut seq = MidiSequencer::new(NullOutput);
//! seq.load_midi(&data).unwrap();
//! while !seq.position_at_end() {
//!     let wait = seq.tick(0.01, 0.001);
//!     # let _ = wait;
//! }
//! ```

pub use ms_engine::{
    build_timeline, LoopStackEntry, LoopState, MidiOutput, MidiSequencer, NullOutput, Position,
    SequencerConfig, SequencerError, SequencerHooks, StreamTimer, Timeline, TrackCursor,
};
pub use ms_formats::{
    convert_mus_to_midi, detect_format, load_music, parse_smf, unwrap_rmid, FormatError,
    LoopFormat, MidiWriter, SmfData, SongMetadata, SourceFormat, MUS_DEFAULT_FREQUENCY,
};
pub use ms_ir::{EventCategory, MarkerEntry, MetaKind, MidiEvent, MidiFraction, MidiTrackRow};
