//! Core IR types for the midiseq sequencer.
//!
//! This crate defines the event and track model shared by the format
//! parsers and the playback engine. Parsers emit `MidiEvent`s grouped into
//! `MidiTrackRow`s, the timeline builder stamps rows with wall-clock times,
//! and the engine walks those rows.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod fraction;
mod marker;
mod track;

pub use event::{EventCategory, MetaKind, MidiEvent};
pub use fraction::MidiFraction;
pub use marker::MarkerEntry;
pub use track::{MidiTrackRow, NoteStates};
