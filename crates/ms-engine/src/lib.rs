//! Playback engine for the midiseq sequencer.
//!
//! Builds a tempo-mapped timeline from parsed tracks and plays it through a
//! [`MidiOutput`], honoring loop points, nested loops and seeking.

mod config;
mod dispatch;
mod error;
mod loop_state;
mod output;
mod position;
mod sequencer;
mod stream;
pub mod timeline;

pub use config::SequencerConfig;
pub use error::SequencerError;
pub use loop_state::{LoopStackEntry, LoopState};
pub use output::{MidiOutput, NullOutput, SequencerHooks};
pub use position::{Position, TrackCursor};
pub use sequencer::MidiSequencer;
pub use stream::StreamTimer;
pub use timeline::{build_timeline, Timeline};
