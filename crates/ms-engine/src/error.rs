//! Error type for loading songs into the sequencer.

use ms_formats::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// The container or header could not be parsed
    #[error(transparent)]
    Format(#[from] FormatError),
    /// A track's event data is malformed
    #[error("track {track}: {message}")]
    TrackData { track: usize, message: String },
}
