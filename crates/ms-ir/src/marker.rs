//! Named markers collected from marker meta events.

use alloc::string::String;

/// A marker label and where it falls in the song.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerEntry {
    pub label: String,
    /// Absolute tick position
    pub pos_ticks: u64,
    /// Position in seconds from song start
    pub pos_time: f64,
}
