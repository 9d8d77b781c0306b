//! Playback settings.

use ms_formats::MUS_DEFAULT_FREQUENCY;
use serde::{Deserialize, Serialize};

/// Sequencer configuration.
///
/// Every field has a default, so partial config files are accepted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Honor loop points and loop the song
    pub loop_enabled: bool,
    /// Number of passes through the loop; -1 loops forever
    pub loops_count: i32,
    /// Fire loop hooks but never jump
    pub loop_hooks_only: bool,
    /// Playback speed factor
    pub tempo_multiplier: f64,
    /// Silence appended after the last event, in seconds
    pub post_song_wait_delay: f64,
    /// Output rate used by `play_stream`
    pub sample_rate: u32,
    /// Bytes per output frame used by `play_stream`
    pub frame_size: u32,
    /// MUS tick rate in Hz
    pub mus_frequency: u16,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            loop_enabled: true,
            loops_count: -1,
            loop_hooks_only: false,
            tempo_multiplier: 1.0,
            post_song_wait_delay: 1.0,
            sample_rate: 44100,
            frame_size: 2,
            mus_frequency: MUS_DEFAULT_FREQUENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SequencerConfig::default();
        assert!(c.loop_enabled);
        assert_eq!(c.loops_count, -1);
        assert_eq!(c.sample_rate, 44100);
        assert_eq!(c.mus_frequency, 140);
    }

    #[test]
    fn ron_round_trip() {
        let c = SequencerConfig {
            loops_count: 3,
            tempo_multiplier: 1.5,
            ..Default::default()
        };
        let text = ron::to_string(&c).unwrap();
        let back: SequencerConfig = ron::from_str(&text).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn partial_ron_uses_defaults() {
        let c: SequencerConfig =
            ron::from_str("(loop_enabled: false, sample_rate: 48000)").unwrap();
        assert!(!c.loop_enabled);
        assert_eq!(c.sample_rate, 48000);
        assert_eq!(c.loops_count, -1);
        assert_eq!(c.post_song_wait_delay, 1.0);
    }
}
