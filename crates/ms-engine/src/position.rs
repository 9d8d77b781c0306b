//! Playback cursor over the per-track row lists.

use ms_ir::MidiTrackRow;

/// Cursor into one track's rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackCursor {
    /// Ticks left until the row at `row` is due
    pub delay: u64,
    /// Index of the next row to dispatch
    pub row: usize,
    /// Cleared once the track has played its end-of-track event
    pub active: bool,
}

/// A snapshot of the whole playback position.
///
/// Cheap enough to clone for loop points: it holds one small cursor per
/// track and no event data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Position {
    /// Seconds until the next event is due
    pub wait: f64,
    /// Playback time in seconds from song start
    pub absolute_time_position: f64,
    pub tracks: Vec<TrackCursor>,
}

impl Position {
    /// Position at the first row of every track.
    pub fn at_begin(tracks: &[Vec<MidiTrackRow>]) -> Self {
        Self {
            wait: 0.0,
            absolute_time_position: 0.0,
            tracks: tracks
                .iter()
                .map(|_| TrackCursor {
                    delay: 0,
                    row: 0,
                    active: true,
                })
                .collect(),
        }
    }

    /// Advance every active track by the smallest pending delay.
    ///
    /// Returns the delay consumed, or `None` if no track is active.
    pub fn advance_shortest_delay(&mut self) -> Option<u64> {
        let shortest = self
            .tracks
            .iter()
            .filter(|t| t.active)
            .map(|t| t.delay)
            .min()?;
        for track in self.tracks.iter_mut().filter(|t| t.active) {
            track.delay -= shortest;
        }
        Some(shortest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortest_delay_skips_finished_tracks() {
        let mut pos = Position::at_begin(&[vec![], vec![], vec![]]);
        pos.tracks[0].delay = 30;
        pos.tracks[1].delay = 5;
        pos.tracks[1].active = false;
        pos.tracks[2].delay = 12;

        assert_eq!(pos.advance_shortest_delay(), Some(12));
        assert_eq!(pos.tracks[0].delay, 18);
        assert_eq!(pos.tracks[1].delay, 5);
        assert_eq!(pos.tracks[2].delay, 0);
    }

    #[test]
    fn no_active_tracks() {
        let mut pos = Position::at_begin(&[vec![]]);
        pos.tracks[0].active = false;
        assert_eq!(pos.advance_shortest_delay(), None);
        assert_eq!(Position::default().advance_shortest_delay(), None);
    }
}
