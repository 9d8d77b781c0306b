//! Track data and tempo-map construction.
//!
//! Decodes every track into rows of same-tick events, validates the loop
//! markers, then walks the tempo changes to stamp each row with its
//! wall-clock time.

use ms_formats::{
    read_int_be, EventParser, FormatError, LoopFormat, SmfData, SongMetadata, TrackReader,
};
use ms_ir::{MarkerEntry, MetaKind, MidiEvent, MidiFraction, MidiTrackRow, NoteStates};
use tracing::{debug, warn};

use crate::loop_state::{LoopStackEntry, LoopState};
use crate::position::Position;
use crate::SequencerError;

const STACK_END_WITHOUT_START: &str =
    "== Invalid loop detected! [Caught loop end without of loop start] ==";

/// A tempo change at an absolute tick.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TempoPoint {
    abs_position: u64,
    /// Seconds per tick
    tempo: MidiFraction,
}

/// A fully decoded song ready for playback.
#[derive(Clone, Debug)]
pub struct Timeline {
    pub tracks: Vec<Vec<MidiTrackRow>>,
    pub smf_format: u16,
    pub division: u16,
    /// Seconds per tick at the default tempo of 500000 us per quarter note
    pub initial_tempo: MidiFraction,
    /// `1 / (1000000 * division)`, multiplied by a tempo meta value
    pub inv_delta_ticks: MidiFraction,
    pub metadata: SongMetadata,
    pub loop_format: LoopFormat,
    pub markers: Vec<MarkerEntry>,
    /// Song length in seconds, including the post-song wait
    pub full_song_time_length: f64,
    /// -1 when the song has no usable loop
    pub loop_start_time: f64,
    /// -1 when the song has no usable loop
    pub loop_end_time: f64,
    pub loop_start_ticks: u64,
    pub loop_end_ticks: u64,
    pub track_begin_position: Position,
    pub loop_begin_position: Position,
    /// Loop state after validation; `invalid_loop` is final
    pub loop_state: LoopState,
    /// Loop definition problems found while building
    pub warnings: Vec<String>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            smf_format: 0,
            division: 0,
            initial_tempo: MidiFraction::ZERO,
            inv_delta_ticks: MidiFraction::ZERO,
            metadata: SongMetadata::default(),
            loop_format: LoopFormat::Default,
            markers: Vec::new(),
            full_song_time_length: 0.0,
            loop_start_time: -1.0,
            loop_end_time: -1.0,
            loop_start_ticks: 0,
            loop_end_ticks: 0,
            track_begin_position: Position::default(),
            loop_begin_position: Position::default(),
            loop_state: LoopState::default(),
            warnings: Vec::new(),
        }
    }
}

/// Loop marker bookkeeping while reading tracks.
#[derive(Default)]
struct LoopScan {
    got_start: bool,
    got_end: bool,
    got_stack_start: bool,
    event_in_row: bool,
}

/// Decode all tracks and build the timeline.
pub fn build_timeline(
    smf: &SmfData,
    post_song_wait_delay: f64,
) -> Result<Timeline, SequencerError> {
    let division = smf.division.max(1) as u64;
    let mut tl = Timeline {
        smf_format: smf.format,
        division: smf.division,
        initial_tempo: MidiFraction::new(1, division * 2),
        inv_delta_ticks: MidiFraction::new(1, 1_000_000 * division),
        ..Default::default()
    };
    tl.loop_state.full_reset();

    let mut parser = EventParser::new();
    let mut tempos: Vec<TempoPoint> = Vec::new();
    let mut scan = LoopScan::default();
    let mut longest_track_ticks = 0u64;

    for (tk, data) in smf.tracks.iter().enumerate() {
        let mut reader = TrackReader::new(data);
        let mut note_states = NoteStates::new();
        let mut rows = Vec::new();
        parser.begin_track();

        let first_delay = reader.read_var_len().map_err(|e| SequencerError::TrackData {
            track: tk,
            message: format!("can't read variable-length value at begin of track: {e}"),
        })?;

        // Leading row holds the initial delay, and the song-begin hook on track 0
        let mut row = MidiTrackRow::new();
        row.delay = first_delay;
        if tk == 0 {
            row.events.push(MidiEvent::song_begin_hook());
        }
        rows.push(row);
        let mut abs_position = first_delay;

        let mut row = MidiTrackRow::new();
        loop {
            let mut event = parser
                .parse_event(&mut reader)
                .map_err(|e| SequencerError::TrackData {
                    track: tk,
                    message: format!("failed to parse event: {e}"),
                })?;
            let mut ends_track = event.is_meta(MetaKind::EndTrack);

            if let MidiEvent::Meta {
                kind,
                data,
                abs_position: event_pos,
            } = &mut event
            {
                match *kind {
                    MetaKind::TempoChange => {
                        *event_pos = abs_position;
                        tempos.push(TempoPoint {
                            abs_position,
                            tempo: tl.inv_delta_ticks * read_int_be(data),
                        });
                    }
                    MetaKind::LoopStart => {
                        if scan.got_start || scan.event_in_row {
                            tl.loop_state.invalid_loop = true;
                            loop_warning(
                                &mut tl.warnings,
                                "== Invalid loop detected! [Caught more than 1 loopStart!] =="
                                    .to_string(),
                            );
                        } else {
                            scan.got_start = true;
                            tl.loop_start_ticks = abs_position;
                        }
                        scan.event_in_row = true;
                    }
                    MetaKind::LoopEnd => {
                        if scan.got_end || scan.event_in_row {
                            tl.loop_state.invalid_loop = true;
                            let more_than_one = if scan.got_end {
                                "[Caught more than 1 loopEnd!]"
                            } else {
                                ""
                            };
                            let same_row = if scan.event_in_row {
                                "[loopEnd in same row as loopStart!]"
                            } else {
                                ""
                            };
                            loop_warning(
                                &mut tl.warnings,
                                format!("== Invalid loop detected! {more_than_one} {same_row} =="),
                            );
                        } else {
                            scan.got_end = true;
                            tl.loop_end_ticks = abs_position;
                        }
                        scan.event_in_row = true;
                    }
                    MetaKind::LoopStackBegin => {
                        if !scan.got_stack_start {
                            if !scan.got_start {
                                tl.loop_start_ticks = abs_position;
                            }
                            scan.got_stack_start = true;
                        }
                        let loops = data.first().copied().unwrap_or(0);
                        let ls = &mut tl.loop_state;
                        ls.stack_up();
                        if ls.stack_level as usize >= ls.stack.len() {
                            ls.stack.push(LoopStackEntry {
                                loops: loops as i32,
                                infinity: loops == 0,
                                start: abs_position,
                                end: abs_position,
                                ..Default::default()
                            });
                        }
                    }
                    MetaKind::LoopStackEnd | MetaKind::LoopStackBreak => {
                        let ls = &mut tl.loop_state;
                        if ls.stack_level <= -1 {
                            ls.invalid_loop = true;
                            loop_warning(&mut tl.warnings, STACK_END_WITHOUT_START.to_string());
                        } else {
                            if tl.loop_end_ticks < abs_position {
                                tl.loop_end_ticks = abs_position;
                            }
                            ls.current_stack_mut().end = abs_position;
                            ls.stack_down();
                        }
                    }
                    _ => {}
                }
            }

            row.events.push(event);

            if !ends_track {
                match reader.read_var_len() {
                    Ok(delay) => row.delay = delay,
                    Err(FormatError::UnexpectedEof) => {
                        // Track data ran out: close the track here
                        debug!(track = tk, "track ends without end-of-track event");
                        row.events.push(MidiEvent::meta(MetaKind::EndTrack, Vec::new()));
                        row.delay = 0;
                        ends_track = true;
                    }
                    Err(e) => {
                        return Err(SequencerError::TrackData {
                            track: tk,
                            message: format!("can't read event delay: {e}"),
                        });
                    }
                }
            }

            if row.delay > 0 || ends_track {
                row.abs_position = abs_position;
                abs_position = abs_position.checked_add(row.delay).ok_or_else(|| {
                    SequencerError::TrackData {
                        track: tk,
                        message: "track length overflows the tick counter".into(),
                    }
                })?;
                row.sort_events(Some(&mut note_states));
                rows.push(std::mem::take(&mut row));
                scan.event_in_row = false;
            }

            if ends_track {
                break;
            }
        }

        longest_track_ticks = longest_track_ticks.max(abs_position);
        tl.tracks.push(rows);
    }

    if scan.got_start && !scan.got_end {
        tl.loop_end_ticks = longest_track_ticks;
    }
    if tl.loop_start_ticks >= tl.loop_end_ticks {
        if scan.got_start || scan.got_end {
            loop_warning(
                &mut tl.warnings,
                "== Invalid loop detected! [loopEnd is going before loopStart] ==".to_string(),
            );
        }
        tl.loop_state.invalid_loop = true;
    }

    tl.loop_format = parser.loop_format();
    tl.metadata = parser.into_metadata();
    tempos.sort_by_key(|t| t.abs_position);
    build_time_line(&mut tl, &tempos, post_song_wait_delay);

    debug!(
        tracks = tl.tracks.len(),
        length = tl.full_song_time_length,
        loop_start = tl.loop_start_time,
        loop_end = tl.loop_end_time,
        invalid_loop = tl.loop_state.invalid_loop,
        "timeline built"
    );
    Ok(tl)
}

fn loop_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{}", message);
    warnings.push(message);
}

/// Stamp rows with times, collect markers and locate the loop points.
fn build_time_line(tl: &mut Timeline, tempos: &[TempoPoint], post_song_wait_delay: f64) {
    let mut max_time = 0.0f64;

    for rows in tl.tracks.iter_mut() {
        let mut time = 0.0f64;
        let mut current_tempo = tl.initial_tempo;
        let mut tempo_index = 0usize;

        for i in 0..rows.len() {
            if i > 0 {
                let pos_abs = rows[i].abs_position;
                if tempo_index < tempos.len() && tempos[tempo_index].abs_position <= pos_abs {
                    // Tempo changed within the previous row's delay: recompute it
                    let prev_abs = rows[i - 1].abs_position;
                    let mut points = vec![TempoPoint {
                        abs_position: prev_abs,
                        tempo: current_tempo,
                    }];
                    while tempo_index < tempos.len()
                        && tempos[tempo_index].abs_position <= pos_abs
                    {
                        points.push(tempos[tempo_index]);
                        tempo_index += 1;
                    }

                    time -= rows[i - 1].time_delay;
                    let mut delay = 0.0;
                    for pair in points.windows(2) {
                        let ticks = pair[1].abs_position.saturating_sub(pair[0].abs_position);
                        delay += (pair[0].tempo * ticks).value();
                    }
                    let last = points[points.len() - 1];
                    let rest = pos_abs.saturating_sub(last.abs_position);
                    delay += (last.tempo * rest).value();
                    current_tempo = last.tempo;

                    rows[i - 1].time_delay = delay;
                    time += delay;
                }
            }

            let row = &mut rows[i];
            row.time_delay = (current_tempo * row.delay).value();
            row.time = time;
            time += row.time_delay;

            for event in &row.events {
                if let MidiEvent::Meta {
                    kind: MetaKind::Marker,
                    data,
                    ..
                } = event
                {
                    tl.markers.push(MarkerEntry {
                        label: String::from_utf8_lossy(data).into_owned(),
                        pos_ticks: row.abs_position,
                        pos_time: row.time,
                    });
                }
            }

            if !tl.loop_state.invalid_loop {
                if tl.loop_start_ticks == row.abs_position {
                    tl.loop_start_time = row.time;
                } else if tl.loop_end_ticks == row.abs_position {
                    tl.loop_end_time = row.time;
                }
            }
        }

        max_time = max_time.max(time);
    }

    tl.markers.sort_by_key(|m| m.pos_ticks);
    tl.full_song_time_length = max_time + post_song_wait_delay;

    tl.track_begin_position = Position::at_begin(&tl.tracks);
    tl.loop_begin_position = tl.track_begin_position.clone();
    let loops_count = tl.loop_state.loops_count;
    tl.loop_state.loops_left = loops_count;
    tl.loop_state.stack_level = -1;

    if !tl.loop_state.invalid_loop {
        if let Some(begin) = find_loop_begin(&tl.tracks, &tl.track_begin_position) {
            tl.loop_begin_position = begin;
            tl.loop_begin_position.absolute_time_position = tl.loop_start_time;
        }
    }
}

/// Walk the tracks in playback order and snapshot the position of the
/// first row that holds a loop start.
fn find_loop_begin(tracks: &[Vec<MidiTrackRow>], begin: &Position) -> Option<Position> {
    let mut position = begin.clone();
    loop {
        let row_begin = position.clone();
        for (tk, cursor) in position.tracks.iter_mut().enumerate() {
            if !cursor.active || cursor.delay > 0 {
                continue;
            }
            let Some(row) = tracks[tk].get(cursor.row) else {
                cursor.active = false;
                continue;
            };
            if row.events.iter().any(|e| e.is_meta(MetaKind::LoopStart)) {
                let mut snapshot = row_begin;
                snapshot.wait = 0.0;
                return Some(snapshot);
            }
            cursor.delay = cursor.delay.checked_add(row.delay)?;
            cursor.row += 1;
        }
        position.advance_shortest_delay()?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ms_formats::MidiWriter;

    const EOT: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

    fn build(division: u16, tracks: &[&[u8]]) -> Timeline {
        let bytes = MidiWriter::smf(1, division, tracks);
        let smf = ms_formats::parse_smf(&bytes).unwrap();
        build_timeline(&smf, 1.0).unwrap()
    }

    #[test]
    fn tempo_change_gives_half_second_quarter() {
        let track = [
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 us
            0x00, 0x90, 60, 100, //
            0x60, 0x80, 60, 0, // 96 ticks later
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        let rows = &tl.tracks[0];
        let on = rows
            .iter()
            .find(|r| r.events.iter().any(|e| matches!(e, MidiEvent::NoteOn { .. })))
            .unwrap();
        let off = rows
            .iter()
            .find(|r| r.events.iter().any(|e| matches!(e, MidiEvent::NoteOff { .. })))
            .unwrap();
        assert_eq!(off.time - on.time, 0.5);
        assert_relative_eq!(tl.full_song_time_length, 1.5);
    }

    #[test]
    fn mid_song_tempo_change_splits_row_delay() {
        // Conductor doubles the tempo at tick 48 while the melody waits 96
        let conductor = [
            0x30, 0xFF, 0x51, 0x03, 0x03, 0xD0, 0x90, // 250000 us at tick 48
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let melody = [
            0x00, 0x90, 60, 100, //
            0x60, 0x80, 60, 0, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&conductor, &melody]);
        let off = tl.tracks[1]
            .iter()
            .find(|r| r.events.iter().any(|e| matches!(e, MidiEvent::NoteOff { .. })))
            .unwrap();
        // 48 ticks at 0.5 s/quarter plus 48 ticks at 0.25 s/quarter
        assert_relative_eq!(off.time, 0.375);
    }

    #[test]
    fn first_row_of_track_zero_has_song_begin_hook() {
        let tl = build(96, &[&EOT, &EOT]);
        assert!(tl.tracks[0][0].events[0].is_meta(MetaKind::SongBeginHook));
        assert!(tl.tracks[1][0].events.is_empty());
    }

    #[test]
    fn loop_markers_set_loop_times() {
        let track = [
            0x00, 0xFF, 0x06, 0x09, b'l', b'o', b'o', b'p', b'S', b't', b'a', b'r', b't', //
            0x00, 0x90, 60, 100, //
            0x60, 0x80, 60, 0, //
            0x00, 0xFF, 0x06, 0x07, b'l', b'o', b'o', b'p', b'E', b'n', b'd', //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert!(!tl.loop_state.invalid_loop);
        assert_eq!(tl.loop_start_ticks, 0);
        assert_eq!(tl.loop_end_ticks, 96);
        assert_relative_eq!(tl.loop_start_time, 0.0);
        assert_relative_eq!(tl.loop_end_time, 0.5);
        assert_eq!(tl.loop_begin_position.tracks[0].row, 1);
    }

    #[test]
    fn loop_end_before_start_is_invalid() {
        let track = [
            0x00, 0xFF, 0xE2, 0x00, //
            0x60, 0xFF, 0xE1, 0x00, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert!(tl.loop_state.invalid_loop);
        assert_eq!(tl.loop_start_time, -1.0);
        assert!(!tl.warnings.is_empty());
    }

    #[test]
    fn second_loop_start_is_invalid() {
        let track = [
            0x00, 0xFF, 0xE1, 0x00, //
            0x10, 0xFF, 0xE1, 0x00, //
            0x10, 0xFF, 0xE2, 0x00, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert!(tl.loop_state.invalid_loop);
        assert_eq!(tl.warnings.len(), 1);
        assert!(tl.warnings[0].contains("[Caught more than 1 loopStart!]"));
    }

    #[test]
    fn loop_end_in_start_row_is_invalid() {
        let track = [
            0x00, 0xFF, 0xE1, 0x00, //
            0x00, 0xFF, 0xE2, 0x00, //
            0x60, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert!(tl.loop_state.invalid_loop);
        assert_eq!(tl.warnings.len(), 1);
        assert!(tl.warnings[0].contains("[loopEnd in same row as loopStart!]"));
        assert!(!tl.warnings[0].contains("more than 1 loopEnd"));
    }

    #[test]
    fn unmatched_stack_end_is_invalid() {
        let track = [0x00, 0xFF, 0xE5, 0x00, 0x00, 0xFF, 0x2F, 0x00];
        let tl = build(96, &[&track]);
        assert!(tl.loop_state.invalid_loop);
        assert!(tl.warnings[0].contains("Invalid loop"));
    }

    #[test]
    fn nested_stack_is_recorded() {
        let track = [
            0x00, 0xFF, 0xE4, 0x01, 0x02, // outer x2
            0x10, 0xFF, 0xE4, 0x01, 0x03, // inner x3
            0x10, 0xFF, 0xE5, 0x00, //
            0x10, 0xFF, 0xE5, 0x00, //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert!(!tl.loop_state.invalid_loop);
        assert_eq!(tl.loop_state.stack.len(), 2);
        assert_eq!(tl.loop_state.stack[0].loops, 2);
        assert_eq!(tl.loop_state.stack[1].loops, 3);
        assert_eq!(tl.loop_state.stack[1].start, 0x10);
        assert_eq!(tl.loop_state.stack[1].end, 0x20);
        assert_eq!(tl.loop_state.stack[0].end, 0x30);
        assert_eq!(tl.loop_state.stack_level, -1);
    }

    #[test]
    fn markers_are_collected_with_times() {
        let track = [
            0x60, 0xFF, 0x06, 0x05, b'v', b'e', b'r', b's', b'e', //
            0x00, 0xFF, 0x2F, 0x00,
        ];
        let tl = build(96, &[&track]);
        assert_eq!(tl.markers.len(), 1);
        assert_eq!(tl.markers[0].label, "verse");
        assert_eq!(tl.markers[0].pos_ticks, 96);
        assert_relative_eq!(tl.markers[0].pos_time, 0.5);
    }

    #[test]
    fn missing_end_of_track_is_implied() {
        let track = [0x00, 0x90, 60, 100];
        let tl = build(96, &[&track]);
        let last = tl.tracks[0].last().unwrap();
        assert!(last.events.last().unwrap().is_meta(MetaKind::EndTrack));
    }

    #[test]
    fn empty_track_fails() {
        let bytes = MidiWriter::smf(1, 96, &[&EOT, &[]]);
        let smf = ms_formats::parse_smf(&bytes).unwrap();
        assert!(matches!(
            build_timeline(&smf, 1.0),
            Err(SequencerError::TrackData { track: 1, .. })
        ));
    }

    #[test]
    fn malformed_event_reports_track() {
        let bytes = MidiWriter::smf(1, 96, &[&EOT, &[0x00, 0x90, 60]]);
        let smf = ms_formats::parse_smf(&bytes).unwrap();
        let err = build_timeline(&smf, 1.0).unwrap_err();
        assert!(err.to_string().starts_with("track 1:"));
    }
}
