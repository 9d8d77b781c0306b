//! The MIDI sequencer: loading, ticking, seeking and streaming.

use ms_formats::{load_music, LoopFormat, SourceFormat};
use ms_ir::{MarkerEntry, MidiEvent, MidiTrackRow};
use tracing::{debug, trace, warn};

use crate::config::SequencerConfig;
use crate::dispatch::Dispatcher;
use crate::output::{MidiOutput, SequencerHooks};
use crate::position::Position;
use crate::stream::StreamTimer;
use crate::timeline::{build_timeline, Timeline};
use crate::SequencerError;

/// Iteration budget before a synthetic delay is forced.
const ANTI_FREEZE_LIMIT: u32 = 10_000;

/// Plays a loaded song through a [`MidiOutput`].
///
/// The sequencer is a plain state machine: `tick`, `seek`, `rewind` and
/// `play_stream` run synchronously and must not be called concurrently.
pub struct MidiSequencer<O: MidiOutput> {
    dispatcher: Dispatcher<O>,
    timeline: Timeline,
    current: Position,
    config: SequencerConfig,
    timer: StreamTimer,
    at_end: bool,
    source_format: Option<SourceFormat>,
    error_string: String,
}

impl<O: MidiOutput> MidiSequencer<O> {
    pub fn new(output: O) -> Self {
        Self::with_config(output, SequencerConfig::default())
    }

    pub fn with_config(output: O, config: SequencerConfig) -> Self {
        let mut seq = Self {
            dispatcher: Dispatcher::new(output),
            timeline: Timeline::default(),
            current: Position::default(),
            config: SequencerConfig::default(),
            timer: StreamTimer::default(),
            at_end: true,
            source_format: None,
            error_string: String::new(),
        };
        seq.apply_config(config);
        seq
    }

    /// Replace all settings. Takes effect immediately.
    pub fn apply_config(&mut self, config: SequencerConfig) {
        self.dispatcher.loop_enabled = config.loop_enabled;
        self.dispatcher.loop_state.loops_count = internal_loops(config.loops_count);
        self.timer.set_format(config.sample_rate, config.frame_size);
        self.config = config;
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load a MIDI, RMID or MUS file.
    ///
    /// On failure the previous song is dropped, the sequencer is left at its
    /// end and [`error_string`](Self::error_string) describes the problem.
    pub fn load_midi(&mut self, data: &[u8]) -> Result<(), SequencerError> {
        self.error_string.clear();
        match self.load_inner(data) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "failed to load music");
                self.error_string = match &err {
                    SequencerError::TrackData { .. } => {
                        format!("MIDI data parsing error has occurred!\n{err}")
                    }
                    SequencerError::Format(_) => err.to_string(),
                };
                self.install(Timeline::default(), None);
                self.at_end = true;
                Err(err)
            }
        }
    }

    fn load_inner(&mut self, data: &[u8]) -> Result<(), SequencerError> {
        let (smf, format) = load_music(data, self.config.mus_frequency)?;
        let timeline = build_timeline(&smf, self.config.post_song_wait_delay)?;
        debug!(
            ?format,
            title = %timeline.metadata.title,
            tracks = timeline.tracks.len(),
            length = timeline.full_song_time_length,
            "music loaded"
        );
        self.install(timeline, Some(format));
        Ok(())
    }

    fn install(&mut self, mut timeline: Timeline, format: Option<SourceFormat>) {
        for message in std::mem::take(&mut timeline.warnings) {
            self.dispatcher.hooks.debug_message(&message);
        }

        let d = &mut self.dispatcher;
        d.loop_state = timeline.loop_state.clone();
        d.loop_state.loops_count = internal_loops(self.config.loops_count);
        d.inv_delta_ticks = timeline.inv_delta_ticks;
        d.tempo = timeline.initial_tempo;
        d.smf_format = timeline.smf_format;
        d.track_disabled = vec![false; timeline.tracks.len()];
        d.solo_track = None;

        self.timeline = timeline;
        self.source_format = format;
        self.rewind();
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Return to the song start.
    pub fn rewind(&mut self) {
        self.current = self.timeline.track_begin_position.clone();
        self.at_end = false;

        let ls = &mut self.dispatcher.loop_state;
        ls.loops_count = internal_loops(self.config.loops_count);
        ls.reset();
        ls.caught_start = true;
        ls.temporary_broken = false;

        self.dispatcher.tempo = self.timeline.initial_tempo;
        self.timer.reset();
    }

    /// Advance playback by `seconds`, dispatching every event that falls due.
    ///
    /// Returns the time until the next event, for scheduling the next call.
    pub fn tick(&mut self, seconds: f64, granularity: f64) -> f64 {
        let s = seconds * self.config.tempo_multiplier;
        self.current.wait -= s;
        self.current.absolute_time_position += s;

        let mut anti_freeze = ANTI_FREEZE_LIMIT;
        while self.current.wait <= granularity * 0.5 && anti_freeze > 0 {
            if !self.process_events(false) {
                break;
            }
            if self.current.wait <= 0.0 {
                anti_freeze -= 1;
            }
        }

        if anti_freeze == 0 {
            warn!("too many zero-delay events, forcing a one second delay");
            self.current.wait += 1.0;
        }

        self.current.wait.max(0.0)
    }

    /// Jump to `seconds` from the song start.
    ///
    /// Events between the start and the target are replayed without
    /// note-ons so controllers and programs end up correct. Returns the wait
    /// until the next event.
    pub fn seek(&mut self, seconds: f64, granularity: f64) -> f64 {
        if seconds < 0.0 {
            return 0.0;
        }
        let length = self.timeline.full_song_time_length;
        if seconds > length {
            self.rewind();
            return 0.0;
        }

        let half = granularity * 0.5;
        let loop_flag = self.dispatcher.loop_enabled;
        self.dispatcher.loop_enabled = false;
        self.rewind();
        self.dispatcher.loop_state.caught_start = false;
        self.dispatcher.loop_state.temporary_broken = seconds >= self.timeline.loop_end_time;

        while self.current.absolute_time_position < seconds
            && self.current.absolute_time_position < length
        {
            self.current.wait -= seconds;
            self.current.absolute_time_position += seconds;

            let mut anti_freeze = ANTI_FREEZE_LIMIT;
            let mut dst_wait = self.current.wait + half;
            while self.current.wait <= half && anti_freeze > 0 {
                if !self.process_events(true) {
                    break;
                }
                if self.current.wait <= dst_wait {
                    anti_freeze -= 1;
                } else {
                    dst_wait = self.current.wait + half;
                    anti_freeze = ANTI_FREEZE_LIMIT;
                }
            }

            if anti_freeze == 0 {
                warn!("seek stalled, forcing a one second delay");
                self.current.wait += 1.0;
            }
        }

        if self.current.wait < 0.0 {
            self.current.wait = 0.0;
        }

        if self.at_end && self.current.absolute_time_position >= length {
            self.rewind();
            self.dispatcher.loop_enabled = loop_flag;
            return 0.0;
        }

        self.timer.reset();
        self.timer.delay = self.current.wait;
        self.dispatcher.loop_enabled = loop_flag;
        debug!(target_time = seconds, wait = self.current.wait, "seek done");
        self.current.wait
    }

    /// Fill `stream` with PCM while dispatching events on sample boundaries.
    ///
    /// PCM comes from the `on_pcm_render` hook, or silence when it is unset.
    /// Returns the number of bytes written.
    pub fn play_stream(&mut self, stream: &mut [u8]) -> usize {
        let frame_size = self.timer.frame_size as usize;
        let rate = self.timer.sample_rate as f64;
        let mut left = stream.len() / frame_size;
        let mut offset = 0usize;
        let mut count = 0usize;

        while left > 0 {
            let left_delay = left as f64 / rate;
            let max_delay = self.timer.time_rest.min(left_delay);
            if self.at_end && self.timer.delay <= 0.0 {
                break;
            }
            self.timer.time_rest -= max_delay;

            let period = (rate * max_delay) as usize;
            let generate = period.min(left);
            if generate > 0 {
                let bytes = generate * frame_size;
                self.dispatcher
                    .hooks
                    .render_pcm(&mut stream[offset..offset + bytes]);
                offset += bytes;
                count += generate;
                left -= generate;
            }

            if self.timer.time_rest <= 0.0 {
                self.timer.delay = self.tick(self.timer.delay, self.timer.min_delay);
                self.timer.time_rest += self.timer.delay;
            }
        }

        count * frame_size
    }

    /// Dispatch every row that is due and work out the next wait.
    ///
    /// Returns `false` once the song has ended.
    fn process_events(&mut self, is_seek: bool) -> bool {
        if self.current.tracks.is_empty() {
            self.at_end = true;
        }
        if self.at_end {
            return false;
        }

        let row_begin = self.current.clone();
        self.dispatcher.loop_state.caught_end = false;

        let mut do_loop_jump = false;
        let mut caught_loop_starts = 0u32;
        let mut caught_stack_starts = 0u32;
        let mut caught_stack_ends = 0u32;
        let mut caught_stack_ends_time = 0.0f64;
        let mut caught_stack_breaks = 0u32;

        for tk in 0..self.current.tracks.len() {
            let cursor = &mut self.current.tracks[tk];
            if !cursor.active || cursor.delay > 0 {
                continue;
            }
            let Some(row) = self.timeline.tracks[tk].get(cursor.row) else {
                cursor.active = false;
                continue;
            };

            for event in &row.events {
                if is_seek && matches!(event, MidiEvent::NoteOn { .. }) {
                    continue;
                }
                if !self.dispatcher.handle_event(tk, event) {
                    cursor.active = false;
                }

                let d = &mut self.dispatcher;
                if d.loop_state.caught_start {
                    d.hooks.loop_start();
                    caught_loop_starts += 1;
                    d.loop_state.caught_start = false;
                }
                if d.loop_state.caught_stack_start {
                    if self.timeline.loop_start_time >= row.time {
                        d.hooks.loop_start();
                    }
                    caught_stack_starts += 1;
                    d.loop_state.caught_stack_start = false;
                }
                if d.loop_state.caught_stack_break {
                    caught_stack_breaks += 1;
                    d.loop_state.caught_stack_break = false;
                }
                if d.loop_state.caught_end || d.loop_state.is_stack_end() {
                    if d.loop_state.caught_stack_end {
                        d.loop_state.caught_stack_end = false;
                        caught_stack_ends += 1;
                        caught_stack_ends_time = row.time;
                    }
                    do_loop_jump = true;
                    break;
                }
                // Nothing left to repeat at this level
                d.loop_state.caught_stack_end = false;
            }

            if cursor.active {
                cursor.delay = cursor.delay.saturating_add(row.delay);
                cursor.row += 1;
            }
            if do_loop_jump {
                break;
            }
        }

        let shortest = self.current.advance_shortest_delay();
        let wait = (self.dispatcher.tempo * shortest.unwrap_or(0)).value();
        self.current.wait += wait;
        trace!(?shortest, wait, "rows processed");

        if caught_loop_starts > 0 && self.timeline.loop_begin_position.absolute_time_position <= 0.0
        {
            self.timeline.loop_begin_position = row_begin.clone();
        }

        if caught_stack_starts > 0 {
            let ls = &mut self.dispatcher.loop_state;
            for _ in 0..caught_stack_starts {
                ls.stack_up();
                ls.current_stack_mut().start_position = row_begin.clone();
            }
            return true;
        }

        if caught_stack_breaks > 0 {
            let ls = &mut self.dispatcher.loop_state;
            for _ in 0..caught_stack_breaks {
                let entry = ls.current_stack_mut();
                entry.loops = 0;
                entry.infinity = false;
                ls.stack_down();
            }
        }

        if caught_stack_ends > 0 {
            for _ in 0..caught_stack_ends {
                let entry = self.dispatcher.loop_state.current_stack_mut();
                if entry.infinity {
                    let start = entry.start_position.clone();
                    if self.timeline.loop_end_time >= caught_stack_ends_time {
                        self.dispatcher.hooks.loop_end();
                        if self.config.loop_hooks_only {
                            self.at_end = true;
                            self.current.wait += self.config.post_song_wait_delay;
                            self.dispatcher.all_notes_off();
                            return true;
                        }
                    }
                    self.jump_to_stack_start(start);
                    return true;
                }

                if entry.loops >= 0 {
                    entry.loops -= 1;
                    if entry.loops > 0 {
                        let start = entry.start_position.clone();
                        self.jump_to_stack_start(start);
                        return true;
                    }
                }
                self.dispatcher.loop_state.stack_down();
            }
            return true;
        }

        if shortest.is_none() || self.dispatcher.loop_state.caught_end {
            self.dispatcher.hooks.loop_end();
            self.dispatcher.all_notes_off();
            self.dispatcher.loop_state.caught_end = false;

            let ls = &mut self.dispatcher.loop_state;
            let loops_exhausted = ls.loops_count >= 0 && ls.loops_left < 1;
            if !self.dispatcher.loop_enabled
                || (shortest.is_none() && loops_exhausted)
                || self.config.loop_hooks_only
            {
                debug!(time = self.current.absolute_time_position, "song end reached");
                self.at_end = true;
                self.current.wait += self.config.post_song_wait_delay;
                return true;
            }

            if ls.temporary_broken {
                self.current = self.timeline.track_begin_position.clone();
                ls.temporary_broken = false;
            } else if ls.loops_count < 0 || ls.loops_left >= 1 {
                self.current = self.timeline.loop_begin_position.clone();
                if ls.loops_count >= 1 {
                    ls.loops_left -= 1;
                }
            }
            trace!(loops_left = ls.loops_left, "looping");
        }

        true
    }

    fn jump_to_stack_start(&mut self, start: Position) {
        self.current = start;
        self.dispatcher.loop_state.skip_stack_start = true;
        self.dispatcher.all_notes_off();
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn output(&self) -> &O {
        &self.dispatcher.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.dispatcher.output
    }

    pub fn into_output(self) -> O {
        self.dispatcher.output
    }

    pub fn hooks_mut(&mut self) -> &mut SequencerHooks {
        &mut self.dispatcher.hooks
    }

    pub fn music_title(&self) -> &str {
        &self.timeline.metadata.title
    }

    pub fn music_copyright(&self) -> &str {
        &self.timeline.metadata.copyright
    }

    pub fn track_titles(&self) -> &[String] {
        &self.timeline.metadata.track_titles
    }

    pub fn markers(&self) -> &[MarkerEntry] {
        &self.timeline.markers
    }

    /// Song length in seconds, including the post-song wait.
    pub fn time_length(&self) -> f64 {
        self.timeline.full_song_time_length
    }

    /// Loop start in seconds, or -1 without a valid loop.
    pub fn loop_start_time(&self) -> f64 {
        self.timeline.loop_start_time
    }

    /// Loop end in seconds, or -1 without a valid loop.
    pub fn loop_end_time(&self) -> f64 {
        self.timeline.loop_end_time
    }

    /// Current playback time in seconds.
    pub fn tell(&self) -> f64 {
        self.current.absolute_time_position
    }

    pub fn position_at_end(&self) -> bool {
        self.at_end
    }

    pub fn track_count(&self) -> usize {
        self.timeline.tracks.len()
    }

    /// Rows of one track, with their computed times.
    pub fn track_rows(&self, track: usize) -> Option<&[MidiTrackRow]> {
        self.timeline.tracks.get(track).map(Vec::as_slice)
    }

    pub fn loops_count(&self) -> i32 {
        self.config.loops_count
    }

    pub fn loop_enabled(&self) -> bool {
        self.config.loop_enabled
    }

    /// Innermost active nested loop level, -1 when none.
    pub fn loop_stack_level(&self) -> i32 {
        self.dispatcher.loop_state.stack_level
    }

    pub fn loop_format(&self) -> LoopFormat {
        self.timeline.loop_format
    }

    pub fn tempo_multiplier(&self) -> f64 {
        self.config.tempo_multiplier
    }

    /// Description of the last load failure; empty after a good load.
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    pub fn source_format(&self) -> Option<SourceFormat> {
        self.source_format
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.config.loop_enabled = enabled;
        self.dispatcher.loop_enabled = enabled;
    }

    /// Number of times the loop plays; -1 loops forever.
    pub fn set_loops_count(&mut self, loops: i32) {
        self.config.loops_count = loops;
        let ls = &mut self.dispatcher.loop_state;
        ls.loops_count = internal_loops(loops);
        ls.loops_left = ls.loops_count;
    }

    pub fn set_loop_hooks_only(&mut self, enabled: bool) {
        self.config.loop_hooks_only = enabled;
    }

    /// Set the playback speed factor.
    pub fn set_tempo(&mut self, multiplier: f64) {
        self.config.tempo_multiplier = multiplier;
    }

    /// Enable or disable a track. Returns `false` for an unknown track.
    pub fn set_track_enabled(&mut self, track: usize, enabled: bool) -> bool {
        match self.dispatcher.track_disabled.get_mut(track) {
            Some(disabled) => {
                *disabled = !enabled;
                true
            }
            None => false,
        }
    }

    /// Enable or disable notes on a channel. Returns `false` for channels
    /// past 15.
    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) -> bool {
        match self.dispatcher.channel_disabled.get_mut(channel) {
            Some(disabled) => {
                *disabled = !enabled;
                true
            }
            None => false,
        }
    }

    /// Play only `track`, or every track with `None`.
    pub fn set_solo_track(&mut self, track: Option<usize>) {
        self.dispatcher.solo_track = track;
    }

    /// Output format for `play_stream`.
    pub fn set_sample_rate(&mut self, sample_rate: u32, frame_size: u32) {
        self.config.sample_rate = sample_rate;
        self.config.frame_size = frame_size;
        self.timer.set_format(sample_rate, frame_size);
    }

    pub fn set_trigger_handler(&mut self, handler: impl FnMut(u8, usize) + Send + 'static) {
        self.dispatcher.hooks.on_trigger = Some(Box::new(handler));
    }

    pub fn set_hooks(&mut self, hooks: SequencerHooks) {
        self.dispatcher.hooks = hooks;
    }
}

/// Loop counts are zero-based internally: the first pass is not a repeat.
fn internal_loops(loops: i32) -> i32 {
    if loops >= 1 {
        loops - 1
    } else {
        loops
    }
}
