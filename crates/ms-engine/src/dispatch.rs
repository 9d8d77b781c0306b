//! Routing of decoded events to the output and loop state.

use ms_formats::read_int_be;
use ms_ir::{MetaKind, MidiEvent, MidiFraction};
use tracing::{debug, trace};

use crate::loop_state::LoopState;
use crate::output::{MidiOutput, SequencerHooks};

/// Controller number for "all notes off".
const CC_ALL_NOTES_OFF: u8 = 123;

/// Everything an event can act on during playback.
pub(crate) struct Dispatcher<O> {
    pub output: O,
    pub hooks: SequencerHooks,
    pub loop_state: LoopState,
    /// Current seconds per tick
    pub tempo: MidiFraction,
    pub inv_delta_ticks: MidiFraction,
    pub loop_enabled: bool,
    pub smf_format: u16,
    pub track_disabled: Vec<bool>,
    pub channel_disabled: [bool; 16],
    pub solo_track: Option<usize>,
}

impl<O: MidiOutput> Dispatcher<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            hooks: SequencerHooks::default(),
            loop_state: LoopState::default(),
            tempo: MidiFraction::ZERO,
            inv_delta_ticks: MidiFraction::ZERO,
            loop_enabled: true,
            smf_format: 0,
            track_disabled: Vec::new(),
            channel_disabled: [false; 16],
            solo_track: None,
        }
    }

    /// Whether solo/disable settings mute this event.
    fn is_muted(&self, track: usize, event: &MidiEvent) -> bool {
        // The conductor track's tempo map always plays
        let conductor = track == 0
            && self.smf_format < 2
            && matches!(
                event.meta_kind(),
                Some(MetaKind::TempoChange | MetaKind::TimeSignature)
            );
        if conductor {
            return false;
        }
        if let Some(solo) = self.solo_track {
            if solo != track {
                return true;
            }
        }
        self.track_disabled.get(track).copied().unwrap_or(false)
    }

    /// Send one event. Returns `false` when the event ends its track.
    pub fn handle_event(&mut self, track: usize, event: &MidiEvent) -> bool {
        if self.is_muted(track, event) {
            return true;
        }
        trace!(track, ?event, "dispatch");

        match event {
            MidiEvent::Meta { kind, data, .. } => return self.handle_meta(track, *kind, data),
            MidiEvent::SongSelect(_)
            | MidiEvent::SongPositionPointer { .. }
            | MidiEvent::System(_) => {}
            MidiEvent::Sysex(data) | MidiEvent::Sysex2(data) => self.output.system_exclusive(data),
            _ => self.handle_channel_event(track, event),
        }
        true
    }

    fn handle_meta(&mut self, track: usize, kind: MetaKind, data: &[u8]) -> bool {
        self.output.meta_event(track, kind, data);

        match kind {
            MetaKind::EndTrack => return false,
            MetaKind::TempoChange => {
                self.tempo = self.inv_delta_ticks * read_int_be(data);
            }
            MetaKind::DeviceSwitch => {
                let name = String::from_utf8_lossy(data);
                debug!(track, device = %name, "switching device");
                self.hooks
                    .debug_message(&format!("Switching another device: {name}"));
                self.output.device_switch(track, data);
            }
            MetaKind::CallbackTrigger => {
                self.hooks.trigger(data.first().copied().unwrap_or(0), track);
            }
            MetaKind::SongBeginHook => self.hooks.song_start(),
            kind if kind.is_loop_marker() => self.handle_loop_marker(kind, data),
            _ => {}
        }
        true
    }

    fn handle_loop_marker(&mut self, kind: MetaKind, data: &[u8]) {
        if !self.loop_enabled || self.loop_state.invalid_loop {
            return;
        }
        let ls = &mut self.loop_state;
        match kind {
            MetaKind::LoopStart => ls.caught_start = true,
            MetaKind::LoopEnd => ls.caught_end = true,
            MetaKind::LoopStackBegin => {
                if ls.skip_stack_start {
                    ls.skip_stack_start = false;
                    return;
                }
                ls.arm_next_level(data.first().copied().unwrap_or(0));
                ls.caught_stack_start = true;
            }
            MetaKind::LoopStackEnd => ls.caught_stack_end = true,
            MetaKind::LoopStackBreak => ls.caught_stack_break = true,
            _ => {}
        }
    }

    fn handle_channel_event(&mut self, track: usize, event: &MidiEvent) {
        let Some(channel) = event.channel() else {
            return;
        };
        let offset = self.output.current_device(track);
        let ch = (channel as usize + offset).min(u8::MAX as usize) as u8;
        let muted = self
            .channel_disabled
            .get(ch as usize)
            .copied()
            .unwrap_or(false);

        match *event {
            MidiEvent::NoteOff { note, velocity, .. } => {
                if !muted {
                    self.output.note_off(ch, note);
                    self.output.note_off_velocity(ch, note, velocity);
                }
            }
            MidiEvent::NoteOn { note, velocity, .. } => {
                if !muted {
                    self.output.note_on(ch, note, velocity);
                }
            }
            MidiEvent::NoteTouch { note, pressure, .. } => {
                self.output.note_aftertouch(ch, note, pressure)
            }
            MidiEvent::ControlChange {
                controller, value, ..
            } => self.output.controller_change(ch, controller, value),
            MidiEvent::PatchChange { program, .. } => self.output.patch_change(ch, program),
            MidiEvent::ChannelAftertouch { pressure, .. } => {
                self.output.channel_aftertouch(ch, pressure)
            }
            MidiEvent::PitchWheel { lsb, msb, .. } => self.output.pitch_bend(ch, msb, lsb),
            _ => {}
        }
    }

    /// Send "all notes off" on every channel.
    pub fn all_notes_off(&mut self) {
        for channel in 0..16 {
            self.output.controller_change(channel, CC_ALL_NOTES_OFF, 0);
        }
    }
}
