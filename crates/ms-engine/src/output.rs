//! Output collaborator trait and optional playback hooks.

use ms_ir::MetaKind;

/// Real-time MIDI sink driven by the sequencer.
///
/// The required methods receive every channel message in playback order.
/// The provided methods are optional and default to doing nothing.
pub trait MidiOutput {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);

    fn note_off(&mut self, channel: u8, note: u8);

    /// Note-off with release velocity, called right after [`note_off`].
    ///
    /// [`note_off`]: MidiOutput::note_off
    fn note_off_velocity(&mut self, _channel: u8, _note: u8, _velocity: u8) {}

    fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8);

    fn channel_aftertouch(&mut self, channel: u8, pressure: u8);

    fn controller_change(&mut self, channel: u8, controller: u8, value: u8);

    fn patch_change(&mut self, channel: u8, patch: u8);

    /// Pitch bend as raw 7-bit halves.
    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8);

    /// Sysex payload including its leading status byte.
    fn system_exclusive(&mut self, data: &[u8]);

    /// Every meta event is offered here before the sequencer acts on it.
    fn meta_event(&mut self, _track: usize, _kind: MetaKind, _data: &[u8]) {}

    /// A device-switch meta event named an output port for `track`.
    fn device_switch(&mut self, _track: usize, _name: &[u8]) {}

    /// Channel offset added to every channel message from `track`.
    fn current_device(&mut self, _track: usize) -> usize {
        0
    }
}

impl<T: MidiOutput + ?Sized> MidiOutput for Box<T> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_on(channel, note, velocity)
    }
    fn note_off(&mut self, channel: u8, note: u8) {
        (**self).note_off(channel, note)
    }
    fn note_off_velocity(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_off_velocity(channel, note, velocity)
    }
    fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8) {
        (**self).note_aftertouch(channel, note, pressure)
    }
    fn channel_aftertouch(&mut self, channel: u8, pressure: u8) {
        (**self).channel_aftertouch(channel, pressure)
    }
    fn controller_change(&mut self, channel: u8, controller: u8, value: u8) {
        (**self).controller_change(channel, controller, value)
    }
    fn patch_change(&mut self, channel: u8, patch: u8) {
        (**self).patch_change(channel, patch)
    }
    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8) {
        (**self).pitch_bend(channel, msb, lsb)
    }
    fn system_exclusive(&mut self, data: &[u8]) {
        (**self).system_exclusive(data)
    }
    fn meta_event(&mut self, track: usize, kind: MetaKind, data: &[u8]) {
        (**self).meta_event(track, kind, data)
    }
    fn device_switch(&mut self, track: usize, name: &[u8]) {
        (**self).device_switch(track, name)
    }
    fn current_device(&mut self, track: usize) -> usize {
        (**self).current_device(track)
    }
}

/// Output that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOutput;

impl MidiOutput for NullOutput {
    fn note_on(&mut self, _: u8, _: u8, _: u8) {}
    fn note_off(&mut self, _: u8, _: u8) {}
    fn note_aftertouch(&mut self, _: u8, _: u8, _: u8) {}
    fn channel_aftertouch(&mut self, _: u8, _: u8) {}
    fn controller_change(&mut self, _: u8, _: u8, _: u8) {}
    fn patch_change(&mut self, _: u8, _: u8) {}
    fn pitch_bend(&mut self, _: u8, _: u8, _: u8) {}
    fn system_exclusive(&mut self, _: &[u8]) {}
}

type Hook = Box<dyn FnMut() + Send>;

/// Optional callbacks fired during playback.
///
/// Unset hooks are skipped.
#[derive(Default)]
pub struct SequencerHooks {
    pub on_loop_start: Option<Hook>,
    pub on_loop_end: Option<Hook>,
    pub on_song_start: Option<Hook>,
    /// Receives loop-definition errors and device switch notices
    pub on_debug_message: Option<Box<dyn FnMut(&str) + Send>>,
    /// Fills a `play_stream` sub-buffer with PCM; silence is written when unset
    pub on_pcm_render: Option<Box<dyn FnMut(&mut [u8]) + Send>>,
    /// Callback-trigger meta events: `(value, track)`
    pub on_trigger: Option<Box<dyn FnMut(u8, usize) + Send>>,
}

impl SequencerHooks {
    pub(crate) fn loop_start(&mut self) {
        if let Some(hook) = self.on_loop_start.as_mut() {
            hook();
        }
    }

    pub(crate) fn loop_end(&mut self) {
        if let Some(hook) = self.on_loop_end.as_mut() {
            hook();
        }
    }

    pub(crate) fn song_start(&mut self) {
        if let Some(hook) = self.on_song_start.as_mut() {
            hook();
        }
    }

    pub(crate) fn debug_message(&mut self, message: &str) {
        if let Some(hook) = self.on_debug_message.as_mut() {
            hook(message);
        }
    }

    pub(crate) fn trigger(&mut self, value: u8, track: usize) {
        if let Some(hook) = self.on_trigger.as_mut() {
            hook(value, track);
        }
    }

    pub(crate) fn render_pcm(&mut self, buffer: &mut [u8]) {
        match self.on_pcm_render.as_mut() {
            Some(hook) => hook(buffer),
            None => buffer.fill(0),
        }
    }
}

impl core::fmt::Debug for SequencerHooks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SequencerHooks")
            .field("on_loop_start", &self.on_loop_start.is_some())
            .field("on_loop_end", &self.on_loop_end.is_some())
            .field("on_song_start", &self.on_song_start.is_some())
            .field("on_debug_message", &self.on_debug_message.is_some())
            .field("on_pcm_render", &self.on_pcm_render.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}
