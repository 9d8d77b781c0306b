//! Track rows: groups of events sharing one tick.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use crate::event::{EventCategory, MidiEvent};

/// Number of (channel, key) slots tracked per track.
const NOTE_SLOTS: usize = 16 * 128;

/// Per-track note on/off memory used while sorting rows.
///
/// Lets the sorter tell a genuine zero-length note (on and off on the same
/// tick) from a note-off that closes an earlier note.
#[derive(Clone, Debug)]
pub struct NoteStates {
    on: [bool; NOTE_SLOTS],
}

impl NoteStates {
    pub fn new() -> Self {
        Self {
            on: [false; NOTE_SLOTS],
        }
    }

    fn slot(channel: u8, note: u8) -> usize {
        (channel as usize & 0x0F) * 128 + (note as usize & 0x7F)
    }

    /// Whether the key is currently held.
    pub fn is_on(&self, channel: u8, note: u8) -> bool {
        self.on[Self::slot(channel, note)]
    }

    fn set(&mut self, slot: usize, on: bool) {
        self.on[slot] = on;
    }
}

impl Default for NoteStates {
    fn default() -> Self {
        Self::new()
    }
}

/// A set of events that occur at the same tick on one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MidiTrackRow {
    /// Absolute tick of this row
    pub abs_position: u64,
    /// Ticks until the next row on the same track
    pub delay: u64,
    /// Wall-clock time of this row in seconds
    pub time: f64,
    /// Seconds until the next row
    pub time_delay: f64,
    pub events: Vec<MidiEvent>,
}

impl MidiTrackRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the row for reuse.
    pub fn clear(&mut self) {
        self.abs_position = 0;
        self.delay = 0;
        self.time = 0.0;
        self.time_delay = 0.0;
        self.events.clear();
    }

    /// Reorder events so that same-tick playback is deterministic.
    ///
    /// Output order is sysex, note-offs, meta markers, controllers, then
    /// everything else. Order within a bucket is preserved.
    ///
    /// With `note_states`, a note-off that would silence a note started in
    /// this same row is moved after that note-on, so zero-length notes
    /// still sound.
    pub fn sort_events(&mut self, note_states: Option<&mut NoteStates>) {
        let mut sysex = Vec::new();
        let mut note_offs = Vec::new();
        let mut metas = Vec::new();
        let mut controllers = Vec::new();
        let mut any_other = Vec::new();

        for event in self.events.drain(..) {
            match event.category() {
                EventCategory::SysEx => sysex.push(event),
                EventCategory::NoteOff => note_offs.push(event),
                EventCategory::Meta => metas.push(event),
                EventCategory::Controller => controllers.push(event),
                EventCategory::Other => any_other.push(event),
            }
        }

        if let Some(states) = note_states {
            let mut mark_as_on = BTreeSet::new();

            // `any_other` grows while scanning; moved note-offs are skipped
            // by the note-on match below.
            let mut i = 0;
            while i < any_other.len() {
                let (channel, note) = match any_other[i] {
                    MidiEvent::NoteOn { channel, note, .. } => (channel, note),
                    _ => {
                        i += 1;
                        continue;
                    }
                };
                let slot = NoteStates::slot(channel, note);
                let was_on = states.on[slot];
                mark_as_on.insert(slot);

                let mut same_note_offs = 0;
                let mut j = 0;
                while j < note_offs.len() {
                    let matches = matches!(
                        note_offs[j],
                        MidiEvent::NoteOff { channel: c, note: n, .. } if c == channel && n == note
                    );
                    if matches {
                        if !was_on || same_note_offs > 0 {
                            any_other.push(note_offs.remove(j));
                            mark_as_on.remove(&slot);
                            continue;
                        }
                        same_note_offs += 1;
                    }
                    j += 1;
                }
                i += 1;
            }

            for event in &note_offs {
                if let MidiEvent::NoteOff { channel, note, .. } = *event {
                    states.set(NoteStates::slot(channel, note), false);
                }
            }
            for slot in mark_as_on {
                states.set(slot, true);
            }
        }

        self.events.reserve(
            sysex.len() + note_offs.len() + metas.len() + controllers.len() + any_other.len(),
        );
        self.events.extend(sysex);
        self.events.extend(note_offs);
        self.events.extend(metas);
        self.events.extend(controllers);
        self.events.extend(any_other);
    }
}
