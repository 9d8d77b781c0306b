//! Integration tests: load → play → seek through the public facade.

use approx::assert_relative_eq;
use midiseq::{
    convert_mus_to_midi, parse_smf, LoopFormat, MetaKind, MidiEvent, MidiSequencer, MidiWriter,
    NullOutput, SourceFormat, MUS_DEFAULT_FREQUENCY,
};

const EOT: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

fn single_note_song() -> Vec<u8> {
    let track = [
        0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // 500000 us per quarter
        0x00, 0x90, 60, 100, //
        0x60, 0x80, 60, 0, // 96 ticks later
        0x00, 0xFF, 0x2F, 0x00,
    ];
    MidiWriter::smf(0, 96, &[&track])
}

fn arpeggio_song() -> Vec<u8> {
    let mut melody = Vec::new();
    for (i, note) in [60u8, 64, 67, 72, 67, 64].iter().enumerate() {
        melody.extend_from_slice(&[0x00, 0x90, *note, 90, 0x30, 0x80, *note, 0]);
        if i == 2 {
            melody.extend_from_slice(&[0x00, 0xB0, 7, 100]);
        }
    }
    melody.extend_from_slice(&EOT);
    let conductor = [
        0x00, 0xFF, 0x03, 0x04, b'T', b'e', b's', b't', //
        0x60, 0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40, // slow down at tick 96
        0x00, 0xFF, 0x2F, 0x00,
    ];
    MidiWriter::smf(1, 96, &[&conductor, &melody])
}

fn nested_loop_song() -> Vec<u8> {
    let track = [
        0x00, 0xFF, 0xE4, 0x01, 0x02, // outer x2
        0x10, 0xFF, 0xE4, 0x01, 0x02, // inner x2
        0x00, 0x90, 60, 100, //
        0x30, 0x80, 60, 0, //
        0x00, 0xFF, 0xE5, 0x00, // inner end
        0x30, 0xFF, 0xE5, 0x00, // outer end
        0x00, 0xFF, 0x2F, 0x00,
    ];
    MidiWriter::smf(0, 96, &[&track])
}

fn mus_file(score: &[u8]) -> Vec<u8> {
    let mut data = b"MUS\x1A".to_vec();
    for v in [score.len() as u16, 16, 1, 0, 0, 0] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    data.extend_from_slice(score);
    data
}

#[test]
fn fresh_load_starts_at_zero() {
    for data in [single_note_song(), arpeggio_song(), nested_loop_song()] {
        let mut seq = MidiSequencer::new(NullOutput);
        seq.load_midi(&data).unwrap();
        assert_eq!(seq.tell(), 0.0);
        assert!(!seq.position_at_end());
        assert!(seq.error_string().is_empty());
        assert_eq!(seq.source_format(), Some(SourceFormat::Midi));
    }
}

#[test]
fn rewind_after_play_and_seek() {
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&arpeggio_song()).unwrap();
    seq.set_loop_enabled(false);
    seq.tick(0.0, 0.001);
    seq.tick(0.7, 0.001);
    seq.seek(1.1, 0.001);
    while !seq.position_at_end() {
        seq.tick(0.1, 0.001);
    }

    seq.rewind();
    assert_eq!(seq.tell(), 0.0);
    assert!(!seq.position_at_end());
}

#[test]
fn seek_lands_within_granularity() {
    let granularity = 0.01;
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&arpeggio_song()).unwrap();
    let length = seq.time_length();
    assert!(length > 1.0);

    let mut last = -1.0;
    let mut t = 0.0;
    while t < length {
        seq.seek(t, granularity);
        let pos = seq.tell();
        assert!((pos - t).abs() <= granularity, "seek({t}) landed at {pos}");
        assert!(pos >= last);
        last = pos;
        t += 0.125;
    }
}

#[test]
fn nested_loops_leave_stack_balanced() {
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&nested_loop_song()).unwrap();
    seq.set_loops_count(1);
    let mut guard = 0;
    while !seq.position_at_end() {
        seq.tick(0.01, 0.001);
        guard += 1;
        assert!(guard < 10_000);
    }
    assert_eq!(seq.loop_stack_level(), -1);
}

#[test]
fn mus_round_trip_has_one_note_pair() {
    // Channel 0: key on 60 vel 100, wait 10; key off 60; score end
    let score = [0x90, 0x80 | 60, 100, 10, 0x00, 60, 0x60];
    let midi = convert_mus_to_midi(&mus_file(&score), MUS_DEFAULT_FREQUENCY).unwrap();
    assert_eq!(parse_smf(&midi).unwrap().tracks.len(), 1);

    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&mus_file(&score)).unwrap();
    assert_eq!(seq.source_format(), Some(SourceFormat::Mus));

    let rows = seq.track_rows(0).unwrap();
    let events: Vec<&MidiEvent> = rows.iter().flat_map(|r| r.events.iter()).collect();
    let ons: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, MidiEvent::NoteOn { .. }))
        .collect();
    let offs: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, MidiEvent::NoteOff { .. }))
        .collect();
    assert_eq!(ons.len(), 1);
    assert_eq!(offs.len(), 1);
    assert_eq!(ons[0].channel(), Some(0));
    assert_eq!(offs[0].channel(), Some(0));
}

#[test]
fn truncated_header_fails_load() {
    let mut seq = MidiSequencer::new(NullOutput);
    assert!(seq.load_midi(b"MThd\x00").is_err());
    assert!(!seq.error_string().is_empty());
    assert!(seq.position_at_end());
    assert_eq!(seq.track_count(), 0);
}

#[test]
fn bad_load_replaces_previous_song() {
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&single_note_song()).unwrap();
    assert_eq!(seq.track_count(), 1);
    assert!(seq.load_midi(b"not music at all").is_err());
    assert_eq!(seq.track_count(), 0);

    seq.load_midi(&single_note_song()).unwrap();
    assert!(seq.error_string().is_empty());
}

#[test]
fn oversized_delta_fails_load_without_panicking() {
    let mut track = vec![0x00, 0x90, 0x3C, 0x64];
    for note in [[0x80, 0x3C, 0x00], [0x90, 0x3E, 0x64]] {
        track.push(0x81);
        track.extend_from_slice(&[0xFF; 8]);
        track.push(0x7F);
        track.extend_from_slice(&note);
    }
    track.extend_from_slice(&EOT);

    let mut seq = MidiSequencer::new(NullOutput);
    assert!(seq.load_midi(&MidiWriter::smf(0, 96, &[&track])).is_err());
    assert!(seq.error_string().contains("longer than 4 bytes"));
    assert!(seq.position_at_end());
}

#[test]
fn quarter_note_at_120_bpm_is_half_a_second() {
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&single_note_song()).unwrap();
    let rows = seq.track_rows(0).unwrap();
    let time_of = |pred: fn(&MidiEvent) -> bool| {
        rows.iter()
            .find(|r| r.events.iter().any(pred))
            .map(|r| r.time)
            .unwrap()
    };
    let on = time_of(|e| matches!(e, MidiEvent::NoteOn { .. }));
    let off = time_of(|e| matches!(e, MidiEvent::NoteOff { .. }));
    assert_eq!(off - on, 0.5);
    assert_relative_eq!(seq.time_length(), 1.5);
}

#[test]
fn hmi_controllers_become_loop_points() {
    let track = [
        0x00, 0xB0, 110, 0, // loop start
        0x00, 0x90, 60, 100, //
        0x60, 0x80, 60, 0, //
        0x00, 0xB0, 111, 0, // loop end
        0x00, 0xFF, 0x2F, 0x00,
    ];
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&MidiWriter::smf(0, 96, &[&track])).unwrap();
    assert_eq!(seq.loop_format(), LoopFormat::Hmi);

    let kinds: Vec<MetaKind> = seq
        .track_rows(0)
        .unwrap()
        .iter()
        .flat_map(|r| r.events.iter())
        .filter_map(MidiEvent::meta_kind)
        .filter(|k| matches!(k, MetaKind::LoopStart | MetaKind::LoopEnd))
        .collect();
    assert_eq!(kinds, vec![MetaKind::LoopStart, MetaKind::LoopEnd]);
    assert_relative_eq!(seq.loop_start_time(), 0.0);
    assert_relative_eq!(seq.loop_end_time(), 0.5);
}

#[test]
fn metadata_is_exposed() {
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&arpeggio_song()).unwrap();
    assert_eq!(seq.music_title(), "Test");
    assert_eq!(seq.track_count(), 2);
}
