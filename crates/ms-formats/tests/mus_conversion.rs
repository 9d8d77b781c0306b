//! Integration tests for MUS loading through the SMF parser.

use ms_formats::{
    convert_mus_to_midi, load_music, EventParser, FormatError, SourceFormat, TrackReader,
};
use ms_ir::{MetaKind, MidiEvent};

fn mus_file(score: &[u8], channels: u16) -> Vec<u8> {
    let mut data = b"MUS\x1A".to_vec();
    for v in [score.len() as u16, 16, channels, 0, 0] {
        data.extend_from_slice(&v.to_le_bytes());
    }
    // Two bytes of padding before the score
    data.extend_from_slice(&[0, 0]);
    data.extend_from_slice(score);
    data
}

#[test]
fn mus_notes_convert_to_midi_events() {
    // ch1: key on 64 vel 80, delay 35; key off; end
    let score = [0x91, 0x80 | 64, 80, 35, 0x01, 64, 0x60];
    let (smf, format) = load_music(&mus_file(&score, 2), 140).unwrap();
    assert_eq!(format, SourceFormat::Mus);
    assert_eq!(smf.format, 0);
    assert_eq!(smf.division, 0x59);
    assert_eq!(smf.tracks.len(), 1);

    let mut parser = EventParser::new();
    let mut r = TrackReader::new(&smf.tracks[0]);
    let mut events = Vec::new();
    while let Ok(delta) = r.read_var_len() {
        let event = parser.parse_event(&mut r).unwrap();
        let end = event.is_meta(MetaKind::EndTrack);
        events.push((delta, event));
        if end {
            break;
        }
    }

    let notes: Vec<_> = events
        .iter()
        .filter(|(_, e)| matches!(e, MidiEvent::NoteOn { .. } | MidiEvent::NoteOff { .. }))
        .cloned()
        .collect();
    // The first melodic MUS channel lands on MIDI channel 0
    assert_eq!(
        notes,
        vec![
            (
                0,
                MidiEvent::NoteOn {
                    channel: 0,
                    note: 64,
                    velocity: 80
                }
            ),
            (
                35,
                MidiEvent::NoteOff {
                    channel: 0,
                    note: 64,
                    velocity: 0x7F
                }
            ),
        ]
    );
    assert!(events[0].1.is_meta(MetaKind::TempoChange));
}

#[test]
fn conversion_is_deterministic() {
    let score = [0x10, 60, 0x40, 3, 90, 0x60];
    let a = convert_mus_to_midi(&mus_file(&score, 1), 140).unwrap();
    let b = convert_mus_to_midi(&mus_file(&score, 1), 140).unwrap();
    assert_eq!(a, b);
}

#[test]
fn oversized_delay_is_rejected() {
    // ch0 key on 60 with a delay of eight continuation bytes
    let mut score = vec![0x90, 0x3C, 0x81];
    score.extend_from_slice(&[0xFF; 8]);
    score.extend_from_slice(&[0x7F, 0x60]);
    assert!(matches!(
        convert_mus_to_midi(&mus_file(&score, 1), 140),
        Err(FormatError::Parse(_))
    ));
}

#[test]
fn delay_that_outgrows_smf_range_is_rejected() {
    // Largest four-byte delay, doubled by a 70 Hz tick rate
    let score = [0x90, 0x3C, 0xFF, 0xFF, 0xFF, 0x7F, 0x00, 0x3C, 0x60];
    assert!(convert_mus_to_midi(&mus_file(&score, 1), 140).is_ok());
    assert!(matches!(
        convert_mus_to_midi(&mus_file(&score, 1), 70),
        Err(FormatError::Parse(_))
    ));
}

#[test]
fn measure_end_only_adds_its_delay() {
    // key on 60, delay 10; measure end, delay 5; key off 60; end
    let score = [0x90, 60, 10, 0xD0, 5, 0x00, 60, 0x60];
    let midi = convert_mus_to_midi(&mus_file(&score, 1), 140).unwrap();
    let body = &midi[33..];
    assert_eq!(
        body,
        &[
            0x00, 0xB0, 0x07, 0x7F, 0x00, 0x90, 60, 0x7F, // volume reset + key on
            15, 0x80, 60, 0x7F, // key off after both delays
            0x00, 0xFF, 0x2F, 0x00,
        ]
    );
}
