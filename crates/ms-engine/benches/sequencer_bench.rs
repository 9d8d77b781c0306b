//! Benchmarks for timeline building and playback
//!
//! Run with: cargo bench --bench sequencer_bench -p ms-engine

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ms_engine::{MidiSequencer, NullOutput};
use ms_formats::MidiWriter;
use std::hint::black_box;

/// A busy multi-track song: `tracks` channels of sixteenth notes.
fn busy_song(tracks: usize, bars: usize) -> Vec<u8> {
    let bodies: Vec<Vec<u8>> = (0..tracks)
        .map(|tk| {
            let mut w = MidiWriter::new();
            let channel = (tk % 16) as u8;
            for step in 0..bars * 16 {
                let note = 36 + ((step * 7 + tk * 3) % 48) as u8;
                w.write_var_len(0);
                w.write_bytes(&[0x90 | channel, note, 100]);
                w.write_var_len(24);
                w.write_bytes(&[0x80 | channel, note, 0]);
            }
            w.write_bytes(&[0x00, 0xFF, 0x2F, 0x00]);
            w.into_bytes()
        })
        .collect();
    let refs: Vec<&[u8]> = bodies.iter().map(Vec::as_slice).collect();
    MidiWriter::smf(1, 96, &refs)
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for tracks in [1usize, 8, 16].iter() {
        let data = busy_song(*tracks, 32);
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &data, |b, data| {
            let mut seq = MidiSequencer::new(NullOutput);
            b.iter(|| {
                seq.load_midi(black_box(data)).unwrap();
                black_box(seq.time_length());
            });
        });
    }

    group.finish();
}

fn bench_playback(c: &mut Criterion) {
    let data = busy_song(16, 32);
    let mut seq = MidiSequencer::new(NullOutput);
    seq.load_midi(&data).unwrap();
    seq.set_loop_enabled(false);

    c.bench_function("tick_whole_song", |b| {
        b.iter(|| {
            seq.rewind();
            while !seq.position_at_end() {
                black_box(seq.tick(0.005, 0.0001));
            }
        });
    });

    let length = seq.time_length();
    c.bench_function("seek_mid_song", |b| {
        b.iter(|| black_box(seq.seek(black_box(length * 0.5), 0.0001)));
    });

    let mut buffer = vec![0u8; 4096];
    c.bench_function("play_stream_4k", |b| {
        b.iter(|| {
            if seq.position_at_end() {
                seq.rewind();
            }
            black_box(seq.play_stream(&mut buffer));
        });
    });
}

criterion_group!(benches, bench_load, bench_playback);
criterion_main!(benches);
