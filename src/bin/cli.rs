//! midiseq CLI: headless playback with an event dump.
//!
//! Usage:
//!   cargo run --bin ms-cli -- path/to/song.mid
//!   cargo run --bin ms-cli -- path/to/song.mus --loops 2 --seek 10.5 --realtime
//!
//! Set `RUST_LOG=debug` for parser and sequencer logging.

use midiseq::{MetaKind, MidiOutput, MidiSequencer};
use std::io::Write;
use std::time::Duration;
use std::{env, fs};
use tracing_subscriber::EnvFilter;

/// Prints every dispatched message, stamped with the current song time.
struct PrintOutput {
    time: f64,
}

impl PrintOutput {
    fn line(&self, text: std::fmt::Arguments<'_>) {
        println!("{:9.3}  {}", self.time, text);
    }
}

impl MidiOutput for PrintOutput {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.line(format_args!("ch{channel:<2} note on   {note:3} vel {velocity}"));
    }
    fn note_off(&mut self, channel: u8, note: u8) {
        self.line(format_args!("ch{channel:<2} note off  {note:3}"));
    }
    fn note_aftertouch(&mut self, channel: u8, note: u8, pressure: u8) {
        self.line(format_args!("ch{channel:<2} key touch {note:3} = {pressure}"));
    }
    fn channel_aftertouch(&mut self, channel: u8, pressure: u8) {
        self.line(format_args!("ch{channel:<2} aftertouch {pressure}"));
    }
    fn controller_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.line(format_args!("ch{channel:<2} cc {controller:3} = {value}"));
    }
    fn patch_change(&mut self, channel: u8, patch: u8) {
        self.line(format_args!("ch{channel:<2} program {patch}"));
    }
    fn pitch_bend(&mut self, channel: u8, msb: u8, lsb: u8) {
        let value = ((msb as u16) << 7) | lsb as u16;
        self.line(format_args!("ch{channel:<2} pitch bend {value}"));
    }
    fn system_exclusive(&mut self, data: &[u8]) {
        self.line(format_args!("sysex {} bytes", data.len()));
    }
    fn meta_event(&mut self, track: usize, kind: MetaKind, data: &[u8]) {
        if matches!(kind, MetaKind::Marker | MetaKind::Text | MetaKind::Lyrics) {
            let text = String::from_utf8_lossy(data);
            self.line(format_args!("trk{track:<2} {kind:?}: {text}"));
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let path = args.get(1).unwrap_or_else(|| {
        eprintln!(
            "Usage: ms-cli <file.mid|file.rmi|file.mus> [--loops N] [--seek SECONDS] [--realtime]"
        );
        std::process::exit(1);
    });

    let option = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let loops: i32 = option("--loops").and_then(|v| v.parse().ok()).unwrap_or(1);
    let seek: Option<f64> = option("--seek").and_then(|v| v.parse().ok());
    let realtime = args.iter().any(|a| a == "--realtime");

    let data = fs::read(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        std::process::exit(1);
    });

    let mut seq = MidiSequencer::new(PrintOutput { time: 0.0 });
    seq.hooks_mut().on_debug_message = Some(Box::new(|msg: &str| eprintln!("{msg}")));
    if seq.load_midi(&data).is_err() {
        eprintln!("Failed to load {}: {}", path, seq.error_string());
        std::process::exit(1);
    }
    seq.set_loops_count(loops);

    println!("Format:    {:?}", seq.source_format());
    println!("Title:     {}", seq.music_title());
    println!("Copyright: {}", seq.music_copyright());
    println!("Tracks:    {}", seq.track_count());
    for (i, title) in seq.track_titles().iter().enumerate() {
        println!("  {:2}: {}", i, title);
    }
    println!("Length:    {:.3} s", seq.time_length());
    if seq.loop_start_time() >= 0.0 {
        println!(
            "Loop:      {:.3} s .. {:.3} s",
            seq.loop_start_time(),
            seq.loop_end_time()
        );
    }
    for marker in seq.markers() {
        println!("Marker:    {:.3} s  {}", marker.pos_time, marker.label);
    }
    println!();

    if let Some(target) = seek {
        let wait = seq.seek(target, 0.001);
        println!("Seeked to {:.3} s, next event in {:.3} s", seq.tell(), wait);
    }

    let step = 0.01;
    while !seq.position_at_end() {
        let now = seq.tell();
        seq.output_mut().time = now;
        seq.tick(step, 0.001);
        let _ = std::io::stdout().flush();
        if realtime {
            std::thread::sleep(Duration::from_secs_f64(step));
        }
    }

    println!("Done at {:.3} s.", seq.tell());
}
