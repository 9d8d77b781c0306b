//! Sample-clock bookkeeping for `play_stream`.

/// Tracks how far the PCM stream is ahead of the sequencer.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamTimer {
    /// Seconds of audio still to render before the next tick
    pub time_rest: f64,
    pub sample_rate: u32,
    /// Bytes per output frame
    pub frame_size: u32,
    /// Tick granularity, one sample period
    pub min_delay: f64,
    /// Wait returned by the last tick
    pub delay: f64,
}

impl StreamTimer {
    pub fn new(sample_rate: u32, frame_size: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            time_rest: 0.0,
            sample_rate,
            frame_size: frame_size.max(1),
            min_delay: 1.0 / sample_rate as f64,
            delay: 0.0,
        }
    }

    /// Change the output format; pending time is kept.
    pub fn set_format(&mut self, sample_rate: u32, frame_size: u32) {
        let sample_rate = sample_rate.max(1);
        self.sample_rate = sample_rate;
        self.frame_size = frame_size.max(1);
        self.min_delay = 1.0 / sample_rate as f64;
    }

    pub fn reset(&mut self) {
        self.time_rest = 0.0;
        self.delay = 0.0;
    }
}

impl Default for StreamTimer {
    fn default() -> Self {
        Self::new(44100, 2)
    }
}
