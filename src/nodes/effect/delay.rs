//! Modulated delay line, the node that makes feedback computable

use dasp_graph::Buffer;
use crate::node::{AudioNode, NodeKind, ParamName, ParamSpec, ProcessContext, BLOCK_SIZE};

/// Delay line with an automatable, per-sample delay time.
///
/// Reads happen in [`process`](AudioNode::process) and writes in
/// [`absorb`](AudioNode::absorb), after the rest of the graph has run. The
/// effective delay is clamped to `[BLOCK_SIZE, capacity)` frames, so every
/// sample read during block N was written in block N-1 or earlier.
///
/// Fractional delays are read with linear interpolation.
pub struct Delay {
    params: [ParamSpec; 1],
    buffer: Vec<f32>,
    /// Position the next absorbed block starts at
    write_pos: usize,
    /// Longest usable delay, in frames
    max_frames: f32,
}

impl Delay {
    /// Create a delay line able to hold `max_delay` seconds at `sample_rate`.
    pub fn new(delay_time: f32, max_delay: f32, sample_rate: u32) -> Self {
        let max_delay = max_delay.max(0.0);
        let max_frames = (max_delay * sample_rate as f32).ceil().max(BLOCK_SIZE as f32);
        // One extra block so a full-length read never lands on a slot
        // that is about to be overwritten, plus an interpolation guard.
        let len = max_frames as usize + BLOCK_SIZE + 2;

        Self {
            params: [ParamSpec::new(ParamName::DelayTime, delay_time, 0.0, max_delay)],
            buffer: vec![0.0; len],
            write_pos: 0,
            max_frames,
        }
    }

    /// Shortest delay this node produces, in frames.
    #[inline]
    pub fn min_delay_frames(&self) -> usize {
        BLOCK_SIZE
    }

    /// Longest delay this node produces, in frames.
    #[inline]
    pub fn max_delay_frames(&self) -> f32 {
        self.max_frames
    }

    /// Ring buffer length in frames.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Reset the delay buffer to silence
    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }

    /// Effective delay in frames for a delay time in seconds.
    #[inline]
    pub fn effective_delay(&self, seconds: f32, sample_rate: u32) -> f32 {
        (seconds * sample_rate as f32).max(BLOCK_SIZE as f32).min(self.max_frames)
    }
}

impl AudioNode for Delay {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    fn start(&mut self) {}

    fn process(&mut self, ctx: &ProcessContext, _input: &Buffer, params: &[Buffer], output: &mut Buffer) {
        let len = self.buffer.len();

        for (i, (out, &seconds)) in output.iter_mut().zip(params[0].iter()).enumerate() {
            let delay = self.effective_delay(seconds, ctx.sample_rate);
            let whole = delay.floor();
            let frac = delay - whole;

            // whole >= BLOCK_SIZE > i, so this is always before write_pos
            let newer = (self.write_pos + len + i - whole as usize) % len;
            let a = self.buffer[newer];
            *out = if frac > 0.0 {
                let older = self.buffer[(newer + len - 1) % len];
                a + (older - a) * frac
            } else {
                a
            };
        }
    }

    fn is_delay_line(&self) -> bool {
        true
    }

    fn absorb(&mut self, _ctx: &ProcessContext, input: &Buffer) {
        let len = self.buffer.len();
        for &sample in input.iter() {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % len;
        }
    }
}
