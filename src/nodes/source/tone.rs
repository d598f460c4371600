//! Band-limited sawtooth oscillator

use dasp_graph::Buffer;
use crate::node::{AudioNode, NodeKind, ParamName, ParamSpec, ProcessContext};

/// Highest frequency the tone oscillator accepts, in Hz.
pub const MAX_TONE_FREQUENCY: f32 = 20_000.0;

/// An audible sawtooth oscillator (mono source)
///
/// The frequency parameter is read per sample, so a control connection into
/// it (vibrato) bends the pitch smoothly within a block.
pub struct ToneOscillator {
    params: [ParamSpec; 1],
    phase: f32,
}

impl ToneOscillator {
    pub fn new(frequency: f32) -> Self {
        Self {
            params: [ParamSpec::new(ParamName::Frequency, frequency, 0.0, MAX_TONE_FREQUENCY)],
            phase: 0.0,
        }
    }

    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }
}

/// PolyBLEP residual, smooths the discontinuity of a naive saw
#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

impl AudioNode for ToneOscillator {
    fn kind(&self) -> NodeKind {
        NodeKind::ToneOscillator
    }

    fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    fn start(&mut self) {
        self.phase = 0.0;
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &Buffer, params: &[Buffer], output: &mut Buffer) {
        let inv_rate = 1.0 / ctx.sample_rate as f32;
        let frequency = &params[0];

        for (out, &freq) in output.iter_mut().zip(frequency.iter()) {
            let dt = (freq * inv_rate).min(0.5);
            let naive = 2.0 * self.phase - 1.0;
            *out = if dt > 0.0 { naive - poly_blep(self.phase, dt) } else { naive };

            self.phase += dt;
            // Branchless phase wrap (phase is always positive)
            self.phase -= (self.phase >= 1.0) as u32 as f32;
        }
    }

    fn is_delay_line(&self) -> bool {
        false
    }

    fn absorb(&mut self, _ctx: &ProcessContext, _input: &Buffer) {}
}
