//! Low-frequency sine oscillator used as a modulation source

use dasp_graph::Buffer;
use crate::node::{AudioNode, NodeKind, ParamName, ParamSpec, ProcessContext};

/// Highest rate a control oscillator accepts, in Hz.
pub const MAX_LFO_FREQUENCY: f32 = 1_000.0;

/// A bipolar sine LFO, output range [-1, 1]
///
/// Never connected to the output directly; graph validation rejects that.
pub struct ControlOscillator {
    params: [ParamSpec; 1],
    phase: f32,
}

impl ControlOscillator {
    pub fn new(frequency: f32) -> Self {
        Self {
            params: [ParamSpec::new(ParamName::Frequency, frequency, 0.0, MAX_LFO_FREQUENCY)],
            phase: 0.0,
        }
    }
}

impl AudioNode for ControlOscillator {
    fn kind(&self) -> NodeKind {
        NodeKind::ControlOscillator
    }

    fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    fn start(&mut self) {
        self.phase = 0.0;
    }

    fn process(&mut self, ctx: &ProcessContext, _input: &Buffer, params: &[Buffer], output: &mut Buffer) {
        let inv_rate = 1.0 / ctx.sample_rate as f32;

        for (out, &freq) in output.iter_mut().zip(params[0].iter()) {
            *out = (self.phase * core::f32::consts::TAU).sin();
            self.phase += freq * inv_rate;
            self.phase -= (self.phase >= 1.0) as u32 as f32;
        }
    }

    fn is_delay_line(&self) -> bool {
        false
    }

    fn absorb(&mut self, _ctx: &ProcessContext, _input: &Buffer) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::BLOCK_SIZE;
    use approx::assert_relative_eq;

    #[test]
    fn quarter_cycle_peaks() {
        // 750 Hz at 48 kHz: 64 samples per cycle, so sample 16 is the peak.
        let ctx = ProcessContext { sample_rate: 48_000, buffer_size: BLOCK_SIZE, time: 0.0 };
        let mut lfo = ControlOscillator::new(750.0);
        let mut freq = Buffer::default();
        freq.iter_mut().for_each(|s| *s = 750.0);
        let mut out = Buffer::default();
        lfo.process(&ctx, &Buffer::default(), &[freq], &mut out);

        assert_relative_eq!(out[0], 0.0);
        assert_relative_eq!(out[16], 1.0, epsilon = 1e-4);
        assert_relative_eq!(out[48], -1.0, epsilon = 1e-4);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }
}
