//! Gain stage, for audio or as a control-rate scaler

use dasp_graph::Buffer;
use crate::node::{AudioNode, NodeKind, ParamName, ParamSpec, ProcessContext};

/// Default upper bound for a gain stage (unity, 0 dBFS).
pub const DEFAULT_MAX_GAIN: f32 = 1.0;

/// Multiplies its input by the gain parameter, sample by sample.
///
/// The same node scales control signals: an LFO through a `Gain` of 12.0
/// yields ±12 Hz of vibrato when connected to a frequency parameter. Use
/// [`with_range`](Self::with_range) for anything that is not a plain
/// attenuator.
pub struct Gain {
    params: [ParamSpec; 1],
}

impl Gain {
    /// Create a new gain node with the specified gain value, range `[0, 1]`
    pub fn new(gain: f32) -> Self {
        Self {
            params: [ParamSpec::new(ParamName::Gain, gain, 0.0, DEFAULT_MAX_GAIN)],
        }
    }

    /// Set the range the gain is clamped to
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.params[0].min = min;
        self.params[0].max = max;
        self
    }

    #[inline]
    pub fn range(&self) -> (f32, f32) {
        (self.params[0].min, self.params[0].max)
    }
}

impl AudioNode for Gain {
    fn kind(&self) -> NodeKind {
        NodeKind::Gain
    }

    fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    fn start(&mut self) {}

    fn process(&mut self, _ctx: &ProcessContext, input: &Buffer, params: &[Buffer], output: &mut Buffer) {
        for ((out, &sample), &gain) in output.iter_mut().zip(input.iter()).zip(params[0].iter()) {
            *out = sample * gain;
        }
    }

    fn is_delay_line(&self) -> bool {
        false
    }

    fn absorb(&mut self, _ctx: &ProcessContext, _input: &Buffer) {}
}
