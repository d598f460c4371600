//! Constant (DC) control source

use dasp_graph::Buffer;
use crate::node::{AudioNode, NodeKind, ParamName, ParamSpec, ProcessContext};

/// Largest magnitude a constant source emits.
pub const MAX_OFFSET: f32 = 1_000.0;

/// Emits its offset parameter on every sample.
///
/// Used to shift a bipolar LFO up before it is scaled onto a parameter that
/// must not go negative.
pub struct ConstantSource {
    params: [ParamSpec; 1],
}

impl ConstantSource {
    pub fn new(offset: f32) -> Self {
        Self {
            params: [ParamSpec::new(ParamName::Offset, offset, -MAX_OFFSET, MAX_OFFSET)],
        }
    }
}

impl AudioNode for ConstantSource {
    fn kind(&self) -> NodeKind {
        NodeKind::ConstantSource
    }

    fn param_specs(&self) -> &[ParamSpec] {
        &self.params
    }

    fn start(&mut self) {}

    fn process(&mut self, _ctx: &ProcessContext, _input: &Buffer, params: &[Buffer], output: &mut Buffer) {
        output.copy_from_slice(&params[0]);
    }

    fn is_delay_line(&self) -> bool {
        false
    }

    fn absorb(&mut self, _ctx: &ProcessContext, _input: &Buffer) {}
}
