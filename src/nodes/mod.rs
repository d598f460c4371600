//! Built-in audio nodes.
//!
//! Nodes are organized into two categories:
//!
//! ## Sources ([`source`])
//!
//! Generate a signal with no audio inputs:
//! - [`ToneOscillator`] - Band-limited sawtooth, the audible voice
//! - [`ControlOscillator`] - Sine LFO, only ever used as a modulation source
//! - [`ConstantSource`] - DC offset for shifting bipolar signals
//!
//! ## Effects ([`effect`])
//!
//! Process a signal (input → output):
//! - [`Gain`] - Multiplier, for audio levels and modulation depth alike
//! - [`Delay`] - Modulated delay line, the only node allowed inside a feedback cycle
//!
//! All of them are stored in a graph as a [`NodeVariant`].

pub mod source;
pub mod effect;

pub use source::{ConstantSource, ControlOscillator, ToneOscillator};
pub use effect::{Delay, Gain};

use core::convert::TryInto;

use dasp_graph::Buffer;

use crate::node::{AudioNode, NodeKind, ParamSpec, ProcessContext};

/// Closed set of node types a graph can hold.
#[enum_delegate::implement(AudioNode,
    pub trait AudioNode {
        fn kind(&self) -> NodeKind;
        fn param_specs(&self) -> &[ParamSpec];
        fn start(&mut self);
        fn process(&mut self, ctx: &ProcessContext, input: &Buffer, params: &[Buffer], output: &mut Buffer);
        fn is_delay_line(&self) -> bool;
        fn absorb(&mut self, ctx: &ProcessContext, input: &Buffer);
    }
)]
pub enum NodeVariant {
    Tone(ToneOscillator),
    Lfo(ControlOscillator),
    Constant(ConstantSource),
    Gain(Gain),
    Delay(Delay),
}
