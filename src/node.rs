//! Core node trait and context types.

use dasp_graph::Buffer;

/// Number of frames in every processing block.
pub const BLOCK_SIZE: usize = Buffer::LEN;

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call. Contains the engine's sample
/// rate, the block size and the engine time at the first frame of the block.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the engine in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of samples per buffer (always [`BLOCK_SIZE`])
    pub buffer_size: usize,
    /// Engine time in seconds at the start of this block
    pub time: f64,
}

/// Unique identifier for a node within a graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a node is. The patch only ever uses these five.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
    ToneOscillator,
    ControlOscillator,
    ConstantSource,
    Gain,
    Delay,
}

impl NodeKind {
    /// Whether the node accepts an audio (or control-as-audio) input stream.
    pub fn has_audio_input(self) -> bool {
        matches!(self, NodeKind::Gain | NodeKind::Delay)
    }

    /// Sources whose output is only meaningful as a modulation signal.
    pub fn is_control_only(self) -> bool {
        matches!(self, NodeKind::ControlOscillator | NodeKind::ConstantSource)
    }

    /// Nodes with a running phase that is reset when the engine starts.
    pub fn is_periodic(self) -> bool {
        matches!(self, NodeKind::ToneOscillator | NodeKind::ControlOscillator)
    }
}

/// Named, automatable parameters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ParamName {
    /// Oscillator frequency in Hz
    Frequency,
    /// Linear multiplier
    Gain,
    /// Delay time in seconds
    DelayTime,
    /// Constant output value
    Offset,
}

/// Declares a parameter, its starting value and the range its evaluated
/// value is clamped to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: ParamName,
    pub initial: f32,
    pub min: f32,
    pub max: f32,
}

impl ParamSpec {
    pub const fn new(name: ParamName, initial: f32, min: f32, max: f32) -> Self {
        Self { name, initial, min, max }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.max(self.min).min(self.max)
    }
}

/// The core trait for audio processing nodes.
///
/// Nodes never see parameter messages directly. The engine resolves each
/// declared parameter into a per-sample buffer (ramped base value plus any
/// control connections, clamped to the [`ParamSpec`] range) and hands those
/// to [`process`](Self::process) in declaration order.
///
/// Nodes that introduce latency (the delay line) are split in two phases:
/// `process` produces this block's output from state written in earlier
/// blocks, then [`absorb`](Self::absorb) receives this block's input once
/// every other node has run. That split is what lets a feedback cycle be
/// computed one block at a time.
pub trait AudioNode: Send + 'static {
    fn kind(&self) -> NodeKind;

    /// Parameters this node exposes, in the order `process` receives them.
    fn param_specs(&self) -> &[ParamSpec];

    /// Reset any running phase so the node starts from a known origin.
    fn start(&mut self);

    /// Process one block of audio.
    ///
    /// - `ctx` - Sample rate, buffer size and block start time
    /// - `input` - Sum of all audio connections into this node (silence for sources)
    /// - `params` - One resolved buffer per entry of [`param_specs`](Self::param_specs)
    /// - `output` - Buffer to fill
    fn process(&mut self, ctx: &ProcessContext, input: &Buffer, params: &[Buffer], output: &mut Buffer);

    /// Whether this node delays its input by at least one block.
    fn is_delay_line(&self) -> bool;

    /// Take this block's input after the whole graph has been evaluated.
    ///
    /// Only called for nodes where [`is_delay_line`](Self::is_delay_line) is true.
    fn absorb(&mut self, ctx: &ProcessContext, input: &Buffer);
}
