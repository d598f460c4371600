//! The feedback chorus patch
//!
//! A sawtooth with vibrato runs into a delay line whose output is fed back
//! into itself and whose delay time is swept by a second LFO through a
//! [`ModulationRouter`]. Dry and wet signals meet at the master gain:
//!
//! ```text
//! vibrato ─> vibrato.depth ─> saw.frequency
//! saw ─┬──────────────────────────────> master ─> out
//!      └─> delay ─┬─────────────────────^
//!            ^    └─> feedback ─┐
//!            └──────────────────┘
//! chorus ─> chorus.scale(+offset) ─> chorus.depth ─> delay.delay_time
//! ```
//!
//! [`FeedbackSynth`] is the control surface for it. Every setter takes the
//! units a user would (dBFS, Hz, ms, percent) and turns them into a short
//! ramp so nothing clicks.

use delegate::delegate;
use tracing::debug;

use crate::engine::{Controller, EngineConfig, EngineState, RenderEngine};
use crate::error::{EngineError, GraphError};
use crate::graph::SignalGraph;
use crate::node::{NodeId, ParamName};
use crate::nodes::{ControlOscillator, Delay, Gain, ToneOscillator};
use crate::param::Curve;
use crate::router::{ModulationPath, ModulationRouter};
use crate::units::{amplitude_to_db, db_to_amplitude};

/// Ramp for anything the ear would notice jumping.
pub const SHORT_RAMP: f64 = 0.010;
/// Ramp for delay time and modulation depth, which pitch-shift while moving.
pub const SLOW_RAMP: f64 = 0.200;

/// Largest feedback gain the loop is allowed to reach.
pub const MAX_FEEDBACK: f32 = 0.95;
/// Largest vibrato deviation, in Hz.
pub const MAX_VIBRATO_DEPTH: f32 = 1_000.0;

/// Initial values of the patch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthSettings {
    pub frequency: f32,
    pub vibrato_rate: f32,
    pub vibrato_depth: f32,
    pub mod_rate: f32,
    pub mod_depth: f32,
    pub unit_scale: f32,
    pub delay_time: f32,
    pub max_delay: f32,
    pub feedback: f32,
    pub master_gain: f32,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            vibrato_rate: 5.0,
            vibrato_depth: 0.0,
            mod_rate: 5.0,
            mod_depth: 0.0,
            unit_scale: crate::router::DEFAULT_UNIT_SCALE,
            delay_time: 0.125,
            max_delay: 1.0,
            feedback: 0.0,
            master_gain: 0.125,
        }
    }
}

impl SynthSettings {
    pub fn with_frequency(mut self, hz: f32) -> Self {
        self.frequency = hz;
        self
    }

    pub fn with_vibrato(mut self, rate: f32, depth: f32) -> Self {
        self.vibrato_rate = rate;
        self.vibrato_depth = depth;
        self
    }

    pub fn with_modulation(mut self, rate: f32, depth: f32) -> Self {
        self.mod_rate = rate;
        self.mod_depth = depth;
        self
    }

    pub fn with_delay(mut self, seconds: f32, feedback: f32) -> Self {
        self.delay_time = seconds;
        self.feedback = feedback;
        self
    }

    pub fn with_max_delay(mut self, seconds: f32) -> Self {
        self.max_delay = seconds;
        self
    }

    pub fn with_master_gain(mut self, gain: f32) -> Self {
        self.master_gain = gain;
        self
    }
}

/// Node ids of the patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchNodes {
    pub saw: NodeId,
    pub vibrato: NodeId,
    pub vibrato_depth: NodeId,
    pub chorus: NodeId,
    pub modulation: ModulationPath,
    pub delay: NodeId,
    pub feedback: NodeId,
    pub master: NodeId,
}

/// Build the patch graph for `sample_rate`.
pub fn patch(settings: &SynthSettings, sample_rate: u32) -> Result<(SignalGraph, PatchNodes, ModulationRouter), GraphError> {
    let mut g = SignalGraph::new();

    let saw = g.add("saw", ToneOscillator::new(settings.frequency));
    let vibrato = g.add("vibrato", ControlOscillator::new(settings.vibrato_rate));
    let vibrato_depth = g.add(
        "vibrato.depth",
        Gain::new(settings.vibrato_depth).with_range(0.0, MAX_VIBRATO_DEPTH),
    );
    let chorus = g.add("chorus", ControlOscillator::new(settings.mod_rate));
    let delay = g.add("delay", Delay::new(settings.delay_time, settings.max_delay, sample_rate));
    let feedback = g.add("feedback", Gain::new(settings.feedback).with_range(0.0, MAX_FEEDBACK));
    let master = g.add("master", Gain::new(settings.master_gain));

    g.connect(vibrato, vibrato_depth)?;
    g.connect_param(vibrato_depth, saw, ParamName::Frequency)?;

    g.connect(saw, delay)?;
    g.connect(delay, feedback)?;
    g.connect(feedback, delay)?;

    let router = ModulationRouter::new(settings.unit_scale).with_depth(settings.mod_depth);
    let modulation = router.install(&mut g, "chorus", chorus, delay, ParamName::DelayTime)?;

    g.connect(saw, master)?;
    g.connect(delay, master)?;
    g.set_output(master)?;

    let nodes = PatchNodes {
        saw,
        vibrato,
        vibrato_depth,
        chorus,
        modulation,
        delay,
        feedback,
        master,
    };
    Ok((g, nodes, router))
}

/// Control surface of the feedback chorus patch.
///
/// Lives on the control side; the matching [`RenderEngine`] goes to the audio
/// callback.
pub struct FeedbackSynth {
    controller: Controller,
    nodes: PatchNodes,
    router: ModulationRouter,
}

impl FeedbackSynth {
    /// Build the patch and its engine. The engine starts out suspended.
    pub fn build(config: EngineConfig, settings: SynthSettings) -> Result<(FeedbackSynth, RenderEngine), EngineError> {
        let (graph, nodes, router) = patch(&settings, config.sample_rate)?;
        let (engine, controller) = RenderEngine::new(graph, config)?;
        debug!(sample_rate = config.sample_rate, ?settings, "feedback synth built");
        Ok((FeedbackSynth { controller, nodes, router }, engine))
    }

    delegate! {
        to self.controller {
            /// Start producing sound.
            pub fn activate(&self) -> Result<(), EngineError>;
            pub fn deactivate(&self) -> Result<(), EngineError>;
            pub fn close(&self);
            pub fn state(&self) -> EngineState;
            pub fn current_time(&self) -> f64;
        }
    }

    pub fn nodes(&self) -> &PatchNodes {
        &self.nodes
    }

    /// Lower-level access for custom automation.
    pub fn controller(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn set_master_gain_db(&mut self, db: f32) -> Result<(), EngineError> {
        let amplitude = db_to_amplitude(db);
        self.ramp(self.nodes.master, ParamName::Gain, amplitude, SHORT_RAMP, Curve::Exponential)
    }

    pub fn set_vibrato_rate(&mut self, hz: f32) -> Result<(), EngineError> {
        self.ramp(self.nodes.vibrato, ParamName::Frequency, hz, SHORT_RAMP, Curve::Exponential)
    }

    /// Vibrato deviation in Hz.
    pub fn set_vibrato_depth(&mut self, hz: f32) -> Result<(), EngineError> {
        self.ramp(self.nodes.vibrato_depth, ParamName::Gain, hz, SHORT_RAMP, Curve::Linear)
    }

    pub fn set_delay_time_ms(&mut self, ms: f32) -> Result<(), EngineError> {
        self.ramp(self.nodes.delay, ParamName::DelayTime, ms / 1000.0, SLOW_RAMP, Curve::Linear)
    }

    pub fn set_mod_rate(&mut self, hz: f32) -> Result<(), EngineError> {
        self.ramp(self.nodes.chorus, ParamName::Frequency, hz, SHORT_RAMP, Curve::Exponential)
    }

    /// Modulation depth in percent, 0 to 100.
    pub fn set_mod_depth(&mut self, percent: f32) -> Result<(), EngineError> {
        let depth = self.router.clamp_depth(percent / 100.0);
        self.ramp(self.nodes.modulation.depth, ParamName::Gain, depth, SLOW_RAMP, Curve::Exponential)
    }

    /// Feedback amount in percent, 0 to 95.
    pub fn set_feedback(&mut self, percent: f32) -> Result<(), EngineError> {
        let amount = (percent / 100.0).max(0.0).min(MAX_FEEDBACK);
        self.ramp(self.nodes.feedback, ParamName::Gain, amount, SHORT_RAMP, Curve::Linear)
    }

    /// Master gain in dBFS.
    pub fn master_gain_db_value(&self) -> Option<f32> {
        self.value(self.nodes.master, ParamName::Gain).map(amplitude_to_db)
    }

    pub fn vibrato_rate_value(&self) -> Option<f32> {
        self.value(self.nodes.vibrato, ParamName::Frequency)
    }

    pub fn vibrato_depth_value(&self) -> Option<f32> {
        self.value(self.nodes.vibrato_depth, ParamName::Gain)
    }

    pub fn delay_time_ms_value(&self) -> Option<f32> {
        self.value(self.nodes.delay, ParamName::DelayTime).map(|s| s * 1000.0)
    }

    pub fn mod_rate_value(&self) -> Option<f32> {
        self.value(self.nodes.chorus, ParamName::Frequency)
    }

    pub fn mod_depth_value(&self) -> Option<f32> {
        self.value(self.nodes.modulation.depth, ParamName::Gain).map(|d| d * 100.0)
    }

    pub fn feedback_value(&self) -> Option<f32> {
        self.value(self.nodes.feedback, ParamName::Gain).map(|g| g * 100.0)
    }

    fn ramp(&mut self, node: NodeId, param: ParamName, target: f32, seconds: f64, curve: Curve) -> Result<(), EngineError> {
        self.controller.set_parameter(node, param, target, seconds, curve)
    }

    fn value(&self, node: NodeId, param: ParamName) -> Option<f32> {
        self.controller.parameter_value(node, param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RATE: u32 = 48_000;

    fn synth() -> (FeedbackSynth, RenderEngine) {
        FeedbackSynth::build(EngineConfig::new(RATE), SynthSettings::default()).unwrap()
    }

    /// Render roughly `seconds` of audio.
    fn run(engine: &mut RenderEngine, seconds: f64) {
        let blocks = (seconds * RATE as f64 / crate::node::BLOCK_SIZE as f64).ceil() as usize;
        for _ in 0..blocks {
            engine.render_block().unwrap();
        }
    }

    #[test]
    fn patch_validates_with_its_feedback_loop() {
        let (g, nodes, _) = patch(&SynthSettings::default(), RATE).unwrap();
        let order = g.validate().unwrap();
        assert_eq!(order.len(), g.node_count());
        assert_eq!(g.output(), Some(nodes.master));
    }

    #[test]
    fn defaults_are_observable() {
        let (synth, mut engine) = synth();
        synth.activate().unwrap();
        engine.render_block().unwrap();

        assert_relative_eq!(synth.master_gain_db_value().unwrap(), -18.0618, epsilon = 1e-3);
        assert_relative_eq!(synth.delay_time_ms_value().unwrap(), 125.0, epsilon = 1e-3);
        assert_eq!(synth.feedback_value(), Some(0.0));
        assert_eq!(synth.mod_depth_value(), Some(0.0));
        assert_eq!(synth.vibrato_rate_value(), Some(5.0));
    }

    #[test]
    fn setters_ramp_to_their_targets() {
        let (mut synth, mut engine) = synth();
        synth.activate().unwrap();
        synth.set_master_gain_db(-12.0).unwrap();
        synth.set_delay_time_ms(250.0).unwrap();
        synth.set_vibrato_depth(8.0).unwrap();
        synth.set_mod_rate(0.5).unwrap();
        synth.set_mod_depth(40.0).unwrap();
        run(&mut engine, 0.3);

        assert_relative_eq!(synth.master_gain_db_value().unwrap(), -12.0, epsilon = 1e-3);
        assert_relative_eq!(synth.delay_time_ms_value().unwrap(), 250.0, epsilon = 1e-2);
        assert_relative_eq!(synth.vibrato_depth_value().unwrap(), 8.0, epsilon = 1e-4);
        assert_relative_eq!(synth.mod_rate_value().unwrap(), 0.5, epsilon = 1e-4);
        assert_relative_eq!(synth.mod_depth_value().unwrap(), 40.0, epsilon = 1e-3);
    }

    #[test]
    fn percentages_are_clamped() {
        let (mut synth, mut engine) = synth();
        synth.activate().unwrap();
        synth.set_feedback(150.0).unwrap();
        synth.set_mod_depth(250.0).unwrap();
        run(&mut engine, 0.3);

        assert_relative_eq!(synth.feedback_value().unwrap(), 95.0, epsilon = 1e-3);
        assert_relative_eq!(synth.mod_depth_value().unwrap(), 100.0, epsilon = 1e-3);

        synth.set_feedback(-20.0).unwrap();
        run(&mut engine, 0.05);
        assert_eq!(synth.feedback_value(), Some(0.0));
    }

    #[test]
    fn close_is_final() {
        let (mut synth, mut engine) = synth();
        synth.activate().unwrap();
        synth.close();
        assert_eq!(synth.state(), EngineState::Closed);
        assert!(synth.activate().is_err());
        assert!(synth.set_feedback(10.0).is_err());
        assert!(engine.render_block().is_err());
    }
}
