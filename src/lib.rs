//! Schwebung - a vibrato saw through a modulated feedback delay
//!
//! Design principles:
//! - The graph is built and validated once; its topology never changes after
//! - Exactly one feedback cycle is allowed, and it must pass through a delay line
//! - Parameters move only along ramps, scheduled from the control side
//! - Control and render talk through a lock-free queue and atomics, nothing else
//! - The render path never blocks, never allocates and never logs
//!
//! The quickest way in is [`synth::FeedbackSynth`], which builds the whole
//! patch. [`graph::SignalGraph`] and [`engine::RenderEngine`] are the pieces
//! underneath, usable on their own.
//!
//! ```
//! use schwebung::engine::EngineConfig;
//! use schwebung::synth::{FeedbackSynth, SynthSettings};
//!
//! let (mut synth, mut engine) = FeedbackSynth::build(EngineConfig::new(48_000), SynthSettings::default()).unwrap();
//! synth.activate().unwrap();
//! synth.set_master_gain_db(-12.0).unwrap();
//! synth.set_feedback(40.0).unwrap();
//!
//! let mut out = [0.0f32; 512];
//! engine.render(&mut out).unwrap();
//! ```

extern crate alloc;

pub mod automation;
pub mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod param;
pub mod router;
pub mod synth;
pub mod units;

#[cfg(feature = "cpal_sink")]
pub mod device;

pub use automation::{AutomationRequest, ParamMonitor};
pub use engine::{Controller, EngineClock, EngineConfig, EngineState, RenderEngine};
pub use error::{EngineError, GraphError};
pub use graph::{Connection, Port, SignalGraph};
pub use node::{AudioNode, NodeId, NodeKind, ParamName, ParamSpec, ProcessContext, BLOCK_SIZE};
pub use param::{Curve, Ramp};
pub use router::{ModulationPath, ModulationRouter};
pub use synth::{FeedbackSynth, SynthSettings};
pub use units::{amplitude_to_db, db_to_amplitude};

#[cfg(feature = "cpal_sink")]
pub use device::{CpalDevice, OutputStream};
