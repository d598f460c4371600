//! Error types for graph construction and the control surface.
//!
//! Nothing in here is ever produced in the middle of a render block. Invalid
//! ramp input and out-of-range values are clamped, not reported; only
//! structural problems (bad topology) and calls that are outright impossible
//! (talking to a closed engine) surface as errors.

use thiserror::Error;

use crate::engine::EngineState;
use crate::node::{NodeId, ParamName};

/// Problems found while validating a [`SignalGraph`](crate::graph::SignalGraph).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node {0:?} does not exist in this graph")]
    UnknownNode(NodeId),

    #[error("node {node:?} ({label}) has no audio input")]
    NoAudioInput { node: NodeId, label: String },

    #[error("node {node:?} has no {param:?} parameter")]
    UnknownParameter { node: NodeId, param: ParamName },

    #[error("no output node was designated")]
    NoOutput,

    #[error("node {0:?} only produces a control signal and cannot be the output")]
    ControlSignalAtOutput(NodeId),

    #[error("graph contains at least {0} feedback cycles, at most one is allowed")]
    MultipleCycles(usize),

    #[error("feedback cycle through [{0}] has no delay node")]
    CycleWithoutDelay(String),
}

/// Failures reported back to the control context.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("cannot {operation} while the engine is {state:?}")]
    LifecycleViolation {
        operation: &'static str,
        state: EngineState,
    },

    #[error("node {node:?} has no {param:?} parameter")]
    UnknownParameter { node: NodeId, param: ParamName },

    #[error("value for {param:?} is not a number")]
    NonFiniteValue { param: ParamName },

    #[error("automation queue is full")]
    QueueFull,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[cfg(feature = "cpal_sink")]
    #[error("audio device error: {0}")]
    Device(String),
}
