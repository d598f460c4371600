//! Automation scheduler - the only channel between control and render
//!
//! Parameter changes travel through a single-producer single-consumer ring
//! buffer ([`rtrb`]): the control context pushes, the render context pops at
//! the start of every block. Neither side ever waits on the other. Resolved
//! parameter values flow back through a table of atomics so a UI can show
//! what is actually playing.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering};

use hashbrown::HashMap;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::EngineError;
use crate::node::{NodeId, ParamName, ParamSpec};
use crate::param::{Curve, Param};

/// A fully resolved ramp request, ready for the render context.
///
/// Built by the [`Controller`](crate::engine::Controller); the node and
/// parameter are already indices so the render side never looks anything up.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutomationRequest {
    pub(crate) node: usize,
    pub(crate) slot: usize,
    pub(crate) target: f32,
    pub(crate) start_time: f64,
    pub(crate) duration: f64,
    pub(crate) curve: Curve,
}

impl AutomationRequest {
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    #[inline]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[inline]
    pub fn curve(&self) -> Curve {
        self.curve
    }
}

/// Create a connected scheduler/queue pair.
pub(crate) fn channel(capacity: usize) -> (Scheduler, AutomationQueue) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    (Scheduler { producer }, AutomationQueue { consumer })
}

/// Control-side end of the request queue.
pub(crate) struct Scheduler {
    producer: Producer<AutomationRequest>,
}

impl Scheduler {
    /// Queue a request. Lock-free, never blocks.
    pub fn submit(&mut self, request: AutomationRequest) -> Result<(), EngineError> {
        self.producer.push(request).map_err(|rtrb::PushError::Full(_)| EngineError::QueueFull)
    }

    /// Free slots left in the queue.
    pub fn capacity_left(&self) -> usize {
        self.producer.slots()
    }
}

/// Render-side end of the request queue.
pub(crate) struct AutomationQueue {
    consumer: Consumer<AutomationRequest>,
}

impl AutomationQueue {
    /// Apply every queued request, in submission order, at time `now`.
    pub fn drain_into(&mut self, params: &mut [Vec<Param>], now: f64) -> usize {
        let mut applied = 0;
        while let Ok(req) = self.consumer.pop() {
            if let Some(param) = params.get_mut(req.node).and_then(|p| p.get_mut(req.slot)) {
                param.schedule(now, req.target, req.start_time, req.duration, req.curve);
                applied += 1;
            }
        }
        applied
    }
}

/// Where a parameter lives in the render plan.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ParamSlot {
    pub node: usize,
    pub slot: usize,
    /// Index into the monitor table
    pub flat: usize,
    pub spec: ParamSpec,
}

/// Control-side lookup tables built once from the compiled graph.
pub(crate) struct ParamRegistry {
    slots: HashMap<(NodeId, ParamName), ParamSlot>,
    labels: HashMap<String, NodeId>,
}

impl ParamRegistry {
    /// Build from per-node parameter lists; also returns the monitor offset
    /// of each node's first parameter.
    pub fn new(params: &[Vec<Param>], labels: HashMap<String, NodeId>) -> (Self, Vec<usize>) {
        let mut slots = HashMap::new();
        let mut offsets = Vec::with_capacity(params.len());
        let mut flat = 0;
        for (node, list) in params.iter().enumerate() {
            offsets.push(flat);
            for (slot, param) in list.iter().enumerate() {
                let spec = *param.spec();
                slots.insert((NodeId(node as u32), spec.name), ParamSlot { node, slot, flat, spec });
                flat += 1;
            }
        }
        (Self { slots, labels }, offsets)
    }

    pub fn lookup(&self, node: NodeId, param: ParamName) -> Result<ParamSlot, EngineError> {
        self.slots
            .get(&(node, param))
            .copied()
            .ok_or(EngineError::UnknownParameter { node, param })
    }

    pub fn node_id(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Last resolved value of every parameter, shared lock-free between contexts.
///
/// The render context stores each parameter's ramp-resolved base value once
/// per block; any thread may read. Values are `f32` bit patterns in atomics.
#[derive(Clone)]
pub struct ParamMonitor {
    values: Arc<[AtomicU32]>,
}

impl ParamMonitor {
    pub(crate) fn new(params: &[Vec<Param>]) -> Self {
        let values: Vec<AtomicU32> = params
            .iter()
            .flatten()
            .map(|p| AtomicU32::new(p.peek(0.0).to_bits()))
            .collect();
        Self { values: values.into() }
    }

    #[inline]
    pub(crate) fn publish(&self, flat: usize, value: f32) {
        if let Some(cell) = self.values.get(flat) {
            cell.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn read(&self, flat: usize) -> Option<f32> {
        self.values.get(flat).map(|cell| f32::from_bits(cell.load(Ordering::Relaxed)))
    }
}
