//! Render engine, engine clock, lifecycle and the control-surface handle

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use dasp_graph::Buffer;
use tracing::{debug, info, warn};

use crate::automation::{self, AutomationQueue, AutomationRequest, ParamMonitor, ParamRegistry, Scheduler};
use crate::error::EngineError;
use crate::graph::SignalGraph;
use crate::node::{AudioNode, NodeId, ParamName, ProcessContext, BLOCK_SIZE};
use crate::nodes::NodeVariant;
use crate::param::{sanitize_duration, Curve, Param, PENDING_CAPACITY};

/// Lifecycle of an engine.
///
/// `Uninitialized → Suspended → Running ⇄ Suspended`, and from anywhere to
/// `Closed`, which is final.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Uninitialized = 0,
    Suspended = 1,
    Running = 2,
    Closed = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineState::Uninitialized,
            1 => EngineState::Suspended,
            2 => EngineState::Running,
            _ => EngineState::Closed,
        }
    }
}

/// State shared by the control and render contexts. Atomics only.
pub(crate) struct Lifecycle {
    state: AtomicU8,
    /// Mirror of the render clock, in frames
    frames: AtomicU64,
    sample_rate: u32,
}

impl Lifecycle {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: AtomicU8::new(EngineState::Uninitialized as u8),
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn now(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    /// Move to `to` if the current state is `from`.
    ///
    /// Returns the state that was observed.
    fn transition(&self, from: EngineState, to: EngineState) -> EngineState {
        match self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire) {
            Ok(prev) | Err(prev) => EngineState::from_u8(prev),
        }
    }

    pub fn initialize(&self) -> EngineState {
        self.transition(EngineState::Uninitialized, EngineState::Suspended)
    }

    pub fn activate(&self) -> Result<(), EngineError> {
        match self.transition(EngineState::Suspended, EngineState::Running) {
            EngineState::Suspended => {
                info!("engine running");
                Ok(())
            }
            EngineState::Running => Ok(()),
            state => Err(EngineError::LifecycleViolation { operation: "activate", state }),
        }
    }

    pub fn deactivate(&self) -> Result<(), EngineError> {
        match self.transition(EngineState::Running, EngineState::Suspended) {
            EngineState::Running => {
                info!("engine suspended");
                Ok(())
            }
            EngineState::Suspended => Ok(()),
            state => Err(EngineError::LifecycleViolation { operation: "deactivate", state }),
        }
    }

    pub fn close(&self) {
        let prev = EngineState::from_u8(self.state.swap(EngineState::Closed as u8, Ordering::AcqRel));
        if prev != EngineState::Closed {
            info!(from = ?prev, "engine closed");
        }
    }
}

/// Monotonic render-time counter, advanced one block at a time.
#[derive(Clone, Copy, Debug)]
pub struct EngineClock {
    frames: u64,
    sample_rate: u32,
}

impl EngineClock {
    pub fn new(sample_rate: u32) -> Self {
        Self { frames: 0, sample_rate }
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Current time in seconds.
    #[inline]
    pub fn seconds(&self) -> f64 {
        self.frames as f64 / f64::from(self.sample_rate)
    }

    #[inline]
    fn advance(&mut self) {
        self.frames += BLOCK_SIZE as u64;
    }
}

/// Engine settings, builder style.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Capacity of the parameter request queue
    pub queue_capacity: usize,
    /// Channels written by [`RenderEngine::render_interleaved`] callers
    pub channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl EngineConfig {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            queue_capacity: 256,
            channels: 2,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels.max(1);
        self
    }
}

/// Everything the render context owns. Dropped when the engine closes.
struct RenderState {
    nodes: Vec<NodeVariant>,
    params: Vec<Vec<Param>>,
    order: Vec<usize>,
    audio_inputs: Vec<Vec<usize>>,
    param_inputs: Vec<Vec<Vec<usize>>>,
    delay_lines: Vec<usize>,
    output: usize,
    /// Monitor offset of each node's first parameter
    param_offsets: Vec<usize>,

    outputs: Vec<Buffer>,
    param_buffers: Vec<Vec<Buffer>>,
    scratch: Buffer,
}

impl RenderState {
    fn start(&mut self) {
        for node in self.nodes.iter_mut() {
            if node.kind().is_periodic() {
                node.start();
            }
        }
    }

    /// Run one block through the graph.
    fn process(&mut self, ctx: &ProcessContext, monitor: &ParamMonitor) {
        let RenderState {
            nodes,
            params,
            order,
            audio_inputs,
            param_inputs,
            delay_lines,
            param_offsets,
            outputs,
            param_buffers,
            scratch,
            ..
        } = self;
        let period = 1.0 / f64::from(ctx.sample_rate);

        for &n in order.iter() {
            for (slot, param) in params[n].iter_mut().enumerate() {
                let spec = *param.spec();
                let buffer = &mut param_buffers[n][slot];
                if param.is_settled() {
                    let base = param.value_at(ctx.time);
                    buffer.iter_mut().for_each(|s| *s = base);
                } else {
                    for (i, s) in buffer.iter_mut().enumerate() {
                        *s = param.value_at(ctx.time + i as f64 * period);
                    }
                }
                monitor.publish(param_offsets[n] + slot, buffer[0]);

                let sources = &param_inputs[n][slot];
                if !sources.is_empty() {
                    for &src in sources.iter() {
                        for (s, &m) in buffer.iter_mut().zip(outputs[src].iter()) {
                            *s += m;
                        }
                    }
                    buffer.iter_mut().for_each(|s| *s = spec.clamp(*s));
                }
            }

            let node = &mut nodes[n];
            if node.is_delay_line() {
                // Input arrives in the absorb pass below
                scratch.iter_mut().for_each(|s| *s = 0.0);
            } else {
                mix_into(scratch, &audio_inputs[n], &outputs[..]);
            }
            node.process(ctx, scratch, &param_buffers[n], &mut outputs[n]);
        }

        // Every output of this block exists now, including the ones that
        // feed back into the delay lines.
        for &n in delay_lines.iter() {
            mix_into(scratch, &audio_inputs[n], &outputs[..]);
            nodes[n].absorb(ctx, scratch);
        }
    }
}

fn mix_into(dest: &mut Buffer, sources: &[usize], outputs: &[Buffer]) {
    dest.iter_mut().for_each(|s| *s = 0.0);
    for &src in sources {
        for (d, &s) in dest.iter_mut().zip(outputs[src].iter()) {
            *d += s;
        }
    }
}

/// The render context: pulls fixed-size blocks through the graph.
///
/// Owns every node, parameter and delay buffer. Meant to live on the audio
/// thread (it is `Send`), driven by the device clock through
/// [`render`](Self::render) or [`render_block`](Self::render_block).
/// It never blocks and never allocates while rendering.
pub struct RenderEngine {
    state: Option<RenderState>,
    queue: AutomationQueue,
    lifecycle: Arc<Lifecycle>,
    monitor: ParamMonitor,
    clock: EngineClock,
    sample_rate: u32,
    started: bool,

    /// Last rendered block and how much of it `render` has handed out
    block: Buffer,
    block_pos: usize,
}

impl RenderEngine {
    /// Validate `graph`, build the render plan and the matching [`Controller`].
    ///
    /// Nodes that allocate per sample rate (delay lines) must have been built
    /// for `config.sample_rate`. The engine starts out `Suspended`.
    pub fn new(graph: SignalGraph, config: EngineConfig) -> Result<(RenderEngine, Controller), EngineError> {
        let lifecycle = Arc::new(Lifecycle::new(config.sample_rate));
        let plan = graph.compile()?;

        let (registry, param_offsets) = ParamRegistry::new(&plan.params, plan.label_map());
        let monitor = ParamMonitor::new(&plan.params);
        let (scheduler, queue) = automation::channel(config.queue_capacity);

        let outputs = vec![Buffer::default(); plan.nodes.len()];
        let param_buffers = plan.params.iter().map(|p| vec![Buffer::default(); p.len()]).collect();

        debug!(
            params = registry.len(),
            delay_lines = plan.delay_lines.len(),
            queue = config.queue_capacity,
            "render engine built"
        );

        let state = RenderState {
            nodes: plan.nodes,
            params: plan.params,
            order: plan.order,
            audio_inputs: plan.audio_inputs,
            param_inputs: plan.param_inputs,
            delay_lines: plan.delay_lines,
            output: plan.output,
            param_offsets,
            outputs,
            param_buffers,
            scratch: Buffer::default(),
        };

        lifecycle.initialize();

        let engine = RenderEngine {
            state: Some(state),
            queue,
            lifecycle: lifecycle.clone(),
            monitor: monitor.clone(),
            clock: EngineClock::new(config.sample_rate),
            sample_rate: config.sample_rate,
            started: false,
            block: Buffer::default(),
            block_pos: BLOCK_SIZE,
        };
        let controller = Controller {
            scheduler,
            pending: vec![Vec::with_capacity(PENDING_CAPACITY); registry.len()],
            block_seconds: BLOCK_SIZE as f64 / f64::from(config.sample_rate),
            registry,
            lifecycle,
            monitor,
        };
        Ok((engine, controller))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn clock(&self) -> EngineClock {
        self.clock
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Render one block.
    ///
    /// While suspended this drains pending requests and returns silence
    /// without advancing the clock. On a closed engine it releases all
    /// render state and fails.
    pub fn render_block(&mut self) -> Result<&Buffer, EngineError> {
        self.advance_block()?;
        self.block_pos = BLOCK_SIZE;
        Ok(&self.block)
    }

    fn advance_block(&mut self) -> Result<(), EngineError> {
        let now = self.clock.seconds();
        let lifecycle_state = self.lifecycle.state();
        if lifecycle_state == EngineState::Closed {
            self.release();
        }

        let state = match self.state.as_mut() {
            Some(state) => state,
            None => {
                return Err(EngineError::LifecycleViolation {
                    operation: "render",
                    state: EngineState::Closed,
                })
            }
        };

        self.queue.drain_into(&mut state.params, now);

        if lifecycle_state != EngineState::Running {
            self.block.iter_mut().for_each(|s| *s = 0.0);
            return Ok(());
        }

        if !self.started {
            state.start();
            self.started = true;
        }

        let ctx = ProcessContext {
            sample_rate: self.sample_rate,
            buffer_size: BLOCK_SIZE,
            time: now,
        };
        state.process(&ctx, &self.monitor);
        self.block.copy_from_slice(&state.outputs[state.output]);

        self.clock.advance();
        self.lifecycle.frames.store(self.clock.frames(), Ordering::Release);
        Ok(())
    }

    /// Fill a mono buffer of any length, carrying partial blocks over.
    ///
    /// On error the rest of `out` is silenced.
    pub fn render(&mut self, out: &mut [f32]) -> Result<(), EngineError> {
        if let Err(e) = self.ensure_open() {
            out.iter_mut().for_each(|s| *s = 0.0);
            return Err(e);
        }
        for i in 0..out.len() {
            match self.next_sample() {
                Ok(sample) => out[i] = sample,
                Err(e) => {
                    out[i..].iter_mut().for_each(|s| *s = 0.0);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Fill an interleaved buffer, copying the mono signal to every channel.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) -> Result<(), EngineError> {
        if let Err(e) = self.ensure_open() {
            out.iter_mut().for_each(|s| *s = 0.0);
            return Err(e);
        }
        let channels = channels.max(1);
        let mut result = Ok(());
        for frame in out.chunks_mut(channels) {
            let sample = match result {
                Ok(()) => match self.next_sample() {
                    Ok(sample) => sample,
                    Err(e) => {
                        result = Err(e);
                        0.0
                    }
                },
                Err(_) => 0.0,
            };
            frame.iter_mut().for_each(|s| *s = sample);
        }
        result
    }

    fn next_sample(&mut self) -> Result<f32, EngineError> {
        if self.block_pos >= BLOCK_SIZE {
            self.advance_block()?;
            self.block_pos = 0;
        }
        let sample = self.block[self.block_pos];
        self.block_pos += 1;
        Ok(sample)
    }

    /// Fail without touching the carried-over block once the engine is
    /// closed.
    fn ensure_open(&mut self) -> Result<(), EngineError> {
        if self.lifecycle.state() == EngineState::Closed {
            self.release();
        }
        if self.state.is_none() {
            return Err(EngineError::LifecycleViolation {
                operation: "render",
                state: EngineState::Closed,
            });
        }
        Ok(())
    }

    /// Drop nodes, delay buffers and parameter state.
    fn release(&mut self) {
        if self.state.take().is_some() {
            self.block_pos = BLOCK_SIZE;
        }
    }
}

/// Control-context handle: schedules parameter changes and drives the
/// lifecycle.
///
/// Every call is lock-free. Parameter changes are queued for the render
/// context and take effect at their start time, in the order submitted.
pub struct Controller {
    scheduler: Scheduler,
    /// Start times of future requests the render side may still hold, per
    /// monitor slot
    pending: Vec<Vec<f64>>,
    block_seconds: f64,
    registry: ParamRegistry,
    lifecycle: Arc<Lifecycle>,
    monitor: ParamMonitor,
}

impl Controller {
    /// Ramp `param` of `node` to `target` over `ramp_seconds`, starting now.
    pub fn set_parameter(
        &mut self,
        node: NodeId,
        param: ParamName,
        target: f32,
        ramp_seconds: f64,
        curve: Curve,
    ) -> Result<(), EngineError> {
        let now = self.lifecycle.now();
        self.set_parameter_at(node, param, target, ramp_seconds, curve, now)
    }

    /// Ramp `param` of `node` to `target` over `ramp_seconds`, starting at
    /// engine time `start_time`.
    ///
    /// Invalid durations are clamped to zero. Infinite targets are clamped to
    /// the parameter's range; NaN is rejected.
    pub fn set_parameter_at(
        &mut self,
        node: NodeId,
        param: ParamName,
        target: f32,
        ramp_seconds: f64,
        curve: Curve,
        start_time: f64,
    ) -> Result<(), EngineError> {
        self.ensure_open("set a parameter")?;
        let slot = self.registry.lookup(node, param)?;

        if target.is_nan() {
            return Err(EngineError::NonFiniteValue { param });
        }
        let target = if target.is_finite() { target } else { slot.spec.clamp(target) };

        let duration = sanitize_duration(ramp_seconds);
        if duration != ramp_seconds && ramp_seconds != 0.0 {
            warn!(?node, ?param, ramp_seconds, "invalid ramp duration, snapping instead");
        }
        if curve == Curve::Exponential && target <= 0.0 {
            warn!(?node, ?param, target, "exponential ramp needs a positive target, clamping");
        }
        let now = self.lifecycle.now();
        let start_time = if start_time.is_finite() { start_time } else { now };

        // A future start stays pending on the render side until the block
        // containing it has run.
        let future = start_time > now;
        if future {
            let horizon = now - self.block_seconds;
            let starts = &mut self.pending[slot.flat];
            starts.retain(|&t| t > horizon);
            if starts.len() >= PENDING_CAPACITY {
                warn!(?node, ?param, start_time, "too many future ramps pending");
                return Err(EngineError::QueueFull);
            }
        }

        self.scheduler.submit(AutomationRequest {
            node: slot.node,
            slot: slot.slot,
            target,
            start_time,
            duration,
            curve,
        })?;
        if future {
            self.pending[slot.flat].push(start_time);
        }
        Ok(())
    }

    /// Jump to `value` at `time` without interpolation.
    pub fn set_value_at_time(&mut self, node: NodeId, param: ParamName, value: f32, time: f64) -> Result<(), EngineError> {
        self.set_parameter_at(node, param, value, 0.0, Curve::Linear, time)
    }

    /// Start producing sound. Oscillators start together on the next block.
    pub fn activate(&self) -> Result<(), EngineError> {
        self.lifecycle.activate()
    }

    /// Pause rendering; requests are still accepted.
    pub fn deactivate(&self) -> Result<(), EngineError> {
        self.lifecycle.deactivate()
    }

    /// Shut the engine down for good.
    pub fn close(&self) {
        self.lifecycle.close()
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Engine time in seconds, as last published by the render context.
    pub fn current_time(&self) -> f64 {
        self.lifecycle.now()
    }

    /// Ramp-resolved value of a parameter, as of the last rendered block.
    pub fn parameter_value(&self, node: NodeId, param: ParamName) -> Option<f32> {
        let slot = self.registry.lookup(node, param).ok()?;
        self.monitor.read(slot.flat)
    }

    /// Look up a node by the label it was added with.
    pub fn node_id(&self, label: &str) -> Option<NodeId> {
        self.registry.node_id(label)
    }

    /// Free slots in the request queue.
    pub fn queue_capacity_left(&self) -> usize {
        self.scheduler.capacity_left()
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), EngineError> {
        match self.lifecycle.state() {
            EngineState::Closed => Err(EngineError::LifecycleViolation {
                operation,
                state: EngineState::Closed,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ConstantSource, Delay, Gain};
    use approx::assert_relative_eq;

    const RATE: u32 = 48_000;

    /// offset(1.0) -> gain -> output, easy to predict
    fn dc_graph() -> (SignalGraph, NodeId, NodeId) {
        let mut g = SignalGraph::new();
        let dc = g.add("dc", ConstantSource::new(1.0));
        let gain = g.add("gain", Gain::new(0.5));
        g.connect(dc, gain).unwrap();
        g.set_output(gain).unwrap();
        (g, dc, gain)
    }

    #[test]
    fn lifecycle_transitions() {
        let lc = Lifecycle::new(RATE);
        assert_eq!(lc.state(), EngineState::Uninitialized);
        assert!(lc.activate().is_err());
        lc.initialize();
        assert_eq!(lc.state(), EngineState::Suspended);
        lc.deactivate().unwrap();
        lc.activate().unwrap();
        lc.activate().unwrap();
        assert_eq!(lc.state(), EngineState::Running);
        lc.deactivate().unwrap();
        assert_eq!(lc.state(), EngineState::Suspended);
        lc.close();
        assert_eq!(
            lc.activate(),
            Err(EngineError::LifecycleViolation { operation: "activate", state: EngineState::Closed })
        );
    }

    #[test]
    fn suspended_engine_is_silent_and_frozen() {
        let (g, _, _) = dc_graph();
        let (mut engine, controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        assert_eq!(controller.state(), EngineState::Suspended);

        let block = engine.render_block().unwrap();
        assert!(block.iter().all(|&s| s == 0.0));
        assert_eq!(engine.clock().frames(), 0);

        controller.activate().unwrap();
        let block = engine.render_block().unwrap();
        assert!(block.iter().all(|&s| s == 0.5));
        assert_eq!(engine.clock().frames(), BLOCK_SIZE as u64);
        assert_relative_eq!(controller.current_time(), BLOCK_SIZE as f64 / RATE as f64);
    }

    #[test]
    fn requests_queued_while_suspended_apply_later() {
        let (g, _, gain) = dc_graph();
        let (mut engine, mut controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();

        controller.set_parameter(gain, ParamName::Gain, 0.25, 0.0, Curve::Linear).unwrap();
        engine.render_block().unwrap();
        controller.activate().unwrap();
        let block = engine.render_block().unwrap();
        assert!(block.iter().all(|&s| s == 0.25));
        assert_eq!(controller.parameter_value(gain, ParamName::Gain), Some(0.25));
    }

    #[test]
    fn closed_engine_rejects_everything() {
        let (g, _, gain) = dc_graph();
        let (mut engine, mut controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();
        controller.close();

        let violation = |operation| EngineError::LifecycleViolation { operation, state: EngineState::Closed };
        assert_eq!(controller.activate(), Err(violation("activate")));
        assert_eq!(
            controller.set_parameter(gain, ParamName::Gain, 0.1, 0.1, Curve::Linear),
            Err(violation("set a parameter"))
        );
        assert_eq!(engine.render_block().err(), Some(violation("render")));

        let mut out = [1.0f32; 100];
        assert!(engine.render(&mut out).is_err());
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn close_discards_the_carried_over_block() {
        let (g, _, _) = dc_graph();
        let (mut engine, controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();

        // Leaves half a block of 0.5 waiting to be handed out.
        let mut out = [0.0f32; BLOCK_SIZE / 2];
        engine.render(&mut out).unwrap();
        controller.close();

        let violation = EngineError::LifecycleViolation { operation: "render", state: EngineState::Closed };
        let mut mono = [1.0f32; BLOCK_SIZE];
        assert_eq!(engine.render(&mut mono), Err(violation.clone()));
        assert!(mono.iter().all(|&s| s == 0.0));

        let mut stereo = [1.0f32; 2 * BLOCK_SIZE];
        assert_eq!(engine.render_interleaved(&mut stereo, 2), Err(violation));
        assert!(stereo.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn control_side_validation() {
        let (g, dc, gain) = dc_graph();
        let (_engine, mut controller) = RenderEngine::new(g, EngineConfig::new(RATE).with_queue_capacity(1)).unwrap();

        assert_eq!(
            controller.set_parameter(dc, ParamName::Gain, 1.0, 0.0, Curve::Linear),
            Err(EngineError::UnknownParameter { node: dc, param: ParamName::Gain })
        );
        assert_eq!(
            controller.set_parameter(gain, ParamName::Gain, f32::NAN, 0.0, Curve::Linear),
            Err(EngineError::NonFiniteValue { param: ParamName::Gain })
        );
        controller.set_parameter(gain, ParamName::Gain, f32::INFINITY, -1.0, Curve::Linear).unwrap();
        assert_eq!(
            controller.set_parameter(gain, ParamName::Gain, 0.5, 0.0, Curve::Linear),
            Err(EngineError::QueueFull)
        );
        assert_eq!(controller.node_id("gain"), Some(gain));
    }

    #[test]
    fn future_ramps_per_parameter_are_bounded() {
        let (g, _, gain) = dc_graph();
        let (mut engine, mut controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();

        for k in 1..=PENDING_CAPACITY {
            controller.set_value_at_time(gain, ParamName::Gain, 0.1 * k as f32, k as f64).unwrap();
        }
        assert_eq!(
            controller.set_value_at_time(gain, ParamName::Gain, 0.95, 9.0),
            Err(EngineError::QueueFull)
        );
        // Immediate changes are never held back.
        controller.set_parameter(gain, ParamName::Gain, 0.3, 0.0, Curve::Linear).unwrap();

        // Once the first start time has been rendered past, there is room again.
        let blocks = (1.5 * RATE as f64 / BLOCK_SIZE as f64) as usize;
        for _ in 0..blocks {
            engine.render_block().unwrap();
        }
        controller.set_value_at_time(gain, ParamName::Gain, 0.95, 9.0).unwrap();
        assert_relative_eq!(controller.parameter_value(gain, ParamName::Gain).unwrap(), 0.1);
    }

    #[test]
    fn render_carries_partial_blocks() {
        let (g, _, _) = dc_graph();
        let (mut engine, controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();

        let mut out = [0.0f32; 100];
        engine.render(&mut out).unwrap();
        assert_eq!(engine.clock().frames(), 2 * BLOCK_SIZE as u64);
        let mut out = [0.0f32; 28];
        engine.render(&mut out).unwrap();
        assert_eq!(engine.clock().frames(), 2 * BLOCK_SIZE as u64);
        assert!(out.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn interleaved_duplicates_channels() {
        let (g, _, _) = dc_graph();
        let (mut engine, controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();

        let mut out = [0.0f32; 2 * BLOCK_SIZE];
        engine.render_interleaved(&mut out, 2).unwrap();
        assert!(out.iter().all(|&s| s == 0.5));
        assert_eq!(engine.clock().frames(), BLOCK_SIZE as u64);
    }

    #[test]
    fn feedback_loop_stays_causal() {
        // impulse source: dc gated on for one block by a gain ramp
        let mut g = SignalGraph::new();
        let dc = g.add("dc", ConstantSource::new(1.0));
        let gate = g.add("gate", Gain::new(1.0));
        let delay = g.add("delay", Delay::new(BLOCK_SIZE as f32 / RATE as f32, 0.5, RATE));
        let fb = g.add("feedback", Gain::new(0.5));
        let out = g.add("out", Gain::new(1.0));
        g.connect(dc, gate).unwrap();
        g.connect(gate, delay).unwrap();
        g.connect(delay, fb).unwrap();
        g.connect(fb, delay).unwrap();
        g.connect(delay, out).unwrap();
        g.set_output(out).unwrap();

        let (mut engine, mut controller) = RenderEngine::new(g, EngineConfig::new(RATE)).unwrap();
        controller.activate().unwrap();
        let one_block = BLOCK_SIZE as f64 / RATE as f64;
        controller.set_value_at_time(gate, ParamName::Gain, 0.0, one_block).unwrap();

        // Block 0: delay has nothing yet. Block 1: first echo. Then halving.
        let expected = [0.0f32, 1.0, 0.5, 0.25, 0.125];
        for &level in expected.iter() {
            let block = engine.render_block().unwrap();
            for &s in block.iter() {
                assert_relative_eq!(s, level, epsilon = 1e-3);
            }
        }
    }
}
