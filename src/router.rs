//! Modulation router - bipolar LFO onto a parameter that must stay positive
//!
//! The mapping is built from ordinary nodes, so it runs at audio rate and
//! shows up in the graph like everything else:
//!
//! ```text
//! lfo ──────────┐
//!               ├─(sum)─> scale(unit_scale) ─> depth ─> target.param
//! offset(1.0) ──┘
//! ```
//!
//! `output = depth * unit_scale * (lfo + 1)`. For an LFO in `[-1, 1]` and
//! `depth` in `[0, max_depth]` the result lies in
//! `[0, 2 * unit_scale * depth]` and never dips below zero, with no clamping
//! anywhere near the LFO's zero crossings.

use tracing::debug;

use crate::error::GraphError;
use crate::graph::SignalGraph;
use crate::node::{NodeId, ParamName};
use crate::nodes::{ConstantSource, Gain};

/// DC offset that lifts a bipolar LFO to `[0, 2]`.
pub const LFO_OFFSET: f32 = 1.0;

/// Scale that maps the lifted LFO onto a unit range.
pub const DEFAULT_UNIT_SCALE: f32 = 0.5;

/// Describes one offset + scale + depth modulation path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModulationRouter {
    unit_scale: f32,
    initial_depth: f32,
    max_depth: f32,
}

/// Nodes created by [`ModulationRouter::install`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModulationPath {
    pub offset: NodeId,
    pub scale: NodeId,
    pub depth: NodeId,
}

impl Default for ModulationRouter {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_SCALE)
    }
}

impl ModulationRouter {
    pub fn new(unit_scale: f32) -> Self {
        Self {
            unit_scale: unit_scale.abs(),
            initial_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Depth the path starts at.
    pub fn with_depth(mut self, depth: f32) -> Self {
        self.initial_depth = depth;
        self
    }

    /// Largest depth [`clamp_depth`](Self::clamp_depth) lets through.
    pub fn with_max_depth(mut self, max_depth: f32) -> Self {
        self.max_depth = max_depth.max(0.0);
        self
    }

    #[inline]
    pub fn unit_scale(&self) -> f32 {
        self.unit_scale
    }

    #[inline]
    pub fn max_depth(&self) -> f32 {
        self.max_depth
    }

    /// Clamp a requested depth to `[0, max_depth]`.
    ///
    /// The depth gain node clamps to the same range when it evaluates, so an
    /// out-of-range request is caught at both ends.
    #[inline]
    pub fn clamp_depth(&self, depth: f32) -> f32 {
        depth.max(0.0).min(self.max_depth)
    }

    /// The value the installed chain produces for one LFO sample.
    #[inline]
    pub fn map(&self, lfo: f32, depth: f32) -> f32 {
        self.clamp_depth(depth) * self.unit_scale * (lfo + LFO_OFFSET)
    }

    /// Add the offset/scale/depth chain between `lfo` and `param` of `target`.
    pub fn install(
        &self,
        graph: &mut SignalGraph,
        name: &str,
        lfo: NodeId,
        target: NodeId,
        param: ParamName,
    ) -> Result<ModulationPath, GraphError> {
        let offset = graph.add(&format!("{}.offset", name), ConstantSource::new(LFO_OFFSET));
        let scale = graph.add(
            &format!("{}.scale", name),
            Gain::new(self.unit_scale).with_range(0.0, self.unit_scale),
        );
        let depth = graph.add(
            &format!("{}.depth", name),
            Gain::new(self.clamp_depth(self.initial_depth)).with_range(0.0, self.max_depth),
        );

        graph.connect(lfo, scale)?;
        graph.connect(offset, scale)?;
        graph.connect(scale, depth)?;
        graph.connect_param(depth, target, param)?;

        debug!(name, unit_scale = self.unit_scale, max_depth = self.max_depth, "modulation path installed");
        Ok(ModulationPath { offset, scale, depth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn extremes_map_to_zero_and_twice_unit_scale() {
        let router = ModulationRouter::new(0.25);
        assert_relative_eq!(router.map(-1.0, 1.0), 0.0);
        assert_relative_eq!(router.map(1.0, 1.0), 0.5);
        assert_relative_eq!(router.map(0.0, 1.0), 0.25);
    }

    #[test]
    fn never_negative() {
        let router = ModulationRouter::default();
        for i in 0..=200 {
            let lfo = -1.0 + i as f32 / 100.0;
            for &depth in [0.0f32, 0.3, 1.0, 5.0, -2.0].iter() {
                assert!(router.map(lfo, depth) >= 0.0);
            }
        }
    }

    #[test]
    fn depth_is_clamped_at_the_boundary() {
        let router = ModulationRouter::default().with_max_depth(1.0);
        assert_eq!(router.clamp_depth(1.5), 1.0);
        assert_eq!(router.clamp_depth(-0.5), 0.0);
        assert_relative_eq!(router.map(1.0, 3.0), router.map(1.0, 1.0));
    }

    #[test]
    fn install_wires_the_chain() {
        use crate::graph::Port;
        use crate::nodes::{ControlOscillator, Delay};

        let mut g = SignalGraph::new();
        let lfo = g.add("lfo", ControlOscillator::new(5.0));
        let delay = g.add("delay", Delay::new(0.1, 1.0, 48_000));
        let path = ModulationRouter::default().install(&mut g, "chorus", lfo, delay, ParamName::DelayTime).unwrap();

        let edges: Vec<_> = g.connections().map(|c| (c.from, c.to, c.port)).collect();
        assert!(edges.contains(&(lfo, path.scale, Port::Audio)));
        assert!(edges.contains(&(path.offset, path.scale, Port::Audio)));
        assert!(edges.contains(&(path.scale, path.depth, Port::Audio)));
        assert!(edges.contains(&(path.depth, delay, Port::Param(ParamName::DelayTime))));
        assert_eq!(g.node(path.depth).unwrap().label(), "chorus.depth");
    }

    /// Render the installed chain on its own and return the depth node's output.
    fn render_chain(router: ModulationRouter, blocks: usize) -> Vec<f32> {
        use crate::engine::{EngineConfig, RenderEngine};
        use crate::nodes::{ControlOscillator, Delay};

        let mut g = SignalGraph::new();
        // 750 Hz at 48 kHz: one LFO cycle per block
        let lfo = g.add("lfo", ControlOscillator::new(750.0));
        let delay = g.add("delay", Delay::new(0.1, 1.0, 48_000));
        let path = router.install(&mut g, "chorus", lfo, delay, ParamName::DelayTime).unwrap();
        g.set_output(path.depth).unwrap();

        let (mut engine, controller) = RenderEngine::new(g, EngineConfig::new(48_000)).unwrap();
        controller.activate().unwrap();
        let mut out = vec![0.0; blocks * crate::node::BLOCK_SIZE];
        engine.render(&mut out).unwrap();
        out
    }

    #[test]
    fn rendered_chain_matches_the_mapping() {
        for &(unit_scale, depth) in [(0.5f32, 1.0f32), (0.25, 0.6), (0.5, 0.0)].iter() {
            let router = ModulationRouter::new(unit_scale).with_depth(depth);
            let out = render_chain(router, 2);

            for (i, &s) in out.iter().enumerate() {
                let lfo = (i as f32 / 64.0 * core::f32::consts::TAU).sin();
                assert_relative_eq!(s, router.map(lfo, depth), epsilon = 1e-4);
                assert!(s >= 0.0);
                assert!(s <= 2.0 * unit_scale * depth + 1e-6);
            }
            // sample 16 is the LFO peak, sample 48 the trough
            assert_relative_eq!(out[16], 2.0 * unit_scale * depth, epsilon = 1e-4);
            assert_relative_eq!(out[48], 0.0, epsilon = 1e-4);
        }
    }
}
