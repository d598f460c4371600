//! Parameter ramps and per-parameter automation state.
//!
//! A [`Param`] owns a held base value, at most one active [`Ramp`] and a short
//! list of ramps waiting for their start time. All times are engine-clock
//! seconds, never wall-clock time.

use std::collections::VecDeque;

use crate::node::ParamSpec;

/// Endpoints of an exponential ramp are clamped to at least this value.
pub const EXP_EPSILON: f64 = 1.0e-6;

/// Most future ramps a parameter holds at once. The pending list is
/// allocated once at this size and never grows.
pub const PENDING_CAPACITY: usize = 8;

/// Interpolation curve of a ramp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    Linear,
    Exponential,
}

/// A time-bounded interpolation from `start_value` to `end_value`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ramp {
    start_value: f64,
    end_value: f64,
    start_time: f64,
    duration: f64,
    curve: Curve,
}

impl Ramp {
    /// Build a ramp, clamping invalid input instead of rejecting it.
    ///
    /// Negative or non-finite durations become zero. Exponential endpoints
    /// that are not strictly positive become [`EXP_EPSILON`].
    pub fn new(start_value: f64, end_value: f64, start_time: f64, duration: f64, curve: Curve) -> Self {
        let duration = sanitize_duration(duration);
        let (start_value, end_value) = match curve {
            Curve::Linear => (start_value, end_value),
            Curve::Exponential => (positive(start_value), positive(end_value)),
        };
        Self {
            start_value,
            end_value,
            start_time,
            duration,
            curve,
        }
    }

    #[inline]
    pub fn start_value(&self) -> f64 {
        self.start_value
    }

    #[inline]
    pub fn end_value(&self) -> f64 {
        self.end_value
    }

    #[inline]
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    #[inline]
    pub fn curve(&self) -> Curve {
        self.curve
    }

    /// Whether the ramp has reached its end value at time `t`.
    #[inline]
    pub fn is_complete(&self, t: f64) -> bool {
        t >= self.end_time()
    }

    /// Value of the ramp at time `t`.
    ///
    /// Before the start the start value is held, after the end the end value.
    pub fn value_at(&self, t: f64) -> f64 {
        if t < self.start_time {
            return self.start_value;
        }
        if self.is_complete(t) {
            return self.end_value;
        }
        let progress = (t - self.start_time) / self.duration;
        match self.curve {
            Curve::Linear => self.start_value + (self.end_value - self.start_value) * progress,
            Curve::Exponential => self.start_value * (self.end_value / self.start_value).powf(progress),
        }
    }
}

#[inline]
pub(crate) fn sanitize_duration(duration: f64) -> f64 {
    if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        0.0
    }
}

#[inline]
fn positive(value: f64) -> f64 {
    if value > EXP_EPSILON {
        value
    } else {
        EXP_EPSILON
    }
}

/// A ramp request that has not reached its start time yet.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Scheduled {
    target: f64,
    start_time: f64,
    duration: f64,
    curve: Curve,
}

/// One automatable parameter: held value, active ramp, queued ramps.
#[derive(Clone, Debug)]
pub struct Param {
    spec: ParamSpec,
    /// Value held when no ramp is active
    held: f64,
    active: Option<Ramp>,
    pending: VecDeque<Scheduled>,
}

impl Param {
    pub fn new(spec: ParamSpec) -> Self {
        Self {
            spec,
            held: f64::from(spec.clamp(spec.initial)),
            active: None,
            pending: VecDeque::with_capacity(PENDING_CAPACITY),
        }
    }

    #[inline]
    pub fn spec(&self) -> &ParamSpec {
        &self.spec
    }

    /// Whether a ramp is currently interpolating.
    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.active.is_some()
    }

    /// Whether nothing is ramping or waiting to start.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    /// Schedule a ramp to `target` starting at `start_time`.
    ///
    /// `now` is the time the render context is about to evaluate. A start
    /// time in the past is moved up to `now`. When the ramp starts it
    /// replaces whatever is active, starting from that ramp's value at the
    /// replacement instant.
    pub fn schedule(&mut self, now: f64, target: f32, start_time: f64, duration: f64, curve: Curve) {
        let request = Scheduled {
            target: f64::from(target),
            start_time: if start_time > now { start_time } else { now },
            duration,
            curve,
        };
        if request.start_time <= now {
            self.begin(request);
            return;
        }
        // Keep start-time order, equal times stay in submission order.
        let at = self
            .pending
            .iter()
            .position(|p| p.start_time > request.start_time)
            .unwrap_or(self.pending.len());
        if self.pending.len() == PENDING_CAPACITY {
            // Full: keep the earliest starts.
            if at == PENDING_CAPACITY {
                return;
            }
            self.pending.pop_back();
        }
        self.pending.insert(at, request);
    }

    /// Evaluate the parameter at time `t`, clamped to its range.
    ///
    /// Promotes any pending ramp whose start time has been reached and
    /// retires the active ramp once it completes.
    pub fn value_at(&mut self, t: f64) -> f32 {
        while self.pending.front().map_or(false, |p| p.start_time <= t) {
            if let Some(next) = self.pending.pop_front() {
                self.begin(next);
            }
        }

        let value = match self.active {
            Some(ramp) if ramp.is_complete(t) => {
                self.held = ramp.end_value();
                self.active = None;
                self.held
            }
            Some(ramp) => ramp.value_at(t),
            None => self.held,
        };
        self.spec.clamp(value as f32)
    }

    /// Value at `t` without promoting or retiring anything.
    pub fn peek(&self, t: f64) -> f32 {
        let value = self.active.map_or(self.held, |ramp| ramp.value_at(t));
        self.spec.clamp(value as f32)
    }

    fn begin(&mut self, request: Scheduled) {
        // Carry over the real value at the replacement instant.
        let from = self.active.map_or(self.held, |ramp| ramp.value_at(request.start_time));
        let ramp = Ramp::new(from, request.target, request.start_time, request.duration, request.curve);
        self.held = ramp.start_value();
        self.active = Some(ramp);
    }
}
