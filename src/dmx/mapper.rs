//! Logical speed → physical output dynamics
//!
//! A [`ValueMapping`] describes how one device type responds: a
//! piecewise-linear remap curve, an optional startup kick for motors that
//! need a minimum drive to overcome stiction, and a first-order transition
//! rate. [`ValueMapper`] holds the per-device state advanced once per
//! simulation tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One point of the remap curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    #[serde(alias = "sourceSpeed")]
    pub source: f32,
    #[serde(alias = "targetSpeed")]
    pub target: f32,
}

impl Breakpoint {
    pub const fn new(source: f32, target: f32) -> Self {
        Self { source, target }
    }
}

/// Per-device-type dynamics, shared read-only by all devices of that type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValueMapping {
    pub needs_startup: bool,
    pub startup_speed: f32,
    pub startup_time_secs: f32,
    /// 0 snaps to the target; otherwise the lerp rate per second
    pub transition_speed: f32,
    pub breakpoints: Vec<Breakpoint>,
}

impl Default for ValueMapping {
    fn default() -> Self {
        Self {
            needs_startup: false,
            startup_speed: 0.0,
            startup_time_secs: 0.0,
            transition_speed: 0.0,
            breakpoints: Vec::new(),
        }
    }
}

impl ValueMapping {
    /// Sort breakpoints ascending by source speed.
    ///
    /// Every mapping loaded from config passes through here, so the remap
    /// scan can rely on the ordering.
    pub fn normalized(mut self) -> Self {
        self.breakpoints.sort_by(|a, b| a.source.total_cmp(&b.source));
        self
    }

    /// Piecewise-linear remap, clamped outside the first and last breakpoint.
    ///
    /// Without breakpoints this is the identity.
    pub fn remap(&self, speed: f32) -> f32 {
        let points = &self.breakpoints;
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return speed,
        };

        if speed <= first.source {
            return first.target;
        }
        if speed >= last.source {
            return last.target;
        }

        for pair in points.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if speed >= lo.source && speed <= hi.source {
                let span = hi.source - lo.source;
                if span <= f32::EPSILON {
                    return hi.target;
                }
                let t = (speed - lo.source) / span;
                return lo.target + (hi.target - lo.target) * t;
            }
        }

        last.target
    }
}

/// Named mappings loaded from the device value-mapping config
pub type MappingTable = HashMap<String, ValueMapping>;

/// Startup state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartupPhase {
    Stopped,
    Starting { elapsed: f32 },
    Running,
}

/// Per-device dynamics state
#[derive(Debug, Clone)]
pub struct ValueMapper {
    current: f32,
    phase: StartupPhase,
}

impl Default for ValueMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueMapper {
    pub fn new() -> Self {
        Self {
            current: 0.0,
            phase: StartupPhase::Stopped,
        }
    }

    /// Last physical output (0..1)
    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn phase(&self) -> StartupPhase {
        self.phase
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.phase = StartupPhase::Stopped;
    }

    /// Advance by `dt` seconds toward `target` (0..1) and return the physical
    /// speed (0..1).
    ///
    /// A missing mapping passes the target straight through.
    pub fn advance(&mut self, mapping: Option<&ValueMapping>, target: f32, dt: f32) -> f32 {
        if target <= 0.0 {
            self.reset();
            return 0.0;
        }

        let mapping = match mapping {
            Some(mapping) => mapping,
            None => {
                self.phase = StartupPhase::Running;
                self.current = target;
                return target;
            }
        };

        let mut speed = mapping.remap(target);

        if mapping.needs_startup {
            if self.phase == StartupPhase::Stopped {
                self.phase = StartupPhase::Starting { elapsed: 0.0 };
            }
            if let StartupPhase::Starting { elapsed } = self.phase {
                if speed < mapping.startup_speed && elapsed < mapping.startup_time_secs {
                    speed = mapping.startup_speed;
                    self.phase = StartupPhase::Starting {
                        elapsed: elapsed + dt,
                    };
                } else {
                    self.phase = StartupPhase::Running;
                }
            }
        } else {
            self.phase = StartupPhase::Running;
        }

        self.current = if mapping.transition_speed <= 0.0 {
            speed
        } else {
            let t = (dt * mapping.transition_speed).clamp(0.0, 1.0);
            self.current + (speed - self.current) * t
        };
        self.current
    }
}
