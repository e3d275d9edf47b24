//! Particle simulation for the rotation plane.
//!
//! One particle per sector. Each fixed step pulls particles toward their
//! RS/RM target, swirls them clockwise around the origin, pushes close
//! pairs apart, then integrates with friction. Forces for a step are
//! accumulated for every particle before any position moves, so pair
//! repulsion is symmetric regardless of iteration order.
//!
//! Screen/world conversion and hover tracking live here too so the whole
//! interaction model can be driven headless.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::logging::log_quadrant_change;
use crate::model::{short_name, Observation};
use crate::regime::QuadrantState;
use crate::state::Config;

pub const ATTRACTION_GAIN: f64 = 0.1;
pub const ROTATION_GAIN: f64 = 50.0;
pub const REPULSION_GAIN: f64 = 0.05;
pub const PULSE_DECAY: f64 = 0.92;
pub const FLASH_DECAY: f64 = 0.90;
pub const SPAWN_SPREAD: f64 = 100.0;
pub const MIN_ZOOM: f64 = 0.2;
pub const MAX_ZOOM: f64 = 5.0;
pub const HIGHLIGHT_COUNT: usize = 3;
pub const MIN_TICK_HZ: f64 = 1.0;
pub const MAX_TICK_HZ: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsParams {
    pub friction: f64,
    pub attraction: f64,
    pub rotation: f64,
    pub repulsion: f64,
    pub repulsion_dist: f64,
    pub kick_force: f64,
}

impl PhysicsParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            friction: config.friction,
            attraction: config.attraction,
            rotation: config.rotation,
            repulsion: config.repulsion,
            repulsion_dist: config.repulsion_dist,
            kick_force: config.kick_force,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Particle {
    pub key: String,
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub radius: f64,
    pub mass: f64,
    pub target_x: f64,
    pub target_y: f64,
    pub rs: f64,
    pub rm: f64,
    pub state: QuadrantState,
    /// Quadrant at the last retarget; `None` before the first one
    pub quadrant: Option<QuadrantState>,
    pub trail: Vec<(f64, f64)>,
    pub pulse: f64,
    pub flash: f64,
    /// False while the sector is missing from the latest snapshot; the
    /// particle keeps its last target until the sector returns.
    pub present: bool,
}

impl Particle {
    fn spawn(key: &str, weight: f64, rng: &mut StdRng) -> Self {
        let (radius, mass) = size_for(weight);
        Self {
            key: key.to_string(),
            x: (rng.gen::<f64>() - 0.5) * SPAWN_SPREAD,
            y: (rng.gen::<f64>() - 0.5) * SPAWN_SPREAD,
            vx: 0.0,
            vy: 0.0,
            radius,
            mass,
            target_x: 0.0,
            target_y: 0.0,
            rs: f64::NAN,
            rm: f64::NAN,
            state: QuadrantState::Neutral,
            quadrant: None,
            trail: Vec::new(),
            pulse: 0.0,
            flash: 0.0,
            present: true,
        }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    fn contains(&self, wx: f64, wy: f64) -> Option<f64> {
        let d = (self.x - wx).hypot(self.y - wy);
        (d < self.radius).then_some(d)
    }
}

/// Radius and mass from index weight.
pub fn size_for(weight: f64) -> (f64, f64) {
    let w = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
    (12.0 + w * 50.0, 1.0 + w * 2.0)
}

/// What a particle should chase after a snapshot or playback change.
#[derive(Debug, Clone, PartialEq)]
pub struct Retarget {
    pub key: String,
    pub observation: Observation,
    pub target: (f64, f64),
    pub state: QuadrantState,
    pub trail: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverChange {
    Entered(String),
    Left(String),
    Switched { from: String, to: String },
}

/// Pan/zoom state between screen and world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    pub width: f64,
    pub height: f64,
    drag_from: Option<(f64, f64)>,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { zoom: 1.0, pan_x: 0.0, pan_y: 0.0, width, height, drag_from: None }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Positive `delta_y` (scroll down) zooms out.
    pub fn wheel(&mut self, delta_y: f64) {
        let factor = if delta_y > 0.0 { 0.9 } else { 1.1 };
        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn begin_drag(&mut self, sx: f64, sy: f64) {
        self.drag_from = Some((sx, sy));
    }

    pub fn drag_to(&mut self, sx: f64, sy: f64) {
        if let Some((lx, ly)) = self.drag_from {
            self.pan_x += sx - lx;
            self.pan_y += sy - ly;
            self.drag_from = Some((sx, sy));
        }
    }

    pub fn end_drag(&mut self) {
        self.drag_from = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    pub fn screen_to_world(&self, sx: f64, sy: f64) -> (f64, f64) {
        let (cx, cy) = self.center();
        ((sx - cx - self.pan_x) / self.zoom, (sy - cy - self.pan_y) / self.zoom)
    }

    pub fn world_to_screen(&self, wx: f64, wy: f64) -> (f64, f64) {
        let (cx, cy) = self.center();
        (wx * self.zoom + cx + self.pan_x, wy * self.zoom + cy + self.pan_y)
    }
}

#[derive(Debug, Clone)]
pub struct ParticleSim {
    particles: Vec<Particle>,
    params: PhysicsParams,
    rng: StdRng,
    hovered: Option<String>,
    pub viewport: Viewport,
    steps: u64,
}

impl ParticleSim {
    pub fn new(config: &Config) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            particles: Vec::new(),
            params: PhysicsParams::from_config(config),
            rng,
            hovered: None,
            viewport: Viewport::new(config.view_width, config.view_height),
            steps: 0,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particle(&self, key: &str) -> Option<&Particle> {
        self.particles.iter().find(|p| p.key == key)
    }

    pub fn particle_mut(&mut self, key: &str) -> Option<&mut Particle> {
        self.particles.iter_mut().find(|p| p.key == key)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    /// Bring `sectors` (key, weight) into the particle set. Particles are
    /// created once and never removed: a sector absent from this snapshot
    /// is only marked not present and keeps position, velocity and target.
    pub fn sync<'a, I>(&mut self, sectors: I)
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        for p in &mut self.particles {
            p.present = false;
        }
        for (key, weight) in sectors {
            match self.particles.iter_mut().find(|p| p.key == key) {
                Some(p) => {
                    let (radius, mass) = size_for(weight);
                    p.radius = radius;
                    p.mass = mass;
                    p.present = true;
                }
                None => {
                    let p = Particle::spawn(key, weight, &mut self.rng);
                    self.particles.push(p);
                }
            }
        }
    }

    /// Move targets without touching position or velocity. Returns
    /// quadrant-change notices.
    pub fn retarget(&mut self, targets: &[Retarget]) -> Vec<String> {
        let mut notices = Vec::new();
        for t in targets {
            let Some(p) = self.particles.iter_mut().find(|p| p.key == t.key) else {
                continue;
            };
            p.target_x = t.target.0;
            p.target_y = t.target.1;
            p.rs = t.observation.rs;
            p.rm = t.observation.rm;
            p.state = t.state;
            p.trail = t.trail.clone();

            if t.state == QuadrantState::Neutral {
                continue;
            }
            if let Some(old) = p.quadrant {
                if old != t.state {
                    notices.push(format!(
                        "{}: {} → {}",
                        short_name(&p.key),
                        old.display_name(),
                        t.state.display_name()
                    ));
                    log_quadrant_change(&p.key, old.as_str(), t.state.as_str());
                }
            }
            p.quadrant = Some(t.state);
        }
        notices
    }

    /// Pulse and flash a sector; HIGH priority adds a random kick.
    pub fn impulse(&mut self, key: &str, kick: bool) -> bool {
        let force = self.params.kick_force;
        let Some(idx) = self.particles.iter().position(|p| p.key == key) else {
            return false;
        };
        let (kx, ky) = if kick {
            ((self.rng.gen::<f64>() - 0.5) * force, (self.rng.gen::<f64>() - 0.5) * force)
        } else {
            (0.0, 0.0)
        };
        let p = &mut self.particles[idx];
        p.pulse = 1.0;
        p.flash = 1.0;
        p.vx += kx;
        p.vy += ky;
        true
    }

    /// One fixed physics step.
    pub fn step(&mut self) {
        let n = self.particles.len();
        let params = self.params;
        let mut acc = vec![(0.0_f64, 0.0_f64); n];

        for (i, p) in self.particles.iter().enumerate() {
            acc[i].0 += (p.target_x - p.x) * params.attraction * ATTRACTION_GAIN;
            acc[i].1 += (p.target_y - p.y) * params.attraction * ATTRACTION_GAIN;

            let mut d = p.x.hypot(p.y);
            if d == 0.0 {
                d = 1.0;
            }
            acc[i].0 += (p.y / d) * params.rotation * ROTATION_GAIN;
            acc[i].1 += (-p.x / d) * params.rotation * ROTATION_GAIN;
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&self.particles[i], &self.particles[j]);
                let dx = b.x - a.x;
                let dy = b.y - a.y;
                let mut d = dx.hypot(dy);
                if d == 0.0 {
                    d = 1.0;
                }
                if d < params.repulsion_dist {
                    let force = (params.repulsion_dist - d) * params.repulsion * REPULSION_GAIN;
                    let fx = dx / d * force;
                    let fy = dy / d * force;
                    acc[i].0 -= fx / a.mass;
                    acc[i].1 -= fy / a.mass;
                    acc[j].0 += fx / b.mass;
                    acc[j].1 += fy / b.mass;
                }
            }
        }

        for (p, (ax, ay)) in self.particles.iter_mut().zip(acc) {
            p.vx += ax;
            p.vy += ay;
            p.x += p.vx;
            p.y += p.vy;
            p.vx *= params.friction;
            p.vy *= params.friction;
            p.pulse *= PULSE_DECAY;
            p.flash *= FLASH_DECAY;
        }
        self.steps += 1;
    }

    /// Nearest particle whose disc contains the world point.
    pub fn hit_test(&self, wx: f64, wy: f64) -> Option<&Particle> {
        self.particles
            .iter()
            .filter_map(|p| p.contains(wx, wy).map(|d| (p, d)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(p, _)| p)
    }

    /// Update hover from a screen-space pointer. Emits only on change;
    /// ignored while dragging.
    pub fn pointer_move(&mut self, sx: f64, sy: f64) -> Option<HoverChange> {
        if self.viewport.is_dragging() {
            self.viewport.drag_to(sx, sy);
            return None;
        }
        let (wx, wy) = self.viewport.screen_to_world(sx, sy);
        let found = self.hit_test(wx, wy).map(|p| p.key.clone());
        if found == self.hovered {
            return None;
        }
        let change = match (self.hovered.take(), found.clone()) {
            (None, Some(to)) => HoverChange::Entered(to),
            (Some(from), None) => HoverChange::Left(from),
            (Some(from), Some(to)) => HoverChange::Switched { from, to },
            (None, None) => return None,
        };
        self.hovered = found;
        Some(change)
    }

    /// Keys of the top particles by RS, best first.
    pub fn highlighted(&self) -> Vec<&str> {
        let mut ranked: Vec<&Particle> = self
            .particles
            .iter()
            .filter(|p| p.present && p.rs.is_finite())
            .collect();
        ranked.sort_by(|a, b| b.rs.partial_cmp(&a.rs).unwrap_or(std::cmp::Ordering::Equal));
        ranked.into_iter().take(HIGHLIGHT_COUNT).map(|p| p.key.as_str()).collect()
    }
}

/// Fixed-step accumulator driving `ParticleSim::step` from wall time.
#[derive(Debug, Clone)]
pub struct Scheduler {
    step_secs: f64,
    max_steps: u32,
    backlog: f64,
}

impl Scheduler {
    pub fn new(tick_hz: f64, max_steps: u32) -> Self {
        let hz = if tick_hz.is_finite() && tick_hz > 0.0 {
            tick_hz.clamp(MIN_TICK_HZ, MAX_TICK_HZ)
        } else {
            60.0
        };
        Self { step_secs: 1.0 / hz, max_steps: max_steps.max(1), backlog: 0.0 }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tick_hz, config.max_steps_per_tick)
    }

    pub fn step_secs(&self) -> f64 {
        self.step_secs
    }

    /// Number of fixed steps to run for `dt` seconds of wall time.
    /// Backlog beyond the per-call limit is dropped.
    pub fn advance(&mut self, dt: f64) -> u32 {
        if dt.is_finite() && dt > 0.0 {
            self.backlog += dt;
        }
        let due = (self.backlog / self.step_secs).floor();
        if due >= self.max_steps as f64 {
            self.backlog = 0.0;
            return self.max_steps;
        }
        let steps = due as u32;
        self.backlog -= steps as f64 * self.step_secs;
        steps
    }
}
