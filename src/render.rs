//! Drawing seam. The simulation produces plain `Frame` data; anything
//! that can paint it implements `DrawAdapter`.

use serde::Serialize;
use std::io::Write;

use crate::alerts::LogEntry;
use crate::physics::Particle;
use crate::regime::QuadrantState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleView {
    pub key: String,
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub color: &'static str,
    pub state: QuadrantState,
    pub trail: Vec<(f64, f64)>,
    pub pulse: f64,
    pub flash: f64,
    pub hovered: bool,
    pub highlighted: bool,
    /// Sector missing from the latest snapshot; drawn from its last data
    pub stale: bool,
}

impl ParticleView {
    pub fn from_particle(p: &Particle, hovered: bool, highlighted: bool) -> Self {
        Self {
            key: p.key.clone(),
            label: crate::model::short_name(&p.key).to_string(),
            x: p.x,
            y: p.y,
            radius: p.radius,
            color: p.state.color(),
            state: p.state,
            trail: p.trail.clone(),
            pulse: p.pulse,
            flash: p.flash,
            hovered,
            highlighted,
            stale: !p.present,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub step: u64,
    pub zoom: f64,
    pub pan: (f64, f64),
    /// Playback date of the first sector, when history is present
    pub date: Option<String>,
    pub particles: Vec<ParticleView>,
    pub notices: Vec<String>,
    pub log: Vec<LogEntry>,
}

pub trait DrawAdapter {
    fn draw(&mut self, frame: &Frame) -> std::io::Result<()>;
}

/// Writes one JSON object per frame.
pub struct JsonLinesAdapter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesAdapter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DrawAdapter for JsonLinesAdapter<W> {
    fn draw(&mut self, frame: &Frame) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, frame)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// Keeps frames in memory; used by headless runs and tests.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    pub frames: Vec<Frame>,
}

impl DrawAdapter for RecordingAdapter {
    fn draw(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame {
            step: 3,
            zoom: 1.0,
            pan: (0.0, 0.0),
            date: Some("2024-01-05".to_string()),
            particles: vec![ParticleView {
                key: "NIFTY_IT".to_string(),
                label: "IT".to_string(),
                x: 1.0,
                y: -2.0,
                radius: 14.5,
                color: "#00C853",
                state: QuadrantState::Leading,
                trail: vec![(0.0, 0.0)],
                pulse: 0.0,
                flash: 0.0,
                hovered: false,
                highlighted: true,
                stale: false,
            }],
            notices: Vec::new(),
            log: Vec::new(),
        }
    }

    #[test]
    fn test_json_lines_one_object_per_frame() {
        let mut adapter = JsonLinesAdapter::new(Vec::new());
        adapter.draw(&frame()).unwrap();
        adapter.draw(&frame()).unwrap();
        let text = String::from_utf8(adapter.into_inner()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["particles"][0]["state"], "LEADING");
        assert_eq!(v["particles"][0]["label"], "IT");
        assert_eq!(v["particles"][0]["stale"], false);
    }

    #[test]
    fn test_recording_adapter() {
        let mut rec = RecordingAdapter::default();
        rec.draw(&frame()).unwrap();
        assert_eq!(rec.frames.len(), 1);
    }
}
