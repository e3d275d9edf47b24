pub mod alerts;
pub mod confidence;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod physics;
pub mod playback;
pub mod regime;
pub mod render;
pub mod state;
pub mod trend;
