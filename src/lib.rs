//! voxchain - text-to-speech with a fallback chain
//!
//! Speaks text through the first backend that works: a TTS server, a hosted
//! inference endpoint, a local neural model, and finally the platform's own
//! speech engine. Only one utterance is ever audible at a time.

pub mod error;
pub mod platform;
pub mod speech;
pub mod state;

pub use error::{Result, VoxError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "voxchain";
