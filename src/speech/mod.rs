//! Speech synthesis with graceful fallback
//!
//! Text goes in, audio comes out of whichever backend answers first.

pub mod backends;
pub mod codec;
pub mod engine;
pub mod language;
pub mod playback;
pub mod probe;

pub use backends::{AudioPayload, BackendId, EnginePolicy, SpeechBackend, Utterance};
pub use engine::{EngineParts, EngineStatus, SpeechEngine};
pub use playback::{AudioOutput, PlaybackController, SpeechListener};
