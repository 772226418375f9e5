//! Speech generation backends
//!
//! Every byte-producing backend sits behind [`SpeechBackend`]. A backend never
//! fails loudly: network errors, rejected requests and garbage payloads all
//! come back as `None` so the engine can move on to the next tier.

// TTS server reachable over HTTP (presets per language)
pub mod server;

// Hosted inference: custom deployed space, then generic inference API
pub mod hosted;

// Local neural model, loaded lazily on first use
pub mod neural;

// Piper runtime backing the local neural model
pub mod piper;

// Platform speech engine (terminal fallback, drives its own playback)
pub mod native;

use crate::state::config::Endpoints;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Identifies one backend tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    Server,
    Hosted,
    Neural,
    Native,
}

impl BackendId {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Hosted => "hosted",
            Self::Neural => "neural",
            Self::Native => "native",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which backends a speech request may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePolicy {
    /// Try every backend in priority order
    #[default]
    Auto,
    Server,
    Hosted,
    Neural,
    Native,
}

impl EnginePolicy {
    /// Whether this policy selects the given backend
    pub fn includes(&self, backend: BackendId) -> bool {
        match self {
            Self::Auto => true,
            Self::Server => backend == BackendId::Server,
            Self::Hosted => backend == BackendId::Hosted,
            Self::Neural => backend == BackendId::Neural,
            Self::Native => backend == BackendId::Native,
        }
    }
}

impl fmt::Display for EnginePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Server => write!(f, "server"),
            Self::Hosted => write!(f, "hosted"),
            Self::Neural => write!(f, "neural"),
            Self::Native => write!(f, "native"),
        }
    }
}

impl FromStr for EnginePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "server" | "edge" => Ok(Self::Server),
            "hosted" | "qwen" => Ok(Self::Hosted),
            "neural" | "kokoro" => Ok(Self::Neural),
            "native" | "webspeech" => Ok(Self::Native),
            _ => Err(format!("Invalid engine policy: {}", s)),
        }
    }
}

/// One request to vocalize a piece of text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    text: String,
    lang: String,
}

impl Utterance {
    pub fn new(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: lang.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Two-letter language code
    pub fn lang(&self) -> &str {
        &self.lang
    }
}

/// Encoded audio ready for playback (WAV, MP3 or whatever the backend returned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload(Vec<u8>);

impl AudioPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// A backend that turns text into an audio payload
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Which tier this backend occupies
    fn id(&self) -> BackendId;

    /// Generate audio for the utterance.
    ///
    /// Returns `None` on any failure; the reason is logged, never raised.
    async fn attempt(&self, utterance: &Utterance, endpoints: &Endpoints) -> Option<AudioPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("auto".parse::<EnginePolicy>(), Ok(EnginePolicy::Auto));
        assert_eq!("Server".parse::<EnginePolicy>(), Ok(EnginePolicy::Server));
        assert_eq!("edge".parse::<EnginePolicy>(), Ok(EnginePolicy::Server));
        assert_eq!("qwen".parse::<EnginePolicy>(), Ok(EnginePolicy::Hosted));
        assert_eq!("kokoro".parse::<EnginePolicy>(), Ok(EnginePolicy::Neural));
        assert_eq!("webspeech".parse::<EnginePolicy>(), Ok(EnginePolicy::Native));
        assert!("loudspeaker".parse::<EnginePolicy>().is_err());
    }

    #[test]
    fn test_policy_display_round_trips() {
        for policy in [
            EnginePolicy::Auto,
            EnginePolicy::Server,
            EnginePolicy::Hosted,
            EnginePolicy::Neural,
            EnginePolicy::Native,
        ] {
            assert_eq!(policy.to_string().parse::<EnginePolicy>(), Ok(policy));
        }
    }

    #[test]
    fn test_policy_selection() {
        assert!(EnginePolicy::Auto.includes(BackendId::Neural));
        assert!(EnginePolicy::Hosted.includes(BackendId::Hosted));
        assert!(!EnginePolicy::Hosted.includes(BackendId::Server));
        assert!(!EnginePolicy::Native.includes(BackendId::Neural));
    }
}
