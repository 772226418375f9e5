//! TTS server backend
//!
//! Talks to a local or remote TTS server:
//! - `GET  {url}/health` answers 200 when the server is up
//! - `POST {url}/tts` with `{text, lang, preset}` returns raw audio
//! - `GET  {url}/voices` lists the server's presets
//!
//! Voice presets are chosen per language. Tiny bodies are treated as
//! failures even with a success status, since they are error text rather
//! than audio.

use super::{AudioPayload, BackendId, SpeechBackend, Utterance};
use crate::state::config::Endpoints;
use crate::{Result, VoxError};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;

/// Bodies at or below this size are not audio
pub const MIN_AUDIO_BYTES: usize = 100;

/// Preset used when a language has no entry
pub const DEFAULT_PRESET: &str = "jesus_en";

const PRESETS: &[(&str, &str)] = &[
    ("en", "jesus_en"),
    ("pt", "jesus_pt"),
    ("es", "jesus_es"),
    ("fr", "jesus_fr"),
    ("it", "jesus_it"),
    ("de", "jesus_de"),
];

/// Voice preset for a language
pub fn preset_for(lang: &str) -> &'static str {
    PRESETS
        .iter()
        .find(|(code, _)| *code == lang)
        .map(|(_, preset)| *preset)
        .unwrap_or(DEFAULT_PRESET)
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    lang: &'a str,
    preset: &'a str,
}

/// HTTP TTS server backend
pub struct ServerBackend {
    client: reqwest::Client,
}

impl ServerBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn synthesize(&self, utterance: &Utterance, server_url: &str) -> Result<AudioPayload> {
        let preset = preset_for(utterance.lang());
        debug!(
            "Requesting server speech (lang: {}, preset: {})",
            utterance.lang(),
            preset
        );

        let response = self
            .client
            .post(format!("{}/tts", server_url))
            .json(&TtsRequest {
                text: utterance.text(),
                lang: utterance.lang(),
                preset,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::Backend(format!("TTS server returned {}", status)));
        }

        let body = response.bytes().await?;
        if body.len() <= MIN_AUDIO_BYTES {
            return Err(VoxError::Backend(format!(
                "TTS server body too small to be audio ({} bytes)",
                body.len()
            )));
        }

        info!("TTS server audio received: {} bytes", body.len());
        Ok(AudioPayload::new(body.to_vec()))
    }

    /// Fetch the server's preset catalogue
    pub async fn list_voices(&self, server_url: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/voices", server_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SpeechBackend for ServerBackend {
    fn id(&self) -> BackendId {
        BackendId::Server
    }

    async fn attempt(&self, utterance: &Utterance, endpoints: &Endpoints) -> Option<AudioPayload> {
        match self.synthesize(utterance, &endpoints.server_url).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("TTS server failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        assert_eq!(preset_for("en"), "jesus_en");
        assert_eq!(preset_for("pt"), "jesus_pt");
        assert_eq!(preset_for("de"), "jesus_de");
    }

    #[test]
    fn test_unknown_language_uses_default_preset() {
        assert_eq!(preset_for("ja"), DEFAULT_PRESET);
        assert_eq!(preset_for(""), DEFAULT_PRESET);
    }

    #[tokio::test]
    async fn test_unreachable_server_returns_none() {
        let backend = ServerBackend::new(reqwest::Client::new());
        let endpoints = Endpoints {
            server_url: "http://127.0.0.1:1".to_string(),
            ..Endpoints::default()
        };
        let utterance = Utterance::new("Hello", "en");
        assert!(backend.attempt(&utterance, &endpoints).await.is_none());
    }
}
