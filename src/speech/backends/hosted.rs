//! Hosted inference backend
//!
//! Two transports, tried in order:
//! 1. A custom deployed space: `POST {space}/api/predict` with
//!    `{data: [text, instruction, lang]}`. The first element of the reply's
//!    `data` array is either a `data:audio` URL or a server-side file path
//!    fetched from `GET {space}/file={path}`.
//! 2. The generic inference endpoint: `POST {inference_url}` with a bearer
//!    token and `{inputs, parameters: {voice_instruction}}`, answering with
//!    raw audio.
//!
//! The voice instruction is a natural-language description of the voice,
//! Portuguese for `pt` and English otherwise.

use super::{AudioPayload, BackendId, SpeechBackend, Utterance};
use crate::speech::codec::decode_data_url;
use crate::state::config::Endpoints;
use crate::{Result, VoxError};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

pub const VOICE_INSTRUCTION_EN: &str = "A warm, deep male voice with gentle authority and spiritual compassion. Calm and reassuring, like a wise teacher speaking with love and wisdom. Speak slowly and clearly.";

pub const VOICE_INSTRUCTION_PT: &str = "Uma voz masculina profunda e calorosa com autoridade gentil e compaixão espiritual. Calma e reconfortante, como um professor sábio falando com amor e sabedoria. Fale devagar e claramente.";

/// Voice instruction for a language
pub fn voice_instruction(lang: &str) -> &'static str {
    if lang == "pt" {
        VOICE_INSTRUCTION_PT
    } else {
        VOICE_INSTRUCTION_EN
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    data: Vec<Value>,
}

/// Where the space put the generated audio
#[derive(Debug, PartialEq, Eq)]
enum SpaceAudio {
    Inline(String),
    File(String),
}

impl SpaceAudio {
    fn from_value(value: &Value) -> Option<Self> {
        let reference = match value {
            Value::String(s) => s.as_str(),
            // Newer spaces wrap files as {path, url, ...}
            Value::Object(map) => map.get("path").and_then(Value::as_str)?,
            _ => return None,
        };
        if reference.is_empty() {
            None
        } else if reference.starts_with("data:audio") {
            Some(Self::Inline(reference.to_string()))
        } else {
            Some(Self::File(reference.to_string()))
        }
    }
}

/// Hosted inference backend
pub struct HostedBackend {
    client: reqwest::Client,
}

impl HostedBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn via_space(&self, utterance: &Utterance, space_url: &str) -> Result<AudioPayload> {
        debug!("Using hosted space: {}", space_url);

        let response = self
            .client
            .post(format!("{}/api/predict", space_url))
            .json(&json!({
                "data": [utterance.text(), voice_instruction(utterance.lang()), utterance.lang()],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::Backend(format!("Space returned {}", status)));
        }

        let result: PredictResponse = response.json().await?;
        let audio = result
            .data
            .first()
            .and_then(SpaceAudio::from_value)
            .ok_or_else(|| VoxError::Backend("Space reply has no audio".to_string()))?;

        let bytes = match audio {
            SpaceAudio::Inline(url) => decode_data_url(&url)?,
            SpaceAudio::File(path) => {
                debug!("Fetching space file: {}", path);
                self.client
                    .get(format!("{}/file={}", space_url, path))
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?
                    .to_vec()
            }
        };

        non_empty(bytes, "Space")
    }

    async fn via_inference(
        &self,
        utterance: &Utterance,
        inference_url: &str,
        token: &str,
    ) -> Result<AudioPayload> {
        debug!("Using inference API");

        let response = self
            .client
            .post(inference_url)
            .bearer_auth(token)
            .json(&json!({
                "inputs": utterance.text(),
                "parameters": {
                    "voice_instruction": voice_instruction(utterance.lang()),
                },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VoxError::Backend(format!("Inference API returned {}", status)));
        }

        non_empty(response.bytes().await?.to_vec(), "Inference API")
    }
}

fn non_empty(bytes: Vec<u8>, source: &str) -> Result<AudioPayload> {
    if bytes.is_empty() {
        return Err(VoxError::Backend(format!("{} returned an empty body", source)));
    }
    info!("{} audio received: {} bytes", source, bytes.len());
    Ok(AudioPayload::new(bytes))
}

#[async_trait]
impl SpeechBackend for HostedBackend {
    fn id(&self) -> BackendId {
        BackendId::Hosted
    }

    async fn attempt(&self, utterance: &Utterance, endpoints: &Endpoints) -> Option<AudioPayload> {
        if let Some(space_url) = &endpoints.space_url {
            match self.via_space(utterance, space_url).await {
                Ok(audio) => return Some(audio),
                Err(e) => warn!("Hosted space failed: {}", e),
            }
        }

        if let Some(token) = &endpoints.hf_token {
            match self
                .via_inference(utterance, &endpoints.inference_url, token)
                .await
            {
                Ok(audio) => return Some(audio),
                Err(e) => warn!("Inference API failed: {}", e),
            }
        }

        None
    }
}
