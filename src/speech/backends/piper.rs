//! Piper runtime for the local neural model
//!
//! "Loading" locates the piper binary and indexes the available voice models
//! (each `*.onnx` file with its `*.onnx.json` config). Generation streams raw
//! 16-bit PCM out of piper and hands it back as float samples.
//!
//! Env overrides:
//! - PIPER_BIN: piper executable (otherwise searched on PATH)
//! - PIPER_VOICE: a single voice model file
//! - PIPER_VOICE_DIR: directory of voice models

use super::neural::{ModelLoader, NeuralModel, NeuralVoice, PcmAudio, DEFAULT_SAMPLE_RATE};
use crate::{Result, VoxError};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Where to find piper and its voices
#[derive(Debug, Clone, Default)]
pub struct PiperLoader {
    pub bin: Option<PathBuf>,
    pub voice: Option<PathBuf>,
    pub voice_dir: Option<PathBuf>,
}

impl PiperLoader {
    /// Resolve piper and voice locations from the environment
    pub fn from_env() -> Self {
        Self {
            bin: get_from_env_or_path("PIPER_BIN", "piper"),
            voice: std::env::var("PIPER_VOICE").ok().map(PathBuf::from),
            voice_dir: std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from),
        }
    }
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(default_bin))
        .find(|candidate| candidate.exists())
}

#[derive(Debug, Deserialize, Default)]
struct VoiceConfig {
    #[serde(default)]
    audio: AudioConfig,
    #[serde(default)]
    language: Option<LanguageConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct AudioConfig {
    #[serde(default)]
    sample_rate: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LanguageConfig {
    #[serde(default)]
    code: String,
}

/// One indexed voice model
#[derive(Debug, Clone)]
struct PiperVoice {
    model: PathBuf,
    /// Two-letter language family ("en" for "en_US")
    language: String,
    sample_rate: u32,
}

async fn read_voice(model: &Path) -> Result<PiperVoice> {
    let mut config_path = model.as_os_str().to_owned();
    config_path.push(".json");
    let config: VoiceConfig = match tokio::fs::read(&config_path).await {
        Ok(raw) => serde_json::from_slice(&raw)?,
        Err(e) => {
            debug!("No config for {:?}: {}", model, e);
            VoiceConfig::default()
        }
    };

    let language = config
        .language
        .map(|l| crate::speech::language::normalize_language(&l.code))
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string());

    Ok(PiperVoice {
        model: model.to_path_buf(),
        language,
        sample_rate: config.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
    })
}

#[async_trait]
impl ModelLoader for PiperLoader {
    async fn load(&self) -> Result<Arc<dyn NeuralModel>> {
        let bin = self
            .bin
            .clone()
            .ok_or_else(|| VoxError::Speech("piper binary not found; set PIPER_BIN".to_string()))?;

        let mut models = Vec::new();
        if let Some(voice) = &self.voice {
            models.push(voice.clone());
        }
        if let Some(dir) = &self.voice_dir {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "onnx") {
                    models.push(path);
                }
            }
        }

        let mut voices = Vec::new();
        for model in models.iter().filter(|m| m.exists()) {
            voices.push(read_voice(model).await?);
        }
        if voices.is_empty() {
            return Err(VoxError::Speech(
                "No piper voice models found; set PIPER_VOICE or PIPER_VOICE_DIR".to_string(),
            ));
        }

        info!("Piper ready with {} voice model(s)", voices.len());
        Ok(Arc::new(PiperModel { bin, voices }))
    }
}

/// Language family for a model language code
fn language_for_code(code: char) -> &'static str {
    match code {
        'a' | 'b' => "en",
        'p' => "pt",
        'e' => "es",
        'f' => "fr",
        'i' => "it",
        _ => "en",
    }
}

/// Piper with its indexed voices
struct PiperModel {
    bin: PathBuf,
    voices: Vec<PiperVoice>,
}

impl PiperModel {
    fn voice_for(&self, voice: &NeuralVoice) -> &PiperVoice {
        let language = language_for_code(voice.lang_code);
        self.voices
            .iter()
            .find(|v| v.language == language)
            .unwrap_or(&self.voices[0])
    }
}

#[async_trait]
impl NeuralModel for PiperModel {
    async fn generate(&self, text: &str, voice: &NeuralVoice) -> Result<PcmAudio> {
        let selected = self.voice_for(voice);
        debug!("Running piper with {:?}", selected.model);

        let mut child = Command::new(&self.bin)
            .arg("--model")
            .arg(&selected.model)
            .arg("--output-raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(VoxError::Speech(format!(
                "piper failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(PcmAudio {
            samples: pcm16_to_float(&output.stdout),
            sample_rate: selected.sample_rate,
        })
    }
}

/// Convert little-endian 16-bit PCM to floats in -1.0..1.0
fn pcm16_to_float(raw: &[u8]) -> Vec<f32> {
    raw.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect()
}
