//! Persisted settings
//!
//! Credentials, endpoints and engine preferences live in an INI file
//! (`~/.voxchain.cfg` unless `VOXCHAIN_CONFIG` points elsewhere). They are
//! loaded once at startup; every setter writes the file straight away.

use crate::speech::backends::EnginePolicy;
use crate::{Result, VoxError};
use ini::Ini;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "VOXCHAIN_CONFIG";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8765";
pub const DEFAULT_INFERENCE_URL: &str =
    "https://router.huggingface.co/hf-inference/models/Qwen/Qwen3-TTS-12Hz-1.7B-VoiceDesign";
pub const DEFAULT_NATIVE_RATE: f32 = 0.85;
pub const DEFAULT_NATIVE_PITCH: f32 = 0.9;

/// Snapshot of everything a backend needs to reach its service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// TTS server base URL
    pub server_url: String,
    /// Custom hosted space base URL
    pub space_url: Option<String>,
    /// Generic inference endpoint (needs `hf_token`)
    pub inference_url: String,
    /// Bearer credential for the inference endpoint
    pub hf_token: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            space_url: None,
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            hf_token: None,
        }
    }
}

/// Application settings backed by an INI file
pub struct Settings {
    /// INI storage
    ini: Ini,

    /// Settings file path
    path: PathBuf,
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(Self::settings_path())
    }

    /// Load settings from an explicit file, falling back to defaults if it is missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading settings from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| VoxError::IniParse(format!("Failed to load settings: {}", e)))?
        } else {
            info!("Settings file not found, using defaults");
            Self::default_settings()
        };

        Ok(Self { ini, path })
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        self.write(&self.ini)
    }

    fn write(&self, ini: &Ini) -> Result<()> {
        debug!("Saving settings to {:?}", self.path);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        ini.write_to_file(&self.path)
            .map_err(|e| VoxError::Config(format!("Failed to save settings: {}", e)))
    }

    /// Resolve the settings file path
    fn settings_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".voxchain.cfg")
    }

    /// Expose the settings file path for display
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_settings() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("engine"))
            .set("policy", "auto")
            .set("language", "auto");

        ini.with_section(Some("endpoints"))
            .set("server_url", DEFAULT_SERVER_URL)
            .set("inference_url", DEFAULT_INFERENCE_URL);

        ini.with_section(Some("native"))
            .set("rate", DEFAULT_NATIVE_RATE.to_string())
            .set("pitch", DEFAULT_NATIVE_PITCH.to_string());

        ini
    }

    /// Get a string value, treating blanks as absent
    fn get_opt(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get_from(Some(section), key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Get a string value from settings
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.get_opt(section, key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Get a float value from settings
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in memory without persisting
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    /// Set a value and write the file; memory is left untouched if the write fails
    fn set_and_save(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut updated = self.ini.clone();
        updated.with_section(Some(section)).set(key, value);
        self.write(&updated)?;
        self.ini = updated;
        Ok(())
    }

    /// Which backends speech requests may use
    pub fn policy(&self) -> EnginePolicy {
        let raw = self.get_string("engine", "policy", "auto");
        raw.parse().unwrap_or_else(|e| {
            warn!("{}, using auto", e);
            EnginePolicy::Auto
        })
    }

    /// Pinned language, or "auto" for detection
    pub fn language(&self) -> String {
        self.get_string("engine", "language", "auto")
    }

    pub fn hf_token(&self) -> Option<String> {
        self.get_opt("credentials", "hf_token")
    }

    pub fn server_url(&self) -> String {
        trim_url(&self.get_string("endpoints", "server_url", DEFAULT_SERVER_URL))
    }

    pub fn space_url(&self) -> Option<String> {
        self.get_opt("endpoints", "space_url").map(|u| trim_url(&u))
    }

    pub fn inference_url(&self) -> String {
        self.get_string("endpoints", "inference_url", DEFAULT_INFERENCE_URL)
    }

    /// Native speech rate as a multiple of the platform's normal rate
    pub fn native_rate(&self) -> f32 {
        self.get_float("native", "rate", DEFAULT_NATIVE_RATE)
    }

    /// Native speech pitch as a multiple of the platform's normal pitch
    pub fn native_pitch(&self) -> f32 {
        self.get_float("native", "pitch", DEFAULT_NATIVE_PITCH)
    }

    /// Current endpoint and credential snapshot
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            server_url: self.server_url(),
            space_url: self.space_url(),
            inference_url: self.inference_url(),
            hf_token: self.hf_token(),
        }
    }

    pub fn set_hf_token(&mut self, token: &str) -> Result<()> {
        info!("Inference token updated");
        self.set_and_save("credentials", "hf_token", token.trim())
    }

    pub fn set_space_url(&mut self, url: &str) -> Result<()> {
        info!("Hosted space URL set: {}", url);
        self.set_and_save("endpoints", "space_url", url.trim())
    }

    pub fn set_server_url(&mut self, url: &str) -> Result<()> {
        info!("TTS server URL set: {}", url);
        self.set_and_save("endpoints", "server_url", url.trim())
    }

    pub fn set_policy(&mut self, policy: EnginePolicy) -> Result<()> {
        info!("Engine policy set: {}", policy);
        self.set_and_save("engine", "policy", &policy.to_string())
    }

    pub fn set_language(&mut self, language: &str) -> Result<()> {
        info!("Language set: {}", language);
        self.set_and_save("engine", "language", language.trim())
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
