//! Speech engine
//!
//! Drives one speech request through the fallback chain:
//!
//! 1. TTS server (skipped for the whole session if the startup probe failed)
//! 2. Hosted inference (custom space, then the generic inference API)
//! 3. Local neural model
//! 4. Platform speech, tried unconditionally once everything else failed
//!
//! The first backend to return audio wins and its bytes go to the playback
//! controller. Backends run strictly one after another. A request that is
//! stopped or replaced while a backend is still working lets that backend
//! finish but drops its result.

use super::backends::hosted::HostedBackend;
use super::backends::native::{NativeSpeech, SystemSpeech};
use super::backends::neural::{ModelLoader, NeuralBackend};
use super::backends::piper::PiperLoader;
use super::backends::server::ServerBackend;
use super::backends::{BackendId, EnginePolicy, SpeechBackend, Utterance};
use super::language::{detect_language, normalize_language};
use super::playback::{AudioOutput, PlaybackController, RodioOutput, SpeechListener};
use super::probe::{probe, Availability};
use crate::platform::Capabilities;
use crate::state::config::Settings;
use crate::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Transport timeout for backend requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Collaborators the engine is built from
pub struct EngineParts {
    pub client: reqwest::Client,
    pub output: Arc<dyn AudioOutput>,
    pub native: Arc<dyn NativeSpeech>,
    pub loader: Arc<dyn ModelLoader>,
}

impl EngineParts {
    /// Real network client, sound device, platform speech and piper
    pub fn system(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            output: Arc::new(RodioOutput::new()),
            native: Arc::new(SystemSpeech::new(
                settings.native_rate(),
                settings.native_pitch(),
            )),
            loader: Arc::new(PiperLoader::from_env()),
        })
    }
}

/// Snapshot returned by [`SpeechEngine::status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    /// Active policy
    pub engine: EnginePolicy,
    #[serde(rename = "hasHFToken")]
    pub has_hf_token: bool,
    pub has_space_url: bool,
    pub model_loaded: bool,
    pub native_speech_available: bool,
    pub server_available: bool,
    pub is_playing: bool,
}

/// The speech engine: settings, probe results and the playback handle
pub struct SpeechEngine {
    settings: Mutex<Settings>,
    availability: Availability,
    capabilities: Capabilities,
    server: ServerBackend,
    hosted: HostedBackend,
    neural: NeuralBackend,
    playback: PlaybackController,
}

impl SpeechEngine {
    /// Build the engine with real system components
    pub async fn init(settings: Settings) -> Result<Self> {
        let parts = EngineParts::system(&settings)?;
        Ok(Self::start(settings, parts).await)
    }

    /// Probe the backends and assemble the engine
    pub async fn start(settings: Settings, parts: EngineParts) -> Self {
        info!("Starting speech engine (policy: {})", settings.policy());

        let availability = probe(&parts.client, &settings.endpoints()).await;
        let capabilities = Capabilities::detect(parts.native.as_ref());
        let playback = PlaybackController::new(parts.output, parts.native, capabilities);

        Self {
            settings: Mutex::new(settings),
            availability,
            capabilities,
            server: ServerBackend::new(parts.client.clone()),
            hosted: HostedBackend::new(parts.client),
            neural: NeuralBackend::new(parts.loader),
            playback,
        }
    }

    /// The byte-producing tiers, in fallback order
    fn tiers(&self) -> [&dyn SpeechBackend; 3] {
        [&self.server, &self.hosted, &self.neural]
    }

    /// Speak `text`.
    ///
    /// `lang` pins the language for this request; otherwise the configured
    /// language or detection decides. Never fails: backend errors are logged
    /// and the worst outcome is silence. Whatever was playing stops first,
    /// even when `text` is blank.
    pub async fn speak(&self, text: &str, lang: Option<&str>) {
        let ticket = self.playback.begin_request();
        if text.trim().is_empty() {
            debug!("Ignoring empty speech request");
            return;
        }

        let (policy, pinned, endpoints) = {
            let settings = self.settings.lock();
            (settings.policy(), settings.language(), settings.endpoints())
        };
        let lang = match lang.map(str::trim) {
            Some(l) if !l.is_empty() && !l.eq_ignore_ascii_case("auto") => {
                normalize_language(l)
            }
            _ => detect_language(text, &pinned),
        };
        let utterance = Utterance::new(text, lang);

        info!(
            "Speech request {} ({}, policy {}): {}",
            ticket,
            utterance.lang(),
            policy,
            text
        );

        for backend in self.tiers() {
            let id = backend.id();
            if !policy.includes(id) {
                debug!("Skipping {} backend: not selected", id);
                continue;
            }
            if id == BackendId::Server && !self.availability.server_reachable {
                debug!("Skipping {} backend: not reachable at startup", id);
                continue;
            }

            info!("Trying {} backend...", id);
            let audio = backend.attempt(&utterance, &endpoints).await;

            if !self.playback.is_current(ticket) {
                debug!("Request {} superseded, dropping {} result", ticket, id);
                return;
            }

            match audio {
                Some(audio) => {
                    info!("✓ {} backend produced {} bytes", id, audio.len());
                    if let Err(e) = self.playback.play(ticket, audio) {
                        warn!("Playback failed: {}", e);
                    }
                    return;
                }
                None => info!("✗ {} backend produced nothing", id),
            }
        }

        if !self.playback.is_current(ticket) {
            return;
        }
        info!("Falling back to {} speech", BackendId::Native);
        self.playback.speak_native(ticket, &utterance).await;
    }

    /// Stop anything audible and drop results of in-flight requests
    pub fn stop(&self) {
        self.playback.stop();
    }

    /// Resolve once nothing is playing
    pub async fn wait_until_idle(&self) {
        while self.playback.is_playing() {
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Register a speech start/end observer
    pub fn add_listener(&self, listener: Arc<dyn SpeechListener>) {
        self.playback.add_listener(listener);
    }

    pub fn status(&self) -> EngineStatus {
        let settings = self.settings.lock();
        EngineStatus {
            engine: settings.policy(),
            has_hf_token: settings.hf_token().is_some(),
            has_space_url: settings.space_url().is_some(),
            model_loaded: self.neural.is_loaded(),
            native_speech_available: self.capabilities.native_speech,
            server_available: self.availability.server_reachable,
            is_playing: self.playback.is_playing(),
        }
    }

    /// Voice presets offered by the TTS server
    pub async fn list_server_voices(&self) -> Result<serde_json::Value> {
        let server_url = self.settings.lock().server_url();
        self.server.list_voices(&server_url).await
    }

    pub fn set_hf_token(&self, token: &str) -> Result<()> {
        self.settings.lock().set_hf_token(token)
    }

    pub fn set_space_url(&self, url: &str) -> Result<()> {
        self.settings.lock().set_space_url(url)
    }

    /// Used from the next request on. Reachability is not re-checked: a
    /// server found unreachable at startup stays skipped for the session.
    pub fn set_server_url(&self, url: &str) -> Result<()> {
        self.settings.lock().set_server_url(url)
    }

    pub fn set_policy(&self, policy: EnginePolicy) -> Result<()> {
        self.settings.lock().set_policy(policy)
    }

    pub fn set_language(&self, language: &str) -> Result<()> {
        self.settings.lock().set_language(language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::backends::neural::NeuralModel;
    use crate::speech::backends::AudioPayload;
    use crate::speech::playback::PlaybackNode;
    use crate::VoxError;
    use async_trait::async_trait;

    struct NoOutput;

    impl AudioOutput for NoOutput {
        fn start(&self, _audio: AudioPayload) -> Result<Box<dyn PlaybackNode>> {
            Err(VoxError::Playback("no device".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNative {
        spoken: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NativeSpeech for RecordingNative {
        fn is_available(&self) -> bool {
            true
        }

        fn start(&self, text: &str, lang: &str) -> Result<()> {
            self.spoken.lock().push((text.to_string(), lang.to_string()));
            Ok(())
        }

        async fn finished(&self) {}

        fn cancel(&self) {}
    }

    struct MissingModel;

    #[async_trait]
    impl ModelLoader for MissingModel {
        async fn load(&self) -> Result<Arc<dyn NeuralModel>> {
            Err(VoxError::Speech("no model".to_string()))
        }
    }

    async fn offline_engine(dir: &tempfile::TempDir) -> (SpeechEngine, Arc<RecordingNative>) {
        let mut settings = Settings::load_from(dir.path().join("voxchain.cfg")).unwrap();
        settings.set("endpoints", "server_url", "http://127.0.0.1:1");
        let native = Arc::new(RecordingNative::default());
        let parts = EngineParts {
            client: reqwest::Client::new(),
            output: Arc::new(NoOutput),
            native: native.clone(),
            loader: Arc::new(MissingModel),
        };
        (SpeechEngine::start(settings, parts).await, native)
    }

    #[tokio::test]
    async fn test_status_before_any_speech() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = offline_engine(&dir).await;
        let status = engine.status();

        assert_eq!(status.engine, EnginePolicy::Auto);
        assert!(!status.has_hf_token);
        assert!(!status.is_playing);
        assert!(!status.server_available);
        assert!(!status.model_loaded);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["hasHFToken"], false);
        assert_eq!(json["isPlaying"], false);
        assert_eq!(json["engine"], "auto");
    }

    #[tokio::test]
    async fn test_exhausted_chain_uses_native() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, native) = offline_engine(&dir).await;

        engine.speak("Você está bem, filho?", None).await;

        let spoken = native.spoken.lock().clone();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].1, "pt");
        assert!(!engine.status().is_playing);
    }

    #[tokio::test]
    async fn test_native_policy_still_reaches_native() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, native) = offline_engine(&dir).await;
        engine.set_policy(EnginePolicy::Native).unwrap();

        engine.speak("Peace be with you", Some("en-US")).await;

        let spoken = native.spoken.lock().clone();
        assert_eq!(spoken, vec![("Peace be with you".to_string(), "en".to_string())]);
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, native) = offline_engine(&dir).await;

        engine.speak("   ", None).await;
        assert!(native.spoken.lock().is_empty());
    }

    #[tokio::test]
    async fn test_auto_language_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, native) = offline_engine(&dir).await;

        engine.speak("Obrigado, meu filho", Some("AUTO")).await;
        engine.speak("Thank you, my son", Some(" Auto ")).await;

        let langs: Vec<String> = native.spoken.lock().iter().map(|s| s.1.clone()).collect();
        assert_eq!(langs, vec!["pt".to_string(), "en".to_string()]);
    }

    #[tokio::test]
    async fn test_tiers_follow_fallback_order() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = offline_engine(&dir).await;

        let ids: Vec<BackendId> = engine.tiers().iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec![BackendId::Server, BackendId::Hosted, BackendId::Neural]);
    }

    #[tokio::test]
    async fn test_setters_are_reflected_in_status() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = offline_engine(&dir).await;

        engine.set_hf_token("hf_secret").unwrap();
        engine.set_space_url("https://example.hf.space/").unwrap();

        let status = engine.status();
        assert!(status.has_hf_token);
        assert!(status.has_space_url);

        let reloaded = Settings::load_from(dir.path().join("voxchain.cfg")).unwrap();
        assert_eq!(reloaded.hf_token().as_deref(), Some("hf_secret"));
    }
}
