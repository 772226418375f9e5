//! Platform speech engine via the tts crate
//!
//! The `tts` crate wraps the host's speech service:
//! - Speech Dispatcher on Linux
//! - AVFoundation on macOS/iOS
//! - WinRT/SAPI on Windows
//!
//! This is the terminal fallback of the chain: no network, no credentials,
//! no model download. It produces no audio bytes and plays through the
//! platform itself: `start` hands the utterance over and `finished` resolves
//! once the platform has gone quiet.

use crate::{Result, VoxError};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tts::{Gender, Tts as TtsCrate};

/// Voice names tried first, in order
pub const PREFERRED_VOICES: &[&str] = &[
    "Daniel",
    "Google UK English Male",
    "Microsoft David",
    "Alex",
    "Thomas",
    "Google US English",
    "Luciano",
    "Jorge",
];

/// How often to check whether the platform is still speaking
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for speech to begin before assuming it already ended
const START_GRACE: Duration = Duration::from_millis(1500);

/// A speech engine that plays through the host platform
#[async_trait]
pub trait NativeSpeech: Send + Sync {
    /// Whether the platform engine exists
    fn is_available(&self) -> bool;

    /// Hand an utterance to the platform; returns once speech has been issued
    fn start(&self, text: &str, lang: &str) -> Result<()>;

    /// Resolve when the platform has stopped speaking
    async fn finished(&self);

    /// Silence current speech
    fn cancel(&self);
}

/// Platform locale for a language code
pub fn locale_for(lang: &str) -> &'static str {
    if lang == "pt" {
        "pt-BR"
    } else {
        "en-US"
    }
}

/// Minimal description of a platform voice, used for ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    pub language: String,
    pub male: bool,
}

impl VoiceInfo {
    fn speaks(&self, lang: &str) -> bool {
        self.language.to_lowercase().starts_with(lang)
    }

    fn sounds_male(&self) -> bool {
        self.male
            || self.name.to_lowercase().contains("male")
            || self.name.contains("Daniel")
            || self.name.contains("David")
    }
}

/// Rank platform voices and pick one for `lang`.
///
/// Order: a preferred name speaking the language, a male voice for the
/// language, any voice for the language, then any English voice.
pub fn select_voice(voices: &[VoiceInfo], lang: &str) -> Option<usize> {
    let lang = lang.to_lowercase();

    PREFERRED_VOICES
        .iter()
        .find_map(|pref| {
            voices
                .iter()
                .position(|v| v.name.contains(pref) && v.speaks(&lang))
        })
        .or_else(|| voices.iter().position(|v| v.speaks(&lang) && v.sounds_male()))
        .or_else(|| voices.iter().position(|v| v.speaks(&lang)))
        .or_else(|| voices.iter().position(|v| v.speaks("en")))
}

/// Native speech through the tts crate
pub struct SystemSpeech {
    /// The tts crate's instance, if the platform has one
    tts: Option<Mutex<TtsCrate>>,

    /// Rate as a multiple of the platform's normal rate
    rate: f32,

    /// Pitch as a multiple of the platform's normal pitch
    pitch: f32,
}

impl SystemSpeech {
    /// Connect to the platform engine.
    ///
    /// A missing engine is not an error; the instance reports itself
    /// unavailable, `start` does nothing and `finished` resolves at once.
    pub fn new(rate: f32, pitch: f32) -> Self {
        debug!("Creating native TTS backend");

        let tts = match TtsCrate::default() {
            Ok(tts) => {
                info!("Native speech engine available");
                Some(Mutex::new(tts))
            }
            Err(e) => {
                info!("Native speech engine unavailable: {}", e);
                None
            }
        };

        Self { tts, rate, pitch }
    }

    /// Handle on the shared platform engine
    fn engine(&self) -> Option<TtsCrate> {
        self.tts.as_ref().map(|tts| tts.lock().clone())
    }

    fn configure(&self, tts: &mut TtsCrate, lang: &str) -> Result<()> {
        let features = tts.supported_features();

        if features.rate {
            let rate = (tts.normal_rate() * self.rate).clamp(tts.min_rate(), tts.max_rate());
            tts.set_rate(rate)
                .map_err(|e| VoxError::Speech(format!("Failed to set rate: {}", e)))?;
        } else {
            debug!("Rate control not supported on this platform");
        }

        if features.pitch {
            let pitch = (tts.normal_pitch() * self.pitch).clamp(tts.min_pitch(), tts.max_pitch());
            tts.set_pitch(pitch)
                .map_err(|e| VoxError::Speech(format!("Failed to set pitch: {}", e)))?;
        } else {
            debug!("Pitch control not supported on this platform");
        }

        if features.voice {
            let voices = tts
                .voices()
                .map_err(|e| VoxError::Speech(format!("Failed to get voices: {}", e)))?;
            let infos: Vec<VoiceInfo> = voices
                .iter()
                .map(|v| VoiceInfo {
                    name: v.name(),
                    language: v.language().as_str().to_string(),
                    male: matches!(v.gender(), Some(Gender::Male)),
                })
                .collect();

            match select_voice(&infos, lang) {
                Some(idx) => {
                    debug!("Selecting voice: {} ({})", infos[idx].name, infos[idx].language);
                    tts.set_voice(&voices[idx])
                        .map_err(|e| VoxError::Speech(format!("Failed to set voice: {}", e)))?;
                }
                None => warn!("No voice found for {}", locale_for(lang)),
            }
        }

        Ok(())
    }

    /// Wait for the platform to start and then finish speaking
    async fn wait_for_end(tts: TtsCrate) {
        if !tts.supported_features().is_speaking {
            return;
        }

        let started = Instant::now();
        let mut seen_speaking = false;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            match tts.is_speaking() {
                Ok(true) => seen_speaking = true,
                Ok(false) if seen_speaking || started.elapsed() > START_GRACE => break,
                Ok(false) => {}
                Err(e) => {
                    debug!("is_speaking failed: {}", e);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl NativeSpeech for SystemSpeech {
    fn is_available(&self) -> bool {
        self.tts.is_some()
    }

    fn start(&self, text: &str, lang: &str) -> Result<()> {
        let Some(mut tts) = self.engine() else {
            warn!("Native speech not available");
            return Ok(());
        };
        if text.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.configure(&mut tts, lang) {
            // A voice we could not set still leaves a working engine
            warn!("{}", e);
        }

        debug!("Speaking natively ({}): {}", locale_for(lang), text);
        tts.speak(text, true).map_err(|e| {
            error!("Failed to speak: {}", e);
            VoxError::Speech(format!("Speak failed: {}", e))
        })?;
        Ok(())
    }

    async fn finished(&self) {
        if let Some(tts) = self.engine() {
            Self::wait_for_end(tts).await;
        }
    }

    fn cancel(&self) {
        if let Some(mut tts) = self.engine() {
            debug!("Canceling native speech");
            if let Err(e) = tts.stop() {
                debug!("Failed to cancel speech: {}", e);
            }
        }
    }
}
