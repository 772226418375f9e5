//! Local neural model backend
//!
//! The model is loaded on first use and kept for the life of the process.
//! Loading goes through a memoized cell, so concurrent or repeated requests
//! never trigger a second load. A failed load is not cached and will be
//! retried by the next request.

use super::{AudioPayload, BackendId, SpeechBackend, Utterance};
use crate::speech::codec::float_to_wav;
use crate::state::config::Endpoints;
use crate::{Result, VoxError};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Sample rate assumed when a model does not report one
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Voice used for every language
pub const DEFAULT_VOICE: &str = "am_adam";

/// Model language code used when a language has no entry
pub const DEFAULT_LANG_CODE: char = 'a';

const LANG_CODES: &[(&str, char)] = &[
    ("en", 'a'),
    ("pt", 'p'),
    ("es", 'e'),
    ("fr", 'f'),
    ("it", 'i'),
];

/// Voice parameters handed to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeuralVoice {
    pub voice: &'static str,
    pub lang_code: char,
}

impl NeuralVoice {
    pub fn for_language(lang: &str) -> Self {
        let lang_code = LANG_CODES
            .iter()
            .find(|(code, _)| *code == lang)
            .map(|(_, c)| *c)
            .unwrap_or(DEFAULT_LANG_CODE);
        Self {
            voice: DEFAULT_VOICE,
            lang_code,
        }
    }
}

/// Raw model output
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// A loaded speech synthesis model
#[async_trait]
pub trait NeuralModel: Send + Sync {
    async fn generate(&self, text: &str, voice: &NeuralVoice) -> Result<PcmAudio>;
}

/// Loads a model (slow, done once)
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn NeuralModel>>;
}

/// Backend running a lazily loaded local model
pub struct NeuralBackend {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn NeuralModel>>,
}

impl NeuralBackend {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    /// Whether the model has been loaded
    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// Get the model, loading it on first call
    async fn model(&self) -> Result<&Arc<dyn NeuralModel>> {
        self.model
            .get_or_try_init(|| async {
                info!("Loading local neural model...");
                let model = self.loader.load().await?;
                info!("Local neural model loaded");
                Ok::<_, VoxError>(model)
            })
            .await
    }

    async fn synthesize(&self, utterance: &Utterance) -> Result<AudioPayload> {
        let model = self.model().await?;
        let voice = NeuralVoice::for_language(utterance.lang());
        debug!(
            "Generating local speech (voice: {}, lang code: {})",
            voice.voice, voice.lang_code
        );

        let pcm = model.generate(utterance.text(), &voice).await?;
        let sample_rate = if pcm.sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            pcm.sample_rate
        };
        Ok(AudioPayload::new(float_to_wav(&pcm.samples, sample_rate)?))
    }
}

#[async_trait]
impl SpeechBackend for NeuralBackend {
    fn id(&self) -> BackendId {
        BackendId::Neural
    }

    async fn attempt(&self, utterance: &Utterance, _endpoints: &Endpoints) -> Option<AudioPayload> {
        match self.synthesize(utterance).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("Local neural model failed: {}", e);
                None
            }
        }
    }
}
