//! Platform capability detection
//!
//! Optional platform features are probed once when the engine starts and
//! handed down as a plain value, so call sites never poke at the platform.

use crate::speech::backends::native::NativeSpeech;
use log::info;

/// What the host platform offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A platform speech engine exists
    pub native_speech: bool,
}

impl Capabilities {
    /// Query the platform once
    pub fn detect(native: &dyn NativeSpeech) -> Self {
        let caps = Self {
            native_speech: native.is_available(),
        };
        info!("Platform capabilities: native speech = {}", caps.native_speech);
        caps
    }
}
