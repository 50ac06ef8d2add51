//! Speech-to-text input.
//!
//! Capture is optional: hosts without a recogniser report themselves as
//! unsupported and the front end hides the listen command.

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech capture is not supported on this host")]
    Unsupported,

    #[error("No speech was recognised")]
    NoSpeech,

    #[error("Speech capture failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait SpeechCapture: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Listen once and return the best transcript.
    async fn listen(&self) -> Result<String, CaptureError>;
}

/// Capture for hosts with no speech recogniser.
pub struct UnsupportedCapture {
    locale: String,
}

impl UnsupportedCapture {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }
}

#[async_trait]
impl SpeechCapture for UnsupportedCapture {
    fn is_supported(&self) -> bool {
        false
    }

    async fn listen(&self) -> Result<String, CaptureError> {
        debug!("Speech capture requested for {}, not available", self.locale);
        Err(CaptureError::Unsupported)
    }
}
