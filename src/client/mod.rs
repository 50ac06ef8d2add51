//! Remote services used by the assistant.
//!
//! Both the chat model and the speech synthesizer sit behind small traits so
//! the speech pipeline and the conversation can run against fakes.

pub mod gemini;

use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("The API key was not provided.")]
    MissingCredential,

    #[error("The API key is not valid. Please check it and try again.")]
    InvalidCredential,

    #[error("Could not get a reply from the Gemini API: {0}")]
    ChatFailure(String),

    #[error("Could not get audio from the Gemini API: {0}")]
    SynthesisFailure(String),
}

impl ServiceError {
    /// Whether the user has to enter a new credential before retrying
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            ServiceError::MissingCredential | ServiceError::InvalidCredential
        )
    }
}

/// Turns text into speech audio.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Returns base64 encoded 16-bit PCM at 24 kHz, mono.
    async fn synthesize(&self, text: &str, credential: &str) -> Result<String, ServiceError>;
}

/// Produces the assistant's reply to a user message.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn get_reply(&self, text: &str, credential: &str) -> Result<String, ServiceError>;
}
