#[macro_use]
extern crate log;

use anyhow::Result;
use std::sync::Arc;
use voicechat_rs::{
    capture::{SpeechCapture, UnsupportedCapture},
    client::gemini::GeminiClient,
    config::{self, OutputKind},
    conversation::{self, Conversation},
    credential::CredentialStore,
    event::{self, EventBus},
    output::PlaybackEngine,
    speech::{self, SpeechController},
    stdin,
};

#[tokio::main]
async fn main() -> Result<()> {
    let filters = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    pretty_env_logger::formatted_builder()
        .parse_filters(&filters)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }

    let config = config::load().await?;

    let bus = EventBus::new();
    event::debug(&bus);

    let credentials = CredentialStore::new(&config.credential_file);
    let credential = match credentials.load().await {
        Ok(credential) => credential,
        Err(e) => {
            warn!("Ignoring unreadable credential file: {e:#}");
            None
        }
    };

    let gemini = Arc::new(GeminiClient::new(config.gemini.clone()));

    let engine = match config.output.kind {
        OutputKind::Device => PlaybackEngine::device(),
        OutputKind::Wav => PlaybackEngine::wav(config.output.wav_dir.clone()),
    };

    let speech = speech::init(
        &bus,
        SpeechController::new(
            bus.clone(),
            gemini.clone(),
            Arc::new(engine),
            credential.clone(),
        ),
    );

    let conversation = Arc::new(Conversation::new(
        bus.clone(),
        gemini,
        speech.clone(),
        credentials,
        credential,
    ));
    conversation::init(&bus, conversation.clone());

    let capture: Arc<dyn SpeechCapture> = Arc::new(UnsupportedCapture::new(&config.locale));

    let speaking = speech.read().await.speaking();
    stdin::start_printer(&bus, speaking);

    tokio::select! {
        result = stdin::run(&bus, conversation, capture) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    Ok(())
}
