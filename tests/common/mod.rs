//! Test infrastructure for voicechat-rs integration tests.
//!
//! Provides fake remote services, a fake audio output, and helpers for
//! watching the event bus without a sound card or network access.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

// Re-export key types from the main crate
pub use voicechat_rs::client::{ChatClient, ServiceError, SynthesisClient};
pub use voicechat_rs::conversation::ChatAction;
pub use voicechat_rs::decoder::AudioAsset;
pub use voicechat_rs::event::{Event, EventBus, Subscriber};
pub use voicechat_rs::message::{Message, MessageAction, Sender};
pub use voicechat_rs::output::{
    ActiveSound, AudioOutput, CompletionCallback, PlaybackEngine, PlaybackError,
};
pub use voicechat_rs::speech::{self, SharedSpeech, SpeechAction, SpeechController};

pub const TEST_KEY: &str = "test-api-key";

/// Base64 payload of `frames` mono 16-bit samples
pub fn pcm_payload(frames: usize) -> String {
    let bytes: Vec<u8> = std::iter::repeat(1000i16)
        .take(frames)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    STANDARD.encode(bytes)
}

/// Synthesizer returning one frame of audio per byte of input text, so tests
/// can tell utterances apart by the length of what gets played.
#[derive(Default)]
pub struct FakeSynthesizer {
    requests: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    garbled: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call takes `delay` before returning
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make synthesis of `text` fail
    pub fn fail_on(&self, text: &str) {
        self.failing.lock().unwrap().insert(text.to_string());
    }

    /// Make synthesis of `text` succeed with a payload that is not base64
    pub fn garble_on(&self, text: &str) {
        self.garbled.lock().unwrap().insert(text.to_string());
    }

    /// Texts synthesized so far, in call order
    pub fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, credential)| credential.clone())
            .collect()
    }
}

#[async_trait]
impl SynthesisClient for FakeSynthesizer {
    async fn synthesize(&self, text: &str, credential: &str) -> Result<String, ServiceError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), credential.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(text) {
            return Err(ServiceError::SynthesisFailure(format!(
                "synthesis of {text:?} failed"
            )));
        }

        if self.garbled.lock().unwrap().contains(text) {
            return Ok("!!!".to_string());
        }

        Ok(pcm_payload(text.len()))
    }
}

/// Output that never makes a sound. Each started asset stays "playing" until
/// the test ends it with [`FakeOutput::finish_latest`] or [`FakeOutput::finish`].
#[derive(Default)]
pub struct FakeOutput {
    started: Mutex<Vec<usize>>,
    ends: Mutex<Vec<Option<CompletionCallback>>>,
    halted: Arc<AtomicUsize>,
    unsupported: bool,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output refusing every asset as if the host had no audio device
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    /// Frame counts of the assets started so far
    pub fn started(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn halted(&self) -> usize {
        self.halted.load(Ordering::SeqCst)
    }

    /// Report the `index`th started asset as played to its end
    pub fn finish(&self, index: usize) {
        let on_end = self
            .ends
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(|end| end.take());

        if let Some(on_end) = on_end {
            on_end();
        }
    }

    /// Report the most recently started asset as played to its end
    pub fn finish_latest(&self) {
        let latest = self.ends.lock().unwrap().len().checked_sub(1);
        if let Some(index) = latest {
            self.finish(index);
        }
    }
}

struct FakeSound {
    halted: Arc<AtomicUsize>,
}

impl ActiveSound for FakeSound {
    fn halt(&mut self) {
        self.halted.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioOutput for FakeOutput {
    fn start(
        &self,
        asset: &AudioAsset,
        on_end: CompletionCallback,
    ) -> Result<Box<dyn ActiveSound>, PlaybackError> {
        if self.unsupported {
            return Err(PlaybackError::Unsupported("no audio device".to_string()));
        }

        self.started.lock().unwrap().push(asset.frames());
        self.ends.lock().unwrap().push(Some(on_end));

        Ok(Box::new(FakeSound {
            halted: self.halted.clone(),
        }))
    }
}

/// Chat model answering every message with a fixed reply, or a fixed error.
pub struct FakeChat {
    reply: Result<String, ServiceError>,
    requests: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(error: ServiceError) -> Self {
        Self {
            reply: Err(error),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// (text, credential) pairs received so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn get_reply(&self, text: &str, credential: &str) -> Result<String, ServiceError> {
        self.requests
            .lock()
            .unwrap()
            .push((text.to_string(), credential.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.reply.clone()
    }
}

/// Speech pipeline wired to fakes and running on its own bus.
pub struct SpeechHarness {
    pub bus: EventBus,
    pub synthesizer: Arc<FakeSynthesizer>,
    pub output: Arc<FakeOutput>,
    pub speech: SharedSpeech,
}

impl SpeechHarness {
    pub fn new() -> Self {
        Self::with_parts(FakeSynthesizer::new(), FakeOutput::new(), Some(TEST_KEY))
    }

    pub fn with_parts(
        synthesizer: FakeSynthesizer,
        output: FakeOutput,
        credential: Option<&str>,
    ) -> Self {
        let bus = EventBus::new();
        let synthesizer = Arc::new(synthesizer);
        let output = Arc::new(output);
        let engine = Arc::new(PlaybackEngine::with_output(output.clone()));

        let controller = SpeechController::new(
            bus.clone(),
            synthesizer.clone(),
            engine,
            credential.map(|c| c.to_string()),
        );
        let speech = speech::init(&bus, controller);

        Self {
            bus,
            synthesizer,
            output,
            speech,
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        self.bus.subscribe()
    }

    pub fn enqueue(&self, text: &str) {
        self.bus.send(Event::Speech(SpeechAction::Enqueue {
            text: text.to_string(),
        }));
    }

    pub fn interrupt(&self, text: &str) {
        self.bus.send(Event::Speech(SpeechAction::Interrupt {
            text: text.to_string(),
        }));
    }

    pub async fn is_speaking(&self) -> bool {
        self.speech.read().await.is_speaking()
    }
}

impl Default for SpeechHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Collects all events from a subscriber within a timeout period.
/// Returns events in the order they were received.
pub async fn collect_events(subscriber: &mut Subscriber, timeout: Duration) -> Vec<Event> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(n)) => {
                eprintln!("Warning: subscriber lagged, missed {n} events");
            }
            Err(TryRecvError::Closed) => break,
        }
    }

    events
}

/// Waits for a specific type of event within a timeout.
pub async fn wait_for_event<F>(
    subscriber: &mut Subscriber,
    timeout: Duration,
    matches: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match subscriber.try_recv() {
            Ok(event) if matches(&event) => return Some(event),
            Ok(_) => continue,
            Err(TryRecvError::Empty) => {
                if tokio::time::Instant::now() >= deadline {
                    return None;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => return None,
        }
    }
}

/// Transcript messages carried by the events, in order.
pub fn messages(events: &[Event]) -> Vec<&Message> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Message(MessageAction::Send(message)) => Some(message),
            _ => None,
        })
        .collect()
}

/// Texts of the error messages carried by the events.
pub fn error_texts(events: &[Event]) -> Vec<&str> {
    messages(events)
        .into_iter()
        .filter(|m| m.is_error)
        .map(|m| m.text.as_str())
        .collect()
}

/// Speaking state changes carried by the events, in order.
pub fn speaking_changes(events: &[Event]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Speech(SpeechAction::SpeakingChanged { speaking }) => Some(*speaking),
            _ => None,
        })
        .collect()
}

/// Asserts that a specific event type was received.
#[macro_export]
macro_rules! assert_event_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            $events.iter().any(|e| matches!(e, $pattern)),
            "Expected event matching {} not found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}

/// Asserts that a specific event type was NOT received.
#[macro_export]
macro_rules! assert_event_not_received {
    ($events:expr, $pattern:pat) => {
        assert!(
            !$events.iter().any(|e| matches!(e, $pattern)),
            "Unexpected event matching {} found in {:?}",
            stringify!($pattern),
            $events
        );
    };
}
