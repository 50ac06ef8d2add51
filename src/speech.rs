//! Sequential speech playback.
//!
//! Utterances are synthesized, decoded and played one at a time. The
//! controller only ever has one utterance in flight; every dequeued utterance
//! is stamped with a generation number and asynchronous continuations that
//! belong to an older generation (after an interruption) are dropped.
//!
//! Continuations come back on a private unbounded channel rather than the
//! shared bus, so a slow controller can lag behind bus traffic without ever
//! losing track of its own work.

use crate::{
    client::{ServiceError, SynthesisClient},
    constants::{CHANNELS, SAMPLE_RATE},
    decoder,
    event::{Event, EventBus, Subscriber},
    message::MessageAction,
    output::{PlaybackEngine, PlaybackError, PlaybackHandle},
    queue::UtteranceQueue,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

#[derive(Clone, Debug)]
pub enum SpeechAction {
    /// Add text at the end of the speech queue
    Enqueue { text: String },

    /// Stop whatever is being spoken, drop the queue and speak text now
    Interrupt { text: String },

    /// Notification that the speaking state changed
    SpeakingChanged { speaking: bool },
}

/// Result of asynchronous work started by the controller
#[derive(Debug)]
enum Continuation {
    /// Synthesis call for an utterance returned
    Synthesized {
        generation: u64,
        result: Result<String, ServiceError>,
    },

    /// Audio of an utterance played to its end
    PlaybackEnded { generation: u64 },
}

enum Stage {
    Idle,
    Synthesizing {
        generation: u64,
    },
    Playing {
        generation: u64,
        handle: PlaybackHandle,
    },
}

pub struct SpeechController {
    bus: EventBus,
    synthesizer: Arc<dyn SynthesisClient>,
    engine: Arc<PlaybackEngine>,
    credential: Option<String>,
    queue: UtteranceQueue,
    stage: Stage,
    generation: u64,
    speaking: watch::Sender<bool>,
    reported_unsupported: bool,
    continuations: mpsc::UnboundedSender<Continuation>,
    continuations_rx: Option<mpsc::UnboundedReceiver<Continuation>>,
}

impl SpeechController {
    pub fn new(
        bus: EventBus,
        synthesizer: Arc<dyn SynthesisClient>,
        engine: Arc<PlaybackEngine>,
        credential: Option<String>,
    ) -> Self {
        let (speaking, _rx) = watch::channel(false);
        let (continuations, continuations_rx) = mpsc::unbounded_channel();

        Self {
            bus,
            synthesizer,
            engine,
            credential: credential.filter(|c| !c.is_empty()),
            queue: UtteranceQueue::new(),
            stage: Stage::Idle,
            generation: 0,
            speaking,
            reported_unsupported: false,
            continuations,
            continuations_rx: Some(continuations_rx),
        }
    }

    /// Observe the speaking state
    pub fn speaking(&self) -> watch::Receiver<bool> {
        self.speaking.subscribe()
    }

    pub fn is_speaking(&self) -> bool {
        *self.speaking.borrow()
    }

    /// Utterances waiting behind the one in flight
    pub fn pending(&self) -> Vec<String> {
        self.queue.iter().cloned().collect()
    }

    pub fn set_credential(&mut self, credential: Option<String>) {
        self.credential = credential.filter(|c| !c.is_empty());
    }

    /// Queue text behind everything already queued.
    pub fn enqueue(&mut self, text: &str) {
        if text.trim().is_empty() || self.credential.is_none() {
            return;
        }

        self.queue.append(text);
        info!("Enqueued utterance, queue size: {}", self.queue.len());

        self.drain();
    }

    /// Silence the current utterance, forget the queue, and speak `text` next.
    pub fn interrupt_and_play(&mut self, text: &str) {
        if text.trim().is_empty() || self.credential.is_none() {
            return;
        }

        match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Playing {
                generation,
                mut handle,
            } => {
                info!("Interrupting utterance {generation} during playback");
                self.engine.stop(&mut handle);
            }
            Stage::Synthesizing { generation } => {
                info!("Interrupting utterance {generation} during synthesis");
            }
            Stage::Idle => {}
        }

        self.queue.clear();
        self.queue.append(text);

        self.drain();
    }

    fn drain(&mut self) {
        self.start_next();
        self.update_speaking();
    }

    fn start_next(&mut self) {
        if !matches!(self.stage, Stage::Idle) {
            return;
        }

        let Some(credential) = self.credential.clone() else {
            return;
        };

        let Ok(text) = self.queue.pop_front() else {
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        self.stage = Stage::Synthesizing { generation };

        debug!(
            "Synthesizing utterance {generation} ({} chars), {} queued",
            text.chars().count(),
            self.queue.len()
        );

        let synthesizer = self.synthesizer.clone();
        let continuations = self.continuations.clone();
        tokio::spawn(async move {
            let result = synthesizer.synthesize(&text, &credential).await;

            if continuations
                .send(Continuation::Synthesized { generation, result })
                .is_err()
            {
                debug!("Speech controller gone, dropping synthesis of utterance {generation}");
            }
        });
    }

    fn on_synthesized(&mut self, generation: u64, result: Result<String, ServiceError>) {
        if !matches!(self.stage, Stage::Synthesizing { generation: current } if current == generation)
        {
            debug!("Dropping synthesis result of cancelled utterance {generation}");
            return;
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => return self.skip(generation, e.to_string()),
        };

        let asset = match decoder::decode_payload(&payload, SAMPLE_RATE, CHANNELS) {
            Ok(asset) => asset,
            Err(e) => return self.skip(generation, e.to_string()),
        };

        let continuations = self.continuations.clone();
        let played = self.engine.play(&asset, move || {
            let _ = continuations.send(Continuation::PlaybackEnded { generation });
        });

        match played {
            Ok(handle) => {
                info!(
                    "Playing utterance {generation} ({:.1}s)",
                    asset.duration().as_secs_f64()
                );
                self.stage = Stage::Playing { generation, handle };
            }
            Err(PlaybackError::Unsupported(reason)) => {
                // Only tell the user once, every utterance would fail the same way
                if self.reported_unsupported {
                    warn!("Skipping utterance {generation}, audio output unsupported: {reason}");
                    self.stage = Stage::Idle;
                    self.drain();
                } else {
                    self.reported_unsupported = true;
                    self.skip(generation, PlaybackError::Unsupported(reason).to_string());
                }
            }
            Err(e) => self.skip(generation, e.to_string()),
        }
    }

    fn on_playback_ended(&mut self, generation: u64) {
        if !matches!(self.stage, Stage::Playing { generation: current, .. } if current == generation)
        {
            debug!("Ignoring end of stopped utterance {generation}");
            return;
        }

        info!("Finished utterance {generation}");
        self.stage = Stage::Idle;
        self.drain();
    }

    /// Give up on the utterance in flight and move on to the next one
    fn skip(&mut self, generation: u64, message: String) {
        warn!("Skipping utterance {generation}: {message}");

        self.bus.send(Event::Message(MessageAction::error(message)));
        self.stage = Stage::Idle;
        self.drain();
    }

    fn update_speaking(&mut self) {
        let speaking = !matches!(self.stage, Stage::Idle) || !self.queue.is_empty();

        let changed = self.speaking.send_if_modified(|current| {
            if *current == speaking {
                false
            } else {
                *current = speaking;
                true
            }
        });

        if changed {
            self.bus
                .send(Event::Speech(SpeechAction::SpeakingChanged { speaking }));
        }
    }
}

/// Type alias for shared speech controller
pub type SharedSpeech = Arc<RwLock<SpeechController>>;

pub fn init(bus: &EventBus, mut controller: SpeechController) -> SharedSpeech {
    let continuations = controller.continuations_rx.take();
    let speech = Arc::new(RwLock::new(controller));

    match continuations {
        Some(continuations) => {
            handle_incoming_event_loop(bus.subscribe(), continuations, speech.clone())
        }
        None => error!("Speech controller initialized twice, not starting its event loop"),
    }

    speech
}

fn handle_incoming_event_loop(
    mut bus_rx: Subscriber,
    mut continuations: mpsc::UnboundedReceiver<Continuation>,
    speech: SharedSpeech,
) {
    tokio::spawn(async move {
        // Handled inline so every event is applied in the order it was received
        loop {
            tokio::select! {
                event = bus_rx.recv() => {
                    if let Event::Speech(action) = event {
                        handle_incoming_event(action, &speech).await;
                    }
                }
                Some(continuation) = continuations.recv() => {
                    handle_continuation(continuation, &speech).await;
                }
            }
        }
    });
}

async fn handle_incoming_event(action: SpeechAction, speech: &SharedSpeech) {
    let mut speech = speech.write().await;
    match action {
        SpeechAction::Enqueue { text } => speech.enqueue(&text),
        SpeechAction::Interrupt { text } => speech.interrupt_and_play(&text),
        SpeechAction::SpeakingChanged { .. } => {}
    }
}

async fn handle_continuation(continuation: Continuation, speech: &SharedSpeech) {
    let mut speech = speech.write().await;
    match continuation {
        Continuation::Synthesized { generation, result } => {
            speech.on_synthesized(generation, result)
        }
        Continuation::PlaybackEnded { generation } => speech.on_playback_ended(generation),
    }
}
