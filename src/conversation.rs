//! The chat side of the assistant: transcript, credential handling, and the
//! hand-off of replies to the speech pipeline.

use crate::{
    client::ChatClient,
    credential::CredentialStore,
    event::{Event, EventBus, Subscriber},
    message::{Message, MessageAction, Sender},
    speech::{SharedSpeech, SpeechAction},
};
use anyhow::Result;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::RwLock;

pub const GREETING: &str = "Hi! I'm your virtual assistant. What would you like to know?";
pub const CREDENTIAL_SAVED: &str =
    "Thanks! Your API key has been saved. You can start chatting now.";
pub const MISSING_CREDENTIAL: &str = "Please enter your API key to continue.";

#[derive(Clone, Debug)]
pub enum ChatAction {
    /// User typed a message for the assistant
    Send { text: String },

    /// Read a message aloud, cutting off whatever is being spoken
    Speak { text: String },
}

/// Messages shown to the user, oldest first
#[derive(Clone)]
pub struct Transcript {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl Transcript {
    pub fn new(first: Message) -> Self {
        Self {
            messages: Arc::new(RwLock::new(vec![first])),
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn push(&self, message: Message) {
        self.messages.write().await.push(message);
    }

    /// Replace the whole transcript with a single message
    pub async fn reset(&self, first: Message) {
        *self.messages.write().await = vec![first];
    }
}

fn bot_message(text: &str) -> Message {
    Message {
        sender: Sender::Bot,
        text: text.to_string(),
        is_error: false,
    }
}

pub struct Conversation {
    bus: EventBus,
    chat: Arc<dyn ChatClient>,
    speech: SharedSpeech,
    credentials: CredentialStore,
    credential: RwLock<Option<String>>,
    transcript: Transcript,
    /// Replies still outstanding, sends may overlap
    pending_replies: AtomicUsize,
    last_error: RwLock<Option<String>>,
}

impl Conversation {
    pub fn new(
        bus: EventBus,
        chat: Arc<dyn ChatClient>,
        speech: SharedSpeech,
        credentials: CredentialStore,
        credential: Option<String>,
    ) -> Self {
        Self {
            bus,
            chat,
            speech,
            credentials,
            credential: RwLock::new(credential.filter(|c| !c.is_empty())),
            transcript: Transcript::new(bot_message(GREETING)),
            pending_replies: AtomicUsize::new(0),
            last_error: RwLock::new(None),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub async fn has_credential(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Whether any reply from the chat model is outstanding
    pub fn is_loading(&self) -> bool {
        self.pending_replies.load(Ordering::SeqCst) > 0
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Persist a new API key and make it available to chat and speech.
    pub async fn save_credential(&self, key: &str) -> Result<()> {
        self.credentials.save(key).await?;

        let key = key.trim().to_string();
        *self.credential.write().await = Some(key.clone());
        self.speech.write().await.set_credential(Some(key));

        self.transcript.reset(bot_message(CREDENTIAL_SAVED)).await;

        Ok(())
    }

    /// Ask the chat model and queue its reply for speech.
    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let credential = self.credential.read().await.clone();
        let Some(credential) = credential else {
            *self.last_error.write().await = Some(MISSING_CREDENTIAL.to_string());
            self.bus
                .send(Event::Message(MessageAction::error(MISSING_CREDENTIAL)));
            return;
        };

        self.bus.send(Event::Message(MessageAction::user_say(text)));
        self.pending_replies.fetch_add(1, Ordering::SeqCst);
        *self.last_error.write().await = None;

        let result = self.chat.get_reply(text, &credential).await;
        self.pending_replies.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(reply) => {
                info!("Received reply ({} chars)", reply.chars().count());
                self.bus.say(reply.clone());
                self.bus
                    .send(Event::Speech(SpeechAction::Enqueue { text: reply }));
            }
            Err(e) => {
                error!("Error while getting reply: {e}");
                let message = e.to_string();
                *self.last_error.write().await = Some(message.clone());
                self.bus.send(Event::Message(MessageAction::error(message)));
            }
        }
    }

    /// Read `text` aloud immediately.
    pub fn speak(&self, text: &str) {
        self.bus.send(Event::Speech(SpeechAction::Interrupt {
            text: text.to_string(),
        }));
    }
}

pub fn init(bus: &EventBus, conversation: Arc<Conversation>) {
    start_transcript_loop(bus.subscribe(), conversation.transcript().clone());
    start_chat_loop(bus.subscribe(), conversation);
}

fn start_transcript_loop(mut bus_rx: Subscriber, transcript: Transcript) {
    tokio::spawn(async move {
        loop {
            let event = bus_rx.recv().await;

            if let Event::Message(MessageAction::Send(message)) = event {
                transcript.push(message).await;
            }
        }
    });
}

fn start_chat_loop(mut bus_rx: Subscriber, conversation: Arc<Conversation>) {
    tokio::spawn(async move {
        loop {
            let event = bus_rx.recv().await;

            match event {
                Event::Chat(ChatAction::Send { text }) => {
                    let conversation = conversation.clone();
                    tokio::spawn(async move {
                        conversation.send_message(&text).await;
                    });
                }
                Event::Chat(ChatAction::Speak { text }) => conversation.speak(&text),
                _ => {}
            }
        }
    });
}
