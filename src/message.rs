use std::fmt::{Display, Formatter};

/// Author of a transcript message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    /// Error messages are shown by the bot, but styled differently
    pub is_error: bool,
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let who = match (self.sender, self.is_error) {
            (Sender::User, _) => "you",
            (Sender::Bot, false) => "assistant",
            (Sender::Bot, true) => "assistant (error)",
        };
        write!(f, "[{who}] {}", self.text)
    }
}

#[derive(Clone, Debug)]
pub enum MessageAction {
    /// Append a message to the transcript
    Send(Message),
}

impl MessageAction {
    /// Create a message typed by the user
    pub fn user_say(text: impl Into<String>) -> Self {
        MessageAction::Send(Message {
            sender: Sender::User,
            text: text.into(),
            is_error: false,
        })
    }

    /// Create a simple text message from the bot
    pub fn bot_say(text: impl Into<String>) -> Self {
        MessageAction::Send(Message {
            sender: Sender::Bot,
            text: text.into(),
            is_error: false,
        })
    }

    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        MessageAction::Send(Message {
            sender: Sender::Bot,
            text: message.into(),
            is_error: true,
        })
    }
}
