use crate::{
    capture::{CaptureError, SpeechCapture},
    conversation::{ChatAction, Conversation, CREDENTIAL_SAVED, GREETING},
    event::{Event, EventBus},
    message::{MessageAction, Sender},
};
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Ask the assistant
    Send(String),

    /// Read text aloud, or the latest reply when no text is given
    Speak(Option<String>),

    /// Capture a spoken question
    Listen,

    Help,

    Quit,
}

/// Parses one line of terminal input. `/listen` is only recognised when
/// speech capture is available.
pub fn parse_line(line: &str, capture_supported: bool) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => Some(Command::Quit),
        "/help" => Some(Command::Help),
        "/speak" if rest.is_empty() => Some(Command::Speak(None)),
        "/speak" => Some(Command::Speak(Some(rest.to_string()))),
        "/listen" if capture_supported => Some(Command::Listen),
        _ => Some(Command::Send(line.to_string())),
    }
}

fn print_help(capture_supported: bool) {
    println!("Type a question and press enter. Commands:");
    println!("  /speak [text]   read text aloud, or the latest reply");
    if capture_supported {
        println!("  /listen         ask a question out loud");
    }
    println!("  /help           show this help");
    println!("  /quit           leave");
}

/// Prints transcript messages and the speaking indicator as they happen.
pub fn start_printer(bus: &EventBus, mut speaking: watch::Receiver<bool>) {
    let mut subscriber = bus.subscribe();
    tokio::spawn(async move {
        loop {
            if let Event::Message(MessageAction::Send(message)) = subscriber.recv().await {
                if message.sender == Sender::Bot {
                    println!("{message}");
                }
            }
        }
    });

    tokio::spawn(async move {
        while speaking.changed().await.is_ok() {
            if *speaking.borrow_and_update() {
                println!("(speaking...)");
            } else {
                println!("(done speaking)");
            }
        }
    });
}

/// Runs the interactive session until `/quit` or end of input.
pub async fn run(
    bus: &EventBus,
    conversation: Arc<Conversation>,
    capture: Arc<dyn SpeechCapture>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if conversation.has_credential().await {
        println!("{GREETING}");
    } else {
        println!("Enter your Gemini API key to start:");
        loop {
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            match conversation.save_credential(&line).await {
                Ok(()) => {
                    println!("{CREDENTIAL_SAVED}");
                    break;
                }
                Err(e) => {
                    error!("Error while saving API key: {e:?}");
                    println!("Could not save the API key: {e:#}");
                }
            }
        }
    }

    let capture_supported = capture.is_supported();
    print_help(capture_supported);

    while let Some(line) = lines.next_line().await? {
        let Some(command) = parse_line(&line, capture_supported) else {
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(capture_supported),
            Command::Send(text) => bus.send(Event::Chat(ChatAction::Send { text })),
            Command::Speak(Some(text)) => bus.send(Event::Chat(ChatAction::Speak { text })),
            Command::Speak(None) => {
                let latest = conversation
                    .transcript()
                    .messages()
                    .await
                    .into_iter()
                    .rev()
                    .find(|m| m.sender == Sender::Bot && !m.is_error);

                if let Some(message) = latest {
                    bus.send(Event::Chat(ChatAction::Speak { text: message.text }));
                }
            }
            Command::Listen => match capture.listen().await {
                Ok(text) => {
                    println!("[you] {text}");
                    bus.send(Event::Chat(ChatAction::Send { text }));
                }
                Err(CaptureError::Unsupported) => {}
                Err(e) => println!("{e}"),
            },
        }
    }

    Ok(())
}
