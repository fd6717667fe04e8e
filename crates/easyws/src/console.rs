//! Interactive console: stdin commands and event printing.

use easyws_core::{Message, MessageKind};
use easyws_net::EventQueues;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// One line of console input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Stop the session and exit.
    Exit,
    /// Print metrics.
    Stats,
    /// Nothing to do.
    Empty,
    /// Send the line as a text message.
    Send(String),
}

impl Command {
    /// Interpret one stdin line. Surrounding whitespace is ignored for
    /// commands; message text is sent without its line terminator only.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "exit" => Self::Exit,
            "stats" => Self::Stats,
            "" => Self::Empty,
            _ => Self::Send(line.trim_end_matches(['\r', '\n']).to_owned()),
        }
    }
}

/// How a received message is shown.
pub fn describe_message(message: &Message) -> String {
    let from = message
        .client_id()
        .map_or_else(|| "unknown".to_owned(), |id| id.to_string());
    match (message.kind(), message.as_text()) {
        (MessageKind::Text, Some(text)) => format!("rx from {from}: {text}"),
        _ => format!(
            "rx from {from}: <{} bytes {}>",
            message.len(),
            message.kind().as_str()
        ),
    }
}

/// Read stdin lines on a dedicated thread.
///
/// The channel closes at end of input. A plain thread keeps a pending read
/// from holding up runtime shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    let _ = std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
    });
    rx
}

/// Print messages and events until both queues close.
pub fn spawn_printer(mut queues: EventQueues) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(message) = queues.messages.recv() => println!("{}", describe_message(&message)),
                Some(event) = queues.events.recv() => println!("{event}"),
                else => break,
            }
        }
    })
}
