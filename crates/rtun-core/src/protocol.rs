//! Newline-delimited text framing for the control and data hellos.
//!
//! Three message kinds, each a single `\n`-terminated line, tokens separated
//! by single spaces: `CONTROL` (client registers as the control channel),
//! `DATA <id>` (client claims a pending pairing), `NEW <id>` (server
//! announces a public caller). There is no other traffic on the wire at this
//! layer — the control channel carries no keepalive frames.

use crate::error::RtunError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `CONTROL` — register as the control channel.
    Control,
    /// `DATA <id>` — claim the pending pairing with this correlation ID.
    Data(String),
    /// `NEW <id>` — a public caller arrived; dial a data channel for it.
    New(String),
}

impl Message {
    /// Render this message as a `\n`-terminated wire line.
    pub fn encode(&self) -> String {
        match self {
            Message::Control => "CONTROL\n".to_string(),
            Message::Data(id) => format!("DATA {id}\n"),
            Message::New(id) => format!("NEW {id}\n"),
        }
    }

    /// Parse one line (trimmed of surrounding whitespace) into a message.
    ///
    /// Accepts `CONTROL` only with exactly one token; `DATA`/`NEW` only with
    /// exactly two tokens and a non-empty ID. Anything else is a protocol
    /// error.
    pub fn parse(line: &str) -> Result<Self, RtunError> {
        let trimmed = line.trim();
        let parts: Vec<&str> = trimmed.split_whitespace().collect();

        match parts.as_slice() {
            ["CONTROL"] => Ok(Message::Control),
            ["DATA", id] if !id.is_empty() => Ok(Message::Data((*id).to_string())),
            ["NEW", id] if !id.is_empty() => Ok(Message::New((*id).to_string())),
            _ => Err(RtunError::Protocol(format!("invalid message: {trimmed}"))),
        }
    }
}

/// Write an encoded message and flush immediately.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<(), RtunError>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.write_all(msg.encode().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a single line from `reader` and parse it as a [`Message`].
///
/// Returns `Err(RtunError::Io)` on EOF or a read failure (an empty line from
/// a closed stream surfaces as an `UnexpectedEof` io error).
pub async fn read_message<R>(reader: &mut R) -> Result<Message, RtunError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(RtunError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before hello",
        )));
    }
    Message::parse(&line)
}
