//! Codec for live-channel commands.
//!
//! Each command travels as a single text line `COMMAND[ DATA]`. On the wire
//! the line is wrapped in an event-stream event: one `data:` field per line,
//! terminated by a blank line.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Maximum size of one encoded event (1 MiB).
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

/// Field prefix for event-stream data lines.
const DATA_FIELD: &str = "data:";

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// Event is not valid UTF-8.
    #[error("Event is not valid UTF-8")]
    InvalidUtf8,

    /// Command name is not recognized.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Not enough data for a complete event.
    #[error("Incomplete event")]
    Incomplete,

    /// Command is missing required data.
    #[error("Command {0} requires data")]
    MissingData(&'static str),
}

/// A live-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the client to reload the page.
    Reload,
    /// Keep-alive probe.
    Ping,
    /// Report an error to the client.
    Error(String),
    /// A new serialized state of an observed value.
    Update {
        /// Value identifier.
        id: String,
        /// Serialized value.
        data: String,
    },
}

impl Command {
    /// Command name as sent on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Reload => "RELOAD",
            Command::Ping => "PING",
            Command::Error(_) => "ERROR",
            Command::Update { .. } => "UPDATE",
        }
    }

    /// Build a command from a name and optional data.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names or missing data.
    pub fn from_parts(name: &str, data: Option<&str>) -> Result<Self, CodecError> {
        match name {
            "RELOAD" => Ok(Command::Reload),
            "PING" => Ok(Command::Ping),
            "ERROR" => Ok(Command::Error(data.unwrap_or_default().to_string())),
            "UPDATE" => {
                let data = data.ok_or(CodecError::MissingData("UPDATE"))?;
                let (id, value) = data.split_once(' ').unwrap_or((data, ""));
                Ok(Command::Update {
                    id: id.to_string(),
                    data: value.to_string(),
                })
            }
            other => Err(CodecError::UnknownCommand(other.to_string())),
        }
    }

    /// Format as a `COMMAND[ DATA]` line.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Command::Reload | Command::Ping => self.name().to_string(),
            Command::Error(message) if message.is_empty() => self.name().to_string(),
            Command::Error(message) => format!("{} {}", self.name(), message),
            Command::Update { id, data } => format!("{} {} {}", self.name(), id, data),
        }
    }

    /// Parse a `COMMAND[ DATA]` line.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown commands.
    pub fn parse_line(line: &str) -> Result<Self, CodecError> {
        match line.split_once(' ') {
            Some((name, data)) => Self::from_parts(name, Some(data)),
            None => Self::from_parts(line, None),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Encode a command as an event-stream event.
///
/// # Errors
///
/// Returns an error if the event is too large.
pub fn encode(command: &Command) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::new();
    encode_into(command, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a command into an existing buffer.
///
/// # Errors
///
/// Returns an error if the event is too large.
pub fn encode_into(command: &Command, buf: &mut BytesMut) -> Result<(), CodecError> {
    let line = command.to_line();
    let mut event = String::with_capacity(line.len() + 16);
    for part in line.split('\n') {
        event.push_str(DATA_FIELD);
        event.push(' ');
        event.push_str(part.trim_end_matches('\r'));
        event.push_str("\r\n");
    }
    event.push_str("\r\n");

    if event.len() > MAX_EVENT_SIZE {
        return Err(CodecError::EventTooLarge(event.len()));
    }

    buf.reserve(event.len());
    buf.put_slice(event.as_bytes());
    Ok(())
}

/// Try to decode one event from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(command))` if a complete event was decoded, `Ok(None)` if
/// more data is needed. Comment lines (starting with `:`) and events without
/// data are skipped.
///
/// # Errors
///
/// Returns an error if the event is too large, not UTF-8 or unknown.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Command>, CodecError> {
    loop {
        let Some((end, terminator)) = find_event_end(&buf[..]) else {
            if buf.len() > MAX_EVENT_SIZE {
                return Err(CodecError::EventTooLarge(buf.len()));
            }
            return Ok(None);
        };

        let raw = buf.split_to(end);
        buf.advance(terminator);

        let text = std::str::from_utf8(&raw).map_err(|_| CodecError::InvalidUtf8)?;
        let data = text
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_FIELD))
            .map(|value| value.strip_prefix(' ').unwrap_or(value))
            .collect::<Vec<_>>();

        if data.is_empty() {
            continue;
        }
        return Command::parse_line(&data.join("\n")).map(Some);
    }
}

/// Decode a single complete event.
///
/// # Errors
///
/// Returns an error if the event is incomplete or invalid.
pub fn decode(data: &[u8]) -> Result<Command, CodecError> {
    let mut buf = BytesMut::from(data);
    decode_from(&mut buf)?.ok_or(CodecError::Incomplete)
}

fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
