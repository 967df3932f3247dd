//! STOMP 1.2 frames as carried over the game's WebSocket endpoint.
//!
//! Only the subset a subscribing client needs is modelled: the handshake,
//! topic subscription, pushed messages, errors and heart-beats.

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

/// Destination prefix under which the server publishes game snapshots
pub const GAME_TOPIC_PREFIX: &str = "/topic/games/";

pub const STOMP_VERSION: &str = "1.2";

/// Topic carrying the snapshots of one game
pub fn game_topic(game_id: &str) -> String {
    format!("{GAME_TOPIC_PREFIX}{game_id}")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame is missing its command line")]
    MissingCommand,
    #[error("Unknown frame command: {0}")]
    UnknownCommand(String),
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
    #[error("Invalid escape sequence in header: {0}")]
    InvalidEscape(String),
    #[error("Frame is missing the blank line before its body")]
    MissingBody,
    #[error("Invalid heart-beat header: {0}")]
    InvalidHeartBeat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED frames carry raw header values
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. Repeated headers keep their first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .header("accept-version", STOMP_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.to_string())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Heart-beat advertised in a CONNECT/CONNECTED frame; absent means none
    pub fn heart_beat(&self) -> Result<HeartBeat, FrameError> {
        match self.get("heart-beat") {
            Some(value) => value.parse(),
            None => Ok(HeartBeat::NONE),
        }
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decode every frame in one transport message. Heart-beat end-of-lines
    /// between or around frames are skipped, so a pure heart-beat message
    /// yields an empty list.
    pub fn decode_all(text: &str) -> Result<Vec<Frame>, FrameError> {
        text.split('\0')
            .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
            .filter(|chunk| !chunk.is_empty())
            .map(Frame::decode_one)
            .collect()
    }

    fn decode_one(chunk: &str) -> Result<Frame, FrameError> {
        let (head, body) = split_head(chunk)?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

        let command: Command = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or(FrameError::MissingCommand)?
            .parse()?;

        let escape = command.escapes_headers();
        let mut headers = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        Ok(Frame {
            command,
            headers,
            body: body.to_string(),
        })
    }
}

fn split_head(chunk: &str) -> Result<(&str, &str), FrameError> {
    let lf = chunk.find("\n\n").map(|at| (at, 2));
    let crlf = chunk.find("\r\n\r\n").map(|at| (at, 4));
    let end = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
        (a, b) => a.or(b),
    };
    if let Some((at, len)) = end {
        return Ok((&chunk[..at], &chunk[at + len..]));
    }
    // Frame with no headers and no body: "COMMAND\n"
    match chunk.strip_suffix('\n') {
        Some(head) if !head.contains('\n') => Ok((head.trim_end_matches('\r'), "")),
        _ => Err(FrameError::MissingBody),
    }
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

/// Heart-beat intervals in milliseconds: `outgoing` is how often this side
/// promises to send, `incoming` how often it wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: u64,
    pub incoming: u64,
}

impl HeartBeat {
    pub const NONE: HeartBeat = HeartBeat {
        outgoing: 0,
        incoming: 0,
    };

    pub fn symmetric(interval: Duration) -> Self {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        Self {
            outgoing: ms,
            incoming: ms,
        }
    }

    /// Settle on the effective intervals given what the server answered.
    pub fn negotiate(self, server: HeartBeat) -> NegotiatedHeartBeat {
        let pick = |ours: u64, theirs: u64| {
            if ours == 0 || theirs == 0 {
                None
            } else {
                Some(Duration::from_millis(ours.max(theirs)))
            }
        };

        NegotiatedHeartBeat {
            send_every: pick(self.outgoing, server.incoming),
            expect_every: pick(self.incoming, server.outgoing),
        }
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.outgoing, self.incoming)
    }
}

impl FromStr for HeartBeat {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidHeartBeat(s.to_string());
        let (outgoing, incoming) = s.split_once(',').ok_or_else(invalid)?;
        Ok(Self {
            outgoing: outgoing.trim().parse().map_err(|_| invalid())?,
            incoming: incoming.trim().parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedHeartBeat {
    pub send_every: Option<Duration>,
    pub expect_every: Option<Duration>,
}

impl NegotiatedHeartBeat {
    /// How long silence from the server is tolerated before the link is
    /// considered dead
    pub fn liveness_window(&self) -> Option<Duration> {
        self.expect_every.map(|every| every * 2)
    }
}
