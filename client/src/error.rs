use minesduel_common::{models::ParamsError, protocol::FrameError};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Invalid game parameters: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("Failed to {context}: server answered {status}")]
    Status {
        status: StatusCode,
        context: &'static str,
    },
    #[error("Username must not be empty")]
    EmptyUsername,
    #[error("Broker rejected the connection: {0}")]
    Broker(String),
    #[error("Connection closed during handshake")]
    HandshakeClosed,
    #[error("No heart-beat from server within {0:?}")]
    HeartbeatTimeout(std::time::Duration),
    #[error("Failed to set WebSocket scheme")]
    WebSocketScheme,
    #[error("Not in a game. Join or create one first.")]
    NoSession,
}

pub type Result<T> = std::result::Result<T, Error>;
