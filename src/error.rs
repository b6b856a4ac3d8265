//! Error types for the TTS client library.

use thiserror::Error;

use crate::frame::{FrameError, MsgType};

/// Error type for TTS client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed frame bytes.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Connection attempt did not complete in time.
    #[error("connection timeout")]
    ConnectionTimeout,

    /// The synthesis deadline expired while waiting for the server.
    #[error("synthesis timeout")]
    SynthesisTimeout,

    /// The transport closed while the session was still pending.
    #[error("connection closed before the session finished")]
    ConnectionClosed,

    /// The server sent a text message where a binary frame was expected.
    #[error("unexpected text message: {0}")]
    UnexpectedTextMessage(String),

    /// A well-formed frame arrived that the session cannot accept.
    #[error("unexpected frame in session: {msg_type:?}")]
    UnexpectedFrame {
        /// Type of the offending frame.
        msg_type: MsgType,
    },

    /// The server reported an error for this session.
    #[error("server error: {message} (code: {code})")]
    Server {
        /// Diagnostic text from the error frame payload.
        message: String,
        /// Error code from the error frame.
        code: u32,
    },

    /// The session finished without producing any audio.
    #[error("synthesis finished with no audio data")]
    EmptyAudio,

    /// Text to synthesize was empty.
    #[error("text must not be empty")]
    EmptyText,

    /// Audio file write error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
