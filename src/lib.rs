//! Rust client for the Volcengine bidirectional streaming TTS WebSocket API.
//!
//! The service speaks a binary, bit-packed frame protocol over a persistent
//! WebSocket connection: the client sends one JSON synthesis request and the
//! server streams the result back as audio-only frames, terminated by a
//! session-finished event. [`frame`] implements the wire codec, [`TtsClient`]
//! drives one session per call, and [`VoiceService`] adds voice profiles and
//! audio persistence on top.
//!
//! # Example
//!
//! ```no_run
//! use volc_tts::{TtsClient, TtsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), volc_tts::Error> {
//!     let config = TtsConfig::new(
//!         volc_tts::TTS_ENDPOINT.to_string(),
//!         std::env::var("VOLC_APP_ID").expect("VOLC_APP_ID not set"),
//!         std::env::var("VOLC_ACCESS_TOKEN").expect("VOLC_ACCESS_TOKEN not set"),
//!     );
//!
//!     let client = TtsClient::new(config);
//!     let audio = client.synthesize("你好，世界！", None).await?;
//!     println!("received {} bytes of audio", audio.len());
//!     Ok(())
//! }
//! ```

mod error;
pub mod frame;
mod messages;
mod tts;
mod voice;
mod ws;

pub use error::Error;
pub use messages::{Additions, AudioParams, TtsRequest};
pub use tts::{TtsClient, TtsConfig, TtsStats, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SYNTHESIS_TIMEOUT};
pub use voice::{SynthesisResult, VoiceConfig, VoiceService};
pub use ws::{resource_id, WebSocket};

/// Default TTS WebSocket endpoint.
pub const TTS_ENDPOINT: &str = "wss://openspeech.bytedance.com/api/v3/tts/bidirection";

/// Default speaker id used when no voice profile resolves.
pub const DEFAULT_SPEAKER: &str = "S_HLw7rGSx1";
