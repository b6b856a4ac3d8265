//! JSON payload types carried inside protocol frames.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request payload
// ============================================================================

/// User block of a synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Request-scoped unique user id.
    pub uid: String,
}

/// Audio output parameters for a synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioParams {
    /// Output format, for example "wav" or "mp3".
    pub format: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Whether the server should return per-word timestamps.
    pub enable_timestamp: bool,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: "wav".to_string(),
            sample_rate: 24000,
            enable_timestamp: true,
        }
    }
}

/// Free-form request additions, sent as a JSON-encoded string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Additions {
    /// Whether the server should skip markdown filtering of the input text.
    pub disable_markdown_filter: bool,
}

impl Default for Additions {
    fn default() -> Self {
        Self {
            disable_markdown_filter: false,
        }
    }
}

/// Request parameters block of a synthesis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqParams {
    /// Speaker (voice) identifier.
    pub speaker: String,
    /// Audio output parameters.
    pub audio_params: AudioParams,
    /// Text to synthesize.
    pub text: String,
    /// JSON-encoded [`Additions`] string.
    pub additions: String,
}

/// Synthesis request payload for a full client request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsRequest {
    /// User block.
    pub user: User,
    /// Request parameters.
    pub req_params: ReqParams,
}

impl TtsRequest {
    /// Creates a synthesis request with a fresh request-scoped uid.
    pub fn new(
        text: &str,
        speaker: &str,
        audio_params: AudioParams,
        additions: &Additions,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user: User {
                uid: Uuid::new_v4().to_string(),
            },
            req_params: ReqParams {
                speaker: speaker.to_string(),
                audio_params,
                text: text.to_string(),
                additions: serde_json::to_string(additions)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let request = TtsRequest::new(
            "hello",
            "zh_female_tianmei",
            AudioParams::default(),
            &Additions::default(),
        )
        .unwrap();

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["req_params"]["speaker"], "zh_female_tianmei");
        assert_eq!(value["req_params"]["text"], "hello");
        assert_eq!(value["req_params"]["audio_params"]["sample_rate"], 24000);
        assert_eq!(
            value["req_params"]["audio_params"]["enable_timestamp"],
            true
        );
        // Additions travel as a JSON-encoded string, not a nested object.
        let additions = value["req_params"]["additions"].as_str().unwrap();
        assert_eq!(additions, r#"{"disable_markdown_filter":false}"#);
        assert!(!value["user"]["uid"].as_str().unwrap().is_empty());
    }
}
