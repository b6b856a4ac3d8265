//! Streaming text-to-speech client.
//!
//! One [`TtsClient::synthesize`] call owns one synthesis session end to end:
//! it opens a fresh authenticated connection, sends a single full client
//! request and then drains server frames until the session finishes, fails
//! or the deadline expires. Audio-only frames are accumulated in arrival
//! order, which is the only ordering guarantee the transport gives. The
//! connection is always closed on the way out, on success and on failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::Error;
use crate::frame::{EventType, Frame, MsgType};
use crate::messages::{Additions, AudioParams, TtsRequest};
use crate::ws::WebSocket;

/// Default maximum size of a single incoming WebSocket message (10 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10_485_760;

/// Default budget for one whole synthesis call.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the TTS client.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// Application key for authentication.
    pub app_id: String,
    /// Access key for authentication.
    pub access_token: String,
    /// Speaker id used when no voice profile resolves.
    pub speaker: String,
    /// Named voice profiles mapping to speaker ids.
    pub voice_profiles: HashMap<String, String>,
    /// Profile tried when the caller names no voice, or an unknown one.
    pub default_voice: String,
    /// Audio output parameters sent with every request.
    pub audio_params: AudioParams,
    /// Request additions sent with every request.
    pub additions: Additions,
    /// Maximum size of a single incoming WebSocket message.
    pub max_message_size: usize,
    /// Deadline budget for one synthesis call's receive loop.
    pub synthesis_timeout: Duration,
}

impl TtsConfig {
    /// Creates a configuration with default voice and protocol settings.
    pub fn new(endpoint: String, app_id: String, access_token: String) -> Self {
        Self {
            endpoint,
            app_id,
            access_token,
            speaker: crate::DEFAULT_SPEAKER.to_string(),
            voice_profiles: HashMap::new(),
            default_voice: "sweet".to_string(),
            audio_params: AudioParams::default(),
            additions: Additions::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }
}

/// Snapshot of client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtsStats {
    /// Completed synthesis calls.
    pub synthesis_count: u64,
    /// Characters synthesized across all calls.
    pub total_characters: u64,
    /// Audio bytes received across all calls.
    pub total_audio_bytes: u64,
    /// Failed synthesis calls.
    pub error_count: u64,
}

/// Session progress while the receive loop runs.
///
/// `Pending` transitions to `Finished` on a session-finished event and to
/// `Failed` on an error frame, an unexpected frame, a transport error or an
/// expired deadline. Both outcomes are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Pending,
    Finished,
    Failed,
}

/// Text-to-speech client for streaming audio synthesis.
pub struct TtsClient {
    config: TtsConfig,
    synthesis_count: AtomicU64,
    total_characters: AtomicU64,
    total_audio_bytes: AtomicU64,
    error_count: AtomicU64,
}

impl TtsClient {
    /// Creates a new TTS client with the given configuration.
    pub fn new(config: TtsConfig) -> Self {
        Self {
            config,
            synthesis_count: AtomicU64::new(0),
            total_characters: AtomicU64::new(0),
            total_audio_bytes: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    /// Synthesizes `text` and returns the complete audio buffer.
    ///
    /// `voice` names a voice profile; unknown or absent voices fall back to
    /// the configured default profile, then to the raw configured speaker.
    /// Concurrent calls are independent: each opens its own connection.
    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Vec<u8>, Error> {
        if text.is_empty() {
            return Err(Error::EmptyText);
        }

        let speaker = self.resolve_speaker(voice).to_string();
        let started = Instant::now();
        info!(speaker = %speaker, chars = text.chars().count(), "TTS synthesis starting");

        let result = self.synthesize_once(text, &speaker).await;

        match &result {
            Ok(audio) => {
                self.synthesis_count.fetch_add(1, Ordering::SeqCst);
                self.total_characters
                    .fetch_add(text.chars().count() as u64, Ordering::SeqCst);
                self.total_audio_bytes
                    .fetch_add(audio.len() as u64, Ordering::SeqCst);
                info!(
                    bytes = audio.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "TTS synthesis finished"
                );
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                error!(error = %e, "TTS synthesis failed");
            }
        }

        result
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    /// Resolves a caller-supplied voice name to a speaker id.
    pub fn resolve_speaker(&self, voice: Option<&str>) -> &str {
        if let Some(voice) = voice {
            if let Some(speaker) = self.config.voice_profiles.get(voice) {
                return speaker;
            }
        }
        if let Some(speaker) = self.config.voice_profiles.get(&self.config.default_voice) {
            return speaker;
        }
        &self.config.speaker
    }

    /// Returns a snapshot of the client counters.
    pub fn stats(&self) -> TtsStats {
        TtsStats {
            synthesis_count: self.synthesis_count.load(Ordering::SeqCst),
            total_characters: self.total_characters.load(Ordering::SeqCst),
            total_audio_bytes: self.total_audio_bytes.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }

    /// Resets all client counters to zero.
    pub fn reset_stats(&self) {
        self.synthesis_count.store(0, Ordering::SeqCst);
        self.total_characters.store(0, Ordering::SeqCst);
        self.total_audio_bytes.store(0, Ordering::SeqCst);
        self.error_count.store(0, Ordering::SeqCst);
    }

    /// Runs one session on a fresh connection, closing it on every path.
    async fn synthesize_once(&self, text: &str, speaker: &str) -> Result<Vec<u8>, Error> {
        let ws = WebSocket::connect(
            &self.config.endpoint,
            &self.config.app_id,
            &self.config.access_token,
            speaker,
            self.config.max_message_size,
        )
        .await?;

        let result = self.run_session(&ws, text, speaker).await;
        ws.close().await;
        result
    }

    async fn run_session(&self, ws: &WebSocket, text: &str, speaker: &str) -> Result<Vec<u8>, Error> {
        let request = TtsRequest::new(
            text,
            speaker,
            self.config.audio_params.clone(),
            &self.config.additions,
        )?;
        let frame = Frame::full_client_request(serde_json::to_vec(&request)?);
        debug!(frame = %frame, "sending synthesis request");
        ws.send_binary(frame.marshal()?).await?;

        let deadline = Instant::now() + self.config.synthesis_timeout;
        self.receive_audio(ws, deadline).await
    }

    /// Drains server frames until the session reaches a terminal state.
    async fn receive_audio(&self, ws: &WebSocket, deadline: Instant) -> Result<Vec<u8>, Error> {
        let mut state = SessionState::Pending;
        let mut audio: Vec<u8> = Vec::new();
        let mut failure: Option<Error> = None;

        while state == SessionState::Pending {
            let frame = match self.next_frame(ws, deadline).await {
                Ok(frame) => frame,
                Err(e) => {
                    state = SessionState::Failed;
                    failure = Some(e);
                    continue;
                }
            };

            match frame.msg_type {
                MsgType::FullServerResponse if frame.event == EventType::SessionFinished => {
                    state = SessionState::Finished;
                }
                MsgType::AudioOnlyServer => {
                    debug!(chunk = frame.payload.len(), total = audio.len(), "audio chunk");
                    audio.extend_from_slice(&frame.payload);
                }
                MsgType::FullServerResponse | MsgType::FrontEndResultServer => {
                    // Session status and timestamp frames; informational.
                    debug!(frame = %frame, "status frame");
                }
                MsgType::Error => {
                    state = SessionState::Failed;
                    failure = Some(Error::Server {
                        message: String::from_utf8_lossy(&frame.payload).into_owned(),
                        code: frame.error_code,
                    });
                }
                other => {
                    state = SessionState::Failed;
                    failure = Some(Error::UnexpectedFrame { msg_type: other });
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if audio.is_empty() {
            // A finished session with no audio is a failure, not a
            // zero-length result.
            return Err(Error::EmptyAudio);
        }
        Ok(audio)
    }

    async fn next_frame(&self, ws: &WebSocket, deadline: Instant) -> Result<Frame, Error> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(Error::SynthesisTimeout);
        }
        let data = ws.recv_binary(budget).await?;
        let frame = Frame::unmarshal(&data)?;
        debug!(frame = %frame, "received frame");
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TtsConfig {
        let mut config = TtsConfig::new(
            "wss://example.invalid/tts".to_string(),
            "app".to_string(),
            "token".to_string(),
        );
        config
            .voice_profiles
            .insert("sweet".to_string(), "zh_female_tianmei".to_string());
        config
            .voice_profiles
            .insert("replica".to_string(), "S_HLw7rGSx1".to_string());
        config
    }

    #[test]
    fn test_resolve_speaker_profiles() {
        let client = TtsClient::new(test_config());
        assert_eq!(client.resolve_speaker(Some("replica")), "S_HLw7rGSx1");
        // Unknown voices fall back to the default profile.
        assert_eq!(client.resolve_speaker(Some("nope")), "zh_female_tianmei");
        assert_eq!(client.resolve_speaker(None), "zh_female_tianmei");
    }

    #[test]
    fn test_resolve_speaker_without_profiles() {
        let mut config = test_config();
        config.voice_profiles.clear();
        let client = TtsClient::new(config);
        assert_eq!(client.resolve_speaker(Some("sweet")), crate::DEFAULT_SPEAKER);
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let client = TtsClient::new(test_config());
        assert!(matches!(
            client.synthesize("", None).await,
            Err(Error::EmptyText)
        ));
        // Input validation happens before a session exists; not counted
        // as a session failure.
        assert_eq!(client.stats().error_count, 0);
    }

    #[test]
    fn test_stats_reset() {
        let client = TtsClient::new(test_config());
        client.synthesis_count.store(3, Ordering::SeqCst);
        client.total_audio_bytes.store(960, Ordering::SeqCst);
        client.reset_stats();
        assert_eq!(client.stats(), TtsStats::default());
    }
}
