//! Voice service wrapping the TTS client with persistence and batching.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tts::TtsClient;

/// Configuration for the voice service.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Whether synthesized audio is saved to disk by default.
    pub auto_save: bool,
    /// Directory for saved audio files.
    pub output_dir: PathBuf,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            output_dir: PathBuf::from("data/voice/output"),
        }
    }
}

/// Result of one synthesis call through the voice service.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// Synthesized audio bytes.
    pub audio: Vec<u8>,
    /// The text that was synthesized.
    pub text: String,
    /// The voice name the caller asked for, if any.
    pub voice: Option<String>,
    /// The speaker id the voice resolved to.
    pub speaker: String,
    /// Path the audio was saved to, if it was saved.
    pub output_file: Option<PathBuf>,
    /// Wall-clock time the call took.
    pub elapsed: Duration,
}

/// Voice service: synthesis plus optional persistence of the result.
pub struct VoiceService {
    client: TtsClient,
    config: VoiceConfig,
}

impl VoiceService {
    /// Creates a voice service around an existing TTS client.
    pub fn new(client: TtsClient, config: VoiceConfig) -> Self {
        Self { client, config }
    }

    /// Returns the wrapped TTS client.
    pub fn client(&self) -> &TtsClient {
        &self.client
    }

    /// Synthesizes `text` and optionally saves the audio.
    ///
    /// `save_audio` overrides the configured auto-save; `output_file`
    /// overrides the generated file name.
    pub async fn text_to_speech(
        &self,
        text: &str,
        voice: Option<&str>,
        output_file: Option<PathBuf>,
        save_audio: Option<bool>,
    ) -> Result<SynthesisResult, Error> {
        let started = Instant::now();
        let speaker = self.client.resolve_speaker(voice).to_string();

        let audio = self.client.synthesize(text, voice).await?;

        let should_save = save_audio.unwrap_or(self.config.auto_save);
        let output_file = if should_save {
            let path = match output_file {
                Some(path) => path,
                None => self.generate_output_path(text),
            };
            self.save_audio(&path, &audio).await?;
            Some(path)
        } else {
            None
        };

        Ok(SynthesisResult {
            audio,
            text: text.to_string(),
            voice: voice.map(str::to_string),
            speaker,
            output_file,
            elapsed: started.elapsed(),
        })
    }

    /// Synthesizes several texts in order, saving each to the output dir.
    pub async fn batch_synthesize(
        &self,
        texts: &[String],
        voice: Option<&str>,
    ) -> Result<Vec<SynthesisResult>, Error> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            info!(progress = i + 1, total = texts.len(), "batch synthesis");
            let path = self
                .config
                .output_dir
                .join(format!("batch_{:03}_{}.{}", i + 1, unix_timestamp(), self.audio_format()));
            let result = self
                .text_to_speech(text, voice, Some(path), Some(true))
                .await?;
            results.push(result);
        }
        info!(count = texts.len(), "batch synthesis finished");
        Ok(results)
    }

    /// Probes the service with a short synthesis, without saving audio.
    pub async fn test_connection(&self) -> bool {
        match self.text_to_speech("test", None, None, Some(false)).await {
            Ok(result) => !result.audio.is_empty(),
            Err(e) => {
                warn!(error = %e, "TTS connection test failed");
                false
            }
        }
    }

    async fn save_audio(&self, path: &Path, audio: &[u8]) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, audio).await?;
        debug!(path = %path.display(), bytes = audio.len(), "audio saved");
        Ok(())
    }

    fn audio_format(&self) -> &str {
        &self.client.config().audio_params.format
    }

    fn generate_output_path(&self, text: &str) -> PathBuf {
        let text_id: String = text
            .chars()
            .take(20)
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        self.config.output_dir.join(format!(
            "tts_{}_{}.{}",
            unix_timestamp(),
            text_id,
            self.audio_format()
        ))
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tts::TtsConfig;

    fn test_service() -> VoiceService {
        let config = TtsConfig::new(
            "wss://example.invalid/tts".to_string(),
            "app".to_string(),
            "token".to_string(),
        );
        VoiceService::new(TtsClient::new(config), VoiceConfig::default())
    }

    #[test]
    fn test_generated_path_sanitized() {
        let service = test_service();
        let path = service.generate_output_path("hello world! *tts* check");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("tts_"));
        assert!(name.ends_with(".wav"));
        assert!(name.contains("hello_world_tts"));
        assert!(!name.contains('!'));
        assert!(!name.contains('*'));
    }

    #[test]
    fn test_default_output_dir() {
        let config = VoiceConfig::default();
        assert!(config.auto_save);
        assert_eq!(config.output_dir, PathBuf::from("data/voice/output"));
    }
}
