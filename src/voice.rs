//! Voice replies: request detection, MiniMax TTS synthesis, voice file cleanup.
//!
//! Synthesized audio comes back hex encoded inside the JSON response and is
//! written to `<voice_dir>/voice_<YYYYMMDD_HHMMSS>.wav`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{TTSConfig, VoiceProfile};
use crate::error::VoiceError;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    #[serde(flatten)]
    profile: &'a VoiceProfile,
    text: &'a str,
    language_boost: &'a str,
}

#[derive(Deserialize)]
struct SpeechResponse {
    base_resp: Option<BaseResp>,
    data: Option<SpeechData>,
    extra_info: Option<ExtraInfo>,
}

#[derive(Deserialize)]
struct BaseResp {
    status_code: i64,
    #[serde(default)]
    status_msg: String,
}

#[derive(Deserialize)]
struct SpeechData {
    audio: Option<String>,
}

#[derive(Deserialize)]
#[serde(default)]
struct ExtraInfo {
    audio_length: u64,
    audio_sample_rate: u64,
    audio_size: u64,
    bitrate: u64,
    audio_format: String,
    audio_channel: u32,
    invisible_character_ratio: f64,
    usage_characters: u64,
}

impl Default for ExtraInfo {
    fn default() -> Self {
        Self {
            audio_length: 0,
            audio_sample_rate: 0,
            audio_size: 0,
            bitrate: 0,
            audio_format: "unknown".into(),
            audio_channel: 1,
            invisible_character_ratio: 0.0,
            usage_characters: 0,
        }
    }
}

/// `language_boost` value for a reply language: English-tuned for `"en"`,
/// Chinese for everything else.
fn language_boost(language: &str) -> &'static str {
    if language == "en" {
        "en"
    } else {
        "zh"
    }
}

pub struct VoiceHandler {
    endpoint: String,
    api_key: String,
    profile: VoiceProfile,
    voice_dir: PathBuf,
    keywords: Vec<String>,
    client: Client,
}

impl VoiceHandler {
    pub fn new(config: &TTSConfig) -> Result<Self, VoiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        if let Err(e) = fs::create_dir_all(&config.voice_dir) {
            warn!("Failed to create voice dir {}: {e}", config.voice_dir.display());
        }

        Ok(Self {
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            profile: config.voice_settings.clone(),
            voice_dir: config.voice_dir.clone(),
            keywords: config.voice_keywords.iter().map(|k| k.to_lowercase()).collect(),
            client,
        })
    }

    pub fn voice_dir(&self) -> &Path {
        &self.voice_dir
    }

    /// Whether the message asks for a spoken reply.
    ///
    /// Plain substring match on the lower-cased text, so a keyword that merely
    /// appears inside unrelated text ("already" contains "read") also counts.
    pub fn is_voice_request(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|keyword| text.contains(keyword.as_str()))
    }

    /// Synthesize `text` and return the written voice file.
    /// Returns `None` on any failure after logging it; callers fall back to a
    /// text-only reply.
    pub async fn generate_voice(&self, text: &str, language: &str) -> Option<PathBuf> {
        match self.synthesize(text, language).await {
            Ok(path) => Some(path),
            Err(e) => {
                error!("Voice generation failed: {e}");
                None
            }
        }
    }

    /// Synthesize `text` through the TTS provider and write the audio file.
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<PathBuf, VoiceError> {
        tokio::fs::create_dir_all(&self.voice_dir).await?;

        let body = SpeechRequest {
            profile: &self.profile,
            text,
            language_boost: language_boost(language),
        };

        debug!("Requesting TTS for {} chars ({})", text.chars().count(), body.language_boost);
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        debug!("TTS provider answered {}", resp.status());

        let raw = resp.text().await?;
        let parsed: SpeechResponse =
            serde_json::from_str(&raw).map_err(|e| VoiceError::Malformed(e.to_string()))?;

        if let Some(extra) = &parsed.extra_info {
            log_extra_info(extra);
        }

        let base = parsed
            .base_resp
            .ok_or_else(|| VoiceError::Malformed("missing base_resp".into()))?;
        if base.status_code != 0 {
            let message = if base.status_msg.is_empty() {
                "unknown error".to_string()
            } else {
                base.status_msg
            };
            return Err(VoiceError::Provider {
                code: base.status_code,
                message,
            });
        }

        let audio_hex = parsed
            .data
            .and_then(|d| d.audio)
            .ok_or_else(|| VoiceError::Malformed("missing data.audio".into()))?;
        let audio = hex::decode(audio_hex.trim())?;

        let file_name = Local::now().format("voice_%Y%m%d_%H%M%S.wav").to_string();
        let voice_path = self.voice_dir.join(file_name);
        tokio::fs::write(&voice_path, &audio).await?;

        info!("Voice generated: {} ({} bytes)", voice_path.display(), audio.len());
        Ok(voice_path)
    }

    /// Delete every regular file directly inside the voice dir.
    /// Subdirectories are left alone. Returns the number of files removed.
    pub fn cleanup_voice_dir(&self) -> usize {
        if !self.voice_dir.exists() {
            return 0;
        }

        let entries = match fs::read_dir(&self.voice_dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to clean voice dir {}: {e}", self.voice_dir.display());
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    error!("Failed to read voice dir entry: {e}");
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed old voice file: {}", path.display());
                    removed += 1;
                }
                Err(e) => error!("Failed to remove voice file {}: {e}", path.display()),
            }
        }
        removed
    }
}

fn log_extra_info(extra: &ExtraInfo) {
    info!(
        "Audio info: length={}ms, sample_rate={}Hz, size={} bytes, bitrate={}bps",
        extra.audio_length, extra.audio_sample_rate, extra.audio_size, extra.bitrate
    );
    info!(
        "Audio format: {}, channels: {}",
        extra.audio_format, extra.audio_channel
    );
    info!(
        "Invisible character ratio: {:.2}%, billed characters: {}",
        extra.invisible_character_ratio * 100.0,
        extra.usage_characters
    );
}
