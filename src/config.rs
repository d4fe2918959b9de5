//! Configuration management for lingobuddy.
//!
//! Loads config from a YAML file in standard locations. Every section falls
//! back to the stock bot settings, so a partial file only overrides what it
//! names. The loaded `Config` is immutable and handed to each component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ConfigError;
use crate::history::default_db_path;
use crate::quiet_hours::QuietHours;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Nicknames or group names the bot answers. Not remarks.
    pub listen_list: Vec<String>,
    pub robot_name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            listen_list: vec!["Ziggy".into()],
            robot_name: "LingoBuddy".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Rounds of context kept per sender.
    pub max_groups: usize,
    pub prompt_path: PathBuf,
    pub emoji_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ark.cn-beijing.volces.com/api/v3".into(),
            api_key: String::new(),
            model: "deepseek-v3-241226".into(),
            max_tokens: 1000,
            temperature: 1.1,
            max_groups: 15,
            prompt_path: PathBuf::from("data/lingobuddy/wango/wango.md"),
            emoji_dir: PathBuf::from("data/lingobuddy/wango/emoji"),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimberWeight {
    pub voice_id: String,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSetting {
    pub voice_id: String,
    pub speed: f32,
    pub pitch: i32,
    pub vol: f32,
    pub emotion: String,
    pub latex_read: bool,
}

impl Default for VoiceSetting {
    fn default() -> Self {
        Self {
            voice_id: String::new(),
            speed: 0.88,
            pitch: 0,
            vol: 1.0,
            emotion: "happy".into(),
            latex_read: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSetting {
    pub sample_rate: u32,
    pub bitrate: u32,
    pub format: String,
}

impl Default for AudioSetting {
    fn default() -> Self {
        Self {
            sample_rate: 32000,
            bitrate: 128000,
            format: "wav".into(),
        }
    }
}

/// Static part of every MiniMax `t2a_v2` request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceProfile {
    pub model: String,
    pub timber_weights: Vec<TimberWeight>,
    pub voice_setting: VoiceSetting,
    pub audio_setting: AudioSetting,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        let weight = |voice_id: &str, weight| TimberWeight {
            voice_id: voice_id.into(),
            weight,
        };
        Self {
            model: "speech-01-hd".into(),
            timber_weights: vec![
                weight("Serene_Woman", 26),
                weight("female-chengshu-jingpin", 13),
                weight("Santa_Claus", 13),
            ],
            voice_setting: VoiceSetting::default(),
            audio_setting: AudioSetting::default(),
        }
    }
}

pub const DEFAULT_VOICE_KEYWORDS: &[&str] = &[
    // direct requests
    "语音", "朗读", "读一下", "念一下", "说一下",
    "发音", "读给我听", "怎么读", "怎么说",
    // English learning
    "pronunciation", "speak", "read", "say",
    "how to pronounce", "how to say",
    // pronunciation practice
    "读音", "跟读", "复述", "重复",
    "repeat after me", "listen and repeat",
    // spoken replies
    "用语音回答", "语音回复", "voice message",
    "speak out", "say it out loud",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TTSConfig {
    pub group_id: String,
    pub api_key: String,
    /// Full endpoint; derived from `group_id` when empty.
    pub url: String,
    pub voice_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub voice_keywords: Vec<String>,
    pub voice_settings: VoiceProfile,
}

impl Default for TTSConfig {
    fn default() -> Self {
        Self {
            group_id: String::new(),
            api_key: String::new(),
            url: String::new(),
            voice_dir: PathBuf::from("data/voices"),
            request_timeout_secs: 30,
            voice_keywords: DEFAULT_VOICE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            voice_settings: VoiceProfile::default(),
        }
    }
}

impl TTSConfig {
    pub fn endpoint(&self) -> String {
        if self.url.is_empty() {
            format!("https://api.minimax.chat/v1/t2a_v2?GroupId={}", self.group_id)
        } else {
            self.url.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckInConfig {
    /// Prompt handed to the LLM when the bot reaches out on its own.
    pub message: String,
    pub min_countdown_hours: f64,
    pub max_countdown_hours: f64,
}

impl Default for CheckInConfig {
    fn default() -> Self {
        Self {
            message: "请你模拟系统设置的角色，在微信上找对方发消息想知道对方在做什么".into(),
            min_countdown_hours: 1.0,
            max_countdown_hours: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuietTimeConfig {
    pub start: String,
    pub end: String,
}

impl Default for QuietTimeConfig {
    fn default() -> Self {
        Self {
            start: "00:00".into(),
            end: "24:00".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `data/database/chat_history.db` under the working directory.
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_db_path)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bot: BotConfig,
    pub llm: LlmConfig,
    pub tts: TTSConfig,
    pub checkin: CheckInConfig,
    pub quiet_time: QuietTimeConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/lingobuddy/config.yaml
    /// 3. /etc/lingobuddy/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/lingobuddy/config.yaml")),
                Some(PathBuf::from("/etc/lingobuddy/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn quiet_hours(&self) -> Result<QuietHours, ConfigError> {
        QuietHours::parse(&self.quiet_time.start, &self.quiet_time.end)
    }
}
