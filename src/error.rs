//! Error types for the bot components.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),
}

/// Failure to turn text into a voice file.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("TTS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed TTS response: {0}")]
    Malformed(String),

    #[error("TTS provider returned status {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("invalid hex audio payload: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("voice file error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("database file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database directory error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat completion returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("chat completion response had no content")]
    EmptyReply,
}

/// Failure handling one inbound message.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error(transparent)]
    History(#[from] HistoryError),
}
