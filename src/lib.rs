//! lingobuddy: personal WeChat chatbot core.
//!
//! Components:
//! - `bot`: one inbound message to one reply (LLM, optional voice, chat log)
//! - `llm`: OpenAI-compatible chat completions with per-sender context
//! - `voice`: voice-request detection and MiniMax TTS voice files
//! - `history`: SQLite chat log and read-only history queries
//! - `checkin`: random-countdown check-ins outside quiet hours
//! - `config`: YAML configuration

pub mod bot;
pub mod checkin;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod quiet_hours;
pub mod voice;
