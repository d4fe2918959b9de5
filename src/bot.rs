//! Message handling: one inbound chat message in, one reply out.
//!
//! inbound text → voice request? → LLM reply → optional TTS → chat log

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::checkin::CheckIn;
use crate::config::Config;
use crate::error::BotError;
use crate::history::ChatLog;
use crate::llm::ChatClient;
use crate::voice::VoiceHandler;

#[derive(Debug, Clone, PartialEq)]
pub struct BotReply {
    pub text: String,
    /// Present when a voice reply was asked for and synthesis worked.
    pub voice: Option<PathBuf>,
}

pub struct Bot {
    listen_list: Vec<String>,
    chat: ChatClient,
    voice: VoiceHandler,
    log: ChatLog,
}

impl Bot {
    pub fn new(config: &Config) -> Result<Self, BotError> {
        Ok(Self {
            listen_list: config.bot.listen_list.clone(),
            chat: ChatClient::new(&config.llm)?,
            voice: VoiceHandler::new(&config.tts)?,
            log: ChatLog::open(&config.database.resolved_path())?,
        })
    }

    /// Whether `name` (nickname or group name) is on the listen list.
    pub fn listens_to(&self, name: &str) -> bool {
        self.listen_list.iter().any(|n| n == name)
    }

    /// Answer one message. A failed voice synthesis falls back to text only,
    /// and a failed log write is logged without failing the reply.
    pub async fn handle_message(
        &mut self,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        language: &str,
    ) -> Result<BotReply, BotError> {
        let wants_voice = self.voice.is_voice_request(text);
        let reply = self.chat.reply(sender_id, text).await?;

        let voice = if wants_voice {
            let voice = self.voice.generate_voice(&reply, language).await;
            if voice.is_none() {
                warn!("No voice for {sender_name}, replying with text");
            }
            voice
        } else {
            None
        };

        if let Err(e) = self.log.record_turn(sender_id, sender_name, text, &reply) {
            error!("Failed to save chat turn for {sender_name}: {e}");
        }

        info!(
            "Replied to {sender_name} ({} chars{})",
            reply.chars().count(),
            if voice.is_some() { ", voice" } else { "" }
        );
        Ok(BotReply { text: reply, voice })
    }

    /// Produce the bot-initiated message for a fired check-in.
    pub async fn check_in(&mut self, event: &CheckIn) -> Result<String, BotError> {
        Ok(self.chat.reply(&event.contact, &event.prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ChatHistoryReader;
    use serde_json::json;
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_llm(server: &MockServer, content: &str) {
        Mock::given(method("POST"))
            .and(path("/llm/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": content } }]
            })))
            .mount(server)
            .await;
    }

    fn config_for(server_uri: &str, dir: &Path) -> Config {
        let mut config = Config::default();
        config.llm.base_url = format!("{server_uri}/llm");
        config.llm.prompt_path = dir.join("missing.md");
        config.tts.url = format!("{server_uri}/tts");
        config.tts.voice_dir = dir.join("voices");
        config.database.path = Some(dir.join("chat_history.db"));
        config
    }

    #[tokio::test]
    async fn text_message_is_answered_and_logged() {
        let server = MockServer::start().await;
        mock_llm(&server, "Nice to meet you!").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server.uri(), dir.path());
        let mut bot = Bot::new(&config).unwrap();

        let reply = bot.handle_message("wxid_a", "Ziggy", "hi there", "en").await.unwrap();
        assert_eq!(reply, BotReply { text: "Nice to meet you!".into(), voice: None });

        let reader = ChatHistoryReader::open(config.database.path.as_deref()).unwrap();
        let recent = reader.get_recent_messages(10);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "hi there");
        assert_eq!(recent[0].reply, "Nice to meet you!");
    }

    #[tokio::test]
    async fn voice_request_gets_audio() {
        let server = MockServer::start().await;
        mock_llm(&server, "Apple: /ˈæp.əl/").await;
        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base_resp": { "status_code": 0 },
                "data": { "audio": "cafe" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut bot = Bot::new(&config_for(&server.uri(), dir.path())).unwrap();

        let reply = bot
            .handle_message("wxid_a", "Ziggy", "How to pronounce apple?", "en")
            .await
            .unwrap();
        let voice = reply.voice.unwrap();
        assert_eq!(std::fs::read(voice).unwrap(), vec![0xca, 0xfe]);
    }

    #[tokio::test]
    async fn failed_synthesis_falls_back_to_text() {
        let server = MockServer::start().await;
        mock_llm(&server, "Apple.").await;
        Mock::given(method("POST"))
            .and(path("/tts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base_resp": { "status_code": 2013, "status_msg": "invalid params" }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut bot = Bot::new(&config_for(&server.uri(), dir.path())).unwrap();

        let reply = bot.handle_message("wxid_a", "Ziggy", "读一下 apple", "zh").await.unwrap();
        assert_eq!(reply.text, "Apple.");
        assert!(reply.voice.is_none());
    }

    #[tokio::test]
    async fn check_in_uses_configured_prompt() {
        let server = MockServer::start().await;
        mock_llm(&server, "在干嘛呀？").await;

        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&server.uri(), dir.path());
        let mut bot = Bot::new(&config).unwrap();
        assert!(bot.listens_to("Ziggy"));
        assert!(!bot.listens_to("Stranger"));

        let event = CheckIn {
            contact: "Ziggy".into(),
            prompt: config.checkin.message.clone(),
        };
        assert_eq!(bot.check_in(&event).await.unwrap(), "在干嘛呀？");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["content"], json!(config.checkin.message));
    }
}
