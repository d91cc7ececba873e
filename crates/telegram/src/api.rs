use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rosterbot_core::UserId;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::commands::KNOWN_COMMANDS;
use crate::events::{BotEvent, CallbackQueryEvent, MessageEvent, UpdateEnvelope};
use crate::keyboard::OutgoingMessage;
use crate::polling::{BotTransport, TransportError};

const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

/// Bot API client speaking long polling over HTTPS.
#[derive(Debug)]
pub struct HttpBotTransport {
    client: Client,
    api_base_url: String,
    token: SecretString,
    poll_timeout_secs: u64,
    state: Mutex<PollState>,
}

#[derive(Debug, Default)]
struct PollState {
    offset: Option<i64>,
    pending: VecDeque<UpdateEnvelope>,
}

impl HttpBotTransport {
    pub fn new(
        api_base_url: impl Into<String>,
        token: SecretString,
        poll_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()
            .map_err(|error| TransportError::Connect(error.without_url().to_string()))?;
        Ok(Self {
            client,
            api_base_url: api_base_url.into(),
            token,
            poll_timeout_secs,
            state: Mutex::new(PollState::default()),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.token.expose_secret(),
            method
        )
    }

    /// Calls a Bot API method. Error strings never carry the request URL, which embeds the token.
    async fn call<P, T>(&self, method: &str, payload: &P) -> Result<T, String>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.method_url(method))
            .json(payload)
            .send()
            .await
            .map_err(|error| format!("{method} request failed: {}", error.without_url()))?;

        let status = response.status();
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|error| format!("{method} returned {status}: {}", error.without_url()))?;

        if !body.ok {
            return Err(format!(
                "{method} rejected: {}",
                body.description.as_deref().unwrap_or("no description")
            ));
        }
        body.result.ok_or_else(|| format!("{method} returned no result"))
    }
}

#[async_trait]
impl BotTransport for HttpBotTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let me: RawUser = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(TransportError::Connect)?;
        info!(
            event_name = "ingress.telegram.authenticated",
            bot_id = me.id,
            bot_username = me.username.as_deref().unwrap_or("unknown"),
            "bot token accepted"
        );

        let commands: Vec<BotCommand<'_>> = KNOWN_COMMANDS
            .iter()
            .map(|&(command, description)| BotCommand { command, description })
            .collect();
        if let Err(error) = self
            .call::<_, bool>("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await
        {
            warn!(
                event_name = "ingress.telegram.commands_not_registered",
                error = %error,
                "could not register bot commands"
            );
        }
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<UpdateEnvelope>, TransportError> {
        let mut state = self.state.lock().await;
        loop {
            if let Some(envelope) = state.pending.pop_front() {
                return Ok(Some(envelope));
            }

            let request = GetUpdates {
                offset: state.offset,
                timeout: self.poll_timeout_secs,
                allowed_updates: &ALLOWED_UPDATES,
            };
            let updates: Vec<RawUpdate> =
                self.call("getUpdates", &request).await.map_err(TransportError::Receive)?;

            for update in updates {
                state.offset = Some(update.update_id + 1);
                state.pending.push_back(envelope_from_update(update));
            }
        }
    }

    async fn acknowledge(&self, envelope: &UpdateEnvelope) -> Result<(), TransportError> {
        let BotEvent::CallbackQuery(event) = &envelope.event else {
            return Ok(());
        };
        self.call::<_, bool>(
            "answerCallbackQuery",
            &serde_json::json!({ "callback_query_id": event.callback_query_id }),
        )
        .await
        .map(|_| ())
        .map_err(TransportError::Acknowledge)
    }

    async fn send(&self, message: &OutgoingMessage) -> Result<(), TransportError> {
        self.call::<_, Value>("sendMessage", message)
            .await
            .map(|_| ())
            .map_err(TransportError::Send)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct BotCommand<'a> {
    command: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RawUpdate {
    pub update_id: i64,
    message: Option<RawMessage>,
    callback_query: Option<RawCallbackQuery>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    from: Option<RawUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCallbackQuery {
    id: String,
    from: RawUser,
    message: Option<RawMessage>,
    data: Option<String>,
}

/// Translates a Bot API update into the transport-neutral envelope. Non-text messages arrive
/// as empty text so the conversation can reject them.
pub fn envelope_from_update(update: RawUpdate) -> UpdateEnvelope {
    let event = if let Some(message) = update.message {
        let user_id = message.from.as_ref().map_or(message.chat.id, |from| from.id);
        BotEvent::Message(MessageEvent {
            chat_id: message.chat.id,
            user_id: UserId(user_id),
            text: message.text.unwrap_or_default(),
        })
    } else if let Some(query) = update.callback_query {
        BotEvent::CallbackQuery(CallbackQueryEvent {
            callback_query_id: query.id,
            chat_id: query.message.map_or(query.from.id, |message| message.chat.id),
            user_id: UserId(query.from.id),
            data: query.data.unwrap_or_default(),
        })
    } else {
        let kind = update.other.keys().next().cloned().unwrap_or_else(|| "unknown".to_owned());
        BotEvent::Unsupported { kind }
    };

    UpdateEnvelope { update_id: update.update_id, event }
}

#[cfg(test)]
mod tests {
    use rosterbot_core::UserId;
    use secrecy::SecretString;
    use serde_json::json;

    use super::{envelope_from_update, HttpBotTransport, RawUpdate};
    use crate::events::BotEvent;

    fn parse(value: serde_json::Value) -> RawUpdate {
        serde_json::from_value(value).expect("valid update")
    }

    #[test]
    fn text_messages_carry_sender_and_chat() {
        let envelope = envelope_from_update(parse(json!({
            "update_id": 900,
            "message": {
                "message_id": 1,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 7, "is_bot": false, "first_name": "Ali" },
                "text": "/menu"
            }
        })));

        assert_eq!(envelope.update_id, 900);
        match envelope.event {
            BotEvent::Message(event) => {
                assert_eq!(event.chat_id, 42);
                assert_eq!(event.user_id, UserId(7));
                assert_eq!(event.text, "/menu");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn callback_queries_become_button_presses() {
        let envelope = envelope_from_update(parse(json!({
            "update_id": 901,
            "callback_query": {
                "id": "cb-9",
                "from": { "id": 7, "is_bot": false, "first_name": "Ali" },
                "message": { "message_id": 2, "chat": { "id": 42, "type": "private" } },
                "data": "A"
            }
        })));

        match envelope.event {
            BotEvent::CallbackQuery(event) => {
                assert_eq!(event.callback_query_id, "cb-9");
                assert_eq!(event.chat_id, 42);
                assert_eq!(event.data, "A");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn photos_arrive_as_empty_text() {
        let envelope = envelope_from_update(parse(json!({
            "update_id": 902,
            "message": {
                "message_id": 3,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 7, "is_bot": false, "first_name": "Ali" },
                "photo": []
            }
        })));

        assert!(matches!(envelope.event, BotEvent::Message(ref event) if event.text.is_empty()));
    }

    #[test]
    fn other_update_kinds_are_unsupported() {
        let envelope = envelope_from_update(parse(json!({
            "update_id": 903,
            "edited_message": { "message_id": 4 }
        })));

        assert_eq!(envelope.event, BotEvent::Unsupported { kind: "edited_message".to_owned() });
    }

    #[test]
    fn token_stays_out_of_debug_output() {
        let transport = HttpBotTransport::new(
            "https://api.telegram.org/",
            SecretString::from("123:very-secret".to_owned()),
            30,
        )
        .expect("client builds");

        assert!(!format!("{transport:?}").contains("very-secret"));
        assert_eq!(
            transport.method_url("getMe"),
            "https://api.telegram.org/bot123:very-secret/getMe"
        );
    }
}
