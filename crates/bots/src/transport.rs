//! Outbound webhook delivery.

use {
    async_trait::async_trait,
    bytes::Bytes,
    herald_common::model::{Bot, BotEventType},
    herald_config::BotsConfig,
    reqwest::{StatusCode, header::CONTENT_TYPE},
    tracing::{debug, info},
    uuid::Uuid,
};

pub const EVENT_HEADER: &str = "X-Herald-Bot-Event";
pub const REQUEST_ID_HEADER: &str = "X-Herald-Bot-Request-Id";
pub const TOKEN_HEADER: &str = "X-Herald-Bot-Token";

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    /// HTTP status, when the bot answered at all.
    pub status: Option<u16>,
}

impl DeliveryOutcome {
    pub const NOT_DELIVERED: Self = Self {
        delivered: false,
        status: None,
    };
}

#[async_trait]
pub trait BotTransport: Send + Sync {
    /// Deliver one encoded event to one bot. Never fails: anything other than
    /// an acknowledged delivery is reported as not delivered.
    async fn deliver(
        &self,
        bot: &Bot,
        event: BotEventType,
        request_id: Uuid,
        body: Bytes,
    ) -> DeliveryOutcome;
}

/// POSTs the event body to the bot's webhook URL. Only `204 No Content`
/// counts as delivered.
pub struct HttpBotTransport {
    client: reqwest::Client,
}

impl HttpBotTransport {
    pub fn new(config: &BotsConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.delivery_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BotTransport for HttpBotTransport {
    async fn deliver(
        &self,
        bot: &Bot,
        event: BotEventType,
        request_id: Uuid,
        body: Bytes,
    ) -> DeliveryOutcome {
        let result = self
            .client
            .post(&bot.webhook_url)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .header(EVENT_HEADER, event.as_str())
            .header(REQUEST_ID_HEADER, request_id.to_string())
            .header(TOKEN_HEADER, &bot.verification_token)
            .body(body)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status();
                debug!(bot_id = %bot.id, event = %event, status = status.as_u16(), "bot webhook answered");
                DeliveryOutcome {
                    delivered: status == StatusCode::NO_CONTENT,
                    status: Some(status.as_u16()),
                }
            },
            Err(e) => {
                debug!(bot_id = %bot.id, event = %event, error = %e, "bot webhook request failed");
                DeliveryOutcome {
                    delivered: false,
                    status: e.status().map(|s| s.as_u16()),
                }
            },
        }
    }
}

/// Logs instead of calling out; every delivery succeeds.
#[derive(Debug, Default)]
pub struct DryRunTransport;

#[async_trait]
impl BotTransport for DryRunTransport {
    async fn deliver(
        &self,
        bot: &Bot,
        event: BotEventType,
        request_id: Uuid,
        body: Bytes,
    ) -> DeliveryOutcome {
        info!(
            bot_id = %bot.id,
            bot = %bot.display_name,
            event = %event,
            %request_id,
            body = %String::from_utf8_lossy(&body),
            "dry-run bot delivery"
        );
        DeliveryOutcome {
            delivered: true,
            status: None,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, std::collections::HashSet};

    fn bot(url: String) -> Bot {
        Bot {
            id: Uuid::new_v4(),
            bot_user_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            display_name: "echo".into(),
            description: String::new(),
            state: Default::default(),
            privileged: false,
            subscribe_events: HashSet::new(),
            webhook_url: url,
            verification_token: "verify-me".into(),
            channel_ids: HashSet::new(),
        }
    }

    fn transport() -> HttpBotTransport {
        HttpBotTransport::new(&BotsConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn no_content_is_delivered() {
        let mut server = mockito::Server::new_async().await;
        let request_id = Uuid::new_v4();
        let mock = server
            .mock("POST", "/hook")
            .match_header(EVENT_HEADER, "PING")
            .match_header(TOKEN_HEADER, "verify-me")
            .match_header(REQUEST_ID_HEADER, request_id.to_string().as_str())
            .match_body(r#"{"hello":true}"#)
            .with_status(204)
            .create_async()
            .await;

        let outcome = transport()
            .deliver(
                &bot(format!("{}/hook", server.url())),
                BotEventType::Ping,
                request_id,
                Bytes::from_static(br#"{"hello":true}"#),
            )
            .await;

        mock.assert_async().await;
        assert_eq!(outcome, DeliveryOutcome {
            delivered: true,
            status: Some(204),
        });
    }

    #[tokio::test]
    async fn ok_with_body_is_not_delivered() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(200)
            .with_body("fine")
            .create_async()
            .await;

        let outcome = transport()
            .deliver(
                &bot(format!("{}/hook", server.url())),
                BotEventType::Joined,
                Uuid::new_v4(),
                Bytes::from_static(b"{}"),
            )
            .await;
        assert!(!outcome.delivered);
        assert_eq!(outcome.status, Some(200));
    }

    #[tokio::test]
    async fn connection_failure_is_not_delivered() {
        let outcome = transport()
            .deliver(
                &bot("http://127.0.0.1:1/hook".into()),
                BotEventType::Ping,
                Uuid::new_v4(),
                Bytes::new(),
            )
            .await;
        assert_eq!(outcome, DeliveryOutcome::NOT_DELIVERED);
    }
}
