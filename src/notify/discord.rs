use super::{Notification, Notifier};
use anyhow::{anyhow, Result};
use metrics::counter;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Posts messages to a channel through the Discord REST API with a bot token.
#[derive(Clone)]
pub struct DiscordNotifier {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: DISCORD_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    /// Points the client at another API root (local relay, tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel_id)
    }

    async fn post_with_retries<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(url)
                .header("Authorization", format!("Bot {}", self.token))
                .timeout(self.timeout)
                .json(body)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord request failed: {e}"),
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            tracing::debug!(attempt, error = %err, "discord send retry");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, channel_id: &str, notification: &Notification) -> Result<()> {
        let url = self.messages_url(channel_id);
        self.post_with_retries(&url, notification).await?;

        // The main message is the delivery; a lost follow-up must not make
        // the engine re-post it.
        if let Some(text) = &notification.follow_up {
            let follow = Notification::text(text.clone());
            if let Err(e) = self.post_with_retries(&url, &follow).await {
                tracing::warn!(
                    channel = channel_id,
                    message = %notification.summary(),
                    error = ?e,
                    "follow-up message not delivered"
                );
                counter!("monitor_follow_up_errors_total", "channel" => channel_id.to_string())
                    .increment(1);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
