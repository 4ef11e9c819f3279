//! Webhook notifications
//!
//! Notices are posted as Slack-compatible incoming-webhook messages, which is
//! also what Mattermost and Rocket.Chat accept.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::freshness::Notice;

/// Where and as whom a notice is posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyTarget {
    pub endpoint: String,
    pub channel: String,
    pub bot_name: String,
    pub bot_icon: String,
}

impl From<&RepositoryConfig> for NotifyTarget {
    fn from(repo: &RepositoryConfig) -> Self {
        Self {
            endpoint: repo.endpoint.clone(),
            channel: repo.channel.clone(),
            bot_name: repo.bot_name.clone(),
            bot_icon: repo.bot_icon.clone(),
        }
    }
}

/// Delivers notices somewhere
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, target: &NotifyTarget, notice: &Notice) -> Result<()>;
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookAttachment {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub channel: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    pub attachments: Vec<WebhookAttachment>,
}

impl WebhookPayload {
    /// `:name:` icons are emoji, anything else is treated as an image URL
    pub fn new(target: &NotifyTarget, title: &str, text: &str) -> Self {
        let icon = target.bot_icon.trim();
        let is_emoji = icon.len() > 1 && icon.starts_with(':') && icon.ends_with(':');

        Self {
            channel: target.channel.clone(),
            username: target.bot_name.clone(),
            icon_emoji: is_emoji.then(|| icon.to_string()),
            icon_url: (!is_emoji && !icon.is_empty()).then(|| icon.to_string()),
            attachments: vec![WebhookAttachment {
                title: title.to_string(),
                text: text.to_string(),
            }],
        }
    }
}

/// Posts notices to a Slack-style incoming webhook
#[derive(Debug, Clone, Default)]
pub struct SlackWebhook {
    client: Client,
}

impl SlackWebhook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for SlackWebhook {
    async fn notify(&self, target: &NotifyTarget, notice: &Notice) -> Result<()> {
        let payload = WebhookPayload::new(target, &notice.title(), &notice.body());
        debug!(
            "Posting to {}: {}",
            target.endpoint,
            serde_json::to_string(&payload).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&target.endpoint)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach webhook for {}", notice.repository()))?;

        if resp.status().is_success() {
            info!("Notified {}: {}", target.channel, notice.title());
            Ok(())
        } else {
            Err(anyhow!(
                "Webhook rejected notice for {}: {}",
                notice.repository(),
                resp.status()
            ))
        }
    }
}

/// Logs notices instead of sending them (`--dry-run`)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, target: &NotifyTarget, notice: &Notice) -> Result<()> {
        info!(
            "[dry-run] would notify {} as {}: {} / {}",
            target.channel,
            target.bot_name,
            notice.title(),
            notice.body()
        );
        Ok(())
    }
}
