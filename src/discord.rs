use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument};

use crate::alerts::{AlertKind, AlertMessage, Notifier, NotifyError};
use crate::config::Discord;
use crate::FailureReason;

const RED: u32 = 15158332;
const GREEN: u32 = 3066993;
const BLUE: u32 = 5793266;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Renders alerts as Discord embeds and posts them to a channel webhook
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    discord: Discord,
}

impl DiscordNotifier {
    pub fn new(client: Client, discord: Discord) -> Self {
        Self { client, discord }
    }

    pub fn build_alert_embed(alert: &AlertMessage, destination: &str) -> Embed {
        let (title, description, color) = match alert.kind {
            AlertKind::Unhealthy => (
                "🔴 Monitor Unhealthy",
                format!(
                    "**{}** failed {} consecutive checks",
                    alert.monitor_name, alert.consecutive_failures
                ),
                RED,
            ),
            AlertKind::Recovery => (
                "✅ Monitor Recovered",
                format!(
                    "**{}** is healthy again; the failure count returned to zero",
                    alert.monitor_name
                ),
                GREEN,
            ),
        };

        let mut fields = vec![
            EmbedField::inline("🔗 Endpoint", &alert.endpoint),
            EmbedField::inline(
                "📊 Status",
                format!("{} → {}", alert.previous_state, alert.state),
            ),
            EmbedField::inline("⚠️ Threshold", alert.threshold),
        ];

        if alert.kind == AlertKind::Unhealthy {
            let last_result = match alert.failure_reason {
                FailureReason::UnexpectedStatus => format!("HTTP {}", alert.status_code),
                reason => reason.to_string(),
            };
            fields.push(EmbedField::inline("❌ Last Result", last_result));
        }

        Embed {
            title: Some(title.to_string()),
            description: Some(description),
            color: Some(color),
            fields,
            footer: Some(EmbedFooter {
                text: format!("Monitor: {} | Destination: {destination}", alert.monitor_id),
            }),
            timestamp: Some(alert.timestamp.to_rfc3339()),
        }
    }

    fn build_message(&self, alert: &AlertMessage, destination: &str) -> Message {
        let mut builder =
            MessageBuilder::new().add_embed(Self::build_alert_embed(alert, destination));
        if let Some(user_id) = &self.discord.user_id {
            let emoji = match alert.kind {
                AlertKind::Unhealthy => "🔴",
                AlertKind::Recovery => "✅",
            };
            builder = builder.content(format!("{emoji} `{}` <@{user_id}>", alert.monitor_name));
        }
        builder.build()
    }

    async fn send_message(&self, message: &Message) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.discord.url)
            .json(message)
            .send()
            .await?;

        if response.status().is_success() {
            info!("Successfully sent Discord message");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status, body })
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    #[instrument(skip(self, body))]
    async fn publish(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let embed = Embed {
            title: Some(subject.to_string()),
            description: Some(body.to_string()),
            color: Some(BLUE),
            fields: Vec::new(),
            footer: Some(EmbedFooter {
                text: format!("Destination: {destination}"),
            }),
            timestamp: Some(Utc::now().to_rfc3339()),
        };

        self.send_message(&MessageBuilder::new().add_embed(embed).build())
            .await
    }

    #[instrument(skip(self, alert), fields(monitor_id = %alert.monitor_id))]
    async fn publish_alert(
        &self,
        destination: &str,
        alert: &AlertMessage,
    ) -> Result<(), NotifyError> {
        self.send_message(&self.build_message(alert, destination)).await
    }
}
