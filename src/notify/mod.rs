//! Discord webhook notifications.
//!
//! One embed per detected change. Delivery is best effort: an unset webhook,
//! a transport error, or a status other than 200/204 is logged and the
//! change is dropped. Nothing is retried within a cycle.

use crate::config::DiscordConfig;
use crate::detector::{ChangeKind, VersionChange};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

const EMBED_TITLE: &str = "Meta App Update Checker";
const FOOTER_TEXT: &str = "Meta Quest Update Checker";
const UPDATE_COLOR: u32 = 3_447_003;
const FIRST_SIGHT_COLOR: u32 = 5_814_783;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sink for detected changes. Returns whether the change was delivered.
pub trait Notifier {
    fn notify(&self, change: &VersionChange) -> impl Future<Output = bool>;
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    /// ISO-8601, UTC.
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

fn field(name: &str, value: String, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value,
        inline,
    }
}

/// Build the embed for a change.
pub fn build_embed(change: &VersionChange, now: DateTime<Utc>) -> Embed {
    let (description, color) = match change.kind {
        ChangeKind::FirstSight => (
            format!("Now tracking **{}**", change.name),
            FIRST_SIGHT_COLOR,
        ),
        ChangeKind::Update => (
            format!("**{}** has been updated!", change.name),
            UPDATE_COLOR,
        ),
    };

    Embed {
        title: EMBED_TITLE.to_string(),
        description,
        color,
        fields: vec![
            field("App ID", format!("`{}`", change.app_id), false),
            field("Previous Version", format!("`{}`", change.old_version), true),
            field("New Version", format!("`{}`", change.new_version), true),
            field("Version Code", format!("`{}`", change.version_code), true),
        ],
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        footer: EmbedFooter {
            text: FOOTER_TEXT.to_string(),
        },
    }
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    username: Option<String>,
    avatar_url: Option<String>,
}

impl DiscordNotifier {
    pub fn new(config: &DiscordConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let webhook_url = config.webhook().map(str::to_string);
        if webhook_url.is_none() {
            warn!("no Discord webhook configured - changes will only be logged (set DISCORD_WEBHOOK_URL)");
        }

        Ok(Self {
            client,
            webhook_url,
            username: config.username.clone(),
            avatar_url: config.avatar_url.clone(),
        })
    }

    pub fn payload(&self, change: &VersionChange, now: DateTime<Utc>) -> WebhookPayload {
        WebhookPayload {
            embeds: vec![build_embed(change, now)],
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }

    async fn deliver(&self, url: &str, payload: &WebhookPayload) -> Result<(), NotifyError> {
        let resp = self.client.post(url).json(payload).send().await?;

        let status = resp.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

impl Notifier for DiscordNotifier {
    async fn notify(&self, change: &VersionChange) -> bool {
        let Some(url) = self.webhook_url.as_deref() else {
            info!(
                app_id = %change.app_id,
                old = %change.old_version,
                new = %change.new_version,
                "no webhook configured, skipping notification"
            );
            return false;
        };

        let payload = self.payload(change, Utc::now());
        match self.deliver(url, &payload).await {
            Ok(()) => {
                info!(app_id = %change.app_id, name = %change.name, "Discord notification sent");
                true
            }
            Err(e) => {
                error!(app_id = %change.app_id, error = %e, "failed to send Discord notification");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::VersionCode;
    use chrono::TimeZone;

    fn change(kind: ChangeKind, old: &str) -> VersionChange {
        VersionChange {
            kind,
            app_id: "4979055762136823".to_string(),
            name: "Gorilla Tag".to_string(),
            old_version: old.to_string(),
            new_version: "1.1.99".to_string(),
            version_code: VersionCode::Number(1099),
        }
    }

    #[test]
    fn test_update_payload_shape() {
        let now = Utc.with_ymd_and_hms(2025, 10, 8, 12, 0, 0).unwrap();
        let notifier = DiscordNotifier::new(&DiscordConfig {
            username: Some("Meta Update Bot".to_string()),
            ..DiscordConfig::default()
        })
        .unwrap();

        let payload = notifier.payload(&change(ChangeKind::Update, "1.1.98"), now);
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["username"], "Meta Update Bot");
        assert!(value.get("avatar_url").is_none());

        let embed = &value["embeds"][0];
        assert_eq!(embed["title"], EMBED_TITLE);
        assert_eq!(embed["description"], "**Gorilla Tag** has been updated!");
        assert_eq!(embed["color"], UPDATE_COLOR);
        assert_eq!(embed["timestamp"], "2025-10-08T12:00:00.000Z");
        assert_eq!(embed["footer"]["text"], FOOTER_TEXT);

        let fields = embed["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0]["name"], "App ID");
        assert_eq!(fields[0]["value"], "`4979055762136823`");
        assert_eq!(fields[0]["inline"], false);
        assert_eq!(fields[1]["value"], "`1.1.98`");
        assert_eq!(fields[2]["value"], "`1.1.99`");
        assert_eq!(fields[3]["value"], "`1099`");
        assert_eq!(fields[3]["inline"], true);
    }

    #[test]
    fn test_first_sight_embed() {
        let embed = build_embed(&change(ChangeKind::FirstSight, "N/A"), Utc::now());
        assert_eq!(embed.color, FIRST_SIGHT_COLOR);
        assert_eq!(embed.description, "Now tracking **Gorilla Tag**");
        assert_eq!(embed.fields[1].value, "`N/A`");
    }

    #[tokio::test]
    async fn test_unset_webhook_skips() {
        let notifier = DiscordNotifier::new(&DiscordConfig::default()).unwrap();
        assert!(!notifier.notify(&change(ChangeKind::Update, "1.0")).await);
    }

    async fn notify_with_status(status: u16) -> bool {
        let url = crate::test_support::respond_once(status, "").await;
        let notifier = DiscordNotifier::new(&DiscordConfig {
            webhook_url: format!("{}/api/webhooks/1/token", url),
            timeout_secs: 1,
            ..DiscordConfig::default()
        })
        .unwrap();
        notifier.notify(&change(ChangeKind::Update, "1.1.98")).await
    }

    #[tokio::test]
    async fn test_delivered_on_200_and_204() {
        assert!(notify_with_status(200).await);
        assert!(notify_with_status(204).await);
    }

    #[tokio::test]
    async fn test_other_statuses_are_swallowed() {
        assert!(!notify_with_status(201).await);
        assert!(!notify_with_status(429).await);
        assert!(!notify_with_status(500).await);
    }

    #[tokio::test]
    async fn test_stalled_webhook_times_out() {
        let url = crate::test_support::stall().await;
        let notifier = DiscordNotifier::new(&DiscordConfig {
            webhook_url: url,
            timeout_secs: 1,
            ..DiscordConfig::default()
        })
        .unwrap();

        assert!(!notifier.notify(&change(ChangeKind::FirstSight, "N/A")).await);
    }
}
