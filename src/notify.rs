//! Notification Dispatch - Formats and delivers release announcements
//!
//! Every channel is a URL. Its prefix selects the message formatter (see
//! [`FormatterRegistry`]) and its scheme selects how [`HttpTransport`]
//! delivers the message. Channels are independent: one failing channel
//! never stops delivery to the others.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::NotificationChannel;
use crate::error::NotifyError;

/// URL prefix of Teams / Power Automate webhooks that expect an Adaptive Card
pub const POWER_AUTOMATE_PREFIX: &str = "generic+powerautomate";

const DISCORD_API: &str = "https://discord.com/api";
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body kept in a `Rejected` error
const MAX_ERROR_BODY_BYTES: usize = 512;

/// A newly observed release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub slug: String,
    pub tag: String,
}

impl ReleaseEvent {
    pub fn new(slug: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            tag: tag.into(),
        }
    }

    pub fn default_message(&self) -> String {
        format!("New release for {}: {}", self.slug, self.tag)
    }
}

/// Renders a release event for the channels it accepts
pub trait MessageFormatter: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, url: &str) -> bool;

    fn format(&self, event: &ReleaseEvent) -> String;
}

/// `New release for owner/name: tag`
pub struct PlainTextFormatter;

impl MessageFormatter for PlainTextFormatter {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn accepts(&self, _url: &str) -> bool {
        true
    }

    fn format(&self, event: &ReleaseEvent) -> String {
        event.default_message()
    }
}

/// Teams message carrying an Adaptive Card with the repository and version
pub struct AdaptiveCardFormatter;

impl MessageFormatter for AdaptiveCardFormatter {
    fn name(&self) -> &'static str {
        "adaptive-card"
    }

    fn accepts(&self, url: &str) -> bool {
        url.starts_with(POWER_AUTOMATE_PREFIX)
    }

    fn format(&self, event: &ReleaseEvent) -> String {
        serde_json::json!({
            "type": "message",
            "attachments": [{
                "contentType": "application/vnd.microsoft.card.adaptive",
                "content": {
                    "type": "AdaptiveCard",
                    "version": "1.2",
                    "body": [{
                        "type": "TextBlock",
                        "text": "New Release Available",
                        "weight": "bolder",
                        "size": "large"
                    }, {
                        "type": "FactSet",
                        "facts": [{
                            "title": "Repository:",
                            "value": event.slug
                        }, {
                            "title": "Version:",
                            "value": event.tag
                        }]
                    }]
                }
            }]
        })
        .to_string()
    }
}

/// Ordered formatter lookup; the first formatter accepting a URL wins and
/// plain text is the fallback.
pub struct FormatterRegistry {
    formatters: Vec<Box<dyn MessageFormatter>>,
    fallback: PlainTextFormatter,
}

impl FormatterRegistry {
    /// Registry with no formatters besides the plain-text fallback
    pub fn empty() -> Self {
        Self {
            formatters: Vec::new(),
            fallback: PlainTextFormatter,
        }
    }

    pub fn register(&mut self, formatter: Box<dyn MessageFormatter>) {
        self.formatters.push(formatter);
    }

    pub fn formatter_for(&self, url: &str) -> &dyn MessageFormatter {
        self.formatters
            .iter()
            .find(|f| f.accepts(url))
            .map(|f| f.as_ref())
            .unwrap_or(&self.fallback)
    }

    pub fn format(&self, url: &str, event: &ReleaseEvent) -> String {
        self.formatter_for(url).format(event)
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(AdaptiveCardFormatter));
        registry
    }
}

/// Delivers a formatted message to a channel URL
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, url: &str, message: &str) -> Result<(), NotifyError>;
}

/// Where a channel URL delivers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceTarget {
    /// POST the message body to an HTTP(S) endpoint
    Webhook { endpoint: String },
    /// Discord webhook
    Discord { webhook_id: String, token: String },
    /// Write the message to the log
    Logger,
}

impl ServiceTarget {
    pub fn parse(url: &str) -> Result<Self, NotifyError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| NotifyError::InvalidUrl(redact_url(url)))?;

        match scheme {
            "generic" | "generic+https" | POWER_AUTOMATE_PREFIX => {
                Self::webhook("https", rest, url)
            }
            "generic+http" => Self::webhook("http", rest, url),
            "discord" => {
                let (token, webhook_id) = rest
                    .split_once('@')
                    .ok_or_else(|| NotifyError::InvalidUrl(redact_url(url)))?;
                let webhook_id = webhook_id.trim_end_matches('/');
                if token.is_empty() || webhook_id.is_empty() {
                    return Err(NotifyError::InvalidUrl(redact_url(url)));
                }
                Ok(ServiceTarget::Discord {
                    webhook_id: webhook_id.to_string(),
                    token: token.to_string(),
                })
            }
            "logger" => Ok(ServiceTarget::Logger),
            other => Err(NotifyError::UnsupportedService(other.to_string())),
        }
    }

    fn webhook(inner_scheme: &str, rest: &str, url: &str) -> Result<Self, NotifyError> {
        if rest.is_empty() {
            return Err(NotifyError::InvalidUrl(redact_url(url)));
        }
        Ok(ServiceTarget::Webhook {
            endpoint: format!("{}://{}", inner_scheme, rest),
        })
    }
}

/// Scheme and host of a channel URL, without credentials, path or query
pub fn redact_url(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let authority = rest.split(['/', '?']).next().unwrap_or(rest);
            let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
            format!("{}://{}", scheme, host)
        }
        None => "<invalid url>".to_string(),
    }
}

/// reqwest-backed transport for generic webhooks, Discord and the log
pub struct HttpTransport {
    client: reqwest::Client,
    discord_api: String,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeout(DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("releasesentry/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create notification HTTP client")?;

        Ok(Self {
            client,
            discord_api: DISCORD_API.to_string(),
        })
    }

    /// Send Discord messages to another API root (used by tests)
    pub fn with_discord_api(mut self, base: impl Into<String>) -> Self {
        self.discord_api = base.into();
        self
    }

    async fn post_webhook(&self, endpoint: &str, message: &str) -> Result<(), NotifyError> {
        let content_type = if serde_json::from_str::<serde_json::Value>(message).is_ok() {
            "application/json"
        } else {
            "text/plain; charset=utf-8"
        };

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, content_type)
            .body(message.to_owned())
            .send()
            .await
            .map_err(request_error)?;

        ensure_success(response).await
    }

    async fn post_discord(&self, webhook_id: &str, token: &str, message: &str) -> Result<(), NotifyError> {
        let endpoint = format!("{}/webhooks/{}/{}", self.discord_api, webhook_id, token);
        let response = self
            .client
            .post(&endpoint)
            .json(&serde_json::json!({ "content": message }))
            .send()
            .await
            .map_err(request_error)?;

        ensure_success(response).await
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn send(&self, url: &str, message: &str) -> Result<(), NotifyError> {
        match ServiceTarget::parse(url)? {
            ServiceTarget::Webhook { endpoint } => self.post_webhook(&endpoint, message).await,
            ServiceTarget::Discord { webhook_id, token } => {
                self.post_discord(&webhook_id, &token, message).await
            }
            ServiceTarget::Logger => {
                info!(target: "releasesentry::notification", "{}", message);
                Ok(())
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Rejected {
        status: status.as_u16(),
        body: truncate_body(body),
    })
}

/// Request URLs can carry webhook tokens, so they never reach the error text
fn request_error(error: reqwest::Error) -> NotifyError {
    NotifyError::Request(error.without_url())
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_BYTES {
        let mut end = MAX_ERROR_BODY_BYTES;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

/// Outcome of delivering one event to every channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Formats release events per channel and hands them to the transport
pub struct Notifier {
    formatters: FormatterRegistry,
    transport: Arc<dyn NotificationTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            formatters: FormatterRegistry::default(),
            transport,
        }
    }

    pub fn with_formatters(mut self, formatters: FormatterRegistry) -> Self {
        self.formatters = formatters;
        self
    }

    /// Send `event` to each channel in order. Failures are logged and counted,
    /// never returned.
    pub async fn notify(&self, event: &ReleaseEvent, channels: &[NotificationChannel]) -> DispatchReport {
        info!("{}", event.default_message());

        let mut report = DispatchReport::default();

        for channel in channels {
            let formatter = self.formatters.formatter_for(&channel.url);
            let message = formatter.format(event);

            debug!(
                channel = %redact_url(&channel.url),
                formatter = formatter.name(),
                "Sending release notification"
            );

            match self.transport.send(&channel.url, &message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "Error sending notification for {} to {}: {}",
                        event.slug,
                        redact_url(&channel.url),
                        e
                    );
                }
            }
        }

        report
    }
}
