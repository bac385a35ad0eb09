use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

/// Delivery side of the notification fan-out. Implementations report whether
/// the message actually went out; the dispatch worker only stamps
/// `email_sent` when they return true.
#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool;
}

/// Posts messages as JSON to an HTTP email gateway.
pub struct WebhookMailer {
    client: Client,
    gateway_url: String,
    token: Option<String>,
    app_name: String,
}

impl WebhookMailer {
    pub fn new(
        gateway_url: impl Into<String>,
        token: Option<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            gateway_url: gateway_url.into(),
            token,
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl EmailSender for WebhookMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        let payload = json!({
            "from": self.app_name,
            "to": to,
            "subject": subject,
            "body": body,
        });

        let mut request = self.client.post(&self.gateway_url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                warn!(%status, to, "email gateway rejected message");
                false
            }
            Err(err) => {
                warn!(error = %err, to, "email gateway request failed");
                false
            }
        }
    }
}

/// Stands in when no gateway is configured. Recipients still get the
/// in-app notification; the email just never leaves the process.
#[derive(Default)]
pub struct NoopMailer;

#[async_trait]
impl EmailSender for NoopMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> bool {
        info!(to, subject, "email gateway not configured; skipping send");
        false
    }
}
