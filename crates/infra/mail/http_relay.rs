use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::domain::{
    repositories::mail_transport::MailTransport, value_objects::outbound_mail::OutboundMail,
};

#[derive(Debug, Clone)]
pub struct HttpMailRelayConfig {
    pub endpoint: Url,
    pub token: Option<String>,
    pub from: String,
    pub timeout: Duration,
}

/// Hands messages to an HTTP mail relay as JSON
/// (`{from, to, subject, text, html}`), authenticating with a bearer token.
pub struct HttpMailRelay {
    config: HttpMailRelayConfig,
    client: Client,
}

impl HttpMailRelay {
    pub fn new(config: HttpMailRelayConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl MailTransport for HttpMailRelay {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        let mut request = self.client.post(self.config.endpoint.clone()).json(&json!({
            "from": self.config.from,
            "to": mail.to,
            "subject": mail.subject,
            "text": mail.text,
            "html": mail.html,
        }));

        if let Some(token) = self.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(sanitize_reqwest_error)?;
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(anyhow!("mail relay authentication failed: {status}"));
        }

        Err(anyhow!("mail relay rejected message: {status}"))
    }

    fn transport_name(&self) -> &'static str {
        "http_relay"
    }
}

// Do not leak the relay URL (it may embed credentials) into reminder records.
fn sanitize_reqwest_error(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        return anyhow!("mail relay request timed out");
    }
    if error.is_connect() {
        return anyhow!("mail relay connection failed");
    }
    anyhow!("mail relay request failed")
}
