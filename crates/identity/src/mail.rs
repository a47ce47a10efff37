//! Outbound email transport.
//!
//! Token issuance never depends on delivery: callers commit the token first
//! and dispatch afterwards, reporting a failed dispatch without rolling back.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use leadforge_config::MailConfig;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    Welcome,
    PasswordReset,
    VerifyEmail,
    EmailChange,
    TeamInvite,
}

impl MailTemplate {
    pub const fn as_str(self) -> &'static str {
        match self {
            MailTemplate::Welcome => "welcome",
            MailTemplate::PasswordReset => "password_reset",
            MailTemplate::VerifyEmail => "verify_email",
            MailTemplate::EmailChange => "email_change",
            MailTemplate::TeamInvite => "team_invite",
        }
    }
}

impl fmt::Display for MailTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail provider rejected the message with status {0}")]
    Rejected(u16),
}

impl From<reqwest::Error> for MailError {
    fn from(error: reqwest::Error) -> Self {
        MailError::Transport(error.to_string())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, template: MailTemplate, data: Value) -> Result<(), MailError>;
}

/// Development transport that only logs what would have been sent.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, template: MailTemplate, data: Value) -> Result<(), MailError> {
        // Payloads carry live links; keep them out of the info stream.
        info!(to, %template, "mail dispatch (log transport)");
        debug!(to, %template, %data, "mail payload");
        Ok(())
    }
}

/// Posts `{from, to, template, data}` as JSON to a transactional mail API.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    template: MailTemplate,
    data: Value,
}

impl HttpMailer {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        from: String,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .user_agent("leadforge-backend")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            from,
        })
    }

    /// Build the transport selected by configuration, if any.
    pub fn from_config(config: &MailConfig) -> Result<Option<Self>, MailError> {
        let Some(endpoint) = config.api_url.clone() else {
            return Ok(None);
        };

        Self::new(
            endpoint,
            config.api_key.clone(),
            config.from.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )
        .map(Some)
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, template: MailTemplate, data: Value) -> Result<(), MailError> {
        let mut request = self.http.post(&self.endpoint).json(&OutgoingMail {
            from: &self.from,
            to,
            template,
            data,
        });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }

        debug!(to, %template, "mail accepted by provider");
        Ok(())
    }
}
