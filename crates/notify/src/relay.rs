use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use leadrobin_core::{NotifierConfig, NotifierMode};

use crate::notifier::{AssignmentNotice, DispatchError, LeadNotifier, NoopNotifier};

/// Bounded exponential backoff for relay deliveries. Retries are capped low
/// because a slow notice is worse than a skipped one; the notification log
/// records the failure either way.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Delivers assignment notices through an HTTP mail relay. One POST per
/// notice; the relay owns templating, batching and provider fallback.
pub struct HttpRelayNotifier {
    client: reqwest::Client,
    endpoint: String,
    from_address: String,
    api_token: Option<SecretString>,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    lead_id: &'a str,
    seller_id: &'a str,
    accept_by: String,
}

impl HttpRelayNotifier {
    pub fn from_config(config: &NotifierConfig) -> Result<Self, DispatchError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| DispatchError::Misconfigured("relay endpoint is not set".to_string()))?
            .to_string();
        let from_address = config
            .from_address
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                DispatchError::Misconfigured("relay from address is not set".to_string())
            })?
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| DispatchError::Misconfigured(error.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            from_address,
            api_token: config.api_token.clone(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    async fn try_send(&self, notice: &AssignmentNotice) -> Result<(), DispatchError> {
        let message = RelayMessage {
            from: &self.from_address,
            to: &notice.email_to,
            subject: &notice.subject,
            text: &notice.body,
            lead_id: &notice.lead_id.0,
            seller_id: &notice.seller_id.0,
            accept_by: notice.accept_by.to_rfc3339(),
        };

        let mut request = self.client.post(&self.endpoint).json(&message);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| DispatchError::Unreachable(error.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(DispatchError::Unreachable(relay_failure(status, &detail)))
        } else {
            Err(DispatchError::Rejected(relay_failure(status, &detail)))
        }
    }
}

#[async_trait]
impl LeadNotifier for HttpRelayNotifier {
    async fn deliver(&self, notice: &AssignmentNotice) -> Result<(), DispatchError> {
        let mut last_error = DispatchError::Unreachable("relay never attempted".to_string());

        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.backoff(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match self.try_send(notice).await {
                Ok(()) => {
                    info!(
                        lead_id = %notice.lead_id,
                        seller_id = %notice.seller_id,
                        attempt,
                        "assignment notice delivered"
                    );
                    return Ok(());
                }
                // A rejection will not heal on retry.
                Err(error @ DispatchError::Rejected(_)) => {
                    warn!(lead_id = %notice.lead_id, error = %error, "relay rejected notice");
                    return Err(error);
                }
                Err(error) => {
                    warn!(
                        lead_id = %notice.lead_id,
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %error,
                        "assignment notice delivery failed"
                    );
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}

/// Picks the notifier implementation for the configured mode.
pub fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn LeadNotifier>, DispatchError> {
    match config.mode {
        NotifierMode::Noop => Ok(Arc::new(NoopNotifier)),
        NotifierMode::Http => Ok(Arc::new(HttpRelayNotifier::from_config(config)?)),
    }
}

fn relay_failure(status: StatusCode, detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        format!("relay returned {status}")
    } else {
        format!("relay returned {status}: {detail}")
    }
}
