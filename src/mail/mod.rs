//! Outbound email.
//!
//! Delivery is an external collaborator behind the [`Mailer`] trait; the
//! crate ships a tracing-backed implementation for development and tests.
//! Sends run on a spawned task under a bounded retry policy so a slow or
//! flapping SMTP server can never block a request-serving task.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound delivery contract. `template` names the message body; `payload`
/// carries its dynamic data.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        payload: serde_json::Value,
    ) -> Result<(), MailError>;
}

/// Bounded retry: a fixed attempt cap with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Attempt delivery up to `policy.max_attempts` times. Exhausting the
/// attempts surfaces the last real error instead of swallowing it.
pub async fn deliver_with_retry(
    mailer: &dyn Mailer,
    recipient: &str,
    template: &str,
    payload: serde_json::Value,
    policy: RetryPolicy,
) -> Result<(), MailError> {
    let mut last_err = MailError::Delivery("no attempts were made".to_string());
    for attempt in 1..=policy.max_attempts {
        match mailer.send(recipient, template, payload.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(template, attempt, error = %e, "Email delivery attempt failed");
                last_err = e;
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(last_err)
}

/// Fire-and-forget delivery on its own task. Failures are logged; the
/// originating request has already been answered.
pub fn send_in_background(
    mailer: Arc<dyn Mailer>,
    recipient: String,
    template: &'static str,
    payload: serde_json::Value,
) {
    tokio::spawn(async move {
        let policy = RetryPolicy::default();
        if let Err(e) =
            deliver_with_retry(mailer.as_ref(), &recipient, template, payload, policy).await
        {
            tracing::error!(template, error = %e, "Background email delivery gave up");
        }
    });
}

/// Development mailer: logs the dispatch instead of speaking SMTP. Token
/// payloads stay out of the log line.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        recipient: &str,
        template: &str,
        _payload: serde_json::Value,
    ) -> Result<(), MailError> {
        tracing::info!(recipient, template, "Email dispatched");
        Ok(())
    }
}
