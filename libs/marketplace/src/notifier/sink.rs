//! Dispatch sinks: the outbound side of the notification engine
//!
//! A sink delivers one message to one destination over one channel. Sinks
//! compose: `ChannelRouter` picks a sink per channel and `RetryingSink`
//! bounds every attempt with a timeout and retries transient failures.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::http::{MailgunEmailSink, TwilioSmsSink};

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Email,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Sms => f.write_str("sms"),
            Channel::Email => f.write_str("email"),
        }
    }
}

/// Dispatch failures; absorbed by the engine, never returned to callers
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("No sink configured for channel {0}")]
    UnsupportedChannel(Channel),

    #[error("No destination available for the recipient")]
    MissingDestination,

    #[error("Sink configuration error: {0}")]
    Configuration(String),
}

impl SinkError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Timeout(_) | SinkError::Transport(_) => true,
            SinkError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Transport(err.to_string())
    }
}

/// Outbound message delivery capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Deliver `message` to `destination` over `channel`
    async fn send(&self, channel: Channel, destination: &str, message: &str)
    -> Result<(), SinkError>;

    /// Sink name for logging
    fn name(&self) -> &'static str;
}

/// Sink that only records the dispatch in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl DispatchSink for LogSink {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        message: &str,
    ) -> Result<(), SinkError> {
        if destination.is_empty() {
            return Err(SinkError::MissingDestination);
        }
        info!(%channel, destination, message, "Notification dispatched");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Picks the sink registered for the message channel
#[derive(Clone, Default)]
pub struct ChannelRouter {
    sms: Option<Arc<dyn DispatchSink>>,
    email: Option<Arc<dyn DispatchSink>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sms(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.sms = Some(sink);
        self
    }

    pub fn with_email(mut self, sink: Arc<dyn DispatchSink>) -> Self {
        self.email = Some(sink);
        self
    }
}

#[async_trait]
impl DispatchSink for ChannelRouter {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        message: &str,
    ) -> Result<(), SinkError> {
        let sink = match channel {
            Channel::Sms => self.sms.as_ref(),
            Channel::Email => self.email.as_ref(),
        }
        .ok_or(SinkError::UnsupportedChannel(channel))?;

        debug!(sink = sink.name(), %channel, "Routing notification");
        sink.send(channel, destination, message).await
    }

    fn name(&self) -> &'static str {
        "router"
    }
}

/// Timeout and retry policy for outbound dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt
    pub timeout: Duration,
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further one
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Decorator adding a per-attempt timeout and bounded retries
#[derive(Clone)]
pub struct RetryingSink {
    inner: Arc<dyn DispatchSink>,
    policy: RetryPolicy,
}

impl RetryingSink {
    pub fn new(inner: Arc<dyn DispatchSink>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl DispatchSink for RetryingSink {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        message: &str,
    ) -> Result<(), SinkError> {
        let mut retry = 0;

        loop {
            let attempt = tokio::time::timeout(
                self.policy.timeout,
                self.inner.send(channel, destination, message),
            )
            .await
            .unwrap_or(Err(SinkError::Timeout(self.policy.timeout)));

            match attempt {
                Ok(()) => {
                    if retry > 0 {
                        debug!(sink = self.inner.name(), retry, "Dispatch succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.backoff(retry);
                    warn!(
                        sink = self.inner.name(),
                        retry,
                        "Dispatch failed: {}, retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Which concrete sink the services wire in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Log,
    Http,
}

/// Sink configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub retry: RetryPolicy,
}

impl SinkConfig {
    /// Create a SinkConfig from environment variables
    ///
    /// # Environment Variables
    /// - `NOTIFY_SINK`: `log` or `http` (default: log)
    /// - `NOTIFY_TIMEOUT_SECONDS`: Per-attempt timeout (default: 10)
    /// - `NOTIFY_MAX_RETRIES`: Retries after the first attempt (default: 3)
    /// - `NOTIFY_RETRY_BACKOFF_MS`: Initial backoff (default: 250)
    pub fn from_env() -> Self {
        let kind = match env::var("NOTIFY_SINK").as_deref() {
            Ok("http") => SinkKind::Http,
            _ => SinkKind::Log,
        };

        let defaults = RetryPolicy::default();
        let timeout = env::var("NOTIFY_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_retries = env::var("NOTIFY_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_retries);

        let initial_backoff = env::var("NOTIFY_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        Self {
            kind,
            retry: RetryPolicy {
                timeout,
                max_retries,
                initial_backoff,
            },
        }
    }

    /// Build the configured sink stack
    ///
    /// `http` requires the Twilio credentials; email is only routed when the
    /// Mailgun credentials are present too.
    pub fn build(&self) -> Result<Arc<dyn DispatchSink>, SinkError> {
        let inner: Arc<dyn DispatchSink> = match self.kind {
            SinkKind::Log => Arc::new(LogSink),
            SinkKind::Http => {
                let mut router = ChannelRouter::new().with_sms(Arc::new(TwilioSmsSink::from_env()?));
                match MailgunEmailSink::from_env() {
                    Ok(mailgun) => router = router.with_email(Arc::new(mailgun)),
                    Err(e) => info!("Email channel disabled: {}", e),
                }
                Arc::new(router)
            }
        };

        info!(sink = inner.name(), "Notification sink configured");
        Ok(Arc::new(RetryingSink::new(inner, self.retry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    /// Fails with a transport error until `succeed_on` attempts were made
    struct FlakySink {
        attempts: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl DispatchSink for FlakySink {
        async fn send(&self, _: Channel, _: &str, _: &str) -> Result<(), SinkError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt >= self.succeed_on {
                Ok(())
            } else {
                Err(SinkError::Transport("connection reset".into()))
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    struct StuckSink;

    #[async_trait]
    impl DispatchSink for StuckSink {
        async fn send(&self, _: Channel, _: &str, _: &str) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let flaky = Arc::new(FlakySink {
            attempts: AtomicU32::new(0),
            succeed_on: 3,
        });
        let sink = RetryingSink::new(flaky.clone(), quick_policy(3));

        assert!(sink.send(Channel::Sms, "+15550100", "hi").await.is_ok());
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let flaky = Arc::new(FlakySink {
            attempts: AtomicU32::new(0),
            succeed_on: u32::MAX,
        });
        let sink = RetryingSink::new(flaky.clone(), quick_policy(2));

        let result = sink.send(Channel::Sms, "+15550100", "hi").await;
        assert!(matches!(result, Err(SinkError::Transport(_))));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let mut mock = MockDispatchSink::new();
        mock.expect_send()
            .times(1)
            .returning(|_, _, _| Err(SinkError::MissingDestination));
        mock.expect_name().return_const("mock");

        let sink = RetryingSink::new(Arc::new(mock), quick_policy(3));
        let result = sink.send(Channel::Sms, "", "hi").await;
        assert!(matches!(result, Err(SinkError::MissingDestination)));
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let sink = RetryingSink::new(Arc::new(StuckSink), quick_policy(0));

        let result = sink.send(Channel::Sms, "+15550100", "hi").await;
        assert!(matches!(result, Err(SinkError::Timeout(_))));
    }

    #[tokio::test]
    async fn router_rejects_unconfigured_channels() {
        let mut sms = MockDispatchSink::new();
        sms.expect_send()
            .withf(|channel, destination, _| *channel == Channel::Sms && destination == "+15550100")
            .times(1)
            .returning(|_, _, _| Ok(()));
        sms.expect_name().return_const("sms");

        let router = ChannelRouter::new().with_sms(Arc::new(sms));

        assert!(router.send(Channel::Sms, "+15550100", "hi").await.is_ok());
        assert!(matches!(
            router.send(Channel::Email, "a@example.com", "hi").await,
            Err(SinkError::UnsupportedChannel(Channel::Email))
        ));
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn rejected_status_decides_transience() {
        let server = SinkError::Rejected {
            status: 503,
            body: String::new(),
        };
        let client = SinkError::Rejected {
            status: 400,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    #[serial]
    fn test_sink_config_from_env() {
        unsafe {
            env::remove_var("NOTIFY_SINK");
            env::set_var("NOTIFY_TIMEOUT_SECONDS", "3");
            env::set_var("NOTIFY_MAX_RETRIES", "oops");
            env::remove_var("NOTIFY_RETRY_BACKOFF_MS");
        }

        let config = SinkConfig::from_env();
        assert_eq!(config.kind, SinkKind::Log);
        assert_eq!(config.retry.timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_millis(250));

        unsafe {
            env::remove_var("NOTIFY_TIMEOUT_SECONDS");
            env::remove_var("NOTIFY_MAX_RETRIES");
        }
    }
}
