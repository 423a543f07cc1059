//! Notification engine
//!
//! Given a subscriber set and a message, the engine selects the active users
//! whose throttle window has elapsed, dispatches one message per qualifying
//! user and records the dispatch time on the user. Users are processed one
//! by one, each with its own `last_notified` write; there is no transaction
//! spanning the fan-out.
//!
//! The window is claimed in the user store before the message goes out, so
//! fan-outs racing for the same user (two categories of one new product,
//! two restocks) deliver at most one message per window. A failed dispatch
//! releases its claim and the user stays eligible.

pub mod http;
pub mod sink;

use chrono::{DateTime, Duration, Utc};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::User;
use crate::repositories::UserRepository;

pub use http::{MailgunEmailSink, TwilioSmsSink};
pub use sink::{
    Channel, ChannelRouter, DispatchSink, LogSink, RetryPolicy, RetryingSink, SinkConfig,
    SinkError, SinkKind,
};

/// Default throttle window: three hours
pub const DEFAULT_THROTTLE_SECONDS: i64 = 10_800;

/// Who receives a dispatched notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyTarget {
    /// Every notification goes by SMS to one operator number
    Operator { destination: String },
    /// The subscriber's own phone, or their email when no phone is set
    Subscriber,
}

impl Default for NotifyTarget {
    fn default() -> Self {
        NotifyTarget::Operator {
            destination: String::new(),
        }
    }
}

/// Whether callers wait for the fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Spawn the fan-out and return immediately
    #[default]
    Background,
    /// Await the fan-out
    Inline,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub throttle: Duration,
    pub target: NotifyTarget,
    pub delivery: Delivery,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::seconds(DEFAULT_THROTTLE_SECONDS),
            target: NotifyTarget::default(),
            delivery: Delivery::default(),
        }
    }
}

impl NotifierConfig {
    /// Create a NotifierConfig from environment variables
    ///
    /// # Environment Variables
    /// - `NOTIFY_THROTTLE_SECONDS`: Throttle window (default: 10800)
    /// - `NOTIFY_TARGET`: `operator` or `subscriber` (default: operator)
    /// - `NOTIFY_OPERATOR_NUMBER`: Operator destination for `operator`
    /// - `NOTIFY_DELIVERY`: `background` or `inline` (default: background)
    pub fn from_env() -> Self {
        let throttle = env::var("NOTIFY_THROTTLE_SECONDS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|secs| *secs >= 0)
            .unwrap_or(DEFAULT_THROTTLE_SECONDS);

        let target = match env::var("NOTIFY_TARGET").as_deref() {
            Ok("subscriber") => NotifyTarget::Subscriber,
            _ => NotifyTarget::Operator {
                destination: env::var("NOTIFY_OPERATOR_NUMBER").unwrap_or_default(),
            },
        };

        let delivery = match env::var("NOTIFY_DELIVERY").as_deref() {
            Ok("inline") => Delivery::Inline,
            _ => Delivery::Background,
        };

        Self {
            throttle: Duration::seconds(throttle),
            target,
            delivery,
        }
    }

    pub fn inline(mut self) -> Self {
        self.delivery = Delivery::Inline;
        self
    }
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub dispatched: usize,
    pub throttled: usize,
    pub inactive: usize,
    pub failed: usize,
}

/// The notification engine shared by the category registry and the product catalog
#[derive(Clone)]
pub struct Notifier {
    users: Arc<dyn UserRepository>,
    sink: Arc<dyn DispatchSink>,
    config: NotifierConfig,
}

impl Notifier {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sink: Arc<dyn DispatchSink>,
        config: NotifierConfig,
    ) -> Self {
        Self {
            users,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Notify a subscriber set according to the delivery policy
    ///
    /// Never fails: sink errors are logged and absorbed. With
    /// `Delivery::Background` this returns before any message is sent.
    pub async fn notify(&self, subscribers: Vec<User>, message: impl Into<String>) {
        if subscribers.is_empty() {
            debug!("No subscribers to notify");
            return;
        }

        let message = message.into();
        match self.config.delivery {
            Delivery::Inline => {
                self.notify_at(&subscribers, &message, Utc::now()).await;
            }
            Delivery::Background => {
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.notify_at(&subscribers, &message, Utc::now()).await;
                });
            }
        }
    }

    /// Run the fan-out to completion against a fixed clock
    pub async fn notify_at(
        &self,
        subscribers: &[User],
        message: &str,
        now: DateTime<Utc>,
    ) -> NotifyReport {
        let mut report = NotifyReport::default();

        for user in subscribers {
            if !user.is_active {
                debug!(user_id = %user.id, "Skipping inactive subscriber");
                report.inactive += 1;
                continue;
            }

            if !self.qualifies(user, now) {
                debug!(user_id = %user.id, "Notification throttled");
                report.throttled += 1;
                continue;
            }

            let (channel, destination) = match self.route(user) {
                Ok(route) => route,
                Err(e) => {
                    warn!(user_id = %user.id, "Notification not dispatched: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            let previous = match self
                .users
                .claim_notification(user.id, now, now - self.config.throttle)
                .await
            {
                Ok(Some(previous)) => previous,
                Ok(None) => {
                    debug!(user_id = %user.id, "Notification window already claimed");
                    report.throttled += 1;
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %user.id, "Failed to claim notification window: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            if let Err(e) = self.sink.send(channel, &destination, message).await {
                warn!(
                    user_id = %user.id,
                    sink = self.sink.name(),
                    "Notification dispatch failed: {}",
                    e
                );
                report.failed += 1;

                if let Err(e) = self
                    .users
                    .release_notification(user.id, now, previous)
                    .await
                {
                    warn!(user_id = %user.id, "Failed to release notification window: {}", e);
                }
                continue;
            }

            info!(user_id = %user.id, %channel, "Notification dispatched");
            report.dispatched += 1;
        }

        report
    }

    /// A user qualifies once the throttle window since their last
    /// notification has fully elapsed
    pub fn qualifies(&self, user: &User, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(user.last_notified) >= self.config.throttle
    }

    fn route(&self, user: &User) -> Result<(Channel, String), SinkError> {
        match &self.config.target {
            NotifyTarget::Operator { destination } if destination.is_empty() => {
                Err(SinkError::MissingDestination)
            }
            NotifyTarget::Operator { destination } => Ok((Channel::Sms, destination.clone())),
            NotifyTarget::Subscriber => match user.phone.as_deref() {
                Some(phone) if !phone.is_empty() => Ok((Channel::Sms, phone.to_string())),
                _ if !user.email.is_empty() => Ok((Channel::Email, user.email.clone())),
                _ => Err(SinkError::MissingDestination),
            },
        }
    }
}
