//! HTTP dispatch sinks: Twilio for SMS, Mailgun for email

use async_trait::async_trait;
use reqwest::{Client, Response};
use std::env;
use tracing::debug;

use super::sink::{Channel, DispatchSink, SinkError};

const TWILIO_API_URL: &str = "https://api.twilio.com";
const MAILGUN_API_URL: &str = "https://api.mailgun.net";

fn required(name: &str) -> Result<String, SinkError> {
    env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SinkError::Configuration(format!("{} not set", name)))
}

async fn check_status(response: Response) -> Result<(), SinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        body,
    })
}

/// Twilio SMS configuration
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender phone number
    pub from_number: String,
    pub api_url: String,
}

impl TwilioConfig {
    /// Read `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN` and `TWILIO_PHONE_NUMBER`
    pub fn from_env() -> Result<Self, SinkError> {
        Ok(Self {
            account_sid: required("TWILIO_ACCOUNT_SID")?,
            auth_token: required("TWILIO_AUTH_TOKEN")?,
            from_number: required("TWILIO_PHONE_NUMBER")?,
            api_url: TWILIO_API_URL.to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, self.account_sid
        )
    }
}

/// SMS sink backed by the Twilio Messages API
pub struct TwilioSmsSink {
    config: TwilioConfig,
    client: Client,
}

impl TwilioSmsSink {
    pub fn new(config: TwilioConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, SinkError> {
        Ok(Self::new(TwilioConfig::from_env()?))
    }
}

#[async_trait]
impl DispatchSink for TwilioSmsSink {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        message: &str,
    ) -> Result<(), SinkError> {
        if channel != Channel::Sms {
            return Err(SinkError::UnsupportedChannel(channel));
        }
        if destination.is_empty() {
            return Err(SinkError::MissingDestination);
        }

        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", destination),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ])
            .send()
            .await?;

        check_status(response).await?;
        debug!(destination, "SMS accepted by Twilio");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Mailgun email configuration
#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub api_url: String,
}

impl MailgunConfig {
    /// Read `MAILGUN_API_KEY` and `MAILGUN_DOMAIN`
    pub fn from_env() -> Result<Self, SinkError> {
        Ok(Self {
            api_key: required("MAILGUN_API_KEY")?,
            domain: required("MAILGUN_DOMAIN")?,
            api_url: MAILGUN_API_URL.to_string(),
        })
    }

    fn sender(&self) -> String {
        format!("Marketplace <noreply@{}>", self.domain)
    }
}

/// Email sink backed by the Mailgun messages API
pub struct MailgunEmailSink {
    config: MailgunConfig,
    client: Client,
}

impl MailgunEmailSink {
    pub fn new(config: MailgunConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn from_env() -> Result<Self, SinkError> {
        Ok(Self::new(MailgunConfig::from_env()?))
    }
}

#[async_trait]
impl DispatchSink for MailgunEmailSink {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        message: &str,
    ) -> Result<(), SinkError> {
        if channel != Channel::Email {
            return Err(SinkError::UnsupportedChannel(channel));
        }
        if destination.is_empty() {
            return Err(SinkError::MissingDestination);
        }

        let url = format!("{}/v3/{}/messages", self.config.api_url, self.config.domain);
        let sender = self.config.sender();
        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(&self.config.api_key))
            .form(&[
                ("from", sender.as_str()),
                ("to", destination),
                ("subject", "Marketplace update"),
                ("text", message),
            ])
            .send()
            .await?;

        check_status(response).await?;
        debug!(destination, "Email accepted by Mailgun");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mailgun"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn twilio() -> TwilioSmsSink {
        TwilioSmsSink::new(TwilioConfig {
            account_sid: "AC123".into(),
            auth_token: "token".into(),
            from_number: "+15550000".into(),
            api_url: "http://127.0.0.1:9".into(),
        })
    }

    #[test]
    fn twilio_url_contains_account() {
        assert_eq!(
            twilio().config.messages_url(),
            "http://127.0.0.1:9/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn twilio_only_accepts_sms() {
        let result = twilio().send(Channel::Email, "a@example.com", "hi").await;
        assert!(matches!(
            result,
            Err(SinkError::UnsupportedChannel(Channel::Email))
        ));
    }

    #[tokio::test]
    async fn empty_destination_is_rejected_before_any_request() {
        let result = twilio().send(Channel::Sms, "", "hi").await;
        assert!(matches!(result, Err(SinkError::MissingDestination)));
    }

    #[test]
    #[serial]
    fn mailgun_requires_credentials() {
        unsafe {
            env::remove_var("MAILGUN_API_KEY");
            env::set_var("MAILGUN_DOMAIN", "mg.example.com");
        }

        assert!(matches!(
            MailgunConfig::from_env(),
            Err(SinkError::Configuration(_))
        ));

        unsafe {
            env::remove_var("MAILGUN_DOMAIN");
        }
    }
}
