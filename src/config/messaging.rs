//! Messaging configuration types.

use reqwest::Url;
use serde::Deserialize;

use super::ConfigError;

/// Messaging type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// AMQP/RabbitMQ messaging.
    Amqp,
    /// In-process channel (standalone mode, tests).
    Channel,
}

/// In-process channel when compiled in, so an unconfigured standalone
/// build starts without a broker. Broker-only builds default to AMQP.
impl Default for MessagingType {
    fn default() -> Self {
        if cfg!(feature = "channel") {
            MessagingType::Channel
        } else {
            MessagingType::Amqp
        }
    }
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// AMQP-specific configuration.
    pub amqp: AmqpConfig,
}

/// AMQP-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpConfig {
    /// Full connection URL. Overrides the individual connection fields when set.
    pub url: Option<String>,
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Broker user.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Virtual host.
    pub vhost: String,
    /// Durable queue carrying order events.
    pub queue: String,
    /// Consumer prefetch. 1 keeps a single message in flight.
    pub prefetch: u16,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: "orders".to_string(),
            prefetch: 1,
        }
    }
}

impl AmqpConfig {
    /// Connection URL for lapin.
    ///
    /// Credentials are percent-encoded, so passwords may contain `@`, `/`,
    /// `:` or `#`.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let vhost = if self.vhost == "/" {
            "%2f".to_string()
        } else {
            self.vhost.trim_start_matches('/').to_string()
        };
        let base = format!("amqp://{}:{}/{}", self.host, self.port, vhost);
        let url = with_credentials(
            &base,
            "messaging.amqp",
            &self.username,
            Some(&self.password),
        )?;
        Ok(url.to_string())
    }

    /// Connection URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        match &self.url {
            Some(_) => "<configured url>".to_string(),
            None => format!(
                "amqp://{}:***@{}:{}/{}",
                self.username, self.host, self.port, self.vhost
            ),
        }
    }
}

/// Parse `base` and attach percent-encoded userinfo.
pub(crate) fn with_credentials(
    base: &str,
    name: &'static str,
    username: &str,
    password: Option<&str>,
) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue { name, value: reason };

    let mut url = Url::parse(base).map_err(|e| invalid(format!("{}: {}", base, e)))?;
    url.set_username(username)
        .map_err(|_| invalid(format!("{}: cannot carry a username", base)))?;
    url.set_password(password)
        .map_err(|_| invalid(format!("{}: cannot carry a password", base)))?;
    Ok(url)
}
