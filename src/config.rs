//! Configuration for the inbox-relay service.
//!
//! Use [`AppConfigBuilder`] to create a configuration with sensible defaults,
//! or [`AppConfig::from_env`] to load everything from the environment at startup:
//!
//! ```
//! use inbox_relay::AppConfig;
//!
//! let config = AppConfig::builder()
//!     .user("seller@example.com")
//!     .password("app-password")
//!     .imap_host("imap.example.com")
//!     .imap_port(993)
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::{Error, Result};
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Connection settings for the monitored mailbox.
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials. The `user` field is stored
/// as a validated [`EmailAddress`] type.
#[derive(Clone)]
pub struct MailConfig {
    /// Mailbox address used for login; also the account whose inbox is polled.
    user: EmailAddress,
    /// Mailbox password or app-specific password (protected from accidental logging).
    password: SecretString,
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (993 for IMAPS).
    pub port: u16,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("user", &self.user.as_str())
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl MailConfig {
    /// Returns the mailbox user as a string slice.
    #[must_use]
    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent accidental logging.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timeout configuration for mailbox operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a folder.
    pub select: Duration,
    /// Timeout for server-side search.
    pub search: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            search: Duration::from_secs(10),
            fetch: Duration::from_secs(30),
            logout: Duration::from_secs(5),
        }
    }
}

/// Retry envelope for a pipeline pass.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of attempts for one pass, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Scheduling intervals for the two background tasks.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Interval between pipeline passes.
    pub poll_interval: Duration,
    /// Interval between housekeeping sweeps.
    pub housekeeping_interval: Duration,
    /// Folders the housekeeping sweep empties.
    pub folders: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            housekeeping_interval: Duration::from_secs(86_400),
            folders: vec![
                "INBOX".to_string(),
                "[Gmail]/Spam".to_string(),
                "[Gmail]/Trash".to_string(),
            ],
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Mailbox connection settings.
    pub mail: MailConfig,
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    pub redis_url: String,
    /// Listen address for the query endpoint.
    pub http_listen: String,
    /// Retry envelope for pipeline passes.
    pub retry: RetryConfig,
    /// Scheduling intervals.
    pub schedule: ScheduleConfig,
    /// Time-to-live applied to every stored entry.
    pub entry_ttl: Duration,
}

impl AppConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Loads the configuration from environment variables.
    ///
    /// `EMAIL_USER`, `EMAIL_PASSWORD`, `IMAP_SERVER`, `IMAP_PORT` and
    /// `REDIS_HOST` are required; the process must refuse to start without
    /// them. `REDIS_PORT` defaults to 6379 and `HTTP_LISTEN` to
    /// `0.0.0.0:5000`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a required variable is missing or
    /// malformed, or [`Error::InvalidEmailFormat`] if `EMAIL_USER` is not a
    /// valid address.
    pub fn from_env() -> Result<Self> {
        let user = require_env("EMAIL_USER")?;
        let password = require_env("EMAIL_PASSWORD")?;
        let host = require_env("IMAP_SERVER")?;
        let port: u16 = require_env("IMAP_PORT")?
            .parse()
            .map_err(|_| Error::InvalidConfig {
                message: "IMAP_PORT must be a port number".into(),
            })?;

        let redis_host = require_env("REDIS_HOST")?;
        let redis_port = match std::env::var("REDIS_PORT") {
            Ok(v) => v.parse::<u16>().map_err(|_| Error::InvalidConfig {
                message: "REDIS_PORT must be a port number".into(),
            })?,
            Err(_) => 6379,
        };

        let mut builder = Self::builder()
            .user(user)
            .password(password)
            .imap_host(host)
            .imap_port(port)
            .redis_url(format!("redis://{redis_host}:{redis_port}"));

        if let Ok(listen) = std::env::var("HTTP_LISTEN") {
            builder = builder.http_listen(listen);
        }

        builder.build()
    }
}

fn require_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::InvalidConfig {
            message: format!("{name} is required"),
        }),
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`AppConfig`].
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    user: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    redis_url: Option<String>,
    http_listen: Option<String>,
    timeouts: Option<TimeoutConfig>,
    retry: Option<RetryConfig>,
    schedule: Option<ScheduleConfig>,
    entry_ttl: Option<Duration>,
}

impl AppConfigBuilder {
    /// Sets the mailbox user (required).
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the mailbox password (required).
    ///
    /// For Gmail/Outlook, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname (required).
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port (required).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the Redis connection URL.
    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Sets the listen address for the query endpoint.
    #[must_use]
    pub fn http_listen(mut self, listen: impl Into<String>) -> Self {
        self.http_listen = Some(listen.into());
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the retry envelope for pipeline passes.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the interval between pipeline passes.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.schedule
            .get_or_insert_with(ScheduleConfig::default)
            .poll_interval = interval;
        self
    }

    /// Sets the interval between housekeeping sweeps.
    #[must_use]
    pub fn housekeeping_interval(mut self, interval: Duration) -> Self {
        self.schedule
            .get_or_insert_with(ScheduleConfig::default)
            .housekeeping_interval = interval;
        self
    }

    /// Sets the folders the housekeeping sweep empties.
    #[must_use]
    pub fn folders(mut self, folders: Vec<String>) -> Self {
        self.schedule
            .get_or_insert_with(ScheduleConfig::default)
            .folders = folders;
        self
    }

    /// Sets the time-to-live applied to stored entries.
    #[must_use]
    pub fn entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = Some(ttl);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<AppConfig> {
        let user_raw = self.user.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox user is required".into(),
        })?;
        let user = validate_email(&user_raw)?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "mailbox password is required".into(),
        })?;

        let host = self.imap_host.ok_or_else(|| Error::InvalidConfig {
            message: "IMAP server host is required".into(),
        })?;

        let port = self.imap_port.ok_or_else(|| Error::InvalidConfig {
            message: "IMAP server port is required".into(),
        })?;

        Ok(AppConfig {
            mail: MailConfig {
                user,
                password: SecretString::from(password_raw),
                host,
                port,
                timeouts: self.timeouts.unwrap_or_default(),
            },
            redis_url: self
                .redis_url
                .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            http_listen: self
                .http_listen
                .unwrap_or_else(|| "0.0.0.0:5000".to_string()),
            retry: self.retry.unwrap_or_default(),
            schedule: self.schedule.unwrap_or_default(),
            entry_ttl: self.entry_ttl.unwrap_or(crate::store::ENTRY_TTL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_minimal() {
        let config = AppConfig::builder()
            .user("seller@example.com")
            .password("secret")
            .imap_host("imap.example.com")
            .imap_port(993)
            .build()
            .unwrap();

        assert_eq!(config.mail.user(), "seller@example.com");
        assert_eq!(config.mail.password(), "secret");
        assert_eq!(config.mail.server_address(), "imap.example.com:993");
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_secs(5));
        assert_eq!(config.schedule.poll_interval, Duration::from_secs(30));
        assert_eq!(config.entry_ttl, Duration::from_secs(172_800));
        assert_eq!(config.http_listen, "0.0.0.0:5000");
    }

    #[test]
    fn test_builder_full() {
        let config = AppConfig::builder()
            .user("seller@example.com")
            .password("secret")
            .imap_host("imap.example.com")
            .imap_port(994)
            .redis_url("redis://cache.internal:6380")
            .http_listen("127.0.0.1:8080")
            .retry(RetryConfig {
                attempts: 5,
                delay: Duration::from_secs(1),
            })
            .poll_interval(Duration::from_secs(10))
            .folders(vec!["INBOX".into()])
            .build()
            .unwrap();

        assert_eq!(config.mail.port, 994);
        assert_eq!(config.redis_url, "redis://cache.internal:6380");
        assert_eq!(config.http_listen, "127.0.0.1:8080");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.schedule.poll_interval, Duration::from_secs(10));
        assert_eq!(config.schedule.folders, vec!["INBOX".to_string()]);
    }

    #[test]
    fn test_builder_missing_user() {
        let result = AppConfig::builder()
            .password("secret")
            .imap_host("imap.example.com")
            .imap_port(993)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_missing_password() {
        let result = AppConfig::builder()
            .user("seller@example.com")
            .imap_host("imap.example.com")
            .imap_port(993)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_missing_server() {
        let result = AppConfig::builder()
            .user("seller@example.com")
            .password("secret")
            .imap_port(993)
            .build();
        assert!(result.is_err());

        let result = AppConfig::builder()
            .user("seller@example.com")
            .password("secret")
            .imap_host("imap.example.com")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_invalid_user() {
        let result = AppConfig::builder()
            .user("not-an-address")
            .password("secret")
            .imap_host("imap.example.com")
            .imap_port(993)
            .build();
        assert!(matches!(result, Err(Error::InvalidEmailFormat { .. })));
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = AppConfig::builder()
            .user("seller@example.com")
            .password("super-secret-password")
            .imap_host("imap.example.com")
            .imap_port(993)
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_default_housekeeping_folders() {
        let schedule = ScheduleConfig::default();
        assert_eq!(
            schedule.folders,
            vec!["INBOX", "[Gmail]/Spam", "[Gmail]/Trash"]
        );
        assert_eq!(schedule.housekeeping_interval, Duration::from_secs(86_400));
    }
}
