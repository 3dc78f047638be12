//! # inbox-relay
//!
//! Mailbox-polling credential relay: watches an IMAP inbox for verification
//! codes and account-activation links, stores what it finds in Redis with a
//! 48-hour expiry, and serves the results over a small HTTP query endpoint.
//!
//! The service runs three cooperating pieces:
//! - A recurring **poller** that opens a fresh IMAP session, selects unread
//!   candidate messages, extracts credentials oldest-first, and upserts them
//!   into the store.
//! - A daily **housekeeping** sweep that empties the inbox and spam/trash
//!   folders in batches.
//! - An **HTTP endpoint** (`GET /getEmailCodes?email=...`) that reads stored
//!   entries and nothing else.
//!
//! ## Quick Start
//!
//! ```no_run
//! use inbox_relay::{AppConfig, Pipeline, RedisStore, SessionManager};
//! use inbox_relay::store::CredentialStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> inbox_relay::Result<()> {
//! let config = AppConfig::builder()
//!     .user("bot@gmail.com")
//!     .password("app-password")
//!     .imap_host("imap.gmail.com")
//!     .imap_port(993)
//!     .build()?;
//!
//! let store: Arc<dyn CredentialStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);
//! let manager = SessionManager::new(config.mail.clone());
//!
//! let pipeline = Pipeline::new(Arc::new(manager), store, config.retry, config.entry_ttl);
//! let summary = pipeline.run_pass().await?;
//! println!("stored {} entries", summary.written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use
//! [`Error::is_retryable`] to decide whether a failed pass is worth
//! re-running:
//!
//! ```
//! use inbox_relay::Error;
//!
//! fn handle_error(error: &Error) {
//!     if error.is_retryable() {
//!         println!("Transient error, can retry: {}", error);
//!     } else {
//!         println!("Permanent error: {}", error);
//!     }
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing` for instrumentation. Major operations emit spans
//! with structured fields:
//!
//! - `SessionManager::acquire` - IMAP connect and login
//! - `Pipeline::run_pass` - one extraction pass
//! - `housekeeping::sweep_folders` - folder cleanup
//! - `RedisStore::connect` - store connection
//! - `connection::establish_tls` - TLS connection

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod error;
pub mod extract;
pub mod housekeeping;
pub mod http;
pub mod message;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod store;

// Internal modules
mod connection;

// Re-exports for ergonomic API
pub use config::{AppConfig, AppConfigBuilder, MailConfig, RetryConfig, ScheduleConfig, TimeoutConfig};
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use extract::Extraction;
pub use message::ParsedEmail;
pub use pipeline::{PassSummary, Pipeline};
pub use scheduler::SessionLease;
pub use session::{MailSession, Mailbox, MailboxProvider, SessionManager};
pub use store::{CredentialStore, MemoryStore, RedisStore, ENTRY_TTL};
