//! Integration tests for inbox-relay.
//!
//! These tests require a real IMAP server and are disabled by default.
//! To run them:
//!
//! ```bash
//! # Set environment variables
//! export INBOX_RELAY_TEST_EMAIL="your@email.com"
//! export INBOX_RELAY_TEST_PASSWORD="your-app-password"
//! export INBOX_RELAY_TEST_IMAP_SERVER="imap.gmail.com"
//! export INBOX_RELAY_TEST_IMAP_PORT="993"
//!
//! # Run with the integration-tests feature
//! cargo test --features integration-tests -- --ignored
//! ```

use inbox_relay::{AppConfig, MailboxProvider, SessionManager};
use std::env;

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_config() -> Option<AppConfig> {
    dotenvy::dotenv().ok();
    let email = env::var("INBOX_RELAY_TEST_EMAIL").ok()?;
    let password = env::var("INBOX_RELAY_TEST_PASSWORD").ok()?;
    let host = env::var("INBOX_RELAY_TEST_IMAP_SERVER").ok()?;
    let port: u16 = env::var("INBOX_RELAY_TEST_IMAP_PORT").ok()?.parse().ok()?;

    AppConfig::builder()
        .user(email)
        .password(password)
        .imap_host(host)
        .imap_port(port)
        .build()
        .ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_acquire_and_release() {
    let config = get_test_config().expect("Test config from environment variables");
    let manager = SessionManager::new(config.mail);

    let session = manager.acquire().await.expect("Failed to connect");
    session.release().await;
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_search_unread_candidates() {
    let config = get_test_config().expect("Test config from environment variables");
    let manager = SessionManager::new(config.mail);

    let mut session = manager.acquire().await.expect("Failed to connect");
    let uids = session.search_unread().await.expect("Search failed");

    // UIDs come back sorted, oldest first.
    assert!(uids.windows(2).all(|w| w[0] < w[1]));

    session.release().await;
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_fetch_returns_bodies_for_found_uids() {
    let config = get_test_config().expect("Test config from environment variables");
    let manager = SessionManager::new(config.mail);

    let mut session = manager.acquire().await.expect("Failed to connect");
    let uids = session.search_unread().await.expect("Search failed");

    if uids.is_empty() {
        println!("No unread candidates (expected on an empty test inbox)");
    } else {
        let fetched = session.fetch_raw(&uids).await.expect("Fetch failed");
        assert!(fetched.iter().all(|(_, body)| !body.is_empty()));
    }

    session.release().await;
}

#[tokio::test]
#[ignore = "requires intentionally wrong credentials"]
async fn test_invalid_credentials() {
    let config = AppConfig::builder()
        .user("test@gmail.com")
        .password("wrong-password")
        .imap_host("imap.gmail.com")
        .imap_port(993)
        .build()
        .expect("valid config structure");

    let result = MailboxProvider::acquire(&SessionManager::new(config.mail)).await;

    assert!(result.is_err());
    let err = result.unwrap_err();

    // Authentication errors are retryable (could be temporary server issue)
    println!("Connection error: {}", err);
    println!("Category: {}", err.category());
}
