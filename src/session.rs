//! Mailbox session lifecycle and IMAP operations.
//!
//! The [`SessionManager`] owns the connection settings and opens one fresh
//! authenticated [`MailSession`] per pipeline pass - sessions are never pooled
//! or reused, which trades connection-setup cost for eliminating stale-session
//! bugs. [`MailSession::release`] always attempts a clean logout and swallows
//! logout failures, since the pass has already completed or failed by then.
//!
//! The [`Mailbox`]/[`MailboxProvider`] traits are the seam the pipeline works
//! against, so passes can be driven without a live server in tests.

use crate::config::{MailConfig, TimeoutConfig};
use crate::connection::{self, TlsStream};
use crate::error::{Error, Result};
use async_imap::Session;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, instrument, warn};

/// Type alias for IMAP session over TLS.
pub(crate) type ImapSession = Session<TlsStream>;

/// Folder the extraction pipeline reads from.
pub const INBOX: &str = "INBOX";

/// Server-side search for unread candidate messages: unread AND (verification
/// subject OR activation body).
pub const UNREAD_QUERY: &str =
    r#"UNSEEN (OR (SUBJECT "verification code") (BODY "Activate Your Account"))"#;

/// A mailbox usable by one pipeline pass.
///
/// Implemented by [`MailSession`]; test doubles implement it to drive the
/// pipeline without a server.
#[async_trait]
pub trait Mailbox: Send + std::fmt::Debug {
    /// Selects the inbox and returns the UIDs of unread candidate messages.
    ///
    /// An empty result is success, not an error - the pass ends early.
    async fn select_unread(&mut self) -> Result<Vec<u32>>;

    /// Fetches the full raw bodies for the given UIDs without marking them seen.
    async fn fetch_raw(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>>;

    /// Marks the given UIDs as seen, removing them from later unread searches.
    ///
    /// Called only once the pass has finished writing, so a failed pass
    /// leaves its messages unread for the retry to pick up again.
    async fn mark_seen(&mut self, uids: &[u32]) -> Result<()>;

    /// Closes the session, attempting a clean logout.
    ///
    /// Logout failures are logged and swallowed - the pass is already over.
    async fn release(self: Box<Self>);
}

/// Opens mailbox sessions on demand.
#[async_trait]
pub trait MailboxProvider: Send + Sync {
    /// Opens a fresh authenticated session.
    async fn acquire(&self) -> Result<Box<dyn Mailbox>>;
}

/// Opens one authenticated session per pass using configured credentials.
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: MailConfig,
}

impl SessionManager {
    /// Creates a manager for the given mailbox.
    #[must_use]
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Opens a fresh authenticated session.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP/TLS handshake or the IMAP login fails or
    /// times out.
    #[instrument(
        name = "SessionManager::acquire",
        skip(self),
        fields(user = %self.config.user(), imap_host = %self.config.host)
    )]
    pub async fn acquire(&self) -> Result<MailSession> {
        let target = self.config.server_address();
        let timeouts = self.config.timeouts.clone();

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_tls_connection(&self.config.host, &target),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("TLS connection established");

        let client = async_imap::Client::new(tls_stream);
        let session = tokio::time::timeout(
            timeouts.auth,
            client.login(self.config.user(), self.config.password()),
        )
        .await
        .map_err(|_| Error::AuthTimeout {
            user: self.config.user().to_string(),
            timeout: timeouts.auth,
        })?
        .map_err(|e| Error::ImapLogin {
            user: self.config.user().to_string(),
            source: e.0,
        })?;

        debug!("Authenticated");

        Ok(MailSession { session, timeouts })
    }
}

#[async_trait]
impl MailboxProvider for SessionManager {
    async fn acquire(&self) -> Result<Box<dyn Mailbox>> {
        let session = SessionManager::acquire(self).await?;
        Ok(Box::new(session))
    }
}

/// A single authenticated connection to the mail server.
///
/// Owned exclusively by one pipeline pass or housekeeping sweep; never shared.
pub struct MailSession {
    session: ImapSession,
    timeouts: TimeoutConfig,
}

impl MailSession {
    /// Selects a folder.
    #[instrument(name = "MailSession::select", skip(self), fields(mailbox = %mailbox))]
    pub async fn select(&mut self, mailbox: &str) -> Result<()> {
        tokio::time::timeout(self.timeouts.select, self.session.select(mailbox))
            .await
            .map_err(|_| Error::SelectTimeout {
                mailbox: mailbox.to_string(),
                timeout: self.timeouts.select,
            })?
            .map_err(|source| Error::SelectMailbox {
                mailbox: mailbox.to_string(),
                source,
            })?;

        Ok(())
    }

    /// Selects the inbox and searches for unread candidate messages.
    pub async fn search_unread(&mut self) -> Result<Vec<u32>> {
        self.select(INBOX).await?;
        self.search(UNREAD_QUERY).await
    }

    /// Searches for every message in the currently selected folder.
    pub async fn search_all(&mut self) -> Result<Vec<u32>> {
        self.search("ALL").await
    }

    #[instrument(name = "MailSession::search", skip(self), fields(query = %query))]
    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let uids = tokio::time::timeout(self.timeouts.search, self.session.uid_search(query))
            .await
            .map_err(|_| Error::SearchTimeout {
                timeout: self.timeouts.search,
            })?
            .map_err(|source| Error::ImapSearch { source })?;

        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();

        debug!(uid_count = uids.len(), "Search complete");

        Ok(uids)
    }

    /// Fetches the full raw bodies for the given UIDs.
    ///
    /// Uses `BODY.PEEK[]`, so fetching does not set `\Seen`; messages stay
    /// unread until [`MailSession::mark_seen`] is called.
    #[instrument(name = "MailSession::fetch_raw", skip_all, fields(uid_count = uids.len()))]
    pub async fn fetch_raw(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = join_uid_set(uids);

        let mut stream = tokio::time::timeout(
            self.timeouts.fetch,
            self.session.uid_fetch(&uid_set, "BODY.PEEK[]"),
        )
        .await
        .map_err(|_| Error::FetchTimeout {
            uid_set: uid_set.clone(),
            timeout: self.timeouts.fetch,
        })?
        .map_err(|source| Error::ImapFetch {
            uid_set: uid_set.clone(),
            source,
        })?;

        let mut fetched = Vec::with_capacity(uids.len());
        while let Some(item) = stream.next().await {
            let message = item.map_err(|source| Error::FetchMessage { source })?;
            let uid = message.uid.unwrap_or_default();
            match message.body() {
                Some(body) => fetched.push((uid, body.to_vec())),
                None => debug!(uid, "Message has no body, skipping"),
            }
        }

        debug!(fetched = fetched.len(), "Fetch complete");

        Ok(fetched)
    }

    /// Marks the given UIDs as seen.
    pub async fn mark_seen(&mut self, uids: &[u32]) -> Result<()> {
        self.store_flags(uids, "+FLAGS (\\Seen)").await
    }

    /// Marks the given UIDs as deleted.
    pub async fn mark_deleted(&mut self, uids: &[u32]) -> Result<()> {
        self.store_flags(uids, "+FLAGS (\\Deleted)").await
    }

    #[instrument(
        name = "MailSession::store_flags",
        skip_all,
        fields(flags = %flags, uid_count = uids.len())
    )]
    async fn store_flags(&mut self, uids: &[u32], flags: &str) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }

        let uid_set = join_uid_set(uids);

        let mut updates = self
            .session
            .uid_store(&uid_set, flags)
            .await
            .map_err(|source| Error::ImapStoreFlags {
                uid_set: uid_set.clone(),
                source,
            })?;

        // Drain untagged FETCH responses the server sends back for the flag change.
        while let Some(item) = updates.next().await {
            item.map_err(|source| Error::ImapStoreFlags {
                uid_set: uid_set.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// Permanently removes messages flagged as deleted from the selected folder.
    #[instrument(name = "MailSession::expunge", skip(self))]
    pub async fn expunge(&mut self) -> Result<()> {
        let expunged = self
            .session
            .expunge()
            .await
            .map_err(|source| Error::ImapExpunge { source })?;
        let mut expunged = std::pin::pin!(expunged);

        let mut count: usize = 0;
        while let Some(item) = expunged.next().await {
            item.map_err(|source| Error::ImapExpunge { source })?;
            count += 1;
        }

        debug!(count, "Expunge complete");

        Ok(())
    }

    /// Closes the session, attempting a clean logout.
    ///
    /// Logout failures (including timeouts) are logged and swallowed.
    #[instrument(name = "MailSession::release", skip(self))]
    pub async fn release(mut self) {
        match tokio::time::timeout(self.timeouts.logout, self.session.logout()).await {
            Ok(Ok(())) => debug!("Logged out"),
            Ok(Err(e)) => warn!(error = %e, "Logout failed, dropping connection"),
            Err(_) => warn!(
                timeout_secs = self.timeouts.logout.as_secs(),
                "Logout timed out, dropping connection"
            ),
        }
    }
}

#[async_trait]
impl Mailbox for MailSession {
    async fn select_unread(&mut self) -> Result<Vec<u32>> {
        self.search_unread().await
    }

    async fn fetch_raw(&mut self, uids: &[u32]) -> Result<Vec<(u32, Vec<u8>)>> {
        MailSession::fetch_raw(self, uids).await
    }

    async fn mark_seen(&mut self, uids: &[u32]) -> Result<()> {
        MailSession::mark_seen(self, uids).await
    }

    async fn release(self: Box<Self>) {
        MailSession::release(*self).await;
    }
}

impl std::fmt::Debug for MailSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailSession")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

fn join_uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_query_shape() {
        // The server-side search must combine unread status with both
        // candidate predicates in a single query.
        assert!(UNREAD_QUERY.starts_with("UNSEEN"));
        assert!(UNREAD_QUERY.contains(r#"SUBJECT "verification code""#));
        assert!(UNREAD_QUERY.contains(r#"BODY "Activate Your Account""#));
    }

    #[test]
    fn test_join_uid_set() {
        assert_eq!(join_uid_set(&[3]), "3");
        assert_eq!(join_uid_set(&[1, 5, 9]), "1,5,9");
        assert_eq!(join_uid_set(&[]), "");
    }
}
