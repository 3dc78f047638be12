//! The extraction pipeline and its retry envelope.
//!
//! One pass runs select → load → extract → write against a fresh session and
//! releases the session on every exit path, including failure exits. Failure
//! at any stage aborts the current pass (not the process); the retry envelope
//! re-runs the entire pass with a fresh connection up to the attempt budget.
//! Candidates are marked seen only after all writes succeed, so an aborted
//! pass never loses a match: the retry finds the same messages still unread.

use crate::config::RetryConfig;
use crate::error::Result;
use crate::extract;
use crate::message;
use crate::session::{Mailbox, MailboxProvider};
use crate::store::CredentialStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Counters for one completed pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Unread candidate messages the selector returned.
    pub candidates: usize,
    /// Store entries written.
    pub written: usize,
}

/// Runs extraction passes against a mailbox provider and a store.
pub struct Pipeline {
    provider: Arc<dyn MailboxProvider>,
    store: Arc<dyn CredentialStore>,
    retry: RetryConfig,
    entry_ttl: Duration,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        provider: Arc<dyn MailboxProvider>,
        store: Arc<dyn CredentialStore>,
        retry: RetryConfig,
        entry_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            retry,
            entry_ttl,
        }
    }

    /// Runs one pass: acquire, select, load, extract, write, mark seen,
    /// release.
    ///
    /// The session is released on every exit path. Messages are marked seen
    /// only after every store write succeeds, so a failed pass leaves its
    /// messages unread and the retried pass re-fetches and re-writes them;
    /// writes are idempotent upserts.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; per-message parse and extraction
    /// failures are isolated and never abort the batch.
    #[instrument(name = "Pipeline::run_pass", skip(self))]
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let mut session = self.provider.acquire().await?;
        let outcome = self.run_stages(session.as_mut()).await;
        session.release().await;
        outcome
    }

    /// Runs one pass inside the retry envelope.
    ///
    /// Retryable failures re-run the entire pass (fresh connection) up to
    /// the attempt budget, with a fixed delay between attempts. Exhaustion
    /// is logged; the caller (the scheduler) simply proceeds to the next
    /// scheduled pass.
    ///
    /// # Errors
    ///
    /// Returns the final failure after the attempt budget is exhausted.
    pub async fn run_with_retry(&self) -> Result<PassSummary> {
        let mut attempt = 1;
        loop {
            match self.run_pass().await {
                Ok(summary) => {
                    debug!(attempt, ?summary, "Pass complete");
                    return Ok(summary);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    warn!(
                        attempt,
                        category = %e.category(),
                        error = %e,
                        "Pass failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        attempt,
                        category = %e.category(),
                        error = %e,
                        "Pass failed, giving up until next scheduled pass"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn run_stages(&self, session: &mut dyn Mailbox) -> Result<PassSummary> {
        let uids = session.select_unread().await?;
        if uids.is_empty() {
            debug!("No candidate messages");
            return Ok(PassSummary::default());
        }

        let fetched = session.fetch_raw(&uids).await?;
        let messages = message::build_ordered(fetched);

        let mut written = 0;
        for msg in &messages {
            let Some(extraction) = extract::extract(msg) else {
                continue;
            };

            let key = extraction.store_key();
            self.store
                .put(&key, extraction.value(), self.entry_ttl)
                .await?;

            info!(kind = extraction.kind(), key = %key, "Stored extraction");
            written += 1;
        }

        // Only now do the candidates leave the unread set; a failure above
        // keeps them eligible for the retried pass.
        session.mark_seen(&uids).await?;

        Ok(PassSummary {
            candidates: uids.len(),
            written,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("retry", &self.retry)
            .field("entry_ttl", &self.entry_ttl)
            .finish_non_exhaustive()
    }
}
