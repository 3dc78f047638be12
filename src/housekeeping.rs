//! Daily mailbox cleanup: a bulk-delete sweep over named folders.
//!
//! Shares the session primitive with the extraction pipeline but is otherwise
//! independent of it. The caller must hold the session lease - the sweep is
//! only safe when no pipeline pass has a session open.

use crate::error::Result;
use crate::session::{MailSession, SessionManager};
use tracing::{debug, info, instrument};

/// Messages marked deleted and expunged per batch.
pub const DELETE_BATCH: usize = 100;

/// Empties each folder in `folders`, expunging in batches.
///
/// Opens one session for the whole sweep and releases it on every exit path.
///
/// # Errors
///
/// Returns the first connection or protocol failure; the next scheduled
/// sweep starts over from the first folder.
#[instrument(name = "housekeeping::sweep_folders", skip_all, fields(folder_count = folders.len()))]
pub async fn sweep_folders(manager: &SessionManager, folders: &[String]) -> Result<()> {
    let mut session = manager.acquire().await?;
    let outcome = sweep(&mut session, folders).await;
    session.release().await;
    outcome
}

async fn sweep(session: &mut MailSession, folders: &[String]) -> Result<()> {
    for folder in folders {
        session.select(folder).await?;
        let uids = session.search_all().await?;

        if uids.is_empty() {
            debug!(folder = %folder, "Folder already empty");
            continue;
        }

        info!(folder = %folder, count = uids.len(), "Cleaning folder");

        for batch in uids.chunks(DELETE_BATCH) {
            session.mark_deleted(batch).await?;
            session.expunge().await?;
            debug!(folder = %folder, batch = batch.len(), "Expunged batch");
        }
    }

    Ok(())
}
