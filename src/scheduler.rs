//! Background task scheduling.
//!
//! Two independently scheduled tasks share one resource: the mail session.
//! They coordinate only through a lease (a mutex around "session in use"),
//! never through shared pipeline state. Passes are driven sequentially by a
//! fixed-interval timer and never overlap; a tick that fires while the prior
//! pass still runs waits for the lease.

use crate::config::ScheduleConfig;
use crate::housekeeping;
use crate::pipeline::Pipeline;
use crate::session::SessionManager;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Lease guarding exclusive use of the mail session resource.
pub type SessionLease = Arc<Mutex<()>>;

/// Spawns the recurring extraction poller.
///
/// Each tick takes the session lease, runs one pass inside its retry
/// envelope, and releases the lease. Pass failures are logged by the
/// pipeline and never terminate the task.
pub fn spawn_poller(
    pipeline: Arc<Pipeline>,
    lease: SessionLease,
    schedule: &ScheduleConfig,
) -> JoinHandle<()> {
    let period = schedule.poll_interval;

    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "Mailbox poller started");

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;

            let _session_in_use = lease.lock().await;
            match pipeline.run_with_retry().await {
                Ok(summary) if summary.written > 0 => {
                    info!(
                        candidates = summary.candidates,
                        written = summary.written,
                        "Pass stored new extractions"
                    );
                }
                Ok(_) => debug!("Pass complete, nothing to store"),
                // Already logged with category by the retry envelope.
                Err(_) => {}
            }
        }
    })
}

/// Spawns the recurring housekeeping sweep.
///
/// The first tick after startup is skipped so the sweep never races service
/// boot; afterwards it runs at the configured interval, holding the session
/// lease so it can never run while a pipeline pass holds the session.
pub fn spawn_housekeeping(
    manager: SessionManager,
    lease: SessionLease,
    schedule: &ScheduleConfig,
) -> JoinHandle<()> {
    let period = schedule.housekeeping_interval;
    let folders = schedule.folders.clone();

    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "Housekeeping scheduler started");

        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the first sweep waits a full period.
        tick.tick().await;

        loop {
            tick.tick().await;

            let _session_in_use = lease.lock().await;
            if let Err(e) = housekeeping::sweep_folders(&manager, &folders).await {
                warn!(category = %e.category(), error = %e, "Housekeeping sweep failed");
            }
        }
    })
}
