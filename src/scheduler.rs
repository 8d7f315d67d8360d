//! Background tasks that keep a `Library` current while the program stays up.
//!
//! - The clock ticker checks the reference clock once a minute and moves the `today` setting when
//!   the date changes, which invalidates the date-dependent queries.
//! - The auto-refresh loop synchronizes after every `auto_refresh_delay_ms` while `auto_refresh`
//!   is on.
//!
//! Both tasks stop when the `Scheduler` is dropped.

use crate::ingest::IngestOutcome;
use crate::library::Library;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info};

pub const CLOCK_TICK: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the clock ticker and the auto-refresh loop. Must be called inside a tokio runtime.
    pub fn start(library: Arc<Library>) -> Self {
        Self::with_tick(library, CLOCK_TICK)
    }

    pub(crate) fn with_tick(library: Arc<Library>, tick: Duration) -> Self {
        info!("Starting the clock ticker and the auto-refresh timer");
        let tasks = vec![
            tokio::spawn(clock_ticker(library.clone(), tick)),
            tokio::spawn(auto_refresh(library)),
        ];
        Self { tasks }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn clock_ticker(library: Arc<Library>, tick: Duration) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let today = library.clock().today();
        if library.settings().today.get() != today {
            debug!("The date is now {today}");
        }
        // Setting an unchanged value does not notify.
        library.settings().today.set(today, false);
    }
}

async fn auto_refresh(library: Arc<Library>) {
    loop {
        let delay = library.settings().auto_refresh_delay_ms.get().max(1);
        sleep(Duration::from_millis(delay)).await;
        if !library.settings().auto_refresh.get() {
            continue;
        }
        info!("Running the scheduled refresh");
        match library.sync(false).await {
            Ok(IngestOutcome::Completed(report)) => {
                info!(
                    "Scheduled refresh completed: {} periods, {} statements",
                    report.periods, report.inserted
                );
            }
            Ok(IngestOutcome::Skipped) => debug!("A refresh is already running"),
            Err(e) => error!("Scheduled refresh failed: {e:#}"),
        }
    }
}
