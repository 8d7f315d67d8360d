use crate::commands::Out;
use crate::library::Library;
use crate::scheduler::Scheduler;
use crate::Result;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Runs the clock ticker and the auto-refresh timer until Ctrl-C. `auto_refresh` turns automatic
/// refresh on first and `every` sets its delay in minutes.
pub async fn watch(library: Arc<Library>, auto_refresh: bool, every: Option<u64>) -> Result<Out<()>> {
    let settings = library.settings();
    if auto_refresh {
        settings.auto_refresh.set(true, false);
    }
    if let Some(minutes) = every {
        settings
            .auto_refresh_delay_ms
            .set(minutes.max(1).saturating_mul(60_000), false);
    }
    if settings.auto_refresh.get() {
        info!(
            "Refreshing every {} minutes, press Ctrl-C to stop",
            settings.auto_refresh_delay_ms.get() / 60_000
        );
    } else {
        info!("Automatic refresh is off, press Ctrl-C to stop");
    }

    let scheduler = Scheduler::start(Arc::clone(&library));
    tokio::signal::ctrl_c()
        .await
        .context("Unable to listen for Ctrl-C")?;
    drop(scheduler);
    Ok("Stopped watching".into())
}
