//! Periodic full reload of the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::manager::ServicesManager;
use crate::shutdown::ShutdownSignal;

/// Reloads the manager from its DAO on a fixed interval.
///
/// A failed reload is logged and the previous snapshot stays in service
/// until the next tick.
#[derive(Debug)]
pub struct ReloadScheduler {
    manager: Arc<ServicesManager>,
    interval: Duration,
}

impl ReloadScheduler {
    /// Create a scheduler. The first reload happens one `interval` after start.
    pub fn new(manager: Arc<ServicesManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// The reload interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run on a new task until shutdown.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Reload on every tick until shutdown is triggered.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "periodic service reload started");
        let mut stop = shutdown.recv();
        loop {
            tokio::select! {
                () = &mut stop => break,
                _ = ticker.tick() => {}
            }
            match self.manager.reload().await {
                Ok(count) => debug!(count, "periodic service reload complete"),
                Err(e) => warn!(error = %e, "periodic service reload failed"),
            }
        }
        info!("periodic service reload stopped");
    }
}
