//! Reload driver
//!
//! Runs converge cycles until told to shut down. Cycles never overlap: the
//! next tick is only awaited once the previous cycle returned, and ticks
//! missed during a long cycle are delayed rather than bunched up.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::service::Orchestrator;

pub struct ReloadDriver {
    orchestrator: Orchestrator,
    automatic: bool,
    interval: Duration,
}

impl ReloadDriver {
    pub fn new(orchestrator: Orchestrator, automatic: bool, interval: Duration) -> Self {
        Self {
            orchestrator,
            automatic,
            interval,
        }
    }

    pub fn from_config(orchestrator: Orchestrator, config: &AgentConfig) -> Self {
        Self::new(orchestrator, config.reload_automatic, config.reload_interval)
    }

    /// Runs the startup cycle, then reloads until `shutdown` turns true
    ///
    /// Returns the number of cycles run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut cycles = 0;

        info!("Running startup converge cycle");
        self.orchestrator.converge().await;
        cycles += 1;

        if !self.automatic {
            info!("Automatic reload disabled, waiting for shutdown");
            wait_for_shutdown(&mut shutdown).await;
            return cycles;
        }

        info!(interval = ?self.interval, "Automatic reload enabled");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup cycle covered it
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Reload interval elapsed");
                    self.orchestrator.converge().await;
                    cycles += 1;
                }
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!(cycles, "Reload driver stopped");
        cycles
    }
}

/// Resolves once the flag is true or every sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // An error means the sender was dropped, which also ends the driver
    let _ = shutdown.wait_for(|stop| *stop).await;
}
