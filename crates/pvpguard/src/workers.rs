//! Background sweep loops.

use pvpguard_combat::SweepOutcome;
use pvpguard_sweep::{SweepConfig, SweepScheduler};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::PvpGuard;

/// Handles to the running sweep loops of one [`PvpGuard`].
#[must_use = "dropping GuardWorkers leaves the loops running until the guard shuts down"]
pub struct GuardWorkers {
    guard: PvpGuard,
    loops: Vec<(&'static str, JoinHandle<u64>)>,
}

impl PvpGuard {
    /// Starts the cooldown/tag sweep and the session sweep on Tokio.
    ///
    /// Periods come from `config.sweeps`; a period of 0 starts the loop but
    /// it never sweeps.
    ///
    /// # Panics
    /// Outside a Tokio runtime.
    pub fn spawn_workers(&self) -> GuardWorkers {
        let sweeps = &self.inner.config.sweeps;

        let cooldowns = {
            let guard = self.clone();
            spawn_loop("cooldowns", sweeps.cooldowns.clone(), self.inner.shutdown.subscribe(), move || {
                let now = guard.now();
                guard.sweep_cooldowns(now);
                guard.sweep_tags(now);
            })
        };

        let sessions = {
            let guard = self.clone();
            spawn_loop("sessions", sweeps.sessions.clone(), self.inner.shutdown.subscribe(), move || {
                let now = guard.now();
                guard.sweep_sessions(now);
            })
        };

        GuardWorkers {
            guard: self.clone(),
            loops: vec![("cooldowns", cooldowns), ("sessions", sessions)],
        }
    }
}

impl GuardWorkers {
    /// Number of loops started.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Stops every loop, waits for them, then flushes open sessions and
    /// waits for queued consent records to be saved.
    pub async fn shutdown(self) -> SweepOutcome {
        self.guard.inner.shutdown.send_replace(true);

        for (name, handle) in self.loops {
            match handle.await {
                Ok(sweeps) => tracing::debug!(sweep = name, sweeps, "sweep loop joined"),
                Err(e) => tracing::warn!(sweep = name, error = %e, "sweep loop panicked"),
            }
        }

        let now = self.guard.now();
        let outcome = self.guard.shutdown(now);
        self.guard.flush_records().await;
        outcome
    }
}

impl std::fmt::Debug for GuardWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.loops.iter().map(|(name, _)| *name).collect();
        f.debug_struct("GuardWorkers").field("loops", &names).finish()
    }
}

fn spawn_loop<F>(
    name: &'static str,
    config: SweepConfig,
    shutdown: watch::Receiver<bool>,
    body: F,
) -> JoinHandle<u64>
where
    F: FnMut() + Send + 'static,
{
    let scheduler = SweepScheduler::new(name, config);
    tokio::spawn(sweep_loop(scheduler, shutdown, body))
}

/// Runs `body` every period until shutdown. Returns the number of sweeps.
async fn sweep_loop<F: FnMut()>(
    mut scheduler: SweepScheduler,
    mut shutdown: watch::Receiver<bool>,
    mut body: F,
) -> u64 {
    if *shutdown.borrow_and_update() {
        return 0;
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = scheduler.wait_for_sweep() => {
                body();
                scheduler.record_sweep_end();
            }
        }
    }

    tracing::debug!(sweep = scheduler.name(), sweeps = scheduler.sweep_count(), "sweep loop stopped");
    scheduler.sweep_count()
}
