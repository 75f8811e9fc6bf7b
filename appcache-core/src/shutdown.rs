//! ShutdownCoordinator: turns termination signals into an explicit drain/escalate state machine.
//!
//! `Running -> ShutdownRequested -> Draining -> Terminated`. The first signal stops dispatch,
//! the executor then moves to `Draining` while in-flight locks get a termination request.
//! A second signal while shutting down escalates straight to `Terminated`, which in-flight
//! operations treat as "kill now".

use std::sync::Arc;

use log::warn;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    Running,
    ShutdownRequested,
    Draining,
    Terminated,
}

impl ShutdownPhase {
    pub fn is_shutting_down(self) -> bool {
        self != ShutdownPhase::Running
    }
}

/// Shared handle; clones observe and drive the same state.
#[derive(Clone, Debug)]
pub struct ShutdownCoordinator {
    phase: Arc<watch::Sender<ShutdownPhase>>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ShutdownPhase::Running);
        Self { phase: Arc::new(tx) }
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.phase().is_shutting_down()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    /// Records one termination signal and returns the phase it led to.
    pub fn signal(&self) -> ShutdownPhase {
        let mut next = ShutdownPhase::Running;
        self.phase.send_if_modified(|phase| {
            let previous = *phase;
            *phase = match previous {
                ShutdownPhase::Running => ShutdownPhase::ShutdownRequested,
                _ => ShutdownPhase::Terminated,
            };
            next = *phase;
            previous != *phase
        });
        next
    }

    /// `ShutdownRequested -> Draining`. Returns false from any other phase.
    pub fn begin_drain(&self) -> bool {
        self.phase.send_if_modified(|phase| {
            if *phase == ShutdownPhase::ShutdownRequested {
                *phase = ShutdownPhase::Draining;
                true
            } else {
                false
            }
        })
    }

    /// Marks the end of a shutdown. No-op while still running normally.
    pub fn finish(&self) {
        self.phase.send_if_modified(|phase| {
            if phase.is_shutting_down() && *phase != ShutdownPhase::Terminated {
                *phase = ShutdownPhase::Terminated;
                true
            } else {
                false
            }
        });
    }

    /// Routes SIGINT/SIGTERM (and SIGHUP) into [`ShutdownCoordinator::signal`].
    ///
    /// # Errors
    /// Fails if a handler is already installed for this process.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let coordinator = self.clone();
        ctrlc::set_handler(move || match coordinator.signal() {
            ShutdownPhase::ShutdownRequested => {
                warn!("Received termination signal, draining in-flight lock operations...");
            }
            ShutdownPhase::Terminated => {
                warn!("Received second termination signal, killing in-flight lock operations");
            }
            _ => {}
        })
    }
}

/// Resolves once the shared phase reaches `target`. Never resolves if the coordinator is gone.
pub(crate) async fn reached(rx: &mut watch::Receiver<ShutdownPhase>, target: ShutdownPhase) {
    if rx.wait_for(|phase| *phase >= target).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_single_signal_then_drain_then_finish() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.phase(), ShutdownPhase::Running);
        assert!(!coordinator.begin_drain());

        assert_eq!(coordinator.signal(), ShutdownPhase::ShutdownRequested);
        assert!(coordinator.is_shutting_down());
        assert!(coordinator.begin_drain());
        assert_eq!(coordinator.phase(), ShutdownPhase::Draining);
        assert!(!coordinator.begin_drain());

        coordinator.finish();
        assert_eq!(coordinator.phase(), ShutdownPhase::Terminated);
    }

    #[test]
    fn test_second_signal_escalates() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.signal();
        coordinator.begin_drain();
        assert_eq!(coordinator.signal(), ShutdownPhase::Terminated);
        assert_eq!(coordinator.signal(), ShutdownPhase::Terminated);

        let early = ShutdownCoordinator::new();
        early.signal();
        assert_eq!(early.signal(), ShutdownPhase::Terminated);
    }

    #[test]
    fn test_finish_without_signal_keeps_running() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.finish();
        assert_eq!(coordinator.phase(), ShutdownPhase::Running);
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        let clone = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            clone.signal();
            clone.signal();
        });

        tokio::time::timeout(Duration::from_secs(2), reached(&mut rx, ShutdownPhase::Terminated))
            .await
            .expect("escalation observed");
    }
}
