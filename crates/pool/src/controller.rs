//! Desired-state holder shared between callers and the run loop

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::PoolError;

/// Target the run loop reconciles toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    pub replicas: usize,
    pub active: bool,
}

/// Single source of truth for how many replicas should be running.
///
/// Every change raises the rescale signal. The signal is stored as a permit
/// when the loop is not currently waiting, so a change made mid-step is seen
/// at the next wait. `scale` never reactivates a pool that was stopped or
/// drained: it only changes the target count.
#[derive(Debug)]
pub struct ScaleController {
    desired: Mutex<DesiredState>,
    started: AtomicBool,
    wake: Notify,
}

impl ScaleController {
    pub fn new(replicas: usize) -> Self {
        Self {
            desired: Mutex::new(DesiredState {
                replicas,
                active: true,
            }),
            started: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Snapshot of the desired state
    pub fn desired(&self) -> DesiredState {
        *self.desired.lock()
    }

    /// Change the desired replica count
    pub fn scale(&self, replicas: i64) -> Result<(), PoolError> {
        let replicas = usize::try_from(replicas).map_err(|_| {
            PoolError::InvalidArgument(format!(
                "replica count must be >= 0, got {replicas}; use stop() to pause the pool"
            ))
        })?;

        let active = {
            let mut desired = self.desired.lock();
            desired.replicas = replicas;
            desired.active
        };

        if active {
            debug!(replicas, "Scale requested");
        } else {
            warn!(replicas, "Scale requested on an inactive pool; no workers will be launched");
        }
        self.wake.notify_one();
        Ok(())
    }

    /// Deactivate the pool and cancel every running worker.
    ///
    /// Idempotent. Before the run loop has started the state change is still
    /// recorded and [`PoolError::NotRunning`] is returned as advice.
    pub fn stop(&self) -> Result<(), PoolError> {
        {
            let mut desired = self.desired.lock();
            desired.active = false;
            desired.replicas = 0;
        }
        debug!("Stop requested");
        self.wake.notify_one();
        self.ensure_started()
    }

    /// Deactivate the pool without cancelling anything.
    ///
    /// Running workers finish their current execution and are not replaced.
    pub fn drain(&self) -> Result<(), PoolError> {
        self.desired.lock().active = false;
        debug!("Drain requested");
        self.wake.notify_one();
        self.ensure_started()
    }

    pub fn is_active(&self) -> bool {
        self.desired.lock().active
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    /// Future resolving on the next state change (or a pending one)
    pub(crate) fn changed(&self) -> Notified<'_> {
        self.wake.notified()
    }

    fn ensure_started(&self) -> Result<(), PoolError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(PoolError::NotRunning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_initial_state_is_active() {
        let controller = ScaleController::new(3);
        assert_eq!(
            controller.desired(),
            DesiredState {
                replicas: 3,
                active: true
            }
        );
    }

    #[test]
    fn test_negative_scale_is_rejected_without_side_effect() {
        let controller = ScaleController::new(2);
        let err = controller.scale(-1).unwrap_err();
        assert!(matches!(err, PoolError::InvalidArgument(_)));
        assert_eq!(controller.desired().replicas, 2);
    }

    #[test]
    fn test_scale_does_not_reactivate_stopped_pool() {
        let controller = ScaleController::new(2);
        controller.mark_started();
        controller.stop().unwrap();
        controller.scale(4).unwrap();

        let desired = controller.desired();
        assert_eq!(desired.replicas, 4);
        assert!(!desired.active);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let controller = ScaleController::new(5);
        controller.mark_started();
        controller.stop().unwrap();
        let once = controller.desired();
        controller.stop().unwrap();
        assert_eq!(controller.desired(), once);
        assert_eq!(
            once,
            DesiredState {
                replicas: 0,
                active: false
            }
        );
    }

    #[test]
    fn test_stop_before_start_is_advisory() {
        let controller = ScaleController::new(1);
        assert!(matches!(controller.stop(), Err(PoolError::NotRunning)));
        assert!(!controller.is_active());
    }

    #[test]
    fn test_drain_keeps_replica_count() {
        let controller = ScaleController::new(3);
        controller.mark_started();
        controller.drain().unwrap();
        assert_eq!(
            controller.desired(),
            DesiredState {
                replicas: 3,
                active: false
            }
        );
    }

    #[tokio::test]
    async fn test_signal_raised_before_wait_is_not_lost() {
        let controller = ScaleController::new(1);
        controller.scale(2).unwrap();
        tokio::time::timeout(Duration::from_secs(1), controller.changed())
            .await
            .expect("pending scale signal should wake the waiter");
    }
}
