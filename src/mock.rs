//! Recording workload manager for tests.
//!
//! Records every launch and termination with the (tokio) time it happened,
//! so timing properties can be checked under a paused clock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::WorkloadError;
use crate::workload::{WorkloadDescriptor, WorkloadManager};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkloadEvent {
    Launched {
        descriptor: WorkloadDescriptor,
        at: Instant,
    },
    Terminated {
        at: Instant,
    },
}

impl WorkloadEvent {
    pub fn at(&self) -> Instant {
        match self {
            Self::Launched { at, .. } | Self::Terminated { at } => *at,
        }
    }
}

#[derive(Default)]
pub struct RecordingWorkloads {
    events: Mutex<Vec<WorkloadEvent>>,
    fail_launch: AtomicBool,
    fail_terminate: AtomicBool,
    changed: Notify,
}

impl RecordingWorkloads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent launches fail (after being recorded).
    pub fn fail_launches(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent terminations fail (after being recorded).
    pub fn fail_terminations(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<WorkloadEvent> {
        self.lock().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, WorkloadEvent::Launched { .. }))
            .count()
    }

    pub fn terminate_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, WorkloadEvent::Terminated { .. }))
            .count()
    }

    /// Wait until at least `count` events have been recorded.
    pub async fn wait_for_events(&self, count: usize) {
        loop {
            let changed = self.changed.notified();
            if self.lock().len() >= count {
                return;
            }
            changed.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<WorkloadEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: WorkloadEvent) {
        self.lock().push(event);
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl WorkloadManager for RecordingWorkloads {
    async fn launch(&self, descriptor: &WorkloadDescriptor) -> Result<String, WorkloadError> {
        self.record(WorkloadEvent::Launched {
            descriptor: descriptor.clone(),
            at: Instant::now(),
        });
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(WorkloadError::Rejected("launch refused".into()));
        }
        Ok(String::new())
    }

    async fn terminate_all(&self) -> Result<(), WorkloadError> {
        self.record(WorkloadEvent::Terminated { at: Instant::now() });
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(WorkloadError::Rejected("terminate refused".into()));
        }
        Ok(())
    }
}
