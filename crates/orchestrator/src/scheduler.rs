//! Stage timers
//!
//! Each stage of a session is armed as its own task. The scheduler hands back
//! a [`StageHandle`] per task so the owning session can revoke everything that
//! has not fired yet.

use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::trace;

use redops_common::{RedopsError, RedopsResult};

/// Work run when a timer elapses.
pub type StageTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Timer facility used to arm pipeline stages.
pub trait StageScheduler: Send + Sync {
    /// Run `task` once `fire_at` has passed.
    ///
    /// Failing to arm is reported as [`RedopsError::Scheduling`].
    fn schedule(&self, fire_at: Instant, task: StageTask) -> RedopsResult<StageHandle>;
}

/// Revocable handle to one armed task.
#[derive(Debug)]
pub struct StageHandle {
    abort: AbortHandle,
}

impl StageHandle {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn revoke(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Scheduler backed by tokio tasks and `sleep_until`.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    jitter: Duration,
    capacity: Option<usize>,
    armed: Arc<AtomicUsize>,
}

/// Releases one armed slot when the task finishes or is revoked.
struct ArmedSlot(Arc<AtomicUsize>);

impl Drop for ArmedSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every timer by a random extra amount in `0..=jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Refuse to arm more than `capacity` timers at once.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Timers currently armed and not yet finished.
    pub fn armed(&self) -> usize {
        self.armed.load(Ordering::Acquire)
    }

    fn reserve(&self) -> RedopsResult<ArmedSlot> {
        let previous = self.armed.fetch_add(1, Ordering::AcqRel);
        let slot = ArmedSlot(self.armed.clone());
        if let Some(capacity) = self.capacity {
            if previous >= capacity {
                return Err(RedopsError::Scheduling(format!(
                    "timer capacity exhausted ({} armed)",
                    capacity
                )));
            }
        }
        Ok(slot)
    }

    fn jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

impl StageScheduler for TokioScheduler {
    fn schedule(&self, fire_at: Instant, task: StageTask) -> RedopsResult<StageHandle> {
        let runtime = Handle::try_current()
            .map_err(|e| RedopsError::Scheduling(format!("no async runtime: {}", e)))?;
        let slot = self.reserve()?;
        let fire_at = fire_at + self.jitter();
        trace!("Arming timer, {} armed", self.armed());

        let join = runtime.spawn(async move {
            let _slot = slot;
            tokio::time::sleep_until(fire_at).await;
            task.await;
        });
        Ok(StageHandle::new(join.abort_handle()))
    }
}
