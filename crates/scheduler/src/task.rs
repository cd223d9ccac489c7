use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tandem_clocks::Clock;
use tandem_ports::SubscriptionId;
use tokio::sync::{Notify, oneshot};

use crate::scheduler::SchedulerInner;

/// Identity of one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) u64);

/// Heap key: root-clock nanoseconds due, insertion order as tie-break
/// so simultaneous tasks fire in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Due {
    pub nanos: i64,
    pub seq: u64,
}

/// What happens when a task fires.
pub(crate) enum TaskAction {
    Callback(Box<dyn FnOnce() + Send>),
    Event(Arc<Notify>),
    Waker(oneshot::Sender<()>),
}

pub(crate) struct TaskEntry {
    pub clock: Clock,
    pub target_ticks: f64,
    pub action: TaskAction,
    pub cancelled: Arc<AtomicBool>,
    pub deprecated: bool,
    pub seq: u64,
    pub subscription: SubscriptionId,
    /// Keeps the weakly-bound clock observer alive for the task's
    /// lifetime.
    pub _observer: Arc<dyn tandem_ports::ClockObserver>,
}

/// Cancellation handle for a scheduled task.
///
/// Cancelling flags the task; the worker discards it when popped. Safe
/// to call after the task has fired or the scheduler has gone away.
pub struct TaskHandle {
    pub(crate) id: TaskId,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) inner: Weak<SchedulerInner>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(inner) = self.inner.upgrade() {
            inner.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
