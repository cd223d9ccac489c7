use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use log::{debug, error, trace};
use parking_lot::Mutex;
use priority_queue::PriorityQueue;
use tandem_clocks::{Clock, monotonic};
use tandem_ports::{ChangeMask, ClockId, ClockObserver};
use tokio::sync::{Notify, oneshot};

use crate::task::{Due, TaskAction, TaskEntry, TaskHandle, TaskId};

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// Handle to one scheduler worker.
///
/// Construction spawns the worker task, so a tokio runtime must be
/// current. Dropping the handle shuts the worker down; the process-wide
/// [`Scheduler::global`] instance is never dropped.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

pub(crate) struct SchedulerInner {
    pub(crate) state: Mutex<SchedState>,
    pub(crate) notify: Notify,
    pub(crate) shutdown: AtomicBool,
}

pub(crate) struct SchedState {
    queue: PriorityQueue<TaskId, Reverse<Due>>,
    tasks: HashMap<TaskId, TaskEntry>,
    /// Tasks whose wake time is currently unknowable (NaN): they wait
    /// for a clock change to re-derive a finite due time.
    parked: HashSet<TaskId>,
    next_task: u64,
    next_seq: u64,
}

/// Per-task observer bound to the task's clock; routes graph change
/// notifications back to the owning scheduler.
struct TaskClockObserver {
    inner: Weak<SchedulerInner>,
    task: TaskId,
}

impl ClockObserver for TaskClockObserver {
    fn clock_changed(&self, _clock: ClockId, _mask: ChangeMask) {
        if let Some(inner) = self.inner.upgrade() {
            inner.reschedule(self.task);
        }
    }
}

impl Scheduler {
    /// Create an independent scheduler with its own worker task.
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedState {
                queue: PriorityQueue::new(),
                tasks: HashMap::new(),
                parked: HashSet::new(),
                next_task: 0,
                next_seq: 0,
            }),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker = Arc::clone(&inner);
        tokio::spawn(async move {
            run_worker(worker).await;
        });
        Scheduler { inner }
    }

    /// The lazily-started process-wide scheduler.
    pub fn global() -> &'static Scheduler {
        GLOBAL.get_or_init(Scheduler::new)
    }

    /// Sleep until `clock` reads `target_ticks`.
    ///
    /// Returns immediately if the tick value has already passed. If the
    /// clock stops on the way there, the sleep extends until motion
    /// resumes and the tick value is actually reached.
    pub async fn sleep_until(&self, clock: &Clock, target_ticks: f64) {
        let (tx, rx) = oneshot::channel();
        let _handle = self.schedule(clock, target_ticks, TaskAction::Waker(tx));
        let _ = rx.await;
    }

    /// Sleep for `ticks` ticks of `clock` from its current reading.
    pub async fn sleep_for(&self, clock: &Clock, ticks: f64) {
        let target = clock.ticks() + ticks;
        self.sleep_until(clock, target).await;
    }

    /// Invoke `callback` when `clock` reads `target_ticks`.
    ///
    /// A panicking callback is trapped and logged; the worker survives.
    pub fn run_at<F>(&self, clock: &Clock, target_ticks: f64, callback: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(clock, target_ticks, TaskAction::Callback(Box::new(callback)))
    }

    /// Signal `event` when `clock` reads `target_ticks`.
    pub fn schedule_event(
        &self,
        clock: &Clock,
        target_ticks: f64,
        event: Arc<Notify>,
    ) -> TaskHandle {
        self.schedule(clock, target_ticks, TaskAction::Event(event))
    }

    fn schedule(&self, clock: &Clock, target_ticks: f64, action: TaskAction) -> TaskHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.inner.state.lock();
        let id = TaskId(state.next_task);
        state.next_task += 1;
        let seq = state.next_seq;
        state.next_seq += 1;

        let observer: Arc<dyn ClockObserver> = Arc::new(TaskClockObserver {
            inner: Arc::downgrade(&self.inner),
            task: id,
        });
        let subscription = clock.bind(&observer);

        let when = clock.calc_when(target_ticks);
        state.tasks.insert(
            id,
            TaskEntry {
                clock: clock.clone(),
                target_ticks,
                action,
                cancelled: Arc::clone(&cancelled),
                deprecated: false,
                seq,
                subscription,
                _observer: observer,
            },
        );
        if when.is_nan() {
            trace!("task {:?} parked: wake time unknowable", id);
            state.parked.insert(id);
        } else {
            state.queue.push(id, Reverse(Due {
                nanos: when as i64,
                seq,
            }));
        }
        drop(state);
        self.inner.notify.notify_one();

        TaskHandle {
            id,
            cancelled,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.notify.notify_one();
    }
}

impl SchedulerInner {
    /// Re-derive a task's due time after its clock (or an ancestor)
    /// changed. Deprecates the heap entry so the worker double-checks
    /// at pop time.
    pub(crate) fn reschedule(&self, task: TaskId) {
        let mut state = self.state.lock();
        let cancelled = match state.tasks.get(&task) {
            None => return,
            Some(entry) => entry.cancelled.load(Ordering::SeqCst),
        };

        if cancelled {
            state.queue.remove(&task);
            state.parked.remove(&task);
            let removed = state.tasks.remove(&task);
            drop(state);
            if let Some(entry) = removed {
                entry.clock.unbind(entry.subscription);
            }
            self.notify.notify_one();
            return;
        }

        let (when, seq) = {
            let entry = state.tasks.get_mut(&task).expect("checked above");
            entry.deprecated = true;
            (entry.clock.calc_when(entry.target_ticks), entry.seq)
        };

        if when.is_nan() {
            trace!("task {:?} parked: clock stopped", task);
            state.queue.remove(&task);
            state.parked.insert(task);
        } else {
            let due = Reverse(Due {
                nanos: when as i64,
                seq,
            });
            if state.parked.remove(&task) {
                state.queue.push(task, due);
            } else if state.queue.change_priority(&task, due).is_none() {
                state.queue.push(task, due);
            }
        }
        drop(state);
        self.notify.notify_one();
    }
}

async fn run_worker(inner: Arc<SchedulerInner>) {
    debug!("scheduler worker started");
    loop {
        if inner.shutdown.load(Ordering::SeqCst) {
            debug!("scheduler worker stopping");
            return;
        }

        let head = {
            let state = inner.state.lock();
            state
                .queue
                .peek()
                .map(|(&id, &Reverse(due))| (id, due.nanos))
        };

        let Some((_, due_nanos)) = head else {
            inner.notify.notified().await;
            continue;
        };

        let now = monotonic::now_nanos();
        if due_nanos > now {
            let sleep = tokio::time::sleep(Duration::from_nanos((due_nanos - now) as u64));
            tokio::select! {
                _ = inner.notify.notified() => {}
                _ = sleep => {}
            }
            continue;
        }

        // Head is due: pop it and decide what to do outside the lock.
        // Re-verify under the lock; a concurrent reschedule may have
        // re-keyed the heap since the peek.
        let fire = {
            let mut state = inner.state.lock();
            let now = monotonic::now_nanos();
            let head_due = state
                .queue
                .peek()
                .is_some_and(|(_, &Reverse(due))| due.nanos <= now);
            if !head_due {
                continue;
            }
            let Some((id, _)) = state.queue.pop() else {
                continue;
            };
            let Some(mut entry) = state.tasks.remove(&id) else {
                continue;
            };

            if entry.cancelled.load(Ordering::SeqCst) {
                trace!("task {:?} cancelled, discarding", id);
                Some((entry, false))
            } else if entry.deprecated {
                // The clock changed while this entry was queued:
                // re-derive from current clock state before firing.
                entry.deprecated = false;
                let when = entry.clock.calc_when(entry.target_ticks);
                if when.is_nan() {
                    state.tasks.insert(id, entry);
                    state.parked.insert(id);
                    None
                } else if (when as i64) > monotonic::now_nanos() {
                    let due = Reverse(Due {
                        nanos: when as i64,
                        seq: entry.seq,
                    });
                    state.tasks.insert(id, entry);
                    state.queue.push(id, due);
                    None
                } else {
                    Some((entry, true))
                }
            } else {
                Some((entry, true))
            }
        };

        if let Some((entry, should_fire)) = fire {
            entry.clock.unbind(entry.subscription);
            if should_fire {
                fire_action(entry.action);
            }
        }
    }
}

fn fire_action(action: TaskAction) {
    match action {
        TaskAction::Callback(callback) => {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
                error!("scheduled callback panicked: {:?}", panic);
            }
        }
        TaskAction::Event(event) => {
            event.notify_one();
            event.notify_waiters();
        }
        TaskAction::Waker(tx) => {
            let _ = tx.send(());
        }
    }
}
