//! Clock and one-shot timer scheduling
//!
//! Delayed work is expressed as [`Task`] values queued in a [`TimerQueue`].
//! The owner of the queue pops due tasks and dispatches them, so every
//! callback runs on the same cooperative loop as sensor events.

use crate::device::TransitionSettings;
use crate::presence::SubscriptionHandle;
use chrono::{Duration, Local, NaiveDateTime};
use home_platform::EntityId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the current (local wall) time
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute time
    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opaque handle of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// Work that can be scheduled for later
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// A presence subscriber's vacating delay has lapsed
    PresenceTimeout(SubscriptionHandle),
    /// Next step of a device's transition toward occupied
    TransitionStep {
        device: EntityId,
        generation: u64,
        steps_remaining: u32,
        step_time: Duration,
        settings: TransitionSettings,
    },
    /// Deferred re-adjustment after the anti-thrash window
    Readjust(EntityId),
}

/// One-shot scheduling as used by the presence tracker and devices
pub trait Scheduler {
    /// Current time
    fn now(&self) -> NaiveDateTime;

    /// Run `task` after `delay` (negative delays run at the next poll)
    fn run_in(&mut self, delay: Duration, task: Task) -> TimerHandle;

    /// Cancel a scheduled task; unknown or already-fired handles are ignored
    fn cancel(&mut self, handle: TimerHandle);
}

/// Time-ordered queue of scheduled tasks
pub struct TimerQueue<C> {
    clock: C,
    /// Pending tasks ordered by (due time, handle)
    queue: BTreeMap<(NaiveDateTime, TimerHandle), Task>,
    /// Due time of every pending handle
    index: HashMap<TimerHandle, NaiveDateTime>,
    next_handle: u64,
}

impl<C: Clock> TimerQueue<C> {
    /// Create an empty queue driven by `clock`
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Remove and return the earliest task that is due, if any
    pub fn pop_due(&mut self) -> Option<(TimerHandle, Task)> {
        let now = self.clock.now();
        let (&(due, handle), _) = self.queue.first_key_value()?;
        if due > now {
            return None;
        }
        self.index.remove(&handle);
        self.queue.remove(&(due, handle)).map(|task| (handle, task))
    }

    /// When the earliest pending task is due
    #[must_use]
    pub fn next_due(&self) -> Option<NaiveDateTime> {
        self.queue.first_key_value().map(|(&(due, _), _)| due)
    }

    /// How long until the earliest pending task is due (zero if overdue)
    #[must_use]
    pub fn time_until_next(&self) -> Option<std::time::Duration> {
        self.next_due().map(|due| {
            (due - self.clock.now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        })
    }

    /// Whether `handle` is still pending
    #[must_use]
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.index.contains_key(&handle)
    }

    /// Get the number of pending timers
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.queue.len()
    }

    /// The clock driving this queue
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<C: Clock> Scheduler for TimerQueue<C> {
    fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn run_in(&mut self, delay: Duration, task: Task) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        let due = self.clock.now() + delay.max(Duration::zero());
        tracing::trace!("Scheduled {:?} at {} ({:?})", handle, due, task);
        self.queue.insert((due, handle), task);
        self.index.insert(handle, due);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(due) = self.index.remove(&handle) {
            self.queue.remove(&(due, handle));
            tracing::trace!("Cancelled {:?}", handle);
        }
    }
}
