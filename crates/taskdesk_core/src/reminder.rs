//! Watches task reminder times and keeps a set of active reminders.
//!
//! A single ticker re-evaluates every task on a fixed cadence. A task whose
//! reminder is within the lookahead window gets one reminder, which expires
//! on its own timer after the dwell time. Dedup is keyed on "is a reminder
//! for this task active right now", so a task still inside its window is
//! reminded again once the previous reminder has expired.

use crate::cache::EntityCache;
use crate::clock::Clock;
use crate::model::{Reminder, Task, TaskId};
use crate::observe::{Subscribers, Subscription, lock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    pub tick: Duration,
    pub lookahead: Duration,
    pub dwell: Duration,
    /// Retire an active reminder as soon as its task is finished or deleted
    /// instead of letting it run out its dwell time.
    pub retire_settled: bool,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            lookahead: Duration::from_secs(5 * 60),
            dwell: Duration::from_secs(30),
            retire_settled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    Dormant,
    Armed { remaining: time::Duration },
}

/// Where `task` stands at `now`. Finished tasks, tasks without a readable
/// reminder time, reminders already past, and reminders further away than
/// `lookahead` are all dormant.
pub fn evaluate(task: &Task, now: OffsetDateTime, lookahead: Duration) -> ReminderState {
    if task.is_finished() {
        return ReminderState::Dormant;
    }
    let Some(at) = task.reminder_at(now.offset()) else {
        return ReminderState::Dormant;
    };

    let remaining = at - now;
    if remaining.is_positive() && remaining.unsigned_abs() <= lookahead {
        ReminderState::Armed { remaining }
    } else {
        ReminderState::Dormant
    }
}

struct ActiveReminder {
    serial: u64,
    reminder: Reminder,
    expiry: Option<JoinHandle<()>>,
}

impl ActiveReminder {
    fn cancel(self) {
        if let Some(expiry) = self.expiry {
            expiry.abort();
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    active: Vec<ActiveReminder>,
    ticker: Option<JoinHandle<()>>,
}

impl SchedulerState {
    fn reminders(&self) -> Vec<Reminder> {
        self.active
            .iter()
            .map(|entry| entry.reminder.clone())
            .collect()
    }
}

struct Inner {
    cache: Arc<EntityCache>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
    state: Mutex<SchedulerState>,
    subscribers: Subscribers<Vec<Reminder>>,
    stopped: AtomicBool,
    serials: AtomicU64,
}

pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    pub fn new(cache: Arc<EntityCache>, clock: Arc<dyn Clock>, config: ReminderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                clock,
                config,
                state: Mutex::new(SchedulerState::default()),
                subscribers: Subscribers::new(),
                stopped: AtomicBool::new(false),
                serials: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> ReminderConfig {
        self.inner.config
    }

    /// Starts the ticker on the current tokio runtime. Calling it again while
    /// running, or after [`ReminderScheduler::stop`], does nothing.
    pub fn start(&self) {
        if self.inner.is_stopped() {
            tracing::warn!("reminder scheduler already stopped, not starting");
            return;
        }

        let mut state = lock(&self.inner.state);
        if state.ticker.is_some() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime available, reminder scheduler not started");
                return;
            }
        };

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.tick.max(Duration::from_millis(1));
        state.ticker = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if inner.is_stopped() {
                    break;
                }
                inner.tick();
            }
        }));
        tracing::info!(
            tick_ms = period.as_millis() as u64,
            lookahead_secs = self.inner.config.lookahead.as_secs(),
            dwell_secs = self.inner.config.dwell.as_secs(),
            "reminder scheduler started"
        );
    }

    /// Runs one evaluation pass right away, independent of the ticker.
    pub fn tick(&self) {
        self.inner.tick();
    }

    pub fn active(&self) -> Vec<Reminder> {
        lock(&self.inner.state).reminders()
    }

    pub fn is_active(&self, task_id: &TaskId) -> bool {
        lock(&self.inner.state)
            .active
            .iter()
            .any(|entry| &entry.reminder.task_id == task_id)
    }

    /// Delivers the full set of active reminders every time it changes.
    pub fn subscribe_reminders<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Reminder>) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Stops the ticker, cancels every expiry timer and drops all
    /// subscribers. No callback fires afterwards. Idempotent.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = lock(&self.inner.state);
            if let Some(ticker) = state.ticker.take() {
                ticker.abort();
            }
            for entry in state.active.drain(..) {
                entry.cancel();
            }
        }
        self.inner.subscribers.clear();
        tracing::info!("reminder scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.is_stopped()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn tick(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }

        let tasks = self.cache.tasks().get();
        let now = self.clock.now();

        let changed_set = {
            let mut state = lock(&self.state);
            let mut changed = false;

            if self.config.retire_settled {
                let (kept, retired): (Vec<_>, Vec<_>) =
                    state.active.drain(..).partition(|entry| {
                        tasks
                            .iter()
                            .any(|task| task.id == entry.reminder.task_id && !task.is_finished())
                    });
                state.active = kept;
                for entry in retired {
                    tracing::info!(task_id = %entry.reminder.task_id, "reminder retired, task settled");
                    entry.cancel();
                    changed = true;
                }
            }

            for task in tasks.iter() {
                let ReminderState::Armed { remaining } =
                    evaluate(task, now, self.config.lookahead)
                else {
                    continue;
                };
                if state
                    .active
                    .iter()
                    .any(|entry| entry.reminder.task_id == task.id)
                {
                    continue;
                }

                let serial = self.serials.fetch_add(1, Ordering::SeqCst) + 1;
                let reminder = Reminder::new(task.id.clone(), &task.title, remaining, now);
                tracing::info!(task_id = %task.id, message = %reminder.message, "reminder fired");
                state.active.push(ActiveReminder {
                    serial,
                    reminder,
                    expiry: self.schedule_expiry(serial),
                });
                changed = true;
            }

            changed.then(|| state.reminders())
        };

        if let Some(current) = changed_set {
            self.subscribers.notify(&current);
        }
    }

    fn schedule_expiry(self: &Arc<Self>, serial: u64) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no async runtime available, reminder will not expire");
                return None;
            }
        };

        let weak: Weak<Inner> = Arc::downgrade(self);
        let dwell = self.config.dwell;
        Some(handle.spawn(async move {
            tokio::time::sleep(dwell).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(serial);
            }
        }))
    }

    fn expire(&self, serial: u64) {
        if self.is_stopped() {
            return;
        }

        let current = {
            let mut state = lock(&self.state);
            let Some(index) = state.active.iter().position(|entry| entry.serial == serial) else {
                return;
            };
            let entry = state.active.remove(index);
            tracing::info!(task_id = %entry.reminder.task_id, "reminder expired");
            state.reminders()
        };
        self.subscribers.notify(&current);
    }
}

#[cfg(test)]
mod tests {
    use super::{ReminderState, evaluate};
    use crate::model::{TaskId, TaskInput, TaskStatus};
    use std::time::Duration;
    use time::macros::{date, datetime};

    const LOOKAHEAD: Duration = Duration::from_secs(300);

    fn task_with_reminder(reminder: Option<&str>) -> crate::model::Task {
        let mut input = TaskInput::new("stretch", date!(2025 - 12 - 20));
        input.reminder_time = reminder.map(str::to_string);
        input
            .into_task(TaskId::new("t1"), datetime!(2025-12-20 08:00 UTC))
            .unwrap()
    }

    #[test]
    fn armed_inside_lookahead_window() {
        let task = task_with_reminder(Some("2025-12-20T09:03"));
        let state = evaluate(&task, datetime!(2025-12-20 09:00 UTC), LOOKAHEAD);
        assert_eq!(
            state,
            ReminderState::Armed {
                remaining: time::Duration::minutes(3)
            }
        );
    }

    #[test]
    fn boundary_of_window_is_armed_but_due_moment_is_not() {
        let task = task_with_reminder(Some("2025-12-20T09:05"));
        assert!(matches!(
            evaluate(&task, datetime!(2025-12-20 09:00 UTC), LOOKAHEAD),
            ReminderState::Armed { .. }
        ));
        assert_eq!(
            evaluate(&task, datetime!(2025-12-20 09:05 UTC), LOOKAHEAD),
            ReminderState::Dormant
        );
    }

    #[test]
    fn dormant_outside_window_or_past() {
        let task = task_with_reminder(Some("2025-12-20T09:10"));
        assert_eq!(
            evaluate(&task, datetime!(2025-12-20 09:00 UTC), LOOKAHEAD),
            ReminderState::Dormant
        );
        assert_eq!(
            evaluate(&task, datetime!(2025-12-20 09:30 UTC), LOOKAHEAD),
            ReminderState::Dormant
        );
    }

    #[test]
    fn dormant_when_finished_missing_or_malformed() {
        let mut finished = task_with_reminder(Some("2025-12-20T09:03"));
        finished.status = TaskStatus::Finished;
        let now = datetime!(2025-12-20 09:00 UTC);

        assert_eq!(evaluate(&finished, now, LOOKAHEAD), ReminderState::Dormant);
        assert_eq!(
            evaluate(&task_with_reminder(None), now, LOOKAHEAD),
            ReminderState::Dormant
        );
        assert_eq!(
            evaluate(&task_with_reminder(Some("soon")), now, LOOKAHEAD),
            ReminderState::Dormant
        );
    }

    #[test]
    fn local_reminder_time_uses_clock_offset() {
        let task = task_with_reminder(Some("2025-12-20T11:03"));
        let now = datetime!(2025-12-20 11:00 +2);
        assert!(matches!(
            evaluate(&task, now, LOOKAHEAD),
            ReminderState::Armed { .. }
        ));
    }
}
