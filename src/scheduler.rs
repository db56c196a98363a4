/*!
 # Timer registry and polling

 The [`Scheduler`] owns every registered [`DailyTimer`] and re-evaluates
 them against the wall clock on each poll, firing the start or end callback
 exactly when an instance's activation state changes. The application drives
 it: call [`Scheduler::poll`] from a loop at least once per minute (once per
 second is typical) so no edge is missed.
*/

use chrono::{Local, NaiveDateTime};
use tracing::{debug, trace};

use crate::timer::DailyTimer;
use crate::{Error, Result};

/// Default ceiling on simultaneously registered timers.
pub const DEFAULT_CAPACITY: usize = 16;

/// Handle to a timer registered with a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(usize);

/// Ordered collection of timers, polled together.
pub struct Scheduler {
    timers: Vec<DailyTimer>,
    capacity: usize,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a scheduler with the default timer capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a scheduler holding at most `capacity` timers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            timers: Vec::new(),
            capacity,
        }
    }

    /// Registers a timer, running its power-up sync against the system
    /// clock so a device recovers the correct state immediately.
    pub fn register(&mut self, timer: DailyTimer) -> Result<TimerId> {
        self.register_at(timer, Local::now().naive_local())
    }

    /// Registers a timer, running its power-up sync against `now`.
    pub fn register_at(&mut self, mut timer: DailyTimer, now: NaiveDateTime) -> Result<TimerId> {
        if self.timers.len() >= self.capacity {
            return Err(Error::CapacityExceeded(self.capacity));
        }
        let active = timer.sync_at(now);
        let id = TimerId(self.timers.len());
        debug!(id = id.0, active, "Registered timer");
        self.timers.push(timer);
        Ok(id)
    }

    /// Polls every timer against the system clock.
    pub fn poll(&mut self) {
        self.poll_at(Local::now().naive_local());
    }

    /// Re-evaluates every timer in registration order against `now` and
    /// fires the matching callback on each state transition. Callbacks run
    /// synchronously; a slow callback delays the timers behind it.
    pub fn poll_at(&mut self, now: NaiveDateTime) {
        trace!(%now, timers = self.timers.len(), "Polling timers");
        for timer in &mut self.timers {
            timer.tick(now);
        }
    }

    /// Shared access to a registered timer.
    pub fn get(&self, id: TimerId) -> Option<&DailyTimer> {
        self.timers.get(id.0)
    }

    /// Mutable access to a registered timer, e.g. to feed in a computed
    /// sunset time.
    pub fn get_mut(&mut self, id: TimerId) -> Option<&mut DailyTimer> {
        self.timers.get_mut(id.0)
    }

    /// Number of registered timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Whether no timers are registered.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Maximum number of timers this scheduler accepts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::days::DaySet;
    use crate::timer::TimeOfDay;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // 2024-01-08 was a Monday.
    fn dt(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (count, move || {
            inner.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn rejects_registrations_beyond_capacity() {
        let mut scheduler = Scheduler::with_capacity(1);
        let window = |days| DailyTimer::new(TimeOfDay::new(8, 0), TimeOfDay::new(17, 0), days);

        scheduler
            .register_at(window(DaySet::EveryDay), dt(7, 0, 0))
            .unwrap();
        let err = scheduler
            .register_at(window(DaySet::Weekdays), dt(7, 0, 0))
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(1)));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn callbacks_fire_exactly_once_per_transition() {
        let (started, on_start) = counter();
        let (ended, on_end) = counter();
        let timer = DailyTimer::new(
            TimeOfDay::new(8, 0),
            TimeOfDay::new(17, 0),
            DaySet::EveryDay,
        )
        .on_start(on_start)
        .on_end(on_end);

        let mut scheduler = Scheduler::new();
        scheduler.register_at(timer, dt(7, 0, 0)).unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 0);

        scheduler.poll_at(dt(7, 59, 0));
        assert_eq!(started.load(Ordering::SeqCst), 0);

        scheduler.poll_at(dt(8, 0, 1));
        scheduler.poll_at(dt(9, 0, 0));
        scheduler.poll_at(dt(12, 0, 0));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 0);

        scheduler.poll_at(dt(17, 0, 0));
        scheduler.poll_at(dt(18, 0, 0));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn single_instant_timer_pulses_on_and_off() {
        let (started, on_start) = counter();
        let (ended, on_end) = counter();
        let timer = DailyTimer::at(TimeOfDay::new(8, 0), DaySet::EveryDay)
            .on_start(on_start)
            .on_end(on_end);

        let mut scheduler = Scheduler::new();
        let id = scheduler.register_at(timer, dt(7, 59, 59)).unwrap();
        assert!(!scheduler.get(id).unwrap().is_active());

        scheduler.poll_at(dt(8, 0, 0));
        assert!(scheduler.get(id).unwrap().is_active());
        assert_eq!(started.load(Ordering::SeqCst), 1);

        scheduler.poll_at(dt(8, 0, 1));
        assert!(!scheduler.get(id).unwrap().is_active());
        assert_eq!(ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auto_sync_fires_start_callback_at_registration() {
        let (started, on_start) = counter();
        let timer = DailyTimer::new(
            TimeOfDay::new(8, 0),
            TimeOfDay::new(17, 0),
            DaySet::EveryDay,
        )
        .auto_sync(true)
        .on_start(on_start);

        let mut scheduler = Scheduler::new();
        let id = scheduler.register_at(timer, dt(12, 0, 0)).unwrap();
        assert!(scheduler.get(id).unwrap().is_active());
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Repeated polls inside the window fire nothing further.
        scheduler.poll_at(dt(12, 30, 0));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registration_without_auto_sync_stores_state_silently() {
        let (started, on_start) = counter();
        let timer = DailyTimer::new(
            TimeOfDay::new(8, 0),
            TimeOfDay::new(17, 0),
            DaySet::EveryDay,
        )
        .on_start(on_start);

        let mut scheduler = Scheduler::new();
        let id = scheduler.register_at(timer, dt(12, 0, 0)).unwrap();
        assert!(scheduler.get(id).unwrap().is_active());
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn timers_are_polled_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for name in ["hall", "porch", "bedroom"] {
            let order = Arc::clone(&order);
            let timer = DailyTimer::new(
                TimeOfDay::new(8, 0),
                TimeOfDay::new(17, 0),
                DaySet::EveryDay,
            )
            .on_start(move || order.lock().unwrap().push(name));
            scheduler.register_at(timer, dt(7, 0, 0)).unwrap();
        }
        assert_eq!(scheduler.len(), 3);

        scheduler.poll_at(dt(8, 30, 0));
        assert_eq!(*order.lock().unwrap(), vec!["hall", "porch", "bedroom"]);
    }

    #[test]
    fn get_mut_allows_reconfiguring_a_registered_timer() {
        let timer = DailyTimer::new(
            TimeOfDay::new(8, 0),
            TimeOfDay::new(17, 0),
            DaySet::EveryDay,
        );
        let mut scheduler = Scheduler::new();
        let id = scheduler.register_at(timer, dt(7, 0, 0)).unwrap();

        scheduler.get_mut(id).unwrap().set_days_active(DaySet::Weekends);
        assert_eq!(scheduler.get(id).unwrap().days(), DaySet::Weekends.mask());
    }
}
