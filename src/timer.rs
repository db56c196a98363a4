/*!
 # Timer instances

 A [`DailyTimer`] holds one on/off schedule: start and end times, the days
 of the week it applies to, an optional randomized offset regenerated once
 per calendar day, and the callbacks fired on state transitions. A timer is
 a plain value until it is handed to a [`Scheduler`](crate::Scheduler),
 which runs its power-up sync and polls it from then on.

 Windows may cross midnight; simply configure the times accordingly
 (e.g. 22:00 to 06:00). The off edge is then evaluated on the following
 calendar day via the derived off mask.
*/

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use rand::Rng;
use tracing::{debug, trace};

use crate::days::day_bits;

/// Last valid minute of a day. Randomized times are clamped into
/// `1..=LAST_MINUTE` so they never wrap past the day boundary.
const LAST_MINUTE: i32 = 24 * 60 - 1;

/// Jitter magnitude used until `set_random_offset` is called.
const DEFAULT_OFFSET_MINUTES: u8 = 15;

/// A wall-clock time with whole-minute resolution.
///
/// Out-of-range components saturate to the maximum valid value instead of
/// being rejected; a timer must always carry some valid schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Creates a time of day, clamping the hour to 23 and the minute to 59.
    pub fn new(hour: u8, minute: u8) -> Self {
        Self {
            hour: hour.min(23),
            minute: minute.min(59),
        }
    }

    /// Hour component (0-23).
    pub fn hour(self) -> u8 {
        self.hour
    }

    /// Minute component (0-59).
    pub fn minute(self) -> u8 {
        self.minute
    }

    /// Minutes elapsed since midnight.
    pub fn minute_of_day(self) -> u16 {
        u16::from(self.hour) * 60 + u16::from(self.minute)
    }

    fn from_minute_of_day(minutes: i32) -> Self {
        let minutes = minutes.clamp(0, LAST_MINUTE);
        Self {
            hour: (minutes / 60) as u8,
            minute: (minutes % 60) as u8,
        }
    }

    fn on_date(self, date: NaiveDate) -> NaiveDateTime {
        // Components are clamped, so the conversion cannot fail.
        date.and_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap()
    }
}

/// Which of a timer's two edges receive the daily randomized offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Randomize {
    /// No jitter; edges fire exactly at the configured times.
    #[default]
    Fixed,
    /// Jitter the start time only.
    Start,
    /// Jitter the end time only.
    End,
    /// Jitter both times.
    Both,
}

impl Randomize {
    fn start(self) -> bool {
        matches!(self, Randomize::Start | Randomize::Both)
    }

    fn end(self) -> bool {
        matches!(self, Randomize::End | Randomize::Both)
    }

    fn any(self) -> bool {
        !matches!(self, Randomize::Fixed)
    }
}

/// Device-control hook fired when a timer crosses an edge.
pub type Callback = Box<dyn FnMut() + Send>;

/// One daily on/off schedule plus its runtime state.
pub struct DailyTimer {
    start: TimeOfDay,
    end: TimeOfDay,
    on_mask: u8,
    off_mask: u8,
    random: Randomize,
    offset_minutes: u8,
    auto_sync: bool,
    on_start: Option<Callback>,
    on_end: Option<Callback>,
    /// Last computed activation state.
    active: bool,
    /// Weekday (1=Sunday..7=Saturday) the random offsets were last
    /// regenerated for; `None` until the first evaluation. The randomized
    /// times below are only meaningful for this day.
    randomized_day: Option<u32>,
    random_start: TimeOfDay,
    random_end: TimeOfDay,
}

impl DailyTimer {
    /// Creates a timer that is active between `start` and `end` on the given
    /// days. When `start` is later than `end` the window crosses midnight
    /// and the off edge lands on the following calendar day.
    ///
    /// `days` accepts either a [`DaySet`](crate::DaySet) template or a raw
    /// `0bSMTWTFS0` bitmask.
    pub fn new(start: TimeOfDay, end: TimeOfDay, days: impl Into<u8>) -> Self {
        let mut timer = Self {
            start,
            end,
            on_mask: days.into(),
            off_mask: 0,
            random: Randomize::Fixed,
            offset_minutes: DEFAULT_OFFSET_MINUTES,
            auto_sync: false,
            on_start: None,
            on_end: None,
            active: false,
            randomized_day: None,
            random_start: start,
            random_end: end,
        };
        timer.update_off_mask();
        timer
    }

    /// Creates a single-instant trigger: the end time equals the start time
    /// and the timer pulses active for exactly the start minute's first
    /// second.
    pub fn at(start: TimeOfDay, days: impl Into<u8>) -> Self {
        Self::new(start, start, days)
    }

    /// Binds the callback fired on the off-to-on transition.
    pub fn on_start(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Some(Box::new(callback));
        self
    }

    /// Binds the callback fired on the on-to-off transition.
    pub fn on_end(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_end = Some(Box::new(callback));
        self
    }

    /// When enabled, registration fires the start callback if the window is
    /// already open, forcing a freshly powered-up device into the correct
    /// physical state instead of waiting for the next edge.
    pub fn auto_sync(mut self, enabled: bool) -> Self {
        self.auto_sync = enabled;
        self
    }

    /// Builder form of [`set_random_offset`](Self::set_random_offset).
    pub fn random_offset(mut self, minutes: u8, mode: Randomize) -> Self {
        self.set_random_offset(minutes, mode);
        self
    }

    /// Sets the start time, clamping out-of-range values, and silently
    /// re-evaluates the stored state. Useful for feeding in computed times
    /// such as sunrise or sunset.
    pub fn set_start_time(&mut self, hour: u8, minute: u8) {
        self.start = TimeOfDay::new(hour, minute);
        self.update_off_mask();
        self.refresh(Local::now().naive_local());
    }

    /// Sets the end time, clamping out-of-range values, and silently
    /// re-evaluates the stored state.
    pub fn set_end_time(&mut self, hour: u8, minute: u8) {
        self.end = TimeOfDay::new(hour, minute);
        self.update_off_mask();
        self.refresh(Local::now().naive_local());
    }

    /// Replaces the active-day selection with a [`DaySet`](crate::DaySet)
    /// template or a raw `0bSMTWTFS0` bitmask, then silently re-evaluates
    /// the stored state.
    pub fn set_days_active(&mut self, days: impl Into<u8>) {
        self.on_mask = days.into();
        self.update_off_mask();
        self.refresh(Local::now().naive_local());
    }

    /// Configures the randomized offset. The magnitude is clamped to 59
    /// minutes; a magnitude of zero disables jitter regardless of `mode`.
    pub fn set_random_offset(&mut self, minutes: u8, mode: Randomize) {
        self.offset_minutes = minutes.min(59);
        self.random = if self.offset_minutes == 0 {
            Randomize::Fixed
        } else {
            mode
        };
        // Force regeneration on the next evaluation.
        self.randomized_day = None;
    }

    /// Replaces the active days with `count` weekdays chosen uniformly at
    /// random without replacement, and returns the resulting mask. Intended
    /// to be called periodically (e.g. once a week) by the application; the
    /// timer does not rotate its own days.
    pub fn set_random_days(&mut self, count: u8) -> u8 {
        self.set_random_days_with(&mut rand::thread_rng(), count)
    }

    fn set_random_days_with<R: Rng>(&mut self, rng: &mut R, count: u8) -> u8 {
        let mut slots = [0u8; 7];
        for slot in slots.iter_mut().take(usize::from(count.min(7))) {
            *slot = 1;
        }
        // Fisher-Yates shuffle of the day indicators.
        for i in 0..7 {
            let j = rng.gen_range(i..7);
            slots.swap(i, j);
        }
        let mut mask = 0u8;
        for (i, slot) in slots.iter().enumerate() {
            mask |= slot << i;
        }
        self.on_mask = mask << 1;
        self.update_off_mask();
        self.refresh(Local::now().naive_local());
        debug!("Rotated active days to {:#010b}", self.on_mask);
        self.on_mask
    }

    /// Configured start time.
    pub fn start_time(&self) -> TimeOfDay {
        self.start
    }

    /// Configured end time.
    pub fn end_time(&self) -> TimeOfDay {
        self.end
    }

    /// Start time with today's random offset applied. Only meaningful after
    /// an evaluation on the current day with start jitter enabled.
    pub fn random_start_time(&self) -> TimeOfDay {
        self.random_start
    }

    /// End time with today's random offset applied.
    pub fn random_end_time(&self) -> TimeOfDay {
        self.random_end
    }

    /// Raw active-day mask (`0bSMTWTFS0`, Sunday in the most significant
    /// bit).
    pub fn days(&self) -> u8 {
        self.on_mask
    }

    /// Configured jitter magnitude in minutes.
    pub fn offset_minutes(&self) -> u8 {
        self.offset_minutes
    }

    /// Configured jitter mode.
    pub fn randomize_mode(&self) -> Randomize {
        self.random
    }

    /// Last computed activation state, as stored by the scheduler's poll or
    /// a sync.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Evaluates whether the timer should be active at `now`, without
    /// storing the result. The first call on a new calendar day regenerates
    /// the random offsets when jitter is enabled; apart from that the
    /// evaluation is a pure function of the configuration and `now`.
    pub fn is_active_at(&mut self, now: NaiveDateTime) -> bool {
        let weekday = now.weekday().number_from_sunday();
        if self.random.any() && self.randomized_day != Some(weekday) {
            self.randomize_times_with(&mut rand::thread_rng());
            self.randomized_day = Some(weekday);
        }

        // Compare at whole-second resolution so a poll landing anywhere
        // inside the HH:MM:00 second observes a single-instant pulse.
        let now = now.with_nanosecond(0).unwrap_or(now);
        let today = now.date();
        let on_time = self.effective_start().on_date(today);
        let off_time = self.effective_end().on_date(today);

        let today_bits = day_bits(weekday);
        match (
            today_bits & self.on_mask != 0,
            today_bits & self.off_mask != 0,
        ) {
            // Both edges land today.
            (true, true) => {
                if on_time < off_time {
                    now > on_time && now < off_time
                } else if off_time < on_time {
                    now > on_time || now < off_time
                } else {
                    now == on_time
                }
            }
            // Only the on edge lands today. A non-crossing window is still
            // bounded by the end time even though today's off bit is unset;
            // a crossing one stays open until a later day's off edge.
            (true, false) => {
                if on_time < off_time {
                    now > on_time && now < off_time
                } else {
                    now > on_time
                }
            }
            // Only the off edge lands today: the window opened yesterday.
            (false, true) => now < off_time,
            (false, false) => false,
        }
    }

    /// One-shot power-up synchronisation: evaluates and stores the current
    /// state and, when auto-sync is enabled and the window is already open,
    /// fires the start callback unconditionally. Returns the new state.
    pub fn sync_at(&mut self, now: NaiveDateTime) -> bool {
        self.active = self.is_active_at(now);
        if self.active && self.auto_sync {
            debug!("Auto-sync firing start callback");
            if let Some(callback) = self.on_start.as_mut() {
                callback();
            }
        }
        self.active
    }

    /// Re-evaluates against `now` and fires the matching callback if the
    /// state changed since the last evaluation.
    pub(crate) fn tick(&mut self, now: NaiveDateTime) {
        let was_active = self.active;
        self.active = self.is_active_at(now);
        if was_active == self.active {
            return;
        }
        if self.active {
            debug!("Timer turned on at {now}");
            if let Some(callback) = self.on_start.as_mut() {
                callback();
            }
        } else {
            debug!("Timer turned off at {now}");
            if let Some(callback) = self.on_end.as_mut() {
                callback();
            }
        }
    }

    /// Re-evaluates and stores the state without firing callbacks. Run after
    /// every mutation so getters reflect the new schedule immediately.
    fn refresh(&mut self, now: NaiveDateTime) {
        self.active = self.is_active_at(now);
    }

    /// A start time after the end time means the window crosses midnight,
    /// so the off edge is shifted to match the following calendar day.
    fn update_off_mask(&mut self) {
        self.off_mask = if self.start.minute_of_day() > self.end.minute_of_day() {
            self.on_mask >> 1
        } else {
            self.on_mask
        };
    }

    fn effective_start(&self) -> TimeOfDay {
        if self.random.start() {
            self.random_start
        } else {
            self.start
        }
    }

    fn effective_end(&self) -> TimeOfDay {
        if self.random.end() {
            self.random_end
        } else {
            self.end
        }
    }

    fn randomize_times_with<R: Rng>(&mut self, rng: &mut R) {
        let offset = i32::from(self.offset_minutes);
        if self.random.start() {
            let minutes = i32::from(self.start.minute_of_day()) + rng.gen_range(-offset..=offset);
            self.random_start = TimeOfDay::from_minute_of_day(minutes.clamp(1, LAST_MINUTE));
            trace!(
                "Randomized start {:02}:{:02}",
                self.random_start.hour(),
                self.random_start.minute()
            );
        }
        if self.random.end() {
            let minutes = i32::from(self.end.minute_of_day()) + rng.gen_range(-offset..=offset);
            self.random_end = TimeOfDay::from_minute_of_day(minutes.clamp(1, LAST_MINUTE));
            trace!(
                "Randomized end {:02}:{:02}",
                self.random_end.hour(),
                self.random_end.minute()
            );
        }
    }
}
