/*!
 # Daily Timer Library

 A Rust library for daily recurring on/off control of devices such as lamps
 and appliances, developed primarily for household presence simulation.

 ## Features

 * On and off times with whole-minute resolution
 * Day-of-week selection (weekdays, weekends, single days, custom masks)
 * Windows that cross midnight
 * Single-instant triggers (end time equal to start time)
 * Randomized start/end offsets, regenerated once per calendar day
 * Random rotation of active days
 * Automatic state synchronisation on power-up

 ## Example

 ```rust
 use daily_timer::{DailyTimer, DaySet, Randomize, Scheduler, TimeOfDay};

 fn main() -> Result<(), daily_timer::Error> {
     let mut scheduler = Scheduler::new();

     // Evening lamp with up to 30 minutes of jitter on both edges.
     let lamp = DailyTimer::new(TimeOfDay::new(17, 30), TimeOfDay::new(23, 0), DaySet::EveryDay)
         .random_offset(30, Randomize::Both)
         .auto_sync(true)
         .on_start(|| println!("lamp on"))
         .on_end(|| println!("lamp off"));
     let lamp_id = scheduler.register(lamp)?;

     // Call poll() from the application loop, at least once per minute.
     scheduler.poll();
     println!("lamp active: {}", scheduler.get(lamp_id).unwrap().is_active());
     Ok(())
 }
 ```
*/

use thiserror::Error;

/// Custom error types for the daily timer library
#[derive(Error, Debug)]
pub enum Error {
    /// The scheduler's timer capacity is exhausted
    #[error("Timer capacity exceeded ({0} timers registered)")]
    CapacityExceeded(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

// Re-export modules
pub mod days;
pub mod scheduler;
pub mod timer;

// Re-export key types
pub use days::DaySet;
pub use scheduler::{Scheduler, TimerId, DEFAULT_CAPACITY};
pub use timer::{Callback, DailyTimer, Randomize, TimeOfDay};
