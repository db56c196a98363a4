use clap::{Parser, ValueEnum};
use color_eyre::eyre::{eyre, Result};
use daily_timer::{DailyTimer, DaySet, Randomize, Scheduler, TimeOfDay};
use tokio::time::{self, Duration};
use tracing::{debug, info, instrument, trace, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Time the device turns on (HH:MM)
    #[arg(short, long, default_value = "17:30")]
    start: String,
    /// Time the device turns off (HH:MM); omit for a single-instant trigger
    #[arg(short, long)]
    end: Option<String>,
    /// Days (mon,tue,wed,thu,fri,sat,sun,all,weekdays,weekend)
    #[arg(short, long, default_value = "all")]
    days: String,
    /// Random offset magnitude in minutes (0-59, 0 disables jitter)
    #[arg(short = 'o', long, default_value_t = 0)]
    random_offset: u8,
    /// Which edges receive the random offset
    #[arg(short = 'm', long, value_enum, default_value_t = RandomizeArg::Both)]
    randomize: RandomizeArg,
    /// Fire the start hook at startup when the window is already open
    #[arg(short = 'a', long)]
    auto_sync: bool,
    /// Poll interval in seconds
    #[arg(short, long, default_value_t = 1)]
    interval: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RandomizeArg {
    /// No jitter
    None,
    /// Jitter the start time only
    Start,
    /// Jitter the end time only
    End,
    /// Jitter both times
    Both,
}

impl From<RandomizeArg> for Randomize {
    fn from(arg: RandomizeArg) -> Self {
        match arg {
            RandomizeArg::None => Randomize::Fixed,
            RandomizeArg::Start => Randomize::Start,
            RandomizeArg::End => Randomize::End,
            RandomizeArg::Both => Randomize::Both,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with pretty colors
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("daily_timer=info,dailytimerd=info")),
        )
        .compact()
        .init();

    // Initialize color-eyre for pretty error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let start = parse_time(&cli.start)?;
    let end = match &cli.end {
        Some(raw) => parse_time(raw)?,
        None => start,
    };
    let days = parse_days(&cli.days);
    debug!("Days value: {:#04x}", days);

    // A zero offset magnitude disables jitter regardless of the mode flag.
    let timer = DailyTimer::new(start, end, days)
        .random_offset(cli.random_offset, cli.randomize.into())
        .auto_sync(cli.auto_sync)
        .on_start(|| println!("ON"))
        .on_end(|| println!("OFF"));

    let mut scheduler = Scheduler::new();
    scheduler.register(timer)?;
    info!(
        "Timer scheduled {:02}:{:02} -> {:02}:{:02} (days {:#04x})",
        start.hour(),
        start.minute(),
        end.hour(),
        end.minute(),
        days
    );

    // Mainloop: poll the scheduler until interrupted
    let mut ticker = time::interval(Duration::from_secs(cli.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => scheduler.poll(),
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Parse an HH:MM string into a time of day
#[instrument]
fn parse_time(raw: &str) -> Result<TimeOfDay> {
    let (hour, minute) = raw
        .split_once(':')
        .ok_or_else(|| eyre!("Expected HH:MM, got '{raw}'"))?;
    Ok(TimeOfDay::new(hour.trim().parse()?, minute.trim().parse()?))
}

/// Parse days string to bitmask
#[instrument]
fn parse_days(days: &str) -> u8 {
    let result = match days.to_lowercase().as_str() {
        "mon" | "monday" => DaySet::Mondays.mask(),
        "tue" | "tuesday" => DaySet::Tuesdays.mask(),
        "wed" | "wednesday" => DaySet::Wednesdays.mask(),
        "thu" | "thursday" => DaySet::Thursdays.mask(),
        "fri" | "friday" => DaySet::Fridays.mask(),
        "sat" | "saturday" => DaySet::Saturdays.mask(),
        "sun" | "sunday" => DaySet::Sundays.mask(),
        "all" | "everyday" => DaySet::EveryDay.mask(),
        "weekdays" => DaySet::Weekdays.mask(),
        "weekend" | "weekends" => DaySet::Weekends.mask(),
        // Only descend into the composite form when there is something to
        // split, so a lone unrecognized token cannot recurse on itself.
        _ if days.contains(',') => {
            debug!("Parsing composite days string");
            let mut combined = 0;
            for day in days.split(',') {
                let day_value = parse_days(day.trim());
                debug!("  Day '{}' = {:#04x}", day, day_value);
                combined |= day_value;
            }
            combined
        }
        _ => {
            warn!("Unrecognized day token '{}'", days);
            0
        }
    };

    trace!("Days '{}' parsed to bitmask: {:#04x}", days, result);
    result
}
