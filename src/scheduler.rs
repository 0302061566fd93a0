//! Cron-driven weekly cadence.
//!
//! Polls every minute and compares the current moment against the schedule
//! in the configured timezone. A fire is identified by its schedule slot,
//! not the poll instant, so a slow tick never double-fires and a missed
//! tick inside the trailing window still fires once.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::ConfigError;
use crate::pipeline::Trigger;

const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How far back a due slot is still honored.
const FIRE_WINDOW_MINUTES: i64 = 2;

/// Parse a 5-field cron expression, prefixing the seconds field the
/// underlying parser requires.
pub fn parse_cron(expr: &str) -> Result<Schedule, ConfigError> {
    let with_seconds = format!("0 {}", expr.trim());
    Schedule::from_str(&with_seconds).map_err(|_| ConfigError::InvalidVar {
        name: "DIGEST_CRON",
        value: expr.to_string(),
    })
}

pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse().map_err(|_| ConfigError::InvalidVar {
        name: "DIGEST_TIMEZONE",
        value: name.to_string(),
    })
}

/// The schedule slot currently due: the most recent fire time within the
/// trailing window, evaluated in the given timezone. None when no slot is
/// due.
pub fn due_slot(schedule: &Schedule, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let local_now = now.with_timezone(&tz);
    let window_start = local_now - chrono::Duration::minutes(FIRE_WINDOW_MINUTES);
    schedule
        .after(&window_start)
        .take_while(|t| *t <= local_now)
        .last()
        .map(|t| t.with_timezone(&Utc))
}

/// Poll loop. Exits when the trigger channel closes.
pub async fn run(schedule: Schedule, tz: Tz, triggers: mpsc::Sender<Trigger>) {
    log::info!(
        "Scheduler running, next fire: {:?}",
        schedule.upcoming(tz).next()
    );

    let mut last_fired: Option<DateTime<Utc>> = None;
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        tick.tick().await;
        let Some(slot) = due_slot(&schedule, tz, Utc::now()) else {
            continue;
        };
        if last_fired == Some(slot) {
            continue;
        }
        last_fired = Some(slot);

        log::info!("Scheduled digest generation fired for slot {}", slot);
        match triggers.try_send(Trigger::Scheduled) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("A generation is already queued, skipping scheduled fire");
            }
            Err(TrySendError::Closed(_)) => {
                log::info!("Trigger channel closed, scheduler stopping");
                return;
            }
        }
    }
}
