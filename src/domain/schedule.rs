use crate::db::{self, SlotRow};
use crate::domain::models::SlotStatus;
use crate::error::ContestError;
use crate::time_utils;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use sqlx::PgPool;

static DEFAULT_TIMES: Lazy<Vec<NaiveTime>> = Lazy::new(|| {
    vec![
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
    ]
});

const DEFAULT_WINDOW_SECS: i64 = 90;

/// Contest clock configuration: the fixed daily activation times, the
/// activation window length, and the wall clock they are evaluated against.
/// Window checks use the server clock only.
#[derive(Clone, Debug)]
pub struct ContestConfig {
    pub timezone: Tz,
    pub daily_times: Vec<NaiveTime>,
    pub window_secs: i64,
}

impl ContestConfig {
    pub fn from_env() -> Self {
        let timezone = match std::env::var("CONTEST_TZ") {
            Ok(raw) => time_utils::parse_timezone(&raw).unwrap_or_else(|| {
                tracing::warn!("CONTEST_TZ {:?} not recognized, using UTC", raw);
                Tz::UTC
            }),
            Err(_) => Tz::UTC,
        };

        let daily_times = match std::env::var("CONTEST_TIMES") {
            Ok(raw) => parse_times(&raw).unwrap_or_else(|| {
                tracing::warn!("CONTEST_TIMES {:?} not parseable, using defaults", raw);
                DEFAULT_TIMES.clone()
            }),
            Err(_) => DEFAULT_TIMES.clone(),
        };

        let window_secs = std::env::var("CONTEST_WINDOW_SECS")
            .ok()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_WINDOW_SECS);

        Self {
            timezone,
            daily_times,
            window_secs,
        }
    }

    pub fn local_now(&self) -> NaiveDateTime {
        time_utils::local_now(self.timezone)
    }

    pub fn local_today(&self) -> NaiveDate {
        time_utils::local_today(self.timezone)
    }

    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_secs)
    }

    pub fn is_contest_time(&self, time: NaiveTime) -> bool {
        self.daily_times.contains(&time)
    }

    /// Attempts are accepted in [start, start + window).
    pub fn is_within_window(&self, now: NaiveDateTime, date: NaiveDate, time: NaiveTime) -> bool {
        let start = date.and_time(time);
        now >= start && now < start + self.window()
    }

    pub fn window_closed(&self, now: NaiveDateTime, date: NaiveDate, time: NaiveTime) -> bool {
        now >= date.and_time(time) + self.window()
    }

    /// Lazy expiry: an unclaimed slot whose window has closed reads as
    /// EXPIRED regardless of what the row still says. A slot with a winner
    /// (or already closed) keeps its stored status.
    pub fn effective_status(&self, slot: &SlotRow, now: NaiveDateTime) -> SlotStatus {
        if slot.status.is_closed() || slot.winner_id.is_some() {
            return slot.status;
        }
        if self.window_closed(now, slot.slot_date, slot.slot_time) {
            SlotStatus::Expired
        } else {
            slot.status
        }
    }
}

pub fn parse_times(raw: &str) -> Option<Vec<NaiveTime>> {
    let times: Vec<NaiveTime> = raw
        .split(',')
        .map(|piece| NaiveTime::parse_from_str(piece.trim(), "%H:%M").ok())
        .collect::<Option<Vec<_>>>()?;
    if times.is_empty() {
        return None;
    }
    Some(times)
}

/// Idempotent create-or-fetch keyed on (date, time). Under concurrent callers
/// exactly one insert succeeds; every loser re-fetches and never errors.
pub async fn ensure_slot(
    pool: &PgPool,
    config: &ContestConfig,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<SlotRow, ContestError> {
    if !config.is_contest_time(time) {
        return Err(ContestError::Validation(format!(
            "{} is not a contest time",
            time.format("%H:%M")
        )));
    }
    db::insert_slot_if_absent(pool, date, time).await?;
    db::get_slot_by_key(pool, date, time)
        .await?
        .ok_or(ContestError::SlotNotFound)
}

/// Materialize all of a date's slots. Used by the read path so dashboards
/// always see the full daily set, ordered by activation time.
pub async fn ensure_day(
    pool: &PgPool,
    config: &ContestConfig,
    date: NaiveDate,
) -> Result<Vec<SlotRow>, ContestError> {
    for time in &config.daily_times {
        db::insert_slot_if_absent(pool, date, *time).await?;
    }
    Ok(db::get_slots_for_date(pool, date).await?)
}

/// Persist a lazily-derived expiry and hand back the fresh row. The second
/// element reports whether this call performed the transition (the caller
/// publishes the expiry event exactly when it did).
pub async fn reconcile_slot(
    pool: &PgPool,
    config: &ContestConfig,
    slot: SlotRow,
    now: NaiveDateTime,
) -> Result<(SlotRow, bool), ContestError> {
    if config.effective_status(&slot, now) != SlotStatus::Expired
        || slot.status == SlotStatus::Expired
    {
        return Ok((slot, false));
    }
    // The guard inside the UPDATE loses gracefully to a concurrent winner
    // claim, so always re-read.
    let expired_now = db::expire_slot(pool, slot.id).await?;
    let fresh = db::get_slot(pool, slot.id)
        .await?
        .ok_or(ContestError::SlotNotFound)?;
    Ok((fresh, expired_now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn config() -> ContestConfig {
        ContestConfig {
            timezone: Tz::UTC,
            daily_times: DEFAULT_TIMES.clone(),
            window_secs: 90,
        }
    }

    fn slot(status: SlotStatus, winner: Option<Uuid>) -> SlotRow {
        SlotRow {
            id: Uuid::new_v4(),
            slot_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            slot_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            status,
            winner_id: winner,
            attempt_count: 0,
            started_at: None,
            ended_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let cfg = config();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        assert!(!cfg.is_within_window(at(8, 59, 59), date, nine));
        assert!(cfg.is_within_window(at(9, 0, 0), date, nine));
        assert!(cfg.is_within_window(at(9, 1, 29), date, nine));
        assert!(!cfg.is_within_window(at(9, 1, 30), date, nine));
        assert!(cfg.window_closed(at(9, 1, 30), date, nine));
        assert!(!cfg.window_closed(at(9, 1, 29), date, nine));
    }

    #[test]
    fn unclaimed_slot_reads_expired_after_window() {
        let cfg = config();
        let pending = slot(SlotStatus::Pending, None);
        assert_eq!(
            cfg.effective_status(&pending, at(8, 0, 0)),
            SlotStatus::Pending
        );
        assert_eq!(
            cfg.effective_status(&pending, at(9, 0, 30)),
            SlotStatus::Pending
        );
        assert_eq!(
            cfg.effective_status(&pending, at(10, 0, 0)),
            SlotStatus::Expired
        );

        let active = slot(SlotStatus::Active, None);
        assert_eq!(
            cfg.effective_status(&active, at(10, 0, 0)),
            SlotStatus::Expired
        );
    }

    #[test]
    fn claimed_or_closed_slots_keep_their_status() {
        let cfg = config();
        let completed = slot(SlotStatus::Completed, Some(Uuid::new_v4()));
        assert_eq!(
            cfg.effective_status(&completed, at(10, 0, 0)),
            SlotStatus::Completed
        );

        // Winner claimed but the status write is still racing ours.
        let claimed = slot(SlotStatus::Active, Some(Uuid::new_v4()));
        assert_eq!(
            cfg.effective_status(&claimed, at(10, 0, 0)),
            SlotStatus::Active
        );

        let expired = slot(SlotStatus::Expired, None);
        assert_eq!(
            cfg.effective_status(&expired, at(8, 0, 0)),
            SlotStatus::Expired
        );
    }

    #[test]
    fn parses_time_lists() {
        let times = parse_times("09:00,14:00,19:00").unwrap();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1], NaiveTime::from_hms_opt(14, 0, 0).unwrap());

        assert_eq!(parse_times(" 10:30 , 20:15 ").unwrap().len(), 2);
        assert!(parse_times("09:00,lunch").is_none());
        assert!(parse_times("").is_none());
    }
}
