use chrono::{NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Parse the contest timezone from configuration text. The contest runs on
/// one authoritative wall clock; client clocks are never consulted.
pub fn parse_timezone(raw: &str) -> Option<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("gmt") {
        return Some(Tz::UTC);
    }
    trimmed.parse::<Tz>().ok()
}

/// Server time projected onto the contest wall clock.
pub fn local_now(tz: Tz) -> NaiveDateTime {
    Utc::now().with_timezone(&tz).naive_local()
}

pub fn local_today(tz: Tz) -> NaiveDate {
    local_now(tz).date()
}
