//! Edge-triggered tick detection: a periodicity is due exactly once per
//! wall-clock boundary it crosses. Missed ticks are never backfilled —
//! only the most recently crossed boundary is remembered.

use chrono::{DateTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Periodicity {
    Minute,
    Hour,
    Day,
}

impl Periodicity {
    /// Maps a plugin's capability task name to the periodicity it runs on.
    pub fn from_task_name(task_name: &str) -> Option<Self> {
        match task_name {
            "run_every_minute" => Some(Periodicity::Minute),
            "run_every_hour" => Some(Periodicity::Hour),
            "run_every_day" => Some(Periodicity::Day),
            _ => None,
        }
    }

    fn boundary(&self, at: DateTime<Utc>) -> i64 {
        match self {
            Periodicity::Minute => at.timestamp() / 60,
            Periodicity::Hour => at.timestamp() / 3_600,
            Periodicity::Day => at.timestamp() / 86_400,
        }
    }
}

/// Tracks the last boundary seen for each periodicity and reports which
/// ones are newly crossed on each call to `due`.
#[derive(Debug, Default)]
pub struct TickClock {
    last_minute: Option<i64>,
    last_hour: Option<i64>,
    last_day: Option<i64>,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every periodicity whose boundary `now` has newly crossed
    /// since the last call. The first call after construction always
    /// reports nothing due, so startup doesn't fire every periodicity at
    /// once.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<Periodicity> {
        let mut due = Vec::new();
        if crossed(&mut self.last_minute, Periodicity::Minute.boundary(now)) {
            due.push(Periodicity::Minute);
        }
        if crossed(&mut self.last_hour, Periodicity::Hour.boundary(now)) {
            due.push(Periodicity::Hour);
        }
        if crossed(&mut self.last_day, Periodicity::Day.boundary(now)) {
            due.push(Periodicity::Day);
        }
        due
    }
}

/// Updates `last` to `boundary`, returning true iff it had already been set
/// to a different value (i.e. this is not the first observation).
fn crossed(last: &mut Option<i64>, boundary: i64) -> bool {
    let previous = last.replace(boundary);
    matches!(previous, Some(prev) if prev != boundary)
}

/// Truncates `at` down to the start of its minute, for logging/debugging.
pub fn minute_floor(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn first_call_reports_nothing_due() {
        let mut clock = TickClock::new();
        let due = clock.due(at("2026-07-27T12:00:30Z"));
        assert!(!due.contains(&Periodicity::Minute));
    }

    #[test]
    fn minute_boundary_fires_once_per_minute() {
        let mut clock = TickClock::new();
        clock.due(at("2026-07-27T12:00:30Z"));
        let due = clock.due(at("2026-07-27T12:00:45Z"));
        assert!(!due.contains(&Periodicity::Minute));

        let due = clock.due(at("2026-07-27T12:01:01Z"));
        assert!(due.contains(&Periodicity::Minute));
    }

    #[test]
    fn missed_ticks_are_not_backfilled() {
        let mut clock = TickClock::new();
        clock.due(at("2026-07-27T12:00:00Z"));
        // Jump forward five minutes in one call; only one due report, not five.
        let due = clock.due(at("2026-07-27T12:05:00Z") + Duration::seconds(1));
        assert_eq!(due.iter().filter(|p| **p == Periodicity::Minute).count(), 1);
    }

    #[test]
    fn from_task_name_maps_known_names() {
        assert_eq!(Periodicity::from_task_name("run_every_hour"), Some(Periodicity::Hour));
        assert_eq!(Periodicity::from_task_name("nightly-report"), None);
    }
}
