use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

/// Rate-limit bookkeeping, persisted to `.cairn/state.json` between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_commit_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub daily_commit_count: u32,
    #[serde(default)]
    pub last_commit_date: Option<Date>,
}

/// Dual rate limit: a minimum interval between flushes and a cap on
/// flushes per UTC calendar day.
#[derive(Debug, Clone)]
pub struct CommitScheduler {
    interval: Duration,
    max_per_day: u32,
    state: SchedulerState,
}

impl CommitScheduler {
    pub fn new(interval: Duration, max_per_day: u32, state: SchedulerState) -> Self {
        Self {
            interval,
            max_per_day,
            state,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn daily_commit_count(&self) -> u32 {
        self.state.daily_commit_count
    }

    pub fn last_commit_at(&self) -> Option<OffsetDateTime> {
        self.state.last_commit_at
    }

    /// Reset the daily counter if `now` falls on a different date than the
    /// last recorded one. Returns true when a reset happened.
    pub fn roll_over(&mut self, now: OffsetDateTime) -> bool {
        let today = now.to_offset(time::UtcOffset::UTC).date();
        if self.state.last_commit_date == Some(today) {
            return false;
        }
        let reset = self.state.daily_commit_count != 0;
        self.state.daily_commit_count = 0;
        self.state.last_commit_date = Some(today);
        reset
    }

    pub fn interval_elapsed(&self, now: OffsetDateTime) -> bool {
        match self.state.last_commit_at {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    pub fn quota_available(&self) -> bool {
        self.state.daily_commit_count < self.max_per_day
    }

    /// Whether a buffer of `pending` records must flush now. The only side
    /// effect is the date rollover.
    pub fn should_commit(&mut self, pending: usize, now: OffsetDateTime) -> bool {
        self.roll_over(now);
        pending > 0 && self.interval_elapsed(now) && self.quota_available()
    }

    /// Like `should_commit` but ignores the interval; used when draining.
    pub fn may_force(&mut self, pending: usize, now: OffsetDateTime) -> bool {
        self.roll_over(now);
        pending > 0 && self.quota_available()
    }

    /// Account for one fully successful flush.
    pub fn record_commit(&mut self, now: OffsetDateTime) {
        self.roll_over(now);
        self.state.last_commit_at = Some(now);
        self.state.daily_commit_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn scheduler(interval_ms: i64, max: u32) -> CommitScheduler {
        CommitScheduler::new(
            Duration::milliseconds(interval_ms),
            max,
            SchedulerState::default(),
        )
    }

    #[test]
    fn empty_buffer_never_commits() {
        let mut s = scheduler(0, 10);
        let now = datetime!(2026-10-15 09:00:00 UTC);
        assert!(!s.should_commit(0, now));
        s.record_commit(now);
        assert!(!s.should_commit(0, now + Duration::days(3)));
    }

    #[test]
    fn first_commit_is_immediate() {
        let mut s = scheduler(60_000, 10);
        assert!(s.should_commit(1, datetime!(2026-10-15 09:00:00 UTC)));
    }

    #[test]
    fn interval_gates_commits() {
        let mut s = scheduler(60_000, 10);
        let t0 = datetime!(2026-10-15 09:00:00 UTC);
        s.record_commit(t0);
        assert!(!s.should_commit(5, t0 + Duration::seconds(59)));
        assert!(s.should_commit(5, t0 + Duration::seconds(60)));
    }

    #[test]
    fn daily_quota_caps_commits() {
        let mut s = scheduler(0, 2);
        let t0 = datetime!(2026-10-15 09:00:00 UTC);
        s.record_commit(t0);
        s.record_commit(t0 + Duration::minutes(1));
        assert_eq!(s.daily_commit_count(), 2);
        assert!(!s.should_commit(1, t0 + Duration::minutes(2)));
        assert!(!s.may_force(1, t0 + Duration::minutes(2)));
    }

    #[test]
    fn new_date_resets_count() {
        let mut s = scheduler(0, 1);
        let t0 = datetime!(2026-10-15 23:59:00 UTC);
        s.record_commit(t0);
        assert!(!s.should_commit(1, t0));

        let next_day = datetime!(2026-10-16 00:00:01 UTC);
        assert!(s.should_commit(1, next_day));
        assert_eq!(s.daily_commit_count(), 0);
        assert_eq!(
            s.state().last_commit_date,
            Some(time::macros::date!(2026 - 10 - 16))
        );
    }

    #[test]
    fn dates_are_utc() {
        let mut s = scheduler(0, 1);
        // 2026-10-15 23:30 in UTC, already the 16th in +02:00.
        let t0 = datetime!(2026-10-16 01:30:00 +02:00);
        s.record_commit(t0);
        assert_eq!(
            s.state().last_commit_date,
            Some(time::macros::date!(2026 - 10 - 15))
        );
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut s = scheduler(0, 5);
        s.record_commit(datetime!(2026-10-15 09:00:00 UTC));
        let json = serde_json::to_string(s.state()).unwrap();
        let back: SchedulerState = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, s.state());
        assert!(json.contains("2026-10-15"));
    }
}
