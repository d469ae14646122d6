use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

/// Fixed UTC times of day at which a post goes out: every
/// `interval_minutes` starting at `start_hour:00`, stopping before
/// `end_hour:00`.
pub fn posting_slots(start_hour: u32, end_hour: u32, interval_minutes: u32) -> Vec<NaiveTime> {
    let interval = interval_minutes.max(1);
    let start = start_hour * 60;
    let end = end_hour.min(24) * 60;

    (start..end)
        .step_by(interval as usize)
        .filter_map(|minute| NaiveTime::from_hms_opt(minute / 60, minute % 60, 0))
        .collect()
}

/// The first slot strictly after `now`, rolling over to tomorrow's first
/// slot once today's are used up. `None` only when `slots` is empty.
pub fn next_slot(now: DateTime<Utc>, slots: &[NaiveTime]) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let later_today = slots
        .iter()
        .map(|t| today.and_time(*t).and_utc())
        .filter(|at| *at > now)
        .min();
    if later_today.is_some() {
        return later_today;
    }

    let tomorrow = today.checked_add_days(Days::new(1))?;
    slots.iter().min().map(|t| tomorrow.and_time(*t).and_utc())
}

/// Per-UTC-day post budget. Rolls over on the first use after midnight.
#[derive(Debug)]
pub struct DailyCounter {
    day: NaiveDate,
    count: u32,
    max: u32,
}

impl DailyCounter {
    pub fn new(max: u32, today: NaiveDate) -> Self {
        Self {
            day: today,
            count: 0,
            max,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            tracing::info!("Daily post counter reset ({} posts on {})", self.count, self.day);
            self.day = today;
            self.count = 0;
        }
    }

    /// Take one post from today's budget. Returns the new count, or `None`
    /// when the limit is already reached.
    pub fn try_reserve(&mut self, today: NaiveDate) -> Option<u32> {
        self.roll(today);
        if self.count >= self.max {
            return None;
        }
        self.count += 1;
        Some(self.count)
    }

    /// Give back a reservation whose post never went out.
    pub fn release(&mut self, today: NaiveDate) {
        if today == self.day {
            self.count = self.count.saturating_sub(1);
        }
    }

    pub fn count(&mut self, today: NaiveDate) -> u32 {
        self.roll(today);
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn default_window_gives_twenty_slots() {
        let slots = posting_slots(7, 21, 42);
        assert_eq!(slots.len(), 20);
        assert_eq!(slots[0], t(7, 0));
        assert_eq!(slots[1], t(7, 42));
        assert_eq!(slots[2], t(8, 24));
        assert_eq!(*slots.last().unwrap(), t(20, 18));
    }

    #[test]
    fn window_end_is_exclusive() {
        assert_eq!(posting_slots(7, 9, 60), vec![t(7, 0), t(8, 0)]);
        assert!(posting_slots(9, 9, 30).is_empty());
    }

    #[test]
    fn next_slot_later_today() {
        let slots = posting_slots(7, 21, 42);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 7, 42, 0).unwrap();
        assert_eq!(
            next_slot(now, &slots),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 24, 0).unwrap())
        );
    }

    #[test]
    fn next_slot_rolls_to_tomorrow() {
        let slots = posting_slots(7, 21, 42);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap();
        assert_eq!(
            next_slot(now, &slots),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 7, 0, 0).unwrap())
        );
        assert_eq!(next_slot(now, &[]), None);
    }

    #[test]
    fn counter_caps_and_resets_next_day() {
        let mut counter = DailyCounter::new(2, day(1));
        assert_eq!(counter.try_reserve(day(1)), Some(1));
        assert_eq!(counter.try_reserve(day(1)), Some(2));
        assert_eq!(counter.try_reserve(day(1)), None);
        assert_eq!(counter.count(day(1)), 2);

        assert_eq!(counter.count(day(2)), 0);
        assert_eq!(counter.try_reserve(day(2)), Some(1));
    }

    #[test]
    fn released_reservation_frees_budget() {
        let mut counter = DailyCounter::new(1, day(1));
        assert_eq!(counter.try_reserve(day(1)), Some(1));
        counter.release(day(1));
        assert_eq!(counter.try_reserve(day(1)), Some(1));
    }
}
