//! Calendar arithmetic for the activity tracker and the daily quote.
//!
//! Everything here is pure so it can be tested without a clock or a
//! database; callers pass "today" in explicitly.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::db::models::ActivityDay;

/// Calendar date at `now` in the site time zone.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Today's date in the site time zone.
pub fn today(offset: FixedOffset) -> NaiveDate {
    local_date(Utc::now(), offset)
}

/// Time until the next local midnight (always > 0).
pub fn until_next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> std::time::Duration {
    let local = now.with_timezone(&offset);
    let next_day = local.date_naive() + Duration::days(1);
    let midnight = next_day
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(offset).single())
        .map(|dt| dt.with_timezone(&Utc));

    match midnight {
        Some(m) if m > now => (m - now).to_std().unwrap_or(std::time::Duration::from_secs(1)),
        _ => std::time::Duration::from_secs(24 * 3600),
    }
}

/// Index of the quote shown on `date`, for `count` quotes ordered by id.
/// Returns `None` when there are no quotes.
pub fn daily_quote_index(date: NaiveDate, count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    // ordinal() is 1-based
    Some((date.ordinal() as usize - 1) % count)
}

/// First day of the month and first day of the following month.
/// `month` is 1-12.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

/// Consecutive active days ending on `today`. Zero when today is not active.
pub fn current_streak(active: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while active.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Longest run of consecutive active days inside the given month.
pub fn longest_streak_in_month(active: &BTreeSet<NaiveDate>, year: i32, month: u32) -> u32 {
    let Some((start, end)) = month_bounds(year, month) else {
        return 0;
    };

    let mut longest = 0;
    let mut run = 0;
    let mut day = start;
    while day < end {
        if active.contains(&day) {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
        day += Duration::days(1);
    }
    longest
}

/// Active dates from activity rows.
pub fn active_dates<'a>(rows: impl IntoIterator<Item = &'a ActivityDay>) -> BTreeSet<NaiveDate> {
    rows.into_iter()
        .filter(|r| r.active)
        .map(|r| r.date)
        .collect()
}

/// `date,active` CSV with `1`/`0` flags, rows joined by newlines.
pub fn activity_csv(rows: &[ActivityDay]) -> String {
    let mut csv = String::from("date,active\n");
    let lines: Vec<String> = rows
        .iter()
        .map(|r| format!("{},{}", r.date.format("%Y-%m-%d"), if r.active { '1' } else { '0' }))
        .collect();
    csv.push_str(&lines.join("\n"));
    csv
}

pub fn csv_filename(year: i32, month: u32) -> String {
    format!("activity_{}-{:02}.csv", year, month)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sgt() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn test_local_date_crosses_midnight_in_offset() {
        // 16:30 UTC is 00:30 the next day at +08:00
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 16, 30, 0).unwrap();
        assert_eq!(local_date(now, sgt()), d(2024, 3, 10));
        assert_eq!(local_date(now, FixedOffset::east_opt(0).unwrap()), d(2024, 3, 9));
    }

    #[test]
    fn test_until_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap(); // 23:00 local
        assert_eq!(until_next_midnight(now, sgt()).as_secs(), 3600);
    }

    #[test]
    fn test_daily_quote_index_is_deterministic() {
        assert_eq!(daily_quote_index(d(2024, 1, 1), 10), Some(0));
        assert_eq!(daily_quote_index(d(2024, 1, 11), 10), Some(0));
        assert_eq!(daily_quote_index(d(2024, 2, 1), 10), Some(1)); // day 32
        assert_eq!(daily_quote_index(d(2024, 12, 31), 7), Some(365 % 7));
        assert_eq!(daily_quote_index(d(2024, 5, 5), 0), None);
        assert_eq!(
            daily_quote_index(d(2023, 6, 1), 3),
            daily_quote_index(d(2023, 6, 1), 3)
        );
    }

    #[test]
    fn test_month_bounds_handles_december() {
        assert_eq!(month_bounds(2024, 2), Some((d(2024, 2, 1), d(2024, 3, 1))));
        assert_eq!(month_bounds(2024, 12), Some((d(2024, 12, 1), d(2025, 1, 1))));
        assert_eq!(month_bounds(2024, 13), None);
        assert_eq!(month_bounds(2024, 0), None);
    }

    #[test]
    fn test_current_streak_counts_back_from_today() {
        let active: BTreeSet<_> = [d(2024, 2, 27), d(2024, 2, 28), d(2024, 2, 29), d(2024, 3, 1)]
            .into_iter()
            .collect();
        assert_eq!(current_streak(&active, d(2024, 3, 1)), 4);
        assert_eq!(current_streak(&active, d(2024, 3, 2)), 0);
        assert_eq!(current_streak(&BTreeSet::new(), d(2024, 3, 2)), 0);
    }

    #[test]
    fn test_longest_streak_in_month() {
        let active: BTreeSet<_> = [
            d(2024, 4, 30), // previous month, ignored
            d(2024, 5, 1),
            d(2024, 5, 2),
            d(2024, 5, 10),
            d(2024, 5, 11),
            d(2024, 5, 12),
            d(2024, 5, 31),
            d(2024, 6, 1), // next month, ignored
        ]
        .into_iter()
        .collect();
        assert_eq!(longest_streak_in_month(&active, 2024, 5), 3);
        assert_eq!(longest_streak_in_month(&active, 2024, 7), 0);
    }

    #[test]
    fn test_activity_csv_format() {
        let rows = vec![
            ActivityDay { date: d(2024, 5, 1), active: true },
            ActivityDay { date: d(2024, 5, 2), active: false },
        ];
        assert_eq!(activity_csv(&rows), "date,active\n2024-05-01,1\n2024-05-02,0");
        assert_eq!(activity_csv(&[]), "date,active\n");
        assert_eq!(csv_filename(2024, 5), "activity_2024-05.csv");
    }

    #[test]
    fn test_active_dates_filters_inactive() {
        let rows = vec![
            ActivityDay { date: d(2024, 5, 1), active: true },
            ActivityDay { date: d(2024, 5, 2), active: false },
        ];
        let set = active_dates(&rows);
        assert!(set.contains(&d(2024, 5, 1)));
        assert!(!set.contains(&d(2024, 5, 2)));
    }
}
