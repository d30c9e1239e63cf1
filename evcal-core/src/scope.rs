//! Date windows and named scope shortcuts.

use std::fmt;

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Inclusive range of calendar days.
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn unbounded() -> Self {
        DateWindow::default()
    }

    /// Window from `a` to `b`, swapping them when given in reverse.
    pub fn between(a: NaiveDate, b: NaiveDate) -> Self {
        DateWindow {
            start: Some(a.min(b)),
            end: Some(a.max(b)),
        }
    }

    pub fn day(date: NaiveDate) -> Self {
        DateWindow::between(date, date)
    }

    /// Build an explicit window from raw request values.
    ///
    /// Unparseable values are dropped. Returns None when neither bound
    /// survives, meaning "no explicit range was given".
    pub fn from_args(start: Option<&str>, end: Option<&str>) -> Option<Self> {
        let start = start.and_then(|s| parse_date(s).ok());
        let end = end.and_then(|s| parse_date(s).ok());

        match (start, end) {
            (None, None) => None,
            (Some(a), Some(b)) => Some(DateWindow::between(a, b)),
            (start, end) => Some(DateWindow { start, end }),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// True when the bounds exclude every day.
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(s), Some(e)) if s > e)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    /// True when [first, last] shares at least one day with this window.
    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        self.start.is_none_or(|s| last >= s) && self.end.is_none_or(|e| first <= e)
    }

    /// The days present in both windows.
    pub fn intersect(&self, other: &DateWindow) -> DateWindow {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        DateWindow { start, end }
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let start = self.start.map(|d| d.to_string()).unwrap_or_else(|| "..".into());
        let end = self.end.map(|d| d.to_string()).unwrap_or_else(|| "..".into());
        write!(f, "{}/{}", start, end)
    }
}

/// Parse YYYY-MM-DD
pub fn parse_date(s: &str) -> CalendarResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| CalendarError::InvalidDate(s.to_string()))
}

/// Shortcut names for common date windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedScope {
    Today,
    Tomorrow,
    ThisWeek,
    ThisWeekend,
    NextWeek,
    ThisMonth,
    NextMonth,
    Upcoming,
}

impl NamedScope {
    /// Parse a scope name. Unknown names are "no scope".
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let scope = match normalized.as_str() {
            "today" => NamedScope::Today,
            "tomorrow" => NamedScope::Tomorrow,
            "this-week" | "week" => NamedScope::ThisWeek,
            "this-weekend" | "weekend" => NamedScope::ThisWeekend,
            "next-week" => NamedScope::NextWeek,
            "this-month" | "month" => NamedScope::ThisMonth,
            "next-month" => NamedScope::NextMonth,
            "upcoming" => NamedScope::Upcoming,
            _ => return None,
        };
        Some(scope)
    }

    /// The window this scope covers as seen from `today`.
    pub fn window(self, today: NaiveDate) -> DateWindow {
        match self {
            NamedScope::Today => DateWindow::day(today),
            NamedScope::Tomorrow => DateWindow::day(today + Duration::days(1)),
            NamedScope::ThisWeek => DateWindow::between(today, end_of_week(today)),
            NamedScope::ThisWeekend => {
                let sunday = end_of_week(today);
                let friday = sunday - Duration::days(2);
                DateWindow::between(friday.max(today), sunday)
            }
            NamedScope::NextWeek => {
                let monday = end_of_week(today) + Duration::days(1);
                DateWindow::between(monday, monday + Duration::days(6))
            }
            NamedScope::ThisMonth => DateWindow::between(today, end_of_month(today)),
            NamedScope::NextMonth => {
                let first = first_of_month(today)
                    .checked_add_months(Months::new(1))
                    .unwrap_or(today);
                DateWindow::between(first, end_of_month(first))
            }
            NamedScope::Upcoming => DateWindow::unbounded(),
        }
    }
}

fn end_of_week(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = Weekday::Sun.num_days_from_monday() - date.weekday().num_days_from_monday();
    date + Duration::days(i64::from(days_to_sunday))
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn end_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // 2026-01-14 is a Wednesday
    const WED: (i32, u32, u32) = (2026, 1, 14);

    #[test]
    fn test_weekend_scope_from_midweek() {
        let today = date(WED.0, WED.1, WED.2);
        let window = NamedScope::ThisWeekend.window(today);
        assert_eq!(window, DateWindow::between(date(2026, 1, 16), date(2026, 1, 18)));
    }

    #[test]
    fn test_weekend_scope_on_saturday_starts_today() {
        let window = NamedScope::ThisWeekend.window(date(2026, 1, 17));
        assert_eq!(window, DateWindow::between(date(2026, 1, 17), date(2026, 1, 18)));
    }

    #[test]
    fn test_next_week_and_month_scopes() {
        let today = date(WED.0, WED.1, WED.2);
        assert_eq!(
            NamedScope::NextWeek.window(today),
            DateWindow::between(date(2026, 1, 19), date(2026, 1, 25))
        );
        assert_eq!(
            NamedScope::ThisMonth.window(today),
            DateWindow::between(today, date(2026, 1, 31))
        );
        assert_eq!(
            NamedScope::NextMonth.window(today),
            DateWindow::between(date(2026, 2, 1), date(2026, 2, 28))
        );
    }

    #[test]
    fn test_scope_parsing_is_lenient_and_unknown_is_none() {
        assert_eq!(NamedScope::parse("This_Weekend"), Some(NamedScope::ThisWeekend));
        assert_eq!(NamedScope::parse(" next week "), Some(NamedScope::NextWeek));
        assert_eq!(NamedScope::parse("someday"), None);
        assert_eq!(NamedScope::parse(""), None);
    }

    #[test]
    fn test_explicit_window_from_args() {
        assert_eq!(DateWindow::from_args(None, None), None);
        assert_eq!(DateWindow::from_args(Some("garbage"), None), None);
        assert_eq!(
            DateWindow::from_args(Some("2026-03-10"), Some("2026-03-01")),
            Some(DateWindow::between(date(2026, 3, 1), date(2026, 3, 10))),
            "inverted ranges are swapped"
        );
        assert_eq!(
            DateWindow::from_args(None, Some("2026-03-01")),
            Some(DateWindow {
                start: None,
                end: Some(date(2026, 3, 1))
            })
        );
    }

    #[test]
    fn test_intersect_and_overlap() {
        let a = DateWindow::between(date(2026, 1, 1), date(2026, 1, 10));
        let b = DateWindow {
            start: Some(date(2026, 1, 5)),
            end: None,
        };
        assert_eq!(a.intersect(&b), DateWindow::between(date(2026, 1, 5), date(2026, 1, 10)));
        assert!(a.overlaps(date(2025, 12, 30), date(2026, 1, 1)));
        assert!(!a.overlaps(date(2026, 1, 11), date(2026, 1, 12)));

        let disjoint = a.intersect(&DateWindow::day(date(2026, 2, 1)));
        assert!(disjoint.is_empty());
    }
}
