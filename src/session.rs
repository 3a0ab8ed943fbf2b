//! Trading-session gate.
//!
//! Weekday sessions only. Exchange holidays are not modeled: on a public
//! holiday that falls on a weekday both markets report open, and the
//! collector simply records whatever (stale) prices the vendor serves.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::types::{CaptureTick, Market};

const fn hms(h: u32, m: u32) -> u32 {
    h * 3600 + m * 60
}

/// Half-open `[start, end)` windows, seconds from local midnight.
const A_SESSIONS: &[(u32, u32)] = &[(hms(9, 30), hms(11, 30)), (hms(13, 0), hms(15, 0))];
const H_SESSIONS: &[(u32, u32)] = &[(hms(9, 30), hms(12, 0)), (hms(13, 0), hms(16, 0))];

fn sessions(market: Market) -> &'static [(u32, u32)] {
    match market {
        Market::A => A_SESSIONS,
        Market::H => H_SESSIONS,
    }
}

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether `market` is trading at the given exchange-local wall-clock time.
pub fn is_open(market: Market, local: NaiveDateTime) -> bool {
    if !is_weekday(local.date()) {
        return false;
    }
    let secs = local.time().num_seconds_from_midnight();
    sessions(market)
        .iter()
        .any(|&(start, end)| secs >= start && secs < end)
}

/// Collection runs when either leg's market is open.
pub fn any_open(local: NaiveDateTime) -> bool {
    is_open(Market::A, local) || is_open(Market::H, local)
}

/// Converts UTC instants into exchange-local time before evaluating sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionEvaluator {
    tz: Tz,
}

impl SessionEvaluator {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.tz).naive_local()
    }

    pub fn is_open_at(&self, market: Market, now: DateTime<Utc>) -> bool {
        is_open(market, self.local(now))
    }

    pub fn any_open_at(&self, now: DateTime<Utc>) -> bool {
        any_open(self.local(now))
    }

    pub fn tick(&self, now: DateTime<Utc>) -> CaptureTick {
        CaptureTick {
            captured_at: now,
            trade_date: self.local(now).date(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn a_market_opening_bell() {
        // 2024-01-01 is a Monday.
        assert!(!is_open(Market::A, at(2024, 1, 1, 9, 29, 59)));
        assert!(is_open(Market::A, at(2024, 1, 1, 9, 30, 0)));
        assert!(is_open(Market::A, at(2024, 1, 1, 9, 30, 1)));
    }

    #[test]
    fn weekend_is_closed() {
        // 2024-01-06 is a Saturday, 2024-01-07 a Sunday.
        assert!(!is_open(Market::A, at(2024, 1, 6, 10, 0, 0)));
        assert!(!is_open(Market::H, at(2024, 1, 6, 10, 0, 0)));
        assert!(!is_open(Market::H, at(2024, 1, 7, 14, 0, 0)));
    }

    #[test]
    fn lunch_break_and_close_are_exclusive() {
        let mon = |h, m| at(2024, 1, 1, h, m, 0);
        assert!(is_open(Market::A, at(2024, 1, 1, 11, 29, 59)));
        assert!(!is_open(Market::A, mon(11, 30)));
        assert!(!is_open(Market::A, mon(12, 59)));
        assert!(is_open(Market::A, mon(13, 0)));
        assert!(!is_open(Market::A, mon(15, 0)));
    }

    #[test]
    fn h_market_trades_longer() {
        let mon = |h, m| at(2024, 1, 1, h, m, 0);
        assert!(is_open(Market::H, mon(11, 45)));
        assert!(!is_open(Market::H, mon(12, 0)));
        assert!(is_open(Market::H, mon(15, 30)));
        assert!(!is_open(Market::H, mon(16, 0)));
    }

    #[test]
    fn gate_is_either_market() {
        // Only H is open at 15:30 and 11:45.
        assert!(any_open(at(2024, 1, 2, 15, 30, 0)));
        assert!(any_open(at(2024, 1, 2, 11, 45, 0)));
        assert!(!any_open(at(2024, 1, 2, 12, 30, 0)));
        assert!(!any_open(at(2024, 1, 2, 16, 0, 0)));
    }

    #[test]
    fn evaluator_converts_from_utc() {
        let eval = SessionEvaluator::new(chrono_tz::Asia::Shanghai);
        // 01:30 UTC = 09:30 Shanghai.
        let open = Utc.with_ymd_and_hms(2024, 1, 2, 1, 30, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 2, 1, 29, 59).unwrap();
        assert!(eval.is_open_at(Market::A, open));
        assert!(!eval.is_open_at(Market::A, before));
    }

    #[test]
    fn tick_uses_local_trade_date() {
        let eval = SessionEvaluator::new(chrono_tz::Asia::Shanghai);
        // 17:00 UTC on Jan 1 is already Jan 2 in Shanghai.
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 17, 0, 0).unwrap();
        let tick = eval.tick(now);
        assert_eq!(tick.trade_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(tick.captured_at, now);
    }
}
