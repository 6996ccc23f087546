//! Weekday calendar. Exchange holidays are not modelled.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First trading day strictly after `date`.
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_trading_day(next) {
        next += Duration::days(1);
    }
    next
}

/// Last trading day strictly before `date`.
pub fn prev_trading_day(date: NaiveDate) -> NaiveDate {
    let mut prev = date - Duration::days(1);
    while !is_trading_day(prev) {
        prev -= Duration::days(1);
    }
    prev
}
