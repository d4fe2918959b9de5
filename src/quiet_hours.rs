//! Quiet-hours window for bot-initiated messages.

use chrono::{NaiveTime, Timelike};

use crate::error::ConfigError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Time-of-day window, minute resolution. `end` may be `24:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: u32,
    end: u32,
}

impl QuietHours {
    pub fn parse(start: &str, end: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            start: parse_minutes(start)?,
            end: parse_minutes(end)?,
        })
    }

    /// Whether `time` falls inside the window. A window whose start is after
    /// its end wraps past midnight.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = time.hour() * 60 + time.minute();
        if self.start <= self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

fn parse_minutes(value: &str) -> Result<u32, ConfigError> {
    let invalid = || ConfigError::InvalidTime(value.to_string());
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 24 || minutes >= 60 {
        return Err(invalid());
    }

    let total = hours * 60 + minutes;
    if total > MINUTES_PER_DAY {
        return Err(invalid());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn whole_day_window() {
        let quiet = QuietHours::parse("00:00", "24:00").unwrap();
        assert!(quiet.contains(at(0, 0)));
        assert!(quiet.contains(at(12, 30)));
        assert!(quiet.contains(NaiveTime::from_hms_opt(23, 59, 59).unwrap()));
    }

    #[test]
    fn daytime_window() {
        let quiet = QuietHours::parse("09:00", "17:30").unwrap();
        assert!(!quiet.contains(at(8, 59)));
        assert!(quiet.contains(at(9, 0)));
        assert!(quiet.contains(at(17, 29)));
        assert!(!quiet.contains(at(17, 30)));
    }

    #[test]
    fn window_wrapping_midnight() {
        let quiet = QuietHours::parse("23:00", "07:00").unwrap();
        assert!(quiet.contains(at(23, 15)));
        assert!(quiet.contains(at(3, 0)));
        assert!(!quiet.contains(at(7, 0)));
        assert!(!quiet.contains(at(12, 0)));
    }

    #[test]
    fn equal_bounds_are_empty() {
        let quiet = QuietHours::parse("08:00", "08:00").unwrap();
        assert!(!quiet.contains(at(8, 0)));
    }

    #[test]
    fn rejects_bad_times() {
        for bad in ["", "8", "25:00", "24:01", "12:60", "ab:cd", "99999999:00", "00:4294967295"] {
            assert!(QuietHours::parse(bad, "10:00").is_err(), "{bad:?} accepted");
        }
    }
}
