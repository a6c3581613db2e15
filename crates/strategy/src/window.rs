use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

/// Days and hours during which the market is evaluated.
///
/// All inputs are local to the configured time zone:
///
/// - Monday: `hour == 0` or `hour >= 3`
/// - Tuesday to Thursday: all day
/// - Friday: `00:00..=00:10` and `hour >= 3`; 00:11 to 02:59 stays closed
/// - Saturday, Sunday: closed
#[derive(Debug, Clone, Copy, Default)]
pub struct TradingWindowPolicy {
    /// Open unconditionally. Development and testing only.
    pub test_override: bool,
}

impl TradingWindowPolicy {
    pub fn new(test_override: bool) -> Self {
        Self { test_override }
    }

    pub fn is_trading_window(&self, day: Weekday, hour: u32, minute: u32) -> bool {
        if self.test_override {
            return true;
        }
        match day {
            Weekday::Mon => hour == 0 || hour >= 3,
            Weekday::Tue | Weekday::Wed | Weekday::Thu => true,
            Weekday::Fri => (hour == 0 && minute <= 10) || hour >= 3,
            Weekday::Sat | Weekday::Sun => false,
        }
    }

    /// Evaluate the policy for a timestamp already in the local zone.
    pub fn permits<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.is_trading_window(at.weekday(), at.hour(), at.minute())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use chrono_tz::Asia::Kolkata;

    use super::*;

    #[test]
    fn monday_skips_early_morning() {
        let p = TradingWindowPolicy::default();
        assert!(p.is_trading_window(Weekday::Mon, 0, 30));
        assert!(!p.is_trading_window(Weekday::Mon, 1, 30));
        assert!(!p.is_trading_window(Weekday::Mon, 2, 59));
        assert!(p.is_trading_window(Weekday::Mon, 3, 0));
        assert!(p.is_trading_window(Weekday::Mon, 23, 30));
    }

    #[test]
    fn friday_has_two_disjoint_ranges() {
        let p = TradingWindowPolicy::default();
        assert!(p.is_trading_window(Weekday::Fri, 0, 0));
        assert!(p.is_trading_window(Weekday::Fri, 0, 10));
        assert!(!p.is_trading_window(Weekday::Fri, 0, 11));
        assert!(!p.is_trading_window(Weekday::Fri, 0, 30));
        assert!(!p.is_trading_window(Weekday::Fri, 2, 30));
        assert!(p.is_trading_window(Weekday::Fri, 3, 30));
        assert!(p.is_trading_window(Weekday::Fri, 23, 59));
    }

    #[test]
    fn weekend_closed_unless_overridden() {
        let p = TradingWindowPolicy::default();
        assert!(!p.is_trading_window(Weekday::Sat, 12, 30));
        assert!(!p.is_trading_window(Weekday::Sun, 12, 30));

        let p = TradingWindowPolicy::new(true);
        assert!(p.is_trading_window(Weekday::Sat, 12, 30));
        assert!(p.is_trading_window(Weekday::Fri, 1, 30));
    }

    #[test]
    fn permits_uses_local_time() {
        let p = TradingWindowPolicy::default();
        // Friday 2024-05-03 20:00 UTC is Saturday 01:30 in Kolkata.
        let utc = Utc.with_ymd_and_hms(2024, 5, 3, 20, 0, 0).unwrap();
        assert!(p.permits(&utc));
        assert!(!p.permits(&utc.with_timezone(&Kolkata)));
    }
}
