//! The platform fee and settlement calculator.
//!
//! Pure functions with no store access, so the webhook handler and the fallback poller share one
//! code path and the same rounding behaviour.
use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use prc_common::MinorUnits;
use serde::{Deserialize, Serialize};

/// Western Indonesia Time. Asia/Jakarta has no daylight saving, so a fixed offset is exact.
const WIB_OFFSET_SECONDS: i32 = 7 * 3600;

/// A percent-plus-flat fee pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeRate {
    pub percent: f64,
    pub flat: MinorUnits,
}

impl FeeRate {
    pub fn new(percent: f64, flat: i64) -> Self {
        Self { percent, flat: MinorUnits::from(flat) }
    }
}

/// The weekday/weekend fee schedule. Selection is binary on the payment timestamp's calendar day
/// in Asia/Jakarta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub weekday: FeeRate,
    pub weekend: FeeRate,
}

impl FeeSchedule {
    pub fn rate_for(&self, payment_received: DateTime<Utc>) -> FeeRate {
        if is_weekend_wib(payment_received) {
            self.weekend
        } else {
            self.weekday
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub fee: MinorUnits,
    /// Gross minus fee, floored at zero.
    pub settlement: MinorUnits,
}

/// Whether the timestamp falls on a Saturday or Sunday in the Asia/Jakarta calendar.
/// Shifting the instant by the fixed offset gives the local calendar day directly.
pub fn is_weekend_wib(ts: DateTime<Utc>) -> bool {
    let local = ts + Duration::seconds(i64::from(WIB_OFFSET_SECONDS));
    matches!(local.weekday(), Weekday::Sat | Weekday::Sun)
}

/// `fee = round(gross * percent / 100) + flat`, `settlement = max(gross - fee, 0)`.
pub fn compute_fee(gross: MinorUnits, rate: FeeRate) -> FeeBreakdown {
    #[allow(clippy::cast_possible_truncation)]
    let percent_part = (gross.value() as f64 * rate.percent / 100.0).round() as i64;
    let fee = MinorUnits::from(percent_part) + rate.flat;
    let settlement = (gross - fee).or_zero();
    FeeBreakdown { fee, settlement }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn one_percent_weekday_scenario() {
        // gross 500, 1% + flat 0 -> fee 5, settlement 495
        let breakdown = compute_fee(MinorUnits::from(500), FeeRate::new(1.0, 0));
        assert_eq!(breakdown.fee, MinorUnits::from(5));
        assert_eq!(breakdown.settlement, MinorUnits::from(495));
    }

    #[test]
    fn fee_rounds_half_up_and_adds_flat() {
        // 2.5% of 101 = 2.525 -> 3, plus flat 10
        let breakdown = compute_fee(MinorUnits::from(101), FeeRate::new(2.5, 10));
        assert_eq!(breakdown.fee, MinorUnits::from(13));
        assert_eq!(breakdown.settlement, MinorUnits::from(88));
    }

    #[test]
    fn settlement_floors_at_zero() {
        let breakdown = compute_fee(MinorUnits::from(100), FeeRate::new(50.0, 100));
        assert_eq!(breakdown.fee, MinorUnits::from(150));
        assert_eq!(breakdown.settlement, MinorUnits::from(0));
    }

    #[test]
    fn weekend_boundary_in_jakarta() {
        // 2025-03-07 is a Friday. Friday 23:59 WIB == 16:59 UTC -> weekday
        let friday_night = Utc.with_ymd_and_hms(2025, 3, 7, 16, 59, 0).unwrap();
        assert!(!is_weekend_wib(friday_night));
        // Saturday 00:00 WIB == Friday 17:00 UTC -> weekend
        let saturday_midnight = Utc.with_ymd_and_hms(2025, 3, 7, 17, 0, 0).unwrap();
        assert!(is_weekend_wib(saturday_midnight));
        // Monday 00:00 WIB == Sunday 17:00 UTC -> weekday again
        let monday_midnight = Utc.with_ymd_and_hms(2025, 3, 9, 17, 0, 0).unwrap();
        assert!(!is_weekend_wib(monday_midnight));
    }

    #[test]
    fn schedule_selects_weekend_rate() {
        let schedule = FeeSchedule { weekday: FeeRate::new(1.0, 0), weekend: FeeRate::new(2.0, 50) };
        let saturday = Utc.with_ymd_and_hms(2025, 3, 8, 3, 0, 0).unwrap();
        assert_eq!(schedule.rate_for(saturday), schedule.weekend);
        let wednesday = Utc.with_ymd_and_hms(2025, 3, 5, 3, 0, 0).unwrap();
        assert_eq!(schedule.rate_for(wednesday), schedule.weekday);
    }
}
