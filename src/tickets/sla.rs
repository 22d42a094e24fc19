//! SLA window calculation.
//!
//! Given a total duration and green/yellow/red tier weights, produces the
//! three absolute boundaries (green end, yellow end, deadline) from a start
//! instant. Weights are normalized so they always sum to 1; the deadline is
//! exactly `start + total`, so `green <= yellow <= deadline` holds for any
//! non-negative weights.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DEFAULT_GREEN_PCT: f64 = 0.6;
pub const DEFAULT_YELLOW_PCT: f64 = 0.3;
pub const DEFAULT_RED_PCT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlaWindow {
    pub total_minutos: i32,
    pub start_at: DateTime<Utc>,
    pub green_end_at: DateTime<Utc>,
    pub yellow_end_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
}

/// Normalizes the three tier weights to sum to 1.0. A zero (or negative)
/// sum falls back to treating the sum as 1.0, which keeps the division
/// defined and the deadline exact.
fn normalize(green: f64, yellow: f64, red: f64) -> (f64, f64) {
    let sum = green + yellow + red;
    let sum = if sum > 0.0 { sum } else { 1.0 };
    (green / sum, yellow / sum)
}

pub fn compute_window(
    start: DateTime<Utc>,
    total_minutos: i32,
    green_pct: Option<f64>,
    yellow_pct: Option<f64>,
    red_pct: Option<f64>,
) -> SlaWindow {
    let gp = green_pct.unwrap_or(DEFAULT_GREEN_PCT);
    let yp = yellow_pct.unwrap_or(DEFAULT_YELLOW_PCT);
    let rp = red_pct.unwrap_or(DEFAULT_RED_PCT);
    let (green, yellow) = normalize(gp, yp, rp);

    let total = f64::from(total_minutos);
    let green_min = (total * green).round() as i64;
    let yellow_min = (total * (green + yellow)).round() as i64;

    SlaWindow {
        total_minutos,
        start_at: start,
        green_end_at: start + Duration::minutes(green_min),
        yellow_end_at: start + Duration::minutes(yellow_min),
        deadline_at: start + Duration::minutes(i64::from(total_minutos)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 4, 8, 0, 0).unwrap()
    }

    #[test]
    fn two_days_default_weights() {
        let w = compute_window(start(), 2880, None, None, None);
        assert_eq!(w.total_minutos, 2880);
        assert_eq!(w.green_end_at, start() + Duration::minutes(1728));
        assert_eq!(w.yellow_end_at, start() + Duration::minutes(2592));
        assert_eq!(w.deadline_at, start() + Duration::minutes(2880));
    }

    #[test]
    fn weights_are_normalized() {
        // 1.2/0.6/0.2 normalizes to 0.6/0.3/0.1.
        let w = compute_window(start(), 1000, Some(1.2), Some(0.6), Some(0.2));
        assert_eq!(w.green_end_at, start() + Duration::minutes(600));
        assert_eq!(w.yellow_end_at, start() + Duration::minutes(900));
        assert_eq!(w.deadline_at, start() + Duration::minutes(1000));
    }

    #[test]
    fn zero_weight_sum_does_not_divide_by_zero() {
        let w = compute_window(start(), 1440, Some(0.0), Some(0.0), Some(0.0));
        assert_eq!(w.green_end_at, start());
        assert_eq!(w.yellow_end_at, start());
        assert_eq!(w.deadline_at, start() + Duration::minutes(1440));
    }

    #[test]
    fn boundaries_are_monotonic_for_any_weights() {
        let cases = [
            (0.6, 0.3, 0.1),
            (0.1, 0.1, 0.8),
            (0.0, 1.0, 0.0),
            (1.0, 0.0, 0.0),
            (0.33, 0.33, 0.34),
            (5.0, 2.0, 3.0),
        ];
        for (g, y, r) in cases {
            for total in [1, 59, 60, 1440, 2880, 100_000] {
                let w = compute_window(start(), total, Some(g), Some(y), Some(r));
                assert!(w.green_end_at <= w.yellow_end_at, "{g}/{y}/{r} total {total}");
                assert!(w.yellow_end_at <= w.deadline_at, "{g}/{y}/{r} total {total}");
                assert_eq!(w.deadline_at, start() + Duration::minutes(i64::from(total)));
            }
        }
    }

    #[test]
    fn tier_durations_sum_to_total_within_rounding() {
        let w = compute_window(start(), 2880, Some(0.5), Some(0.25), Some(0.25));
        let green = (w.green_end_at - w.start_at).num_minutes();
        let yellow = (w.yellow_end_at - w.green_end_at).num_minutes();
        let red = (w.deadline_at - w.yellow_end_at).num_minutes();
        assert!((green + yellow + red - 2880).abs() <= 1);
    }
}
