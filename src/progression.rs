use std::f64::consts::E;

use chrono::NaiveDate;

use crate::models::{Frequency, ProgressionType};

/// Expected cumulative value at `period_index` of `total_periods` under the
/// given target curve. `period_index` is 1-based and callers guarantee
/// `1 <= period_index <= total_periods`; period generation always produces
/// at least one period, so `total_periods` is never zero here.
///
/// Rounding is half-up and applied once at the end so repeated lookups for
/// the same period never drift.
pub fn compute_expected(
    progression: ProgressionType,
    final_target: f64,
    period_index: u32,
    total_periods: u32,
) -> i64 {
    let ratio = f64::from(period_index) / f64::from(total_periods);
    let raw = match progression {
        ProgressionType::Linear => final_target * ratio,
        // Sigmoid centered on the midpoint: slow start, fast middle, slow end.
        ProgressionType::SCurve => final_target / (1.0 + (-10.0 * (ratio - 0.5)).exp()),
        // Accelerating growth, reaches the target exactly at the final period.
        ProgressionType::Exponential => final_target * ratio * ratio,
        // Fast start with diminishing returns; ln(e) = 1 at the final period.
        ProgressionType::Logarithmic => final_target * (ratio * (E - 1.0) + 1.0).ln(),
    };
    raw.round() as i64
}

/// Rebaseline decision for one period after a scope change: periods
/// reporting on or before `effective` keep the scope they were generated
/// under (None), later periods adopt the new target and a recomputed
/// expected value.
pub fn rebaseline(
    progression: ProgressionType,
    new_target: f64,
    reporting_date: NaiveDate,
    effective: NaiveDate,
    period_index: u32,
    total_periods: u32,
) -> Option<(i64, f64)> {
    if reporting_date <= effective {
        return None;
    }
    let expected = compute_expected(progression, new_target, period_index, total_periods);
    Some((expected, new_target))
}

/// Reporting dates for a metric between `start` and `end` at the given
/// cadence: one date per elapsed interval after `start`, never empty. A
/// range shorter than one interval collapses to a single period at `end`.
pub fn reporting_dates(start: NaiveDate, end: NaiveDate, frequency: Frequency) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut cursor = frequency.advance(start);

    while let Some(date) = cursor {
        if date > end {
            break;
        }
        dates.push(date);
        cursor = frequency.advance(date);
    }

    if dates.is_empty() {
        dates.push(end);
    }

    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn linear_is_proportional() {
        assert_eq!(compute_expected(ProgressionType::Linear, 1000.0, 5, 10), 500);
        assert_eq!(compute_expected(ProgressionType::Linear, 1000.0, 1, 10), 100);
        assert_eq!(compute_expected(ProgressionType::Linear, 100.0, 4, 4), 100);
    }

    #[test]
    fn s_curve_midpoint_is_half_target() {
        assert_eq!(compute_expected(ProgressionType::SCurve, 1000.0, 5, 10), 500);
    }

    #[test]
    fn s_curve_tail_values() {
        assert_eq!(compute_expected(ProgressionType::SCurve, 1000.0, 1, 10), 18);
        // 1000 / (1 + e^-5), the sigmoid never quite reaches the target
        assert_eq!(compute_expected(ProgressionType::SCurve, 1000.0, 10, 10), 993);
    }

    #[test]
    fn exponential_is_squared_ratio() {
        assert_eq!(compute_expected(ProgressionType::Exponential, 1000.0, 1, 10), 10);
        assert_eq!(compute_expected(ProgressionType::Exponential, 1000.0, 5, 10), 250);
        assert_eq!(compute_expected(ProgressionType::Exponential, 1000.0, 10, 10), 1000);
    }

    #[test]
    fn logarithmic_front_loads_progress() {
        assert_eq!(compute_expected(ProgressionType::Logarithmic, 1000.0, 1, 10), 159);
        assert_eq!(compute_expected(ProgressionType::Logarithmic, 1000.0, 5, 10), 620);
        assert_eq!(compute_expected(ProgressionType::Logarithmic, 1000.0, 10, 10), 1000);
    }

    #[test]
    fn all_curves_reach_target_at_final_period() {
        for progression in [
            ProgressionType::Linear,
            ProgressionType::Exponential,
            ProgressionType::Logarithmic,
        ] {
            assert_eq!(compute_expected(progression, 500.0, 8, 8), 500);
        }
        // sigmoid lands within 1% of target
        assert_eq!(compute_expected(ProgressionType::SCurve, 500.0, 8, 8), 497);
    }

    #[test]
    fn all_curves_are_non_decreasing() {
        for progression in [
            ProgressionType::Linear,
            ProgressionType::SCurve,
            ProgressionType::Exponential,
            ProgressionType::Logarithmic,
        ] {
            let mut previous = i64::MIN;
            for index in 1..=12 {
                let expected = compute_expected(progression, 1000.0, index, 12);
                assert!(
                    expected >= previous,
                    "{} decreased at period {index}: {expected} < {previous}",
                    progression.as_str()
                );
                previous = expected;
            }
        }
    }

    #[test]
    fn unknown_progression_name_falls_back_to_linear() {
        assert_eq!(ProgressionType::parse("bezier"), ProgressionType::Linear);
        assert_eq!(ProgressionType::parse("s-curve"), ProgressionType::SCurve);
    }

    #[test]
    fn rebaseline_keeps_periods_on_or_before_the_effective_date() {
        let effective = date(2026, 2, 1);
        // a 4-period linear metric whose target doubles to 200 mid-flight
        assert_eq!(
            rebaseline(ProgressionType::Linear, 200.0, date(2026, 1, 1), effective, 1, 4),
            None
        );
        assert_eq!(
            rebaseline(ProgressionType::Linear, 200.0, date(2026, 2, 1), effective, 2, 4),
            None
        );
        assert_eq!(
            rebaseline(ProgressionType::Linear, 200.0, date(2026, 3, 1), effective, 3, 4),
            Some((150, 200.0))
        );
        assert_eq!(
            rebaseline(ProgressionType::Linear, 200.0, date(2026, 4, 1), effective, 4, 4),
            Some((200, 200.0))
        );
    }

    #[test]
    fn weekly_dates_step_by_seven_days() {
        let dates = reporting_dates(date(2026, 1, 1), date(2026, 1, 31), Frequency::Weekly);
        assert_eq!(
            dates,
            vec![
                date(2026, 1, 8),
                date(2026, 1, 15),
                date(2026, 1, 22),
                date(2026, 1, 29),
            ]
        );
    }

    #[test]
    fn monthly_dates_cover_the_year() {
        let dates = reporting_dates(date(2026, 1, 1), date(2026, 12, 31), Frequency::Monthly);
        assert_eq!(dates.len(), 11);
        assert_eq!(dates[0], date(2026, 2, 1));
        assert_eq!(dates[10], date(2026, 12, 1));
    }

    #[test]
    fn quarterly_dates_step_by_three_months() {
        let dates = reporting_dates(date(2026, 1, 1), date(2026, 12, 31), Frequency::Quarterly);
        assert_eq!(
            dates,
            vec![date(2026, 4, 1), date(2026, 7, 1), date(2026, 10, 1)]
        );
    }

    #[test]
    fn short_range_yields_single_period_at_end() {
        let dates = reporting_dates(date(2026, 3, 2), date(2026, 3, 4), Frequency::Monthly);
        assert_eq!(dates, vec![date(2026, 3, 4)]);
    }
}
