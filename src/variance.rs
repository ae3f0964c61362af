use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Green,
    Amber,
    Red,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Green => "green",
            Status::Amber => "amber",
            Status::Red => "red",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub variance: f64,
    pub variance_percent: f64,
    pub status: Status,
}

/// Classify one period against its expected value. Tolerances are
/// percentages from the metric's configuration. Only past-or-current
/// periods behind plan are ever flagged; future periods and ahead-of-plan
/// periods are always green.
pub fn classify(
    expected: f64,
    complete: f64,
    amber_tolerance: f64,
    red_tolerance: f64,
    is_past_or_current: bool,
) -> Assessment {
    let variance = complete - expected;
    let variance_percent = if expected > 0.0 {
        (variance / expected).abs() * 100.0
    } else {
        0.0
    };

    let status = if !is_past_or_current || variance >= 0.0 {
        Status::Green
    } else if variance_percent > red_tolerance {
        Status::Red
    } else if variance_percent > amber_tolerance {
        Status::Amber
    } else {
        Status::Green
    };

    Assessment {
        variance,
        variance_percent,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_behind_plan_is_red() {
        let assessment = classify(100.0, 85.0, 5.0, 10.0, true);
        assert_eq!(assessment.variance, -15.0);
        assert_eq!(assessment.variance_percent, 15.0);
        assert_eq!(assessment.status, Status::Red);
    }

    #[test]
    fn slightly_behind_within_tolerance_is_green() {
        let assessment = classify(100.0, 96.0, 5.0, 10.0, true);
        assert_eq!(assessment.variance_percent, 4.0);
        assert_eq!(assessment.status, Status::Green);
    }

    #[test]
    fn between_tolerances_is_amber() {
        let assessment = classify(100.0, 92.0, 5.0, 10.0, true);
        assert_eq!(assessment.status, Status::Amber);
    }

    #[test]
    fn tolerance_boundaries_are_exclusive() {
        // exactly at a tolerance does not cross it
        assert_eq!(classify(100.0, 95.0, 5.0, 10.0, true).status, Status::Green);
        assert_eq!(classify(100.0, 90.0, 5.0, 10.0, true).status, Status::Amber);
    }

    #[test]
    fn ahead_of_plan_is_never_flagged() {
        let assessment = classify(100.0, 110.0, 5.0, 10.0, true);
        assert_eq!(assessment.variance, 10.0);
        assert_eq!(assessment.status, Status::Green);
    }

    #[test]
    fn future_periods_are_never_flagged() {
        let assessment = classify(100.0, 0.0, 5.0, 10.0, false);
        assert_eq!(assessment.variance, -100.0);
        assert_eq!(assessment.status, Status::Green);
    }

    #[test]
    fn zero_expected_yields_zero_percent() {
        let assessment = classify(0.0, 0.0, 5.0, 10.0, true);
        assert_eq!(assessment.variance_percent, 0.0);
        assert_eq!(assessment.status, Status::Green);
    }
}
