use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{Metric, MetricPeriod};
use crate::variance::{self, Status};

#[derive(Debug, Clone)]
pub struct PeriodAssessment {
    pub reporting_date: NaiveDate,
    pub expected: i64,
    pub complete: f64,
    pub variance: f64,
    pub variance_percent: f64,
    pub status: Status,
    pub commentary: Option<String>,
}

/// Run the classifier over every period of a metric. Periods reporting
/// after `today` are future periods and come back green.
pub fn assess_periods(
    metric: &Metric,
    periods: &[MetricPeriod],
    today: NaiveDate,
) -> Vec<PeriodAssessment> {
    periods
        .iter()
        .map(|period| {
            let assessment = variance::classify(
                period.expected as f64,
                period.complete,
                metric.amber_tolerance,
                metric.red_tolerance,
                period.reporting_date <= today,
            );
            PeriodAssessment {
                reporting_date: period.reporting_date,
                expected: period.expected,
                complete: period.complete,
                variance: assessment.variance,
                variance_percent: assessment.variance_percent,
                status: assessment.status,
                commentary: period.commentary.clone(),
            }
        })
        .collect()
}

pub fn build_report(metric: &Metric, periods: &[MetricPeriod], today: NaiveDate) -> String {
    let assessments = assess_periods(metric, periods, today);

    let mut output = String::new();
    let _ = writeln!(output, "# Progress Report: {}", metric.name);
    let _ = writeln!(
        output,
        "{} curve, {} reporting, target {} ({} to {})",
        metric.progression_type.as_str(),
        metric.frequency.as_str(),
        metric.final_target,
        metric.start_date,
        metric.end_date
    );
    let _ = writeln!(output, "Generated {today}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Period Status");

    if assessments.is_empty() {
        let _ = writeln!(output, "No periods generated for this metric.");
    } else {
        let _ = writeln!(
            output,
            "| Reporting date | Expected | Complete | Variance | Variance % | Status |"
        );
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- |");
        for line in assessments.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {:+.1} | {:.1}% | {} |",
                line.reporting_date,
                line.expected,
                line.complete,
                line.variance,
                line.variance_percent,
                line.status
            );
        }
    }

    let flagged: Vec<&PeriodAssessment> = assessments
        .iter()
        .filter(|line| line.status != Status::Green)
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Flagged Periods");

    if flagged.is_empty() {
        let _ = writeln!(output, "No periods behind tolerance.");
    } else {
        for line in flagged {
            let _ = writeln!(
                output,
                "- {}: {} behind plan ({:.1}% variance, {})",
                line.reporting_date,
                line.variance.abs(),
                line.variance_percent,
                line.status
            );
        }
    }

    let noted: Vec<&PeriodAssessment> = assessments
        .iter()
        .filter(|line| line.commentary.is_some())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Commentary");

    if noted.is_empty() {
        let _ = writeln!(output, "No commentary recorded.");
    } else {
        for line in noted {
            let _ = writeln!(
                output,
                "- {}: {}",
                line.reporting_date,
                line.commentary.as_deref().unwrap_or("")
            );
        }
    }

    output
}
