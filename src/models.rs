use anyhow::bail;
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Target curve shape for a metric. Unknown names fall back to linear
/// rather than failing, so stored rows with stale type names stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionType {
    Linear,
    SCurve,
    Exponential,
    Logarithmic,
}

impl ProgressionType {
    pub fn parse(value: &str) -> Self {
        match value {
            "s-curve" | "scurve" | "sigmoid" => ProgressionType::SCurve,
            "exponential" | "j-curve" => ProgressionType::Exponential,
            "logarithmic" | "log" => ProgressionType::Logarithmic,
            _ => ProgressionType::Linear,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressionType::Linear => "linear",
            ProgressionType::SCurve => "s-curve",
            ProgressionType::Exponential => "exponential",
            ProgressionType::Logarithmic => "logarithmic",
        }
    }
}

/// Reporting cadence for a metric's periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Weekly,
    Monthly,
    Quarterly,
}

impl Frequency {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            other => bail!("unknown frequency {other:?}, expected weekly, monthly, or quarterly"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
        }
    }

    /// Next reporting date after `date` at this cadence.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Frequency::Weekly => date.checked_add_days(Days::new(7)),
            Frequency::Monthly => date.checked_add_months(Months::new(1)),
            Frequency::Quarterly => date.checked_add_months(Months::new(3)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Metric {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub progression_type: ProgressionType,
    pub final_target: f64,
    pub amber_tolerance: f64,
    pub red_tolerance: f64,
}

#[derive(Debug, Clone)]
pub struct MetricPeriod {
    pub id: Uuid,
    pub metric_id: Uuid,
    pub reporting_date: NaiveDate,
    pub expected: i64,
    /// Scope in effect when this period was generated; diverges from the
    /// metric's current final_target after a scope change.
    pub target: f64,
    pub complete: f64,
    pub commentary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            other => bail!("unknown audit action {other:?}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

/// One row of the append-only audit log. `old_values` and `new_values` are
/// sparse field-level diffs; CREATE entries carry only `new_values`, DELETE
/// entries only `old_values` (the full row at deletion time).
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub user_email: String,
    pub action: AuditAction,
    pub table_name: String,
    pub record_id: Uuid,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
