use std::collections::BTreeMap;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditLogEntry, Frequency, Metric, MetricPeriod, ProgressionType,
};
use crate::progression;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewMetric {
    pub project: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub progression_type: ProgressionType,
    pub final_target: f64,
    pub amber_tolerance: f64,
    pub red_tolerance: f64,
}

async fn record_audit(
    pool: &PgPool,
    actor: &str,
    action: AuditAction,
    table_name: &str,
    record_id: Uuid,
    old_values: Option<Value>,
    new_values: Option<Value>,
    description: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO metric_tracker.audit_log
        (id, user_email, action, table_name, record_id, old_values, new_values, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(actor)
    .bind(action.as_str())
    .bind(table_name)
    .bind(record_id)
    .bind(old_values)
    .bind(new_values)
    .bind(description)
    .execute(pool)
    .await?;

    Ok(())
}

fn metric_values(metric: &Metric) -> Value {
    json!({
        "id": metric.id,
        "project_id": metric.project_id,
        "name": metric.name,
        "start_date": metric.start_date,
        "end_date": metric.end_date,
        "frequency": metric.frequency.as_str(),
        "progression_type": metric.progression_type.as_str(),
        "final_target": metric.final_target,
        "amber_tolerance": metric.amber_tolerance,
        "red_tolerance": metric.red_tolerance,
    })
}

fn period_values(period: &MetricPeriod) -> Value {
    json!({
        "id": period.id,
        "metric_id": period.metric_id,
        "reporting_date": period.reporting_date,
        "expected": period.expected,
        "target": period.target,
        "complete": period.complete,
        "commentary": period.commentary,
    })
}

async fn ensure_project(pool: &PgPool, actor: &str, name: &str) -> anyhow::Result<Uuid> {
    if let Some(row) = sqlx::query("SELECT id FROM metric_tracker.projects WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
    {
        return Ok(row.get("id"));
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO metric_tracker.projects (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    record_audit(
        pool,
        actor,
        AuditAction::Create,
        "projects",
        id,
        None,
        Some(json!({ "id": id, "name": name })),
        &format!("created project {name}"),
    )
    .await?;

    Ok(id)
}

/// Insert a metric and bulk-generate one period per reporting interval,
/// with expected values from the progression engine. Every inserted row
/// gets a CREATE audit entry.
pub async fn create_metric(
    pool: &PgPool,
    actor: &str,
    new: &NewMetric,
) -> anyhow::Result<(Uuid, usize)> {
    if new.end_date < new.start_date {
        bail!(
            "end date {} is before start date {}",
            new.end_date,
            new.start_date
        );
    }

    let existing = sqlx::query("SELECT id FROM metric_tracker.metrics WHERE name = $1")
        .bind(&new.name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        bail!("metric {} already exists", new.name);
    }

    let project_id = ensure_project(pool, actor, &new.project).await?;
    let metric = Metric {
        id: Uuid::new_v4(),
        project_id,
        name: new.name.clone(),
        start_date: new.start_date,
        end_date: new.end_date,
        frequency: new.frequency,
        progression_type: new.progression_type,
        final_target: new.final_target,
        amber_tolerance: new.amber_tolerance,
        red_tolerance: new.red_tolerance,
    };

    sqlx::query(
        r#"
        INSERT INTO metric_tracker.metrics
        (id, project_id, name, start_date, end_date, frequency, progression_type,
         final_target, amber_tolerance, red_tolerance)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(metric.id)
    .bind(metric.project_id)
    .bind(&metric.name)
    .bind(metric.start_date)
    .bind(metric.end_date)
    .bind(metric.frequency.as_str())
    .bind(metric.progression_type.as_str())
    .bind(metric.final_target)
    .bind(metric.amber_tolerance)
    .bind(metric.red_tolerance)
    .execute(pool)
    .await?;

    record_audit(
        pool,
        actor,
        AuditAction::Create,
        "metrics",
        metric.id,
        None,
        Some(metric_values(&metric)),
        &format!("created metric {}", metric.name),
    )
    .await?;

    let dates = progression::reporting_dates(new.start_date, new.end_date, new.frequency);
    let total = dates.len() as u32;

    for (index, reporting_date) in dates.iter().enumerate() {
        let expected = progression::compute_expected(
            new.progression_type,
            new.final_target,
            index as u32 + 1,
            total,
        );
        let period = MetricPeriod {
            id: Uuid::new_v4(),
            metric_id: metric.id,
            reporting_date: *reporting_date,
            expected,
            target: new.final_target,
            complete: 0.0,
            commentary: None,
        };

        sqlx::query(
            r#"
            INSERT INTO metric_tracker.metric_periods
            (id, metric_id, reporting_date, expected, target, complete, commentary)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(period.id)
        .bind(period.metric_id)
        .bind(period.reporting_date)
        .bind(period.expected)
        .bind(period.target)
        .bind(period.complete)
        .bind(&period.commentary)
        .execute(pool)
        .await?;

        record_audit(
            pool,
            actor,
            AuditAction::Create,
            "metric_periods",
            period.id,
            None,
            Some(period_values(&period)),
            &format!("generated period {} for {}", period.reporting_date, metric.name),
        )
        .await?;
    }

    Ok((metric.id, dates.len()))
}

fn metric_from_row(row: &PgRow) -> anyhow::Result<Metric> {
    Ok(Metric {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        frequency: Frequency::parse(row.get::<String, _>("frequency").as_str())?,
        progression_type: ProgressionType::parse(row.get::<String, _>("progression_type").as_str()),
        final_target: row.get("final_target"),
        amber_tolerance: row.get("amber_tolerance"),
        red_tolerance: row.get("red_tolerance"),
    })
}

fn period_from_row(row: &PgRow) -> MetricPeriod {
    MetricPeriod {
        id: row.get("id"),
        metric_id: row.get("metric_id"),
        reporting_date: row.get("reporting_date"),
        expected: row.get("expected"),
        target: row.get("target"),
        complete: row.get("complete"),
        commentary: row.get("commentary"),
    }
}

pub async fn fetch_metric(pool: &PgPool, name: &str) -> anyhow::Result<Metric> {
    let row = sqlx::query("SELECT * FROM metric_tracker.metrics WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no metric named {name}"))?;

    metric_from_row(&row)
}

pub async fn fetch_periods(pool: &PgPool, metric_id: Uuid) -> anyhow::Result<Vec<MetricPeriod>> {
    let rows = sqlx::query(
        "SELECT * FROM metric_tracker.metric_periods WHERE metric_id = $1 ORDER BY reporting_date",
    )
    .bind(metric_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(period_from_row).collect())
}

/// Field-level old/new diff for recording an actual, or None when the
/// stored values already match and nothing would change.
fn actual_diff(
    period: &MetricPeriod,
    complete: f64,
    commentary: Option<&str>,
) -> Option<(Map<String, Value>, Map<String, Value>)> {
    let mut old_values = Map::new();
    let mut new_values = Map::new();

    if (period.complete - complete).abs() > f64::EPSILON {
        old_values.insert("complete".to_string(), json!(period.complete));
        new_values.insert("complete".to_string(), json!(complete));
    }
    if let Some(text) = commentary {
        if period.commentary.as_deref() != Some(text) {
            old_values.insert("commentary".to_string(), json!(period.commentary));
            new_values.insert("commentary".to_string(), json!(text));
        }
    }

    if new_values.is_empty() {
        None
    } else {
        Some((old_values, new_values))
    }
}

/// Record an actual for one period, auditing the change as a field-level
/// old/new diff. Passing no commentary keeps the existing commentary.
/// Returns whether anything was written; unchanged values are a no-op.
pub async fn record_actual(
    pool: &PgPool,
    actor: &str,
    metric_name: &str,
    reporting_date: NaiveDate,
    complete: f64,
    commentary: Option<&str>,
) -> anyhow::Result<bool> {
    let metric = fetch_metric(pool, metric_name).await?;
    let row = sqlx::query(
        "SELECT * FROM metric_tracker.metric_periods WHERE metric_id = $1 AND reporting_date = $2",
    )
    .bind(metric.id)
    .bind(reporting_date)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("{metric_name} has no period reporting on {reporting_date}"))?;
    let period = period_from_row(&row);

    let Some((old_values, new_values)) = actual_diff(&period, complete, commentary) else {
        return Ok(false);
    };

    sqlx::query(
        r#"
        UPDATE metric_tracker.metric_periods
        SET complete = $1, commentary = COALESCE($2, commentary)
        WHERE id = $3
        "#,
    )
    .bind(complete)
    .bind(commentary)
    .bind(period.id)
    .execute(pool)
    .await?;

    record_audit(
        pool,
        actor,
        AuditAction::Update,
        "metric_periods",
        period.id,
        Some(Value::Object(old_values)),
        Some(Value::Object(new_values)),
        &format!("recorded actual for {metric_name} at {reporting_date}"),
    )
    .await?;

    Ok(true)
}

/// Scope change: update the metric's final target and re-derive target and
/// expected on periods dated after `effective`. Earlier periods keep the
/// scope they were generated under. Returns how many periods changed.
pub async fn set_final_target(
    pool: &PgPool,
    actor: &str,
    metric_name: &str,
    new_target: f64,
    effective: NaiveDate,
) -> anyhow::Result<usize> {
    let metric = fetch_metric(pool, metric_name).await?;
    if (metric.final_target - new_target).abs() < f64::EPSILON {
        return Ok(0);
    }

    sqlx::query("UPDATE metric_tracker.metrics SET final_target = $1 WHERE id = $2")
        .bind(new_target)
        .bind(metric.id)
        .execute(pool)
        .await?;

    record_audit(
        pool,
        actor,
        AuditAction::Update,
        "metrics",
        metric.id,
        Some(json!({ "final_target": metric.final_target })),
        Some(json!({ "final_target": new_target })),
        &format!("scope change for {metric_name}"),
    )
    .await?;

    let periods = fetch_periods(pool, metric.id).await?;
    let total = periods.len() as u32;
    let mut updated = 0usize;

    for (index, period) in periods.iter().enumerate() {
        let Some((expected, target)) = progression::rebaseline(
            metric.progression_type,
            new_target,
            period.reporting_date,
            effective,
            index as u32 + 1,
            total,
        ) else {
            continue;
        };
        if expected == period.expected && (period.target - target).abs() < f64::EPSILON {
            continue;
        }

        sqlx::query(
            "UPDATE metric_tracker.metric_periods SET expected = $1, target = $2 WHERE id = $3",
        )
        .bind(expected)
        .bind(target)
        .bind(period.id)
        .execute(pool)
        .await?;

        record_audit(
            pool,
            actor,
            AuditAction::Update,
            "metric_periods",
            period.id,
            Some(json!({ "expected": period.expected, "target": period.target })),
            Some(json!({ "expected": expected, "target": target })),
            &format!("rebaselined period {} for {metric_name}", period.reporting_date),
        )
        .await?;

        updated += 1;
    }

    Ok(updated)
}

/// Delete a metric (periods cascade). Each removed row is audited with its
/// full values so time travel can restore the pre-deletion state.
pub async fn delete_metric(pool: &PgPool, actor: &str, metric_name: &str) -> anyhow::Result<usize> {
    let metric = fetch_metric(pool, metric_name).await?;
    let periods = fetch_periods(pool, metric.id).await?;

    sqlx::query("DELETE FROM metric_tracker.metrics WHERE id = $1")
        .bind(metric.id)
        .execute(pool)
        .await?;

    for period in &periods {
        record_audit(
            pool,
            actor,
            AuditAction::Delete,
            "metric_periods",
            period.id,
            Some(period_values(period)),
            None,
            &format!("deleted period {} of {metric_name}", period.reporting_date),
        )
        .await?;
    }

    record_audit(
        pool,
        actor,
        AuditAction::Delete,
        "metrics",
        metric.id,
        Some(metric_values(&metric)),
        None,
        &format!("deleted metric {metric_name}"),
    )
    .await?;

    Ok(periods.len())
}

/// Audit entries for a table, optionally narrowed to one record, ascending
/// by creation time as the reconstructor requires.
pub async fn fetch_audit_entries(
    pool: &PgPool,
    table_name: &str,
    record_id: Option<Uuid>,
) -> anyhow::Result<Vec<AuditLogEntry>> {
    let mut query = String::from(
        "SELECT id, user_email, action, table_name, record_id, old_values, new_values, \
         description, created_at \
         FROM metric_tracker.audit_log WHERE table_name = $1",
    );

    if record_id.is_some() {
        query.push_str(" AND record_id = $2");
    }
    query.push_str(" ORDER BY created_at, id");

    let mut rows = sqlx::query(&query).bind(table_name);
    if let Some(id) = record_id {
        rows = rows.bind(id);
    }

    let records = rows.fetch_all(pool).await?;
    let mut entries = Vec::new();

    for row in records {
        entries.push(AuditLogEntry {
            id: row.get("id"),
            user_email: row.get("user_email"),
            action: AuditAction::parse(row.get::<String, _>("action").as_str())?,
            table_name: row.get("table_name"),
            record_id: row.get("record_id"),
            old_values: row.get("old_values"),
            new_values: row.get("new_values"),
            description: row.get("description"),
            created_at: row.get("created_at"),
        });
    }

    Ok(entries)
}

/// Current row for an audited record as a field-value map, or None if the
/// record has been deleted.
pub async fn fetch_live_row(
    pool: &PgPool,
    table_name: &str,
    record_id: Uuid,
) -> anyhow::Result<Option<BTreeMap<String, Value>>> {
    let query = match table_name {
        "metrics" => "SELECT row_to_json(t) AS fields FROM metric_tracker.metrics t WHERE t.id = $1",
        "metric_periods" => {
            "SELECT row_to_json(t) AS fields FROM metric_tracker.metric_periods t WHERE t.id = $1"
        }
        other => bail!("time travel is not supported for table {other:?}"),
    };

    let Some(row) = sqlx::query(query)
        .bind(record_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    match row.get::<Value, _>("fields") {
        Value::Object(fields) => Ok(Some(fields.into_iter().collect())),
        other => bail!("row_to_json returned a non-object for {table_name}: {other}"),
    }
}

pub async fn seed(pool: &PgPool, actor: &str) -> anyhow::Result<()> {
    let metrics = vec![
        NewMetric {
            project: "Website Replatform".to_string(),
            name: "Pages Migrated".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 5).context("invalid date")?,
            end_date: NaiveDate::from_ymd_opt(2026, 3, 30).context("invalid date")?,
            frequency: Frequency::Weekly,
            progression_type: ProgressionType::Linear,
            final_target: 1200.0,
            amber_tolerance: 5.0,
            red_tolerance: 10.0,
        },
        NewMetric {
            project: "Website Replatform".to_string(),
            name: "Test Cases Passed".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).context("invalid date")?,
            end_date: NaiveDate::from_ymd_opt(2026, 12, 31).context("invalid date")?,
            frequency: Frequency::Monthly,
            progression_type: ProgressionType::SCurve,
            final_target: 4000.0,
            amber_tolerance: 10.0,
            red_tolerance: 20.0,
        },
        NewMetric {
            project: "Website Replatform".to_string(),
            name: "Integrations Live".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).context("invalid date")?,
            end_date: NaiveDate::from_ymd_opt(2027, 12, 31).context("invalid date")?,
            frequency: Frequency::Quarterly,
            progression_type: ProgressionType::Exponential,
            final_target: 24.0,
            amber_tolerance: 5.0,
            red_tolerance: 10.0,
        },
    ];

    // Guard each metric separately so a partially applied seed completes
    // on re-run. Recording the same actuals again is a no-op.
    for new in &metrics {
        let existing = sqlx::query("SELECT id FROM metric_tracker.metrics WHERE name = $1")
            .bind(&new.name)
            .fetch_optional(pool)
            .await?;
        if existing.is_none() {
            create_metric(pool, actor, new).await?;
        }
    }

    let actuals = vec![
        (
            "Pages Migrated",
            NaiveDate::from_ymd_opt(2026, 1, 12).context("invalid date")?,
            90.0,
            Some("Content freeze slipped a week"),
        ),
        (
            "Pages Migrated",
            NaiveDate::from_ymd_opt(2026, 1, 19).context("invalid date")?,
            150.0,
            Some("Two migration engineers out sick"),
        ),
        (
            "Pages Migrated",
            NaiveDate::from_ymd_opt(2026, 1, 26).context("invalid date")?,
            310.0,
            None,
        ),
        (
            "Test Cases Passed",
            NaiveDate::from_ymd_opt(2026, 2, 1).context("invalid date")?,
            60.0,
            Some("Regression suite still being ported"),
        ),
    ];

    for (metric_name, reporting_date, complete, commentary) in actuals {
        record_actual(pool, actor, metric_name, reporting_date, complete, commentary).await?;
    }

    Ok(())
}

pub async fn import_csv(
    pool: &PgPool,
    actor: &str,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        metric: String,
        reporting_date: NaiveDate,
        complete: f64,
        commentary: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let changed = record_actual(
            pool,
            actor,
            &row.metric,
            row.reporting_date,
            row.complete,
            row.commentary.as_deref(),
        )
        .await?;
        if changed {
            imported += 1;
        }
    }

    Ok(imported)
}

pub async fn export_csv(pool: &PgPool, out: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Serialize)]
    struct CsvRow<'a> {
        metric: &'a str,
        reporting_date: NaiveDate,
        expected: i64,
        target: f64,
        complete: f64,
        commentary: &'a str,
    }

    let rows = sqlx::query(
        "SELECT m.name, p.reporting_date, p.expected, p.target, p.complete, p.commentary \
         FROM metric_tracker.metric_periods p \
         JOIN metric_tracker.metrics m ON m.id = p.metric_id \
         ORDER BY m.name, p.reporting_date",
    )
    .fetch_all(pool)
    .await?;

    let mut writer = csv::Writer::from_path(out)?;
    for row in &rows {
        let name: String = row.get("name");
        let commentary: Option<String> = row.get("commentary");
        writer.serialize(CsvRow {
            metric: &name,
            reporting_date: row.get("reporting_date"),
            expected: row.get("expected"),
            target: row.get("target"),
            complete: row.get("complete"),
            commentary: commentary.as_deref().unwrap_or(""),
        })?;
    }
    writer.flush()?;

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_period(complete: f64, commentary: Option<&str>) -> MetricPeriod {
        MetricPeriod {
            id: Uuid::new_v4(),
            metric_id: Uuid::new_v4(),
            reporting_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            expected: 100,
            target: 400.0,
            complete,
            commentary: commentary.map(str::to_string),
        }
    }

    #[test]
    fn unchanged_actual_produces_no_diff() {
        let period = sample_period(90.0, Some("late"));
        assert!(actual_diff(&period, 90.0, Some("late")).is_none());
        assert!(actual_diff(&period, 90.0, None).is_none());
    }

    #[test]
    fn changed_actual_diffs_only_the_changed_fields() {
        let period = sample_period(90.0, Some("late"));
        let (old_values, new_values) = actual_diff(&period, 120.0, Some("late")).unwrap();
        assert_eq!(old_values.get("complete"), Some(&json!(90.0)));
        assert_eq!(new_values.get("complete"), Some(&json!(120.0)));
        assert!(new_values.get("commentary").is_none());
    }

    #[test]
    fn commentary_change_alone_is_a_diff() {
        let period = sample_period(90.0, None);
        let (old_values, new_values) = actual_diff(&period, 90.0, Some("caught up")).unwrap();
        assert_eq!(old_values.get("commentary"), Some(&json!(null)));
        assert_eq!(new_values.get("commentary"), Some(&json!("caught up")));
        assert!(new_values.get("complete").is_none());
    }
}
