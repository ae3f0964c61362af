use std::collections::BTreeMap;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::{AuditAction, AuditLogEntry};

pub type FieldValues = BTreeMap<String, Value>;

/// A record's state as of some past timestamp. Computed on demand from the
/// audit log; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// The record had not been created yet, or was already deleted.
    Absent,
    Present(FieldValues),
}

/// Reconstruct one record's field values as of `at`.
///
/// `live` is the record's current row (None if it has since been deleted)
/// and `entries` is every audit entry for the record, ascending by
/// `created_at`. Entries newer than `at` are undone from most recent
/// backwards: UPDATE entries re-apply their sparse `old_values`, a DELETE
/// restores the full row captured in its `old_values`, and undoing a CREATE
/// means the record did not exist yet. Entries at or before `at` stay
/// applied. With no history at all, the past state equals the live state.
pub fn reconstruct_at(
    live: Option<&FieldValues>,
    entries: &[AuditLogEntry],
    at: DateTime<Utc>,
) -> anyhow::Result<Snapshot> {
    let mut state: Option<FieldValues> = live.cloned();

    for entry in entries.iter().rev() {
        if entry.created_at <= at {
            break;
        }

        // Both diff columns must be well-formed before any part of the
        // entry is undone; a bad row is a data-integrity error either way.
        diff_fields(entry.old_values.as_ref(), "old_values", entry)?;
        diff_fields(entry.new_values.as_ref(), "new_values", entry)?;

        match entry.action {
            AuditAction::Create => {
                state = None;
            }
            AuditAction::Update => {
                if let Some(fields) = state.as_mut() {
                    if let Some(old) = diff_fields(entry.old_values.as_ref(), "old_values", entry)? {
                        for (field, value) in old {
                            fields.insert(field.clone(), value.clone());
                        }
                    }
                }
            }
            AuditAction::Delete => {
                let restored = diff_fields(entry.old_values.as_ref(), "old_values", entry)?
                    .map(|fields| {
                        fields
                            .iter()
                            .map(|(field, value)| (field.clone(), value.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                state = Some(restored);
            }
        }
    }

    Ok(match state {
        Some(fields) => Snapshot::Present(fields),
        None => Snapshot::Absent,
    })
}

/// Distinct timestamps at which any audited change occurred, ascending.
/// These are the discrete points a historical view can step through.
pub fn snapshot_points(entries: &[AuditLogEntry]) -> Vec<DateTime<Utc>> {
    let mut points: Vec<DateTime<Utc>> = entries.iter().map(|entry| entry.created_at).collect();
    points.sort();
    points.dedup();
    points
}

/// A diff column is either absent (sparse entry) or a JSON object. Anything
/// else would silently corrupt historical views, so it is a hard error.
fn diff_fields<'a>(
    value: Option<&'a Value>,
    column: &str,
    entry: &AuditLogEntry,
) -> anyhow::Result<Option<&'a Map<String, Value>>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(fields)) => Ok(Some(fields)),
        Some(other) => bail!(
            "audit entry {} has malformed {column}: expected a JSON object, got {other}",
            entry.id
        ),
    }
}
