//! Structural record type detection for files that carry no type tag.
//!
//! The first element of the array is matched against an ordered table of
//! required field sets. The first matching row wins, so table order is the
//! tie-break rule.

use serde_json::Value;

use crate::model::RecordType;

/// Required field sets, evaluated top to bottom.
pub const SIGNATURES: &[(&[&str], RecordType)] = &[
    (&["dueDate", "isCompleted", "priority"], RecordType::Tasks),
    (
        &["startTime", "durationMinutes", "sessionType"],
        RecordType::TimerSessions,
    ),
    (&["startTime", "endTime", "isAllDay"], RecordType::Events),
    (&["startDate", "endDate", "totalWeeks"], RecordType::Semesters),
    (
        &["name", "billingCycle", "startDate"],
        RecordType::Subscriptions,
    ),
    (&["semesterId", "dayOfWeek", "startPeriod"], RecordType::Courses),
    (&["title", "cycle"], RecordType::Routines),
    (&["key", "value"], RecordType::Preferences),
];

/// Infer the record type of a JSON array from its first element.
///
/// Returns `None` for invalid JSON, a non-array document, an empty array, or a
/// first element matching no signature.
pub fn classify(text: &str) -> Option<RecordType> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let document: Value = serde_json::from_str(text).ok()?;
    let first = document.as_array()?.first()?.as_object()?;

    SIGNATURES
        .iter()
        .find(|(fields, _)| fields.iter().all(|field| first.contains_key(*field)))
        .map(|(_, ty)| *ty)
}
