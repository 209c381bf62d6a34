//! Record codec: JSON arrays of flat records, one array per record type.
//!
//! Two decoders are provided. `decode` is lenient and turns a structurally
//! invalid document into an empty list, so "empty" and "unreadable" look the
//! same to its callers. `try_decode` keeps the failure for callers that must
//! report it.

use tracing::{debug, warn};

use crate::error::BackupError;
use crate::records::BackupRecord;

/// Encode a list of records as a JSON array.
pub fn encode<T: BackupRecord>(records: &[T], pretty: bool) -> Result<String, BackupError> {
    let encoded = if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    };
    encoded.map_err(|e| {
        BackupError::format_with(format!("failed to encode {}", T::RECORD_TYPE), e)
    })
}

/// Decode a JSON array of records, reporting any structural failure.
pub fn try_decode<T: BackupRecord>(text: &str) -> Result<Vec<T>, BackupError> {
    let text = strip_bom(text);
    let records: Vec<T> = serde_json::from_str(text).map_err(|e| {
        BackupError::format_with(format!("invalid {} data", T::RECORD_TYPE), e)
    })?;
    debug!(record_type = %T::RECORD_TYPE, count = records.len(), "decoded records");
    Ok(records)
}

/// Decode a JSON array of records; an invalid document yields an empty list.
pub fn decode<T: BackupRecord>(text: &str) -> Vec<T> {
    match try_decode(text) {
        Ok(records) => records,
        Err(e) => {
            warn!(record_type = %T::RECORD_TYPE, error = %e, "discarding undecodable records");
            Vec::new()
        }
    }
}

/// Encode then decode `records` and report whether every field survived.
pub fn round_trips<T: BackupRecord>(records: &[T]) -> Result<bool, BackupError> {
    let encoded = encode(records, false)?;
    let decoded: Vec<T> = try_decode(&encoded)?;
    Ok(decoded.len() == records.len() && records.iter().all(|r| decoded.contains(r)))
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
