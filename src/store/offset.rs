use std::io::ErrorKind;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Cursor value for a store with no records.
pub const NO_RECORDS: i64 = -1;

/// Parse the `update_id` from a `<digits>.<suffix>` file name.
pub fn parse_record_id(name: &str) -> Option<i64> {
    let (digits, suffix) = name.split_once('.')?;
    if digits.is_empty() || suffix.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok()
}

/// Highest `update_id` among record files in `dir`, or [`NO_RECORDS`].
///
/// Unrelated files and sub-directories are ignored; a missing directory is
/// an empty store.
pub fn recover_cursor(dir: &Path) -> Result<i64> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(NO_RECORDS),
        Err(e) => {
            return Err(SyncError::persistence(
                format!("Failed to list {}", dir.display()),
                e,
            ))
        }
    };

    let mut max_id = NO_RECORDS;
    for entry in entries {
        let entry = entry
            .map_err(|e| SyncError::persistence(format!("Failed to list {}", dir.display()), e))?;
        let file_type = entry.file_type().map_err(|e| {
            SyncError::persistence(format!("Failed to stat {}", entry.path().display()), e)
        })?;
        if file_type.is_dir() {
            continue;
        }
        if let Some(id) = entry.file_name().to_str().and_then(parse_record_id) {
            max_id = max_id.max(id);
        }
    }
    Ok(max_id)
}
