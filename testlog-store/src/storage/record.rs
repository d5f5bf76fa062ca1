//! Log Records
//!
//! `TigerStyle`: One write shape, one read shape, one timestamp format.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use crate::constants::{DATE_FORMAT, TIMESTAMP_FORMAT};

/// Identifier of a stored log record.
pub type LogId = i64;

/// Identifier of a project (the retention/lifecycle partition key).
pub type ProjectId = i64;

// =============================================================================
// LogInput
// =============================================================================

/// A log record as handed to `index_logs`.
///
/// `id` is optional: when present it is stored verbatim so a record can be
/// re-inserted after deletion with the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogInput {
    /// Explicit storage identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LogId>,
    /// Client-supplied correlation UUID
    pub uuid: String,
    /// When the log line was produced
    #[serde(with = "timestamp")]
    pub log_time: NaiveDateTime,
    /// Free-text message
    pub log_message: String,
    /// Owning test item
    pub item_id: i64,
    /// Owning launch
    pub launch_id: i64,
    /// Last modification time
    #[serde(with = "timestamp")]
    pub last_modified: NaiveDateTime,
    /// Severity code (20000 = trace ... 50000 = error)
    pub log_level: i32,
    /// Optional attachment
    #[serde(default)]
    pub attachment_id: Option<i64>,
}

impl LogInput {
    /// Turn the input into a stored record with the given identifier.
    #[must_use]
    pub fn into_record(self, id: LogId) -> LogRecord {
        LogRecord {
            id,
            uuid: self.uuid,
            log_time: self.log_time,
            log_message: self.log_message,
            item_id: self.item_id,
            launch_id: self.launch_id,
            last_modified: self.last_modified,
            log_level: self.log_level,
            attachment_id: self.attachment_id,
        }
    }

    /// The document body stored for this input (everything but the id).
    #[must_use]
    pub fn to_document(&self, project: ProjectId) -> LogDocument {
        LogDocument {
            uuid: self.uuid.clone(),
            log_time: self.log_time,
            log_message: self.log_message.clone(),
            item_id: self.item_id,
            launch_id: self.launch_id,
            project_id: Some(project),
            last_modified: self.last_modified,
            log_level: self.log_level,
            attachment_id: self.attachment_id,
        }
    }
}

// =============================================================================
// LogRecord
// =============================================================================

/// A stored log record as returned by every read operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Storage identifier
    pub id: LogId,
    /// Client-supplied correlation UUID
    pub uuid: String,
    /// When the log line was produced
    #[serde(with = "timestamp")]
    pub log_time: NaiveDateTime,
    /// Free-text message
    pub log_message: String,
    /// Owning test item
    pub item_id: i64,
    /// Owning launch
    pub launch_id: i64,
    /// Last modification time
    #[serde(with = "timestamp")]
    pub last_modified: NaiveDateTime,
    /// Severity code
    pub log_level: i32,
    /// Optional attachment
    #[serde(default)]
    pub attachment_id: Option<i64>,
}

// =============================================================================
// LogDocument
// =============================================================================

/// The body stored in the document store; the identifier lives outside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDocument {
    /// Client-supplied correlation UUID
    pub uuid: String,
    /// When the log line was produced
    #[serde(with = "timestamp")]
    pub log_time: NaiveDateTime,
    /// Free-text message
    pub log_message: String,
    /// Owning test item
    pub item_id: i64,
    /// Owning launch
    pub launch_id: i64,
    /// Owning project (absent in documents written by older writers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    /// Last modification time
    #[serde(with = "timestamp")]
    pub last_modified: NaiveDateTime,
    /// Severity code
    pub log_level: i32,
    /// Optional attachment
    #[serde(default)]
    pub attachment_id: Option<i64>,
}

impl LogDocument {
    /// Attach the identifier read from outside the document.
    #[must_use]
    pub fn into_record(self, id: LogId) -> LogRecord {
        LogRecord {
            id,
            uuid: self.uuid,
            log_time: self.log_time,
            log_message: self.log_message,
            item_id: self.item_id,
            launch_id: self.launch_id,
            last_modified: self.last_modified,
            log_level: self.log_level,
            attachment_id: self.attachment_id,
        }
    }
}

// =============================================================================
// DateRange
// =============================================================================

/// Inclusive range of calendar days compared against `log_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range; both ends are inclusive.
    ///
    /// # Errors
    /// Returns a validation error if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> StorageResult<Self> {
        if start > end {
            return Err(StorageError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `"YYYY-MM-DD"` bounds.
    ///
    /// # Errors
    /// Returns a validation error for malformed dates or `start > end`.
    pub fn parse(start: &str, end: &str) -> StorageResult<Self> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
                .map_err(|e| StorageError::validation(format!("invalid date {value:?}: {e}")))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// First day of the range.
    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the range.
    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether a timestamp falls on a day inside the range.
    #[must_use]
    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        let day = ts.date();
        self.start <= day && day <= self.end
    }
}

// =============================================================================
// Timestamp serde
// =============================================================================

/// Serde adapter rendering `NaiveDateTime` as `"YYYY-MM-DD HH:MM:SS"`.
///
/// Parsing is lenient about the input shape and always truncates to whole
/// seconds, so whatever was written reads back in the canonical form.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    use crate::constants::TIMESTAMP_FORMAT;

    /// Serialize in the canonical format.
    ///
    /// # Errors
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    /// Deserialize from a string or epoch milliseconds.
    ///
    /// # Errors
    /// Fails on anything [`super::parse_timestamp`] rejects.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = NaiveDateTime;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a timestamp string or epoch milliseconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            super::parse_timestamp(value).map_err(|e| E::custom(e.to_string()))
        }

        fn visit_i64<E: de::Error>(self, millis: i64) -> Result<Self::Value, E> {
            super::from_epoch_millis(millis).map_err(|e| E::custom(e.to_string()))
        }

        fn visit_u64<E: de::Error>(self, millis: u64) -> Result<Self::Value, E> {
            let millis = i64::try_from(millis).map_err(E::custom)?;
            self.visit_i64(millis)
        }
    }
}

/// Parse a timestamp in any accepted shape, truncated to whole seconds.
///
/// Accepted: `YYYY-MM-DD HH:MM:SS`, the ISO `T` separator, optional
/// fractional seconds, and RFC 3339 with an offset (converted to UTC).
///
/// # Errors
/// Returns a validation error if no shape matches.
pub fn parse_timestamp(value: &str) -> StorageResult<NaiveDateTime> {
    let value = value.trim();
    let parsed = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.naive_utc()))
        .map_err(|e| StorageError::validation(format!("invalid timestamp {value:?}: {e}")))?;
    Ok(truncate_to_secs(parsed))
}

/// Convert epoch milliseconds (UTC) to a timestamp.
///
/// # Errors
/// Returns a validation error when out of range.
pub fn from_epoch_millis(millis: i64) -> StorageResult<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| truncate_to_secs(dt.naive_utc()))
        .ok_or_else(|| StorageError::validation(format!("epoch millis out of range: {millis}")))
}

/// Render a timestamp in the canonical format.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn truncate_to_secs(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}
