//! Retention Policy Manager
//!
//! `TigerStyle`: One retention value per project, two representations.
//!
//! - Document store: a lifecycle policy document whose delete phase carries
//!   `keep_logs_days` ([`LifecyclePolicy`]).
//! - Relational store: no engine feature; a scheduler deletes the range
//!   returned by [`expiry_range`].

use chrono::{Days, NaiveDate};
use serde_json::{json, Map, Value};

use super::error::{StorageError, StorageResult};
use super::record::DateRange;
use crate::constants::{
    EXPIRY_START_YEAR, KEEP_LOGS_DAYS_MAX, KEEP_LOGS_DAYS_MIN, LIFECYCLE_ROLLOVER_AGE_DAYS, LIFECYCLE_WARM_AGE_DAYS,
};

/// Check that a retention value is within the accepted range.
///
/// # Errors
/// Returns a validation error outside `KEEP_LOGS_DAYS_MIN..=KEEP_LOGS_DAYS_MAX`.
pub fn validate_keep_logs_days(keep_logs_days: u32) -> StorageResult<u32> {
    if !(KEEP_LOGS_DAYS_MIN..=KEEP_LOGS_DAYS_MAX).contains(&keep_logs_days) {
        return Err(StorageError::validation(format!(
            "keep_logs_days must be within {KEEP_LOGS_DAYS_MIN}..={KEEP_LOGS_DAYS_MAX}, got {keep_logs_days}"
        )));
    }
    Ok(keep_logs_days)
}

/// Days of logs that have expired on `today` for the given retention.
///
/// The range runs from January 1st of [`EXPIRY_START_YEAR`] to the day
/// exactly `keep_logs_days` before `today`, inclusive.
///
/// # Errors
/// Returns a validation error for an out-of-range retention.
pub fn expiry_range(today: NaiveDate, keep_logs_days: u32) -> StorageResult<DateRange> {
    let keep_logs_days = validate_keep_logs_days(keep_logs_days)?;
    let end = today
        .checked_sub_days(Days::new(u64::from(keep_logs_days)))
        .ok_or_else(|| StorageError::validation("retention reaches before the calendar start"))?;
    let start = NaiveDate::from_ymd_opt(EXPIRY_START_YEAR, 1, 1)
        .ok_or_else(|| StorageError::validation("invalid expiry start year"))?
        .min(end);
    DateRange::new(start, end)
}

fn days(value: u32) -> String {
    format!("{value}d")
}

fn parse_days(value: &Value) -> Option<u32> {
    value.as_str()?.strip_suffix('d')?.parse().ok()
}

// =============================================================================
// LifecyclePolicy
// =============================================================================

/// A document-store lifecycle policy (the object under `"policy"`).
///
/// Fields other than `phases` of a stored policy are preserved when it is
/// rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecyclePolicy {
    phases: Map<String, Value>,
    other: Map<String, Value>,
}

impl Default for LifecyclePolicy {
    /// Hot phase rolling over after 7 days, warm phase from 14 days, no
    /// delete phase.
    fn default() -> Self {
        let mut phases = Map::new();
        phases.insert(
            "hot".to_string(),
            json!({
                "min_age": "0ms",
                "actions": {
                    "rollover": { "max_age": days(LIFECYCLE_ROLLOVER_AGE_DAYS) }
                }
            }),
        );
        phases.insert(
            "warm".to_string(),
            json!({
                "min_age": days(LIFECYCLE_WARM_AGE_DAYS),
                "actions": {}
            }),
        );
        Self {
            phases,
            other: Map::new(),
        }
    }
}

impl LifecyclePolicy {
    /// Wrap a stored policy object.
    ///
    /// # Errors
    /// Returns a serialization error if `value` has no `phases` object.
    pub fn from_document(value: Value) -> StorageResult<Self> {
        let Value::Object(mut other) = value else {
            return Err(StorageError::serialization("lifecycle policy is not an object"));
        };
        match other.remove("phases") {
            Some(Value::Object(phases)) => Ok(Self { phases, other }),
            _ => Err(StorageError::serialization(
                "lifecycle policy has no phases object",
            )),
        }
    }

    /// The policy object.
    #[must_use]
    pub fn document(&self) -> Value {
        let mut document = self.other.clone();
        document.insert("phases".to_string(), Value::Object(self.phases.clone()));
        Value::Object(document)
    }

    /// Body for a policy write: `{"policy": {...}}`.
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        json!({ "policy": self.document() })
    }

    fn phase_min_age_days(&self, phase: &str) -> Option<u32> {
        parse_days(self.phases.get(phase)?.get("min_age")?)
    }

    /// Retention currently carried by the delete phase.
    #[must_use]
    pub fn keep_logs_days(&self) -> Option<u32> {
        self.phase_min_age_days("delete")
    }

    /// Add or replace the delete phase.
    ///
    /// A warm phase starting after the delete age is pulled back to it.
    ///
    /// # Errors
    /// Returns a validation error for an out-of-range retention.
    pub fn apply_keep_logs_days(&mut self, keep_logs_days: u32) -> StorageResult<()> {
        let keep_logs_days = validate_keep_logs_days(keep_logs_days)?;
        let warm_days = self.phase_min_age_days("warm");

        if warm_days.is_some_and(|warm| warm > keep_logs_days) {
            if let Some(Value::Object(warm)) = self.phases.get_mut("warm") {
                warm.insert("min_age".to_string(), Value::from(days(keep_logs_days)));
            }
        }
        self.phases.insert(
            "delete".to_string(),
            json!({
                "min_age": days(keep_logs_days),
                "actions": { "delete": {} }
            }),
        );
        Ok(())
    }
}
