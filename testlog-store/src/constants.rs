//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `LOG_RESULTS_COUNT_MAX` (not `MAX_LOG_RESULTS`)
//!
//! Every constant includes units in the name:
//! - _`COUNT_MAX` for quantity limits
//! - _`SECS_DEFAULT` for time durations
//! - _`DAYS` for retention ages
//! - _MS for milliseconds

// =============================================================================
// Result Limits
// =============================================================================

/// Maximum number of records returned by id / test-item lookups
pub const LOG_RESULTS_COUNT_MAX: usize = 1000;

/// Maximum number of records returned by full-text and pattern search
pub const SEARCH_RESULTS_COUNT_MAX: usize = 1000;

/// Maximum length of a search query or pattern
pub const SEARCH_QUERY_BYTES_MAX: usize = 10_000;

/// Maximum number of ids accepted by a single lookup or delete
pub const LOG_IDS_COUNT_MAX: usize = 10_000;

// =============================================================================
// Bulk Writes
// =============================================================================

/// Documents (or rows) per bulk round-trip
pub const BULK_CHUNK_SIZE_COUNT: usize = 1000;

/// Page size for scroll-based reads
pub const SCROLL_PAGE_SIZE_COUNT: usize = 1000;

/// Scroll context keep-alive between pages
pub const SCROLL_KEEPALIVE: &str = "1m";

// =============================================================================
// Connection Policy
// =============================================================================

/// Per-call timeout applied by the connection layer
pub const CONNECTION_TIMEOUT_SECS_DEFAULT: u64 = 30;

/// Attempts per round-trip (first try included)
pub const CONNECTION_RETRY_COUNT_MAX: u32 = 5;

/// Base delay between retries in milliseconds
pub const CONNECTION_RETRY_DELAY_MS_BASE: u64 = 100;

/// Maximum delay between retries in milliseconds
pub const CONNECTION_RETRY_DELAY_MS_MAX: u64 = 5000;

/// Maximum pooled relational connections
pub const POSTGRES_POOL_CONNECTIONS_MAX: u32 = 10;

// =============================================================================
// Lifecycle Policy
// =============================================================================

/// Age at which the hot phase rolls over to a new segment
pub const LIFECYCLE_ROLLOVER_AGE_DAYS: u32 = 7;

/// Age at which segments enter the warm phase
pub const LIFECYCLE_WARM_AGE_DAYS: u32 = 14;

/// Largest accepted retention (100 years)
pub const KEEP_LOGS_DAYS_MAX: u32 = 36_500;

/// Smallest accepted retention
pub const KEEP_LOGS_DAYS_MIN: u32 = 1;

/// First year covered by range expiry; the earliest year both stores can
/// render as `YYYY-MM-DD`
pub const EXPIRY_START_YEAR: i32 = 1;

// =============================================================================
// Naming
// =============================================================================

/// Suffix appended to a project's index alias
pub const INDEX_NAME_SUFFIX: &str = "_logs";

/// Suffix of the first rollover segment
pub const INDEX_FIRST_SEGMENT_SUFFIX: &str = "-000001";

/// Base name of the shared relational table (after the prefix)
pub const POSTGRES_TABLE_NAME_BASE: &str = "logs";

/// Maximum length of a Postgres identifier
pub const POSTGRES_IDENTIFIER_BYTES_MAX: usize = 63;

/// Canonical timestamp rendering
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Canonical date rendering
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp format as understood by the document store mapping
pub const DOCUMENT_TIMESTAMP_FORMAT: &str = "yyyy-MM-dd HH:mm:ss";

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum fault injection probability
pub const DST_FAULT_PROBABILITY_MAX: f64 = 1.0;

/// Minimum fault injection probability
pub const DST_FAULT_PROBABILITY_MIN: f64 = 0.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_valid() {
        assert!(SEARCH_RESULTS_COUNT_MAX <= LOG_RESULTS_COUNT_MAX);
        assert!(CONNECTION_RETRY_COUNT_MAX > 0);
        assert!(CONNECTION_RETRY_DELAY_MS_BASE <= CONNECTION_RETRY_DELAY_MS_MAX);
        assert!(LIFECYCLE_ROLLOVER_AGE_DAYS < LIFECYCLE_WARM_AGE_DAYS);
        assert!(KEEP_LOGS_DAYS_MIN <= KEEP_LOGS_DAYS_MAX);
    }

    #[test]
    fn test_bulk_chunk_fits_postgres_bind_limit() {
        // Ten bound columns per row, 65535 bind parameters per statement.
        assert!(BULK_CHUNK_SIZE_COUNT * 10 < 65_535);
    }

    #[test]
    fn test_timestamp_formats_agree() {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-09 07:05:01");
        assert_eq!(ts.date().format(DATE_FORMAT).to_string(), "2024-03-09");
    }
}
