//! Storage - Log Backend Trait and Implementations
//!
//! `TigerStyle`: One contract over two stores, simulation-first testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      LogBackend Trait                        │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                    ↑                    ↑
//!          │                    │                    │
//! ┌────────┴────────┐  ┌────────┴────────┐  ┌───────┴────────┐
//! │  SimLogBackend  │  │ Elasticsearch   │  │ PostgresBackend│
//! │   (testing)     │  │ Backend (ILM)   │  │ (shared table) │
//! └─────────────────┘  └─────────────────┘  └────────────────┘
//!          │                    │                    │
//!          └────────── ConnectionPolicy (timeout + retry) ───┘
//! ```

mod backend;
mod connection;
mod error;
mod record;
mod retention;
mod sim;

#[cfg(feature = "elasticsearch")]
mod elasticsearch;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::{BackendCapabilities, BackendKind, LogBackend, PatternSyntax, UnknownBackendKind};
pub use connection::ConnectionPolicy;
pub use error::{StorageError, StorageResult};
pub use record::{
    format_timestamp, from_epoch_millis, parse_timestamp, DateRange, LogDocument, LogId, LogInput,
    LogRecord, ProjectId,
};
pub use retention::{expiry_range, validate_keep_logs_days, LifecyclePolicy};
pub use sim::SimLogBackend;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchBackend;

#[cfg(feature = "postgres")]
pub use postgres::{table_name, PostgresBackend};
