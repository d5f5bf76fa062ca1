//! Testlog Store - Log Persistence with DST
//!
//! TigerStyle storage core for per-project test logs: one contract, two
//! production backends, a simulated third for fault-injection testing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               LogService                     │
//! │   backend selector + error boundary          │
//! ├─────────────────────────────────────────────┤
//! │  Elasticsearch   │ index per project + ILM   │
//! │  Postgres        │ shared table, range purge │
//! │  Sim             │ in-memory, faults         │
//! ├─────────────────────────────────────────────┤
//! │  ConnectionPolicy       │ timeout + retries  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use testlog_store::dst::SimConfig;
//! use testlog_store::storage::SimLogBackend;
//! use testlog_store::LogService;
//!
//! # async fn demo() {
//! let service = LogService::with_backend(Arc::new(SimLogBackend::new(SimConfig::with_seed(42))));
//! assert!(service.get_logs_by_test_item(7, 1).await.is_empty());
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod constants;
pub mod dst;
pub mod logging;
pub mod service;
pub mod storage;
pub mod text;

pub use config::{ConfigError, LogFormat, LogLevel, PostgresConfig, ServiceConfig};
pub use service::LogService;
pub use storage::{
    BackendCapabilities, BackendKind, DateRange, LogBackend, LogId, LogInput, LogRecord,
    ProjectId, StorageError, StorageResult,
};
