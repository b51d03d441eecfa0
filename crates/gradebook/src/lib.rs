//! Offline-first synchronization engine for a school gradebook.
//!
//! The engine keeps a durable local mirror of the backend's data, serves
//! every read from that mirror (refreshing it first when online), records
//! edits locally when the backend cannot be reached, and reconciles with
//! a push-then-pull cycle in dependency order once connectivity returns.
//! No edit is ever silently lost: pending rows survive pulls, merge
//! conflicts resolve deterministically in favor of the latest local edit,
//! and rows the server rejects outright are surfaced instead of being
//! retried forever.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod projection;
pub mod storage;
pub mod sync;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use error::{EngineError, EngineResult};
pub use projection::{GradeSheetRow, StudentReportEntry};
pub use storage::{MirrorStore, MutationKind, StorageError, UpsertSummary};
pub use sync::{ConnectivityMonitor, SyncOrchestrator, SyncPhase, SyncReport, SyncStatus};

// The shared vocabulary is re-exported so most embedders only need this
// crate.
pub use gradebook_api::{
    Activity, EntityRef, Group, LocalId, Mirrored, Score, ServerId, Student, Subject, SyncState,
    Term,
};
