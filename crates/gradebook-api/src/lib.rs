//! Shared vocabulary for the gradebook sync engine.
//!
//! This crate holds the types every other crate agrees on: mirror row
//! identity (`LocalId`, `ServerId`, `EntityRef`, `SyncState`), the domain
//! entities, the wire-level DTOs of the school backend, and the
//! `RemoteBackend` trait implemented by real and fake HTTP clients.

pub mod error;
pub mod keys;
pub mod models;
pub mod remote;

// Re-export identity types
pub use keys::{EntityRef, KeyParseError, LocalId, Mirrored, ServerId, SyncState};

// Re-export domain and wire types
pub use models::{
    Activity, ActivityDto, ActivityPayload, Group, GroupDto, GroupPayload, ParentIdDto, Score,
    ScoreDto, ScorePayload, Student, StudentDto, StudentPayload, Subject, SubjectDto,
    SubjectPayload, Term, TermDto, TermPayload,
};

// Re-export the remote seam
pub use error::{ApiError, ApiResult};
pub use remote::RemoteBackend;
