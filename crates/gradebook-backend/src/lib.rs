//! HTTP client for the school backend, plus an in-memory fake.
//!
//! `BackendClient` implements [`gradebook_api::RemoteBackend`] against the
//! Spring REST API; `FakeBackend` implements the same trait entirely in
//! memory and is what the engine's integration tests and demos run
//! against.

pub mod client;
pub mod fake;

pub use client::BackendClient;
pub use fake::FakeBackend;
