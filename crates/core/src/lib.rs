//! Domain logic for the photerra georectification backend.
//!
//! This crate has no HTTP dependencies so it can be used by the API server,
//! integration tests, and any future CLI tooling. It owns the asynchronous
//! job queue, the crash-recovery checkpoint store, the project model and
//! its archive format, the match-result cache, and the seam to the external
//! georectification engine.

pub mod archive;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod match_cache;
pub mod project;
pub mod recovery;
pub mod report;
pub mod types;
