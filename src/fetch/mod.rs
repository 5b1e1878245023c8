//! Multi-source logo acquisition
//!
//! [`sources`] builds the ordered attempt plan per provider and
//! [`orchestrator`] walks it with per-attempt timeouts, returning a
//! [`crate::models::FetchResult`] that is never an error.

pub mod orchestrator;
pub mod sources;

pub use orchestrator::{ByteFetcher, FetchPhase, FetchedBytes, LogoFetcher, ReqwestByteFetcher};
pub use sources::{attempt_plan, SourceAttempt};
