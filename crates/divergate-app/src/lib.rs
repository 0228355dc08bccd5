//! Application layer for divergate.
//!
//! The app layer coordinates adapters and domain policy: it plans variant
//! command lines, drives executions, and folds results. It does not parse
//! CLI flags.

pub mod coordinator;
pub mod executor;
pub mod plan;
pub mod preflight;
pub mod report;

pub use coordinator::{RunCoordinator, RunSettings};
pub use plan::CaseContext;
pub use preflight::{ArtifactSet, ResolvedPaths};

pub trait Clock: Send + Sync {
    fn now_rfc3339(&self) -> String;
}

#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_rfc3339(&self) -> String {
        use time::format_description::well_known::Rfc3339;
        time::OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}
