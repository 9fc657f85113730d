//! Progress reporting for analysis runs.
//!
//! The engine reports one unit of progress per pipeline stage through a
//! [`ProgressCallback`]. Rendering is left to the caller; the CLI drives
//! `indicatif` bars, tests and library users pass [`NullProgress`].

use std::sync::Arc;

use strum_macros::{AsRefStr, Display, EnumString};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisStage {
    Geometry,
    Fetch,
    Normalize,
    Classify,
    Estimate,
    Combine,
    Derive,
    Validate,
}

impl AnalysisStage {
    pub const ALL: [Self; 8] = [
        Self::Geometry,
        Self::Fetch,
        Self::Normalize,
        Self::Classify,
        Self::Estimate,
        Self::Combine,
        Self::Derive,
        Self::Validate,
    ];

    /// Number of stages a complete run reports.
    #[must_use]
    pub const fn count() -> u64 {
        Self::ALL.len() as u64
    }
}

/// Receives progress from a running analysis.
///
/// Implementations must be `Send + Sync` so one reporter can be shared by
/// concurrent batch runs.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work.
    fn set_total(&self, total: u64);

    /// Advance progress by `delta` units.
    fn inc(&self, delta: u64);

    /// Update the message displayed alongside the indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
