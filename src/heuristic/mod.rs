//! Heuristic suspicion scoring.
//!
//! [`SuspicionScorer`] matches the files a CL touched (and the dependencies it
//! rolled) against a failure signal; [`aggregator`] merges the per-step results
//! of a build into per-CL suspects; [`analysis`] drives both over a whole
//! failed build.

pub mod aggregator;
pub mod analysis;
pub mod justification;
pub mod paths;
pub mod scorer;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{ClKey, ResultStatus, SuspectedCl};
pub use analysis::{analyze_build_failure, AnalysisResult, BuildFailureInput, FailureInfo};
pub use justification::{ChangeAction, Justification};
pub use paths::ChromiumPathOracle;
pub use scorer::{ScorerConfig, SuspectedClInfo, SuspicionScorer};
pub use types::{
    BlameRegion, ChangeLog, ChangeType, Contributor, DependencyRoll, DepsInfo, FailedEdge,
    FailureSignal, RepoInfo, TouchedFile,
};
