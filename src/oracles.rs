//! Lookup contracts the scoring and bisection engines depend on.
//!
//! The engines are generic over these traits so tests can run against
//! in-memory fakes and the CLI can plug in the HTTP clients from
//! [`crate::providers`].
#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::flake::FlakeAnalysis;
use crate::heuristic::{BlameRegion, ChangeLog};

/// Path comparisons used to match touched files against log paths.
pub trait PathOracle {
    /// Whether `changed_path` (from a commit) and `path_in_log` name the same file.
    fn same_file(&self, changed_path: &str, path_in_log: &str) -> bool;

    /// Whether the two files are related (e.g. `x.h` and `x_impl.cc`).
    fn is_related(&self, changed_path: &str, path_in_log: &str) -> bool;

    /// Strips the checkout root so paths are relative to the project.
    fn strip_root(&self, path: &str) -> String;
}

/// Source-control lookups.
pub trait BlameOracle {
    /// Blame regions of `path` at `revision`; `None` when no blame is available.
    async fn blame(
        &self,
        repo_url: &str,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<BlameRegion>>>;

    async fn change_log(&self, repo_url: &str, revision: &str) -> Result<ChangeLog>;

    /// Commits in `(from, to]`, in the order the repository reports them.
    async fn change_logs(&self, repo_url: &str, from: &str, to: &str) -> Result<Vec<ChangeLog>>;
}

/// Build metadata lookups.
pub trait BuildInfoOracle {
    async fn commit_position(&self, master: &str, builder: &str, build_number: u64)
        -> Result<u64>;

    /// Completed build numbers, most recent first.
    async fn recent_completed_builds(&self, master: &str, builder: &str) -> Result<Vec<u64>>;
}

/// Decides whether a measured pass rate counts as stable or flaky.
pub trait StabilityClassifier {
    fn is_stable(&self, pass_rate: f64, lower_flake_threshold: f64, upper_flake_threshold: f64)
        -> bool;
}

/// Persistence for flake analyses.
pub trait AnalysisStore {
    async fn save(&self, analysis: &FlakeAnalysis) -> Result<()>;
}
