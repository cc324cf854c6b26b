//! Commit/build bisection over flakiness data points.

pub mod analysis;
pub mod bisector;
pub mod pruning;
pub mod range_index;
pub mod store;
pub mod types;

pub use analysis::FlakeAnalysis;
pub use bisector::Bisector;
pub use pruning::{Pruner, StabilityThresholds, ThresholdClassifier};
pub use range_index::CommitRangeIndex;
pub use store::JsonAnalysisStore;
pub use types::{BoundsState, BuildBounds, CommitPositionRange, DataPoint, RegressionRange};
