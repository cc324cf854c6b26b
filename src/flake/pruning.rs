use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::analysis::FlakeAnalysis;
use crate::error::Result;
use crate::oracles::{AnalysisStore, StabilityClassifier};

pub const DEFAULT_LOWER_FLAKE_THRESHOLD: f64 = 0.02;
pub const DEFAULT_UPPER_FLAKE_THRESHOLD: f64 = 0.98;
pub const DEFAULT_MINIMUM_ITERATIONS: u32 = 100;

/// Pass rates strictly between the two thresholds are flaky.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityThresholds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        Self {
            lower: DEFAULT_LOWER_FLAKE_THRESHOLD,
            upper: DEFAULT_UPPER_FLAKE_THRESHOLD,
        }
    }
}

/// Stable means (nearly) always failing or always passing.
///
/// A pass rate of -1 (the test does not exist) is stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdClassifier;

impl StabilityClassifier for ThresholdClassifier {
    fn is_stable(&self, pass_rate: f64, lower_flake_threshold: f64, upper_flake_threshold: f64) -> bool {
        pass_rate < lower_flake_threshold || pass_rate > upper_flake_threshold
    }
}

/// Removes stable data points measured with too few iterations to trust.
pub struct Pruner<'a, C, S> {
    classifier: &'a C,
    store: &'a S,
    thresholds: StabilityThresholds,
}

impl<'a, C: StabilityClassifier, S: AnalysisStore> Pruner<'a, C, S> {
    pub fn new(classifier: &'a C, store: &'a S, thresholds: StabilityThresholds) -> Self {
        Self {
            classifier,
            store,
            thresholds,
        }
    }

    /// Drops stable points in `[lower_build, upper_build]` with fewer than
    /// `minimum_iterations` iterations and returns how many were dropped.
    ///
    /// Flaky points and points outside the range are kept. The analysis is
    /// saved only when something changed.
    pub async fn prune_unreliable_stable_points(
        &self,
        analysis: &mut FlakeAnalysis,
        lower_build: u64,
        upper_build: u64,
        minimum_iterations: u32,
    ) -> Result<usize> {
        let before = analysis.data_points.len();

        analysis.data_points.retain(|point| {
            let Some(build_number) = point.build_number else {
                return true;
            };
            if !(lower_build..=upper_build).contains(&build_number) {
                return true;
            }

            let stable = self.classifier.is_stable(
                point.pass_rate,
                self.thresholds.lower,
                self.thresholds.upper,
            );
            let unreliable = point.iterations.unwrap_or_default() < minimum_iterations;
            if stable && unreliable {
                debug!(
                    "Dropping build {build_number}: pass rate {} over {:?} iterations",
                    point.pass_rate, point.iterations
                );
            }
            !(stable && unreliable)
        });

        let removed = before - analysis.data_points.len();
        if removed > 0 {
            info!("Pruned {removed} unreliable stable data point(s)");
            self.store.save(analysis).await?;
        }

        Ok(removed)
    }
}
