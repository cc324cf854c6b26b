use serde::{Deserialize, Serialize};

use super::pruning::StabilityThresholds;
use super::types::{DataPoint, RegressionRange};
use crate::oracles::StabilityClassifier;

/// A flakiness analysis of one test on one builder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlakeAnalysis {
    pub master_name: String,
    pub builder_name: String,
    /// Build that triggered the analysis
    pub build_number: u64,
    #[serde(default)]
    pub step_name: String,
    #[serde(default)]
    pub test_name: String,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
}

impl FlakeAnalysis {
    pub fn new(master_name: impl Into<String>, builder_name: impl Into<String>, build_number: u64) -> Self {
        Self {
            master_name: master_name.into(),
            builder_name: builder_name.into(),
            build_number,
            ..Self::default()
        }
    }

    /// Commit position of a build, ignoring try-job points.
    pub fn commit_position_of_build(&self, build_number: u64) -> Option<u64> {
        self.data_points
            .iter()
            .find(|point| point.build_number == Some(build_number) && !point.is_try_job())
            .and_then(|point| point.commit_position)
    }

    /// Points within `[lower, upper]`; no upper bound when `upper` is `None`.
    pub fn data_points_within_commit_position_range(
        &self,
        lower: u64,
        upper: Option<u64>,
    ) -> Vec<&DataPoint> {
        self.data_points
            .iter()
            .filter(|point| {
                point.commit_position.is_some_and(|commit_position| {
                    commit_position >= lower && upper.map_or(true, |upper| commit_position <= upper)
                })
            })
            .collect()
    }

    pub fn find_matching_data_point_with_build_number(&self, build_number: u64) -> Option<&DataPoint> {
        self.data_points
            .iter()
            .find(|point| point.build_number == Some(build_number))
    }

    pub fn find_matching_data_point_with_commit_position(
        &self,
        commit_position: u64,
    ) -> Option<&DataPoint> {
        self.data_points
            .iter()
            .find(|point| point.commit_position == Some(commit_position))
    }

    pub fn remove_data_point_with_build_number(&mut self, build_number: u64) {
        self.data_points
            .retain(|point| point.build_number != Some(build_number));
    }

    /// Lowest measured build known to include `commit_position`, or the
    /// triggering build.
    pub fn lowest_upper_bound_build_number(&self, commit_position: u64) -> u64 {
        self.data_points
            .iter()
            .filter(|point| point.commit_position.is_some_and(|cp| commit_position <= cp))
            .filter_map(|point| point.build_number)
            .fold(self.build_number, u64::min)
    }

    /// Latest stable commit position and the flaky one right after it.
    ///
    /// A single stable point yields only a lower bound (flakiness did not
    /// reproduce); a single flaky point or all-flaky points yield only an
    /// upper bound.
    pub fn latest_regression_range<C: StabilityClassifier>(
        &self,
        classifier: &C,
        thresholds: &StabilityThresholds,
    ) -> RegressionRange {
        let is_stable = |point: &DataPoint| {
            classifier.is_stable(point.pass_rate, thresholds.lower, thresholds.upper)
        };

        match self.data_points.as_slice() {
            [] => return RegressionRange::default(),
            [point] if is_stable(point) => {
                return RegressionRange {
                    lower: point.commit_position,
                    upper: None,
                }
            }
            [point] => {
                return RegressionRange {
                    lower: None,
                    upper: point.commit_position,
                }
            }
            _ => {}
        }

        let mut points: Vec<&DataPoint> = self.data_points.iter().collect();
        points.sort_by(|a, b| b.commit_position.cmp(&a.commit_position));

        // The most recent point may come from the recent-flakiness check.
        if points.first().is_some_and(|point| is_stable(*point)) {
            points.remove(0);
        }

        match points.iter().position(|point| is_stable(*point)) {
            None => RegressionRange {
                lower: None,
                upper: points.last().and_then(|point| point.commit_position),
            },
            Some(0) => RegressionRange {
                lower: points[0].commit_position,
                upper: None,
            },
            Some(stable_index) => RegressionRange {
                lower: points[stable_index].commit_position,
                upper: points[stable_index - 1].commit_position,
            },
        }
    }
}
