use std::collections::BTreeMap;

use super::types::{BuildBounds, CommitPositionRange, DataPoint};

/// Commit-position ranges of measured builds, keyed by build number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitRangeIndex {
    ranges: BTreeMap<u64, CommitPositionRange>,
}

impl CommitRangeIndex {
    /// Indexes every build-level point with both commit positions known.
    pub fn from_data_points(data_points: &[DataPoint]) -> Self {
        let ranges = data_points
            .iter()
            .filter_map(|point| Some((point.build_number?, point.commit_position_range()?)))
            .collect();
        Self { ranges }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn get(&self, build_number: u64) -> Option<&CommitPositionRange> {
        self.ranges.get(&build_number)
    }

    /// Tightest known builds around `commit_position`.
    ///
    /// Equal bounds mean the build that first contained the commit is known.
    pub fn bounded_range_for_commit_position(&self, commit_position: u64) -> BuildBounds {
        let (Some((&earliest_build, earliest_range)), Some((&latest_build, latest_range))) =
            (self.ranges.first_key_value(), self.ranges.last_key_value())
        else {
            return BuildBounds::default();
        };

        if commit_position < earliest_range.earliest {
            return BuildBounds::new(None, Some(earliest_build));
        }
        if commit_position > latest_range.latest {
            return BuildBounds::new(Some(latest_build), None);
        }

        let mut bounds = BuildBounds::default();
        for (&build_number, range) in self.ranges.iter().rev() {
            if range.contains(commit_position) {
                return BuildBounds::exact(build_number);
            }
            if range.latest > commit_position {
                bounds.upper = Some(build_number);
            } else {
                bounds.lower = Some(build_number);
                break;
            }
        }
        bounds
    }
}
