use serde::{Deserialize, Serialize};

/// One measurement of a test's pass rate at a build or commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub build_number: Option<u64>,
    #[serde(default)]
    pub commit_position: Option<u64>,
    #[serde(default)]
    pub previous_build_commit_position: Option<u64>,
    /// -1 when the test does not exist at this point
    pub pass_rate: f64,
    /// Reruns behind `pass_rate`
    #[serde(default)]
    pub iterations: Option<u32>,
    /// Set for points produced by a try job rather than a build
    #[serde(default)]
    pub try_job_url: Option<String>,
}

impl DataPoint {
    pub fn is_try_job(&self) -> bool {
        self.try_job_url.is_some()
    }

    /// Commit positions built by this build, when known.
    pub fn commit_position_range(&self) -> Option<CommitPositionRange> {
        if self.is_try_job() {
            return None;
        }
        Some(CommitPositionRange {
            earliest: self.previous_build_commit_position? + 1,
            latest: self.commit_position?,
        })
    }
}

/// Commit positions that first landed in one build, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPositionRange {
    pub earliest: u64,
    pub latest: u64,
}

impl CommitPositionRange {
    pub fn contains(&self, commit_position: u64) -> bool {
        (self.earliest..=self.latest).contains(&commit_position)
    }
}

/// Build numbers known to bracket a commit position; `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildBounds {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}

/// Where a lookup stands once the known data has been consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsState {
    ExactMatch(u64),
    BoundedSearch { lower: u64, upper: u64 },
    UnboundedLeft { upper: u64 },
    UnboundedRight { lower: u64 },
    Unknown,
}

impl BuildBounds {
    pub fn new(lower: Option<u64>, upper: Option<u64>) -> Self {
        Self { lower, upper }
    }

    pub fn exact(build_number: u64) -> Self {
        Self::new(Some(build_number), Some(build_number))
    }

    pub fn state(&self) -> BoundsState {
        match (self.lower, self.upper) {
            (Some(lower), Some(upper)) if lower == upper => BoundsState::ExactMatch(lower),
            (Some(lower), Some(upper)) => BoundsState::BoundedSearch { lower, upper },
            (None, Some(upper)) => BoundsState::UnboundedLeft { upper },
            (Some(lower), None) => BoundsState::UnboundedRight { lower },
            (None, None) => BoundsState::Unknown,
        }
    }
}

/// Commit positions of the latest stable point and the flaky point after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegressionRange {
    pub lower: Option<u64>,
    pub upper: Option<u64>,
}
