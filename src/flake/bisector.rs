use log::{debug, info};

use super::analysis::FlakeAnalysis;
use super::range_index::CommitRangeIndex;
use super::types::{BoundsState, BuildBounds};
use crate::error::{FinditError, Result};
use crate::oracles::BuildInfoOracle;

/// Resolves commit positions to build numbers on one builder.
///
/// Known data points are consulted first; only when they cannot settle the
/// answer does the bisector probe the build-info service, one build at a time.
pub struct Bisector<'a, O> {
    oracle: &'a O,
    master_name: &'a str,
    builder_name: &'a str,
    max_probes: Option<usize>,
}

impl<'a, O: BuildInfoOracle> Bisector<'a, O> {
    pub fn new(oracle: &'a O, master_name: &'a str, builder_name: &'a str) -> Self {
        Self {
            oracle,
            master_name,
            builder_name,
            max_probes: None,
        }
    }

    /// Caps how many builds a single lookup may fetch.
    pub fn with_max_probes(mut self, max_probes: Option<usize>) -> Self {
        self.max_probes = max_probes;
        self
    }

    async fn probe(&self, build_number: u64, probes: &mut usize) -> Result<u64> {
        if let Some(limit) = self.max_probes {
            if *probes >= limit {
                return Err(FinditError::ProbeLimitExceeded { limit });
            }
        }
        *probes += 1;

        let commit_position = self
            .oracle
            .commit_position(self.master_name, self.builder_name, build_number)
            .await?;
        debug!("Probe {probes}: build {build_number} is at commit position {commit_position}");
        Ok(commit_position)
    }

    /// Bounds from the commit position of a single known build.
    pub async fn bounded_range_from_single_build(
        &self,
        commit_position: u64,
        build_number: u64,
    ) -> Result<BuildBounds> {
        self.bounds_from_single_build(commit_position, build_number, &mut 0)
            .await
    }

    async fn bounds_from_single_build(
        &self,
        commit_position: u64,
        build_number: u64,
        probes: &mut usize,
    ) -> Result<BuildBounds> {
        let build_commit_position = self.probe(build_number, probes).await?;

        Ok(if commit_position == build_commit_position {
            BuildBounds::exact(build_number)
        } else if commit_position < build_commit_position {
            BuildBounds::new(None, Some(build_number))
        } else {
            BuildBounds::new(Some(build_number), None)
        })
    }

    /// Earliest build at or after `commit_position` within `bounds`.
    ///
    /// A missing lower bound starts from build 0; a missing upper bound from
    /// the latest completed build. When the target lies past the latest build
    /// that build is returned.
    pub async fn nearest_build(&self, bounds: BuildBounds, commit_position: u64) -> Result<u64> {
        self.search(bounds, commit_position, &mut 0).await
    }

    async fn search(
        &self,
        bounds: BuildBounds,
        commit_position: u64,
        probes: &mut usize,
    ) -> Result<u64> {
        let mut lower = match bounds.lower {
            Some(lower) => lower,
            None => {
                if commit_position <= self.probe(0, probes).await? {
                    return Ok(0);
                }
                0
            }
        };

        let mut upper = match bounds.upper {
            Some(upper) => upper,
            None => {
                let latest = self.latest_completed_build().await?;
                if commit_position >= self.probe(latest, probes).await? {
                    return Ok(latest);
                }
                latest
            }
        };

        while upper.saturating_sub(lower) > 1 {
            let mid = lower + (upper - lower) / 2;
            let mid_commit_position = self.probe(mid, probes).await?;

            if mid_commit_position == commit_position {
                return Ok(mid);
            }
            if mid_commit_position > commit_position {
                upper = mid;
            } else {
                lower = mid;
            }
        }

        info!("Commit position {commit_position} resolved to build {upper} after {probes} probe(s)");
        Ok(upper)
    }

    async fn latest_completed_build(&self) -> Result<u64> {
        self.oracle
            .recent_completed_builds(self.master_name, self.builder_name)
            .await?
            .first()
            .copied()
            .ok_or_else(|| FinditError::NoCompletedBuilds {
                master: self.master_name.to_string(),
                builder: self.builder_name.to_string(),
            })
    }

    /// Build number that first contained `commit_position`.
    ///
    /// Uses the analysis's data points when it has any, otherwise the build
    /// that triggered the analysis. Every build fetched counts toward the
    /// probe limit.
    pub async fn earliest_containing_build_number(
        &self,
        commit_position: u64,
        analysis: &FlakeAnalysis,
    ) -> Result<u64> {
        let index = CommitRangeIndex::from_data_points(&analysis.data_points);
        let mut probes = 0;

        let bounds = if index.is_empty() {
            self.bounds_from_single_build(commit_position, analysis.build_number, &mut probes)
                .await?
        } else {
            index.bounded_range_for_commit_position(commit_position)
        };

        match bounds.state() {
            BoundsState::ExactMatch(build_number) => {
                debug!("Commit position {commit_position} already measured in build {build_number}");
                Ok(build_number)
            }
            _ => self.search(bounds, commit_position, &mut probes).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::flake::DataPoint;

    /// Builds 0..=n with commit position `build * 10`.
    struct FakeBuildInfo {
        positions: HashMap<u64, u64>,
        completed: Vec<u64>,
        probed: Mutex<Vec<u64>>,
        failing_build: Option<u64>,
    }

    impl FakeBuildInfo {
        fn linear(latest: u64) -> Self {
            Self {
                positions: (0..=latest).map(|build| (build, build * 10)).collect(),
                completed: (0..=latest).rev().collect(),
                probed: Mutex::new(Vec::new()),
                failing_build: None,
            }
        }

        fn probed(&self) -> Vec<u64> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl BuildInfoOracle for FakeBuildInfo {
        async fn commit_position(&self, _master: &str, _builder: &str, build_number: u64) -> Result<u64> {
            self.probed.lock().unwrap().push(build_number);
            if self.failing_build == Some(build_number) {
                return Err(FinditError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            self.positions
                .get(&build_number)
                .copied()
                .ok_or(FinditError::MissingCommitPosition { build: build_number })
        }

        async fn recent_completed_builds(&self, _master: &str, _builder: &str) -> Result<Vec<u64>> {
            Ok(self.completed.clone())
        }
    }

    fn point(build_number: u64, previous: u64, commit_position: u64) -> DataPoint {
        DataPoint {
            build_number: Some(build_number),
            commit_position: Some(commit_position),
            previous_build_commit_position: Some(previous),
            pass_rate: 1.0,
            ..DataPoint::default()
        }
    }

    fn analysis(points: Vec<DataPoint>) -> FlakeAnalysis {
        FlakeAnalysis {
            data_points: points,
            ..FlakeAnalysis::new("m", "b", 100)
        }
    }

    #[cfg(test)]
    mod nearest_build {
        use super::*;

        #[tokio::test]
        async fn adjacent_bounds_need_no_probe() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(Some(99), Some(100)), 950)
                .await
                .unwrap();

            assert_eq!(build, 100);
            assert!(oracle.probed().is_empty(), "Adjacent bounds resolve without fetching");
        }

        #[tokio::test]
        async fn binary_search_finds_exact_build() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(Some(10), Some(90)), 370)
                .await
                .unwrap();

            assert_eq!(build, 37);
        }

        #[tokio::test]
        async fn between_builds_returns_upper() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(Some(10), Some(90)), 375)
                .await
                .unwrap();

            assert_eq!(build, 38, "First build past the target contains it");
        }

        #[tokio::test]
        async fn missing_lower_bound_probes_build_zero() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(None, Some(50)), 0)
                .await
                .unwrap();

            assert_eq!(build, 0);
            assert_eq!(oracle.probed(), vec![0]);
        }

        #[tokio::test]
        async fn missing_upper_bound_uses_latest_build() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(Some(100), None), 5000)
                .await
                .unwrap();

            assert_eq!(build, 200, "Targets past the latest build resolve to it");
            assert_eq!(oracle.probed(), vec![200]);
        }

        #[tokio::test]
        async fn missing_upper_bound_then_searches() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let build = bisector
                .nearest_build(BuildBounds::new(Some(100), None), 1505)
                .await
                .unwrap();

            assert_eq!(build, 151);
        }

        #[tokio::test]
        async fn no_completed_builds_is_an_error() {
            let mut oracle = FakeBuildInfo::linear(10);
            oracle.completed.clear();
            let bisector = Bisector::new(&oracle, "m", "b");

            let result = bisector
                .nearest_build(BuildBounds::new(Some(1), None), 50)
                .await;

            assert!(matches!(result, Err(FinditError::NoCompletedBuilds { .. })));
        }

        #[tokio::test]
        async fn fetch_failure_propagates() {
            let mut oracle = FakeBuildInfo::linear(200);
            oracle.failing_build = Some(50);
            let bisector = Bisector::new(&oracle, "m", "b");

            let result = bisector
                .nearest_build(BuildBounds::new(Some(0), Some(100)), 420)
                .await;

            let error = result.expect_err("probe of build 50 fails");
            assert!(error.is_retryable(), "Service errors stay retryable");
        }

        #[tokio::test]
        async fn probe_limit_is_enforced() {
            let oracle = FakeBuildInfo::linear(1000);
            let bisector = Bisector::new(&oracle, "m", "b").with_max_probes(Some(3));

            let result = bisector
                .nearest_build(BuildBounds::new(Some(0), Some(1000)), 4321)
                .await;

            assert!(matches!(result, Err(FinditError::ProbeLimitExceeded { limit: 3 })));
            assert_eq!(oracle.probed().len(), 3);
        }
    }

    #[cfg(test)]
    mod earliest_containing_build_number {
        use super::*;

        #[tokio::test]
        async fn known_range_needs_no_fetch() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");
            let analysis = analysis(vec![point(100, 900, 1000), point(99, 800, 900)]);

            for (target, expected) in [(850, 99), (950, 100)] {
                let build = bisector
                    .earliest_containing_build_number(target, &analysis)
                    .await
                    .unwrap();
                assert_eq!(build, expected, "target {target}");
            }
            assert!(oracle.probed().is_empty());
        }

        #[tokio::test]
        async fn searches_below_earliest_known_build() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");
            let analysis = analysis(vec![point(100, 990, 1000), point(99, 980, 990)]);

            let build = bisector
                .earliest_containing_build_number(750, &analysis)
                .await
                .unwrap();

            assert_eq!(build, 75);
            assert_eq!(oracle.probed().first(), Some(&0), "Lower end starts at build 0");
        }

        #[tokio::test]
        async fn searches_above_latest_known_build() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");
            let analysis = analysis(vec![point(100, 990, 1000), point(99, 980, 990)]);

            let build = bisector
                .earliest_containing_build_number(1050, &analysis)
                .await
                .unwrap();

            assert_eq!(build, 105);
        }

        #[tokio::test]
        async fn without_points_starts_from_triggering_build() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b");

            let exact = bisector
                .earliest_containing_build_number(1000, &analysis(Vec::new()))
                .await
                .unwrap();
            assert_eq!(exact, 100);
            assert_eq!(oracle.probed(), vec![100], "Only the triggering build is fetched");

            let earlier = bisector
                .earliest_containing_build_number(421, &analysis(Vec::new()))
                .await
                .unwrap();
            assert_eq!(earlier, 43);
        }

        #[tokio::test]
        async fn triggering_build_counts_toward_probe_limit() {
            let oracle = FakeBuildInfo::linear(200);
            let bisector = Bisector::new(&oracle, "m", "b").with_max_probes(Some(2));

            let result = bisector
                .earliest_containing_build_number(421, &analysis(Vec::new()))
                .await;

            assert!(matches!(result, Err(FinditError::ProbeLimitExceeded { limit: 2 })));
            assert_eq!(
                oracle.probed().len(),
                2,
                "The triggering build and the search share one budget"
            );
        }
    }

    #[tokio::test]
    async fn single_build_bounds() {
        let oracle = FakeBuildInfo::linear(200);
        let bisector = Bisector::new(&oracle, "m", "b");

        assert_eq!(
            bisector.bounded_range_from_single_build(500, 50).await.unwrap(),
            BuildBounds::exact(50)
        );
        assert_eq!(
            bisector.bounded_range_from_single_build(400, 50).await.unwrap(),
            BuildBounds::new(None, Some(50))
        );
        assert_eq!(
            bisector.bounded_range_from_single_build(600, 50).await.unwrap(),
            BuildBounds::new(Some(50), None)
        );
    }
}
