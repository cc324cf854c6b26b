//! Heuristic analysis of a whole failed build.

use std::collections::{BTreeMap, HashMap};

use futures::future::join_all;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::aggregator::{SuspectAggregator, SuspectedCl};
use super::justification::NINJA_DEPENDENCY_SCORE;
use super::scorer::{SuspectedClInfo, SuspicionScorer};
use super::types::{ChangeLog, DepsInfo, FailureSignal};
use crate::error::{FinditError, Result};
use crate::oracles::{BlameOracle, PathOracle};

const COMPILE_STEP: &str = "compile";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureType {
    #[serde(alias = "COMPILE")]
    Compile,
    #[serde(alias = "TEST")]
    Test,
    #[serde(alias = "INFRA")]
    Infra,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailureInfo {
    pub first_failure: u64,
    #[serde(default)]
    pub last_pass: Option<u64>,
}

fn default_supported() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailureInfo {
    pub current_failure: u64,
    pub first_failure: u64,
    #[serde(default)]
    pub last_pass: Option<u64>,
    /// Present when the step reported failures per test
    #[serde(default)]
    pub tests: Option<IndexMap<String, TestFailureInfo>>,
    #[serde(default = "default_supported")]
    pub supported: bool,
}

impl StepFailureInfo {
    /// First build whose blame list may hold the culprit.
    pub fn lower_bound_for_analysis(&self) -> u64 {
        self.last_pass
            .map_or(self.first_failure, |last_pass| last_pass + 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildBlameList {
    #[serde(default)]
    pub blame_list: Vec<String>,
}

/// What failed in a build and which CLs went into the builds since the last pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub master_name: String,
    #[serde(default)]
    pub builder_name: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default)]
    pub chromium_revision: Option<String>,
    #[serde(default)]
    pub failure_type: Option<FailureType>,
    #[serde(default)]
    pub failed_steps: IndexMap<String, StepFailureInfo>,
    #[serde(default)]
    pub builds: BTreeMap<u64, BuildBlameList>,
}

impl FailureInfo {
    /// Revisions across every blame list, without duplicates.
    pub fn blamed_revisions(&self) -> Vec<&str> {
        let mut revisions: Vec<&str> = Vec::new();
        for build in self.builds.values() {
            for revision in &build.blame_list {
                if !revisions.contains(&revision.as_str()) {
                    revisions.push(revision);
                }
            }
        }
        revisions
    }

    fn blame_list(&self, build_number: u64) -> &[String] {
        self.builds
            .get(&build_number)
            .map(|build| build.blame_list.as_slice())
            .unwrap_or_default()
    }
}

/// Step-level signal plus optional per-test signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSignal {
    #[serde(flatten)]
    pub signal: FailureSignal,
    #[serde(default)]
    pub tests: IndexMap<String, FailureSignal>,
}

/// Everything a heuristic analysis of one build needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFailureInput {
    pub failure_info: FailureInfo,
    /// Revision -> change log; pulled from gitiles when empty
    #[serde(default)]
    pub change_logs: HashMap<String, ChangeLog>,
    #[serde(default)]
    pub deps_info: DepsInfo,
    /// Step name -> signals extracted from its logs
    #[serde(default)]
    pub signals: HashMap<String, StepSignal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAnalysisResult {
    pub test_name: String,
    pub first_failure: u64,
    pub last_pass: Option<u64>,
    pub suspected_cls: Vec<SuspectedClInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAnalysisResult {
    pub step_name: String,
    pub first_failure: u64,
    pub last_pass: Option<u64>,
    pub suspected_cls: Vec<SuspectedClInfo>,
    pub supported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestAnalysisResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_compile_suspected_cls: Option<Vec<SuspectedClInfo>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_ninja_dependencies: bool,
}

impl StepAnalysisResult {
    pub fn new(
        step_name: impl Into<String>,
        first_failure: u64,
        last_pass: Option<u64>,
        supported: bool,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            first_failure,
            last_pass,
            suspected_cls: Vec::new(),
            supported,
            tests: None,
            new_compile_suspected_cls: None,
            use_ninja_dependencies: false,
        }
    }

    fn initialize(step_name: &str, step: &StepFailureInfo) -> Self {
        let mut result = Self::new(step_name, step.first_failure, step.last_pass, step.supported);
        result.tests = step.tests.as_ref().map(|tests| {
            tests
                .iter()
                .map(|(test_name, test)| TestAnalysisResult {
                    test_name: test_name.clone(),
                    first_failure: test.first_failure,
                    last_pass: test.last_pass,
                    suspected_cls: Vec::new(),
                })
                .collect()
        });
        result
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub failures: Vec<StepAnalysisResult>,
}

/// Fetches the change log of every blamed revision concurrently.
pub async fn pull_change_logs<B: BlameOracle>(
    oracle: &B,
    repo_url: &str,
    failure_info: &FailureInfo,
) -> Result<HashMap<String, ChangeLog>> {
    let revisions = failure_info.blamed_revisions();
    debug!("Pulling {} change logs from {repo_url}", revisions.len());

    let results = join_all(
        revisions
            .iter()
            .map(|revision| oracle.change_log(repo_url, revision)),
    )
    .await;

    revisions
        .into_iter()
        .zip(results)
        .map(|(revision, change_log)| Ok((revision.to_string(), change_log?)))
        .collect()
}

/// Scores every blamed CL against every failed step of a build.
///
/// Returns the per-step results and the suspects merged across steps. Builds
/// that did not fail, have no known revision or failed on infra yield an
/// empty result.
pub async fn analyze_build_failure<P: PathOracle, B: BlameOracle>(
    scorer: &SuspicionScorer<P, B>,
    input: &BuildFailureInput,
    use_ninja_output: bool,
) -> Result<(AnalysisResult, Vec<SuspectedCl>)> {
    let failure_info = &input.failure_info;
    let mut analysis_result = AnalysisResult::default();

    if !failure_info.failed || failure_info.chromium_revision.is_none() {
        info!("Nothing to analyze: no failed step or no revision");
        return Ok((analysis_result, Vec::new()));
    }
    if failure_info.failure_type == Some(FailureType::Infra) {
        info!("Skipping infra failure");
        return Ok((analysis_result, Vec::new()));
    }

    let mut aggregator = SuspectAggregator::new();
    let empty_signal = StepSignal::default();

    for (step_name, step) in &failure_info.failed_steps {
        let mut step_result = StepAnalysisResult::initialize(step_name, step);
        let signal = input.signals.get(step_name).unwrap_or(&empty_signal);
        let is_test_level = step_result.tests.is_some();
        let lower_bound = step.lower_bound_for_analysis();

        if step_result.supported {
            for build_number in lower_bound..=step.current_failure {
                for revision in failure_info.blame_list(build_number) {
                    let change_log = change_log_for(input, revision)?;

                    for test_result in step_result.tests.iter_mut().flatten() {
                        let test_signal = signal
                            .tests
                            .get(&test_result.test_name)
                            .unwrap_or(&empty_signal.signal);

                        let Some((cl_info, top_score)) = scorer
                            .analyze_one_cl(
                                build_number,
                                test_signal,
                                change_log,
                                &input.deps_info,
                                false,
                            )
                            .await?
                        else {
                            continue;
                        };

                        aggregator.save_failure(
                            &cl_info,
                            step_name,
                            Some(&test_result.test_name),
                            top_score,
                        );
                        test_result.suspected_cls.push(cl_info);
                    }

                    let Some((cl_info, top_score)) = scorer
                        .analyze_one_cl(
                            build_number,
                            &signal.signal,
                            change_log,
                            &input.deps_info,
                            false,
                        )
                        .await?
                    else {
                        continue;
                    };

                    if !is_test_level {
                        aggregator.save_failure(&cl_info, step_name, None, top_score);
                    }
                    step_result.suspected_cls.push(cl_info);
                }
            }

            if step_name == COMPILE_STEP && use_ninja_output {
                let mut new_compile_suspected_cls = Vec::new();
                for build_number in lower_bound..=step.current_failure {
                    for revision in failure_info.blame_list(build_number) {
                        let change_log = change_log_for(input, revision)?;
                        if let Some((cl_info, _)) = scorer
                            .analyze_one_cl(
                                build_number,
                                &signal.signal,
                                change_log,
                                &input.deps_info,
                                true,
                            )
                            .await?
                        {
                            new_compile_suspected_cls.push(cl_info);
                        }
                    }
                }

                if step_result.suspected_cls.is_empty() && !new_compile_suspected_cls.is_empty() {
                    debug!("Falling back to ninja dependencies for {step_name}");
                    step_result.use_ninja_dependencies = true;
                    step_result.suspected_cls = new_compile_suspected_cls.clone();
                    for cl_info in &step_result.suspected_cls {
                        aggregator.save_failure(cl_info, step_name, None, NINJA_DEPENDENCY_SCORE);
                    }
                }
                step_result.new_compile_suspected_cls = Some(new_compile_suspected_cls);
            }
        }

        info!(
            "Step {step_name}: {} suspected CL(s)",
            step_result.suspected_cls.len()
        );
        analysis_result.failures.push(step_result);
    }

    Ok((analysis_result, aggregator.into_suspected_cls()))
}

fn change_log_for<'a>(input: &'a BuildFailureInput, revision: &str) -> Result<&'a ChangeLog> {
    input
        .change_logs
        .get(revision)
        .ok_or_else(|| FinditError::Malformed(format!("no change log for revision {revision}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::aggregator::{result_analysis_status, ResultStatus};
    use crate::heuristic::testing::{change_log, touched, FakeBlame, ADD, MODIFY};
    use crate::heuristic::types::FailedEdge;
    use crate::heuristic::{ChromiumPathOracle, ScorerConfig};

    fn scorer() -> SuspicionScorer<ChromiumPathOracle, FakeBlame> {
        SuspicionScorer::new(
            ChromiumPathOracle::default(),
            FakeBlame::default(),
            ScorerConfig::default(),
        )
    }

    fn step(current_failure: u64, first_failure: u64, last_pass: Option<u64>) -> StepFailureInfo {
        StepFailureInfo {
            current_failure,
            first_failure,
            last_pass,
            tests: None,
            supported: true,
        }
    }

    fn file_signal(path: &str) -> FailureSignal {
        FailureSignal {
            files: IndexMap::from([(path.to_string(), Vec::new())]),
            failed_edges: Vec::new(),
        }
    }

    fn input(steps: Vec<(&str, StepFailureInfo)>) -> BuildFailureInput {
        let mut builds = BTreeMap::new();
        builds.insert(
            98,
            BuildBlameList {
                blame_list: vec!["r98".to_string()],
            },
        );
        builds.insert(
            99,
            BuildBlameList {
                blame_list: vec!["r99_1".to_string(), "r99_2".to_string()],
            },
        );

        let change_logs = [
            change_log("r98", "a@example.com", 1, vec![touched(ADD, "a/old.cc")]),
            change_log("r99_1", "b@example.com", 2, vec![touched(MODIFY, "a/x.cc")]),
            change_log("r99_2", "c@example.com", 3, vec![touched(ADD, "b/y.cc")]),
        ]
        .into_iter()
        .map(|log| (log.revision.clone(), log))
        .collect();

        BuildFailureInput {
            failure_info: FailureInfo {
                failed: true,
                master_name: "m".to_string(),
                builder_name: "b".to_string(),
                build_number: 99,
                chromium_revision: Some("r99_2".to_string()),
                failure_type: Some(FailureType::Compile),
                failed_steps: steps
                    .into_iter()
                    .map(|(name, step)| (name.to_string(), step))
                    .collect(),
                builds,
            },
            change_logs,
            deps_info: DepsInfo::default(),
            signals: HashMap::new(),
        }
    }

    #[test]
    fn lower_bound_follows_last_pass() {
        assert_eq!(step(99, 98, Some(97)).lower_bound_for_analysis(), 98);
        assert_eq!(
            step(99, 98, None).lower_bound_for_analysis(),
            98,
            "Without a last pass the first failure is the bound"
        );
        assert_eq!(step(99, 99, Some(90)).lower_bound_for_analysis(), 91);
    }

    #[test]
    fn blamed_revisions_are_unique() {
        let mut input = input(Vec::new());
        input
            .failure_info
            .builds
            .get_mut(&99)
            .unwrap()
            .blame_list
            .push("r98".to_string());

        assert_eq!(
            input.failure_info.blamed_revisions(),
            vec!["r98", "r99_1", "r99_2"]
        );
    }

    #[cfg(test)]
    mod analyze_build_failure {
        use super::*;

        #[tokio::test]
        async fn bails_out_when_not_failed() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input.failure_info.failed = false;

            let (result, suspects) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            assert!(result.failures.is_empty());
            assert!(suspects.is_empty());
        }

        #[tokio::test]
        async fn bails_out_on_infra_failure() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input.failure_info.failure_type = Some(FailureType::Infra);

            let (result, _) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            assert!(result.failures.is_empty(), "Infra failures are not analyzed");
        }

        #[tokio::test]
        async fn bails_out_without_revision() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input.failure_info.chromium_revision = None;

            let (result, _) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            assert!(result.failures.is_empty());
        }

        #[tokio::test]
        async fn scores_step_level_signal() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input
                .signals
                .insert("compile".to_string(), StepSignal {
                    signal: file_signal("b/y.cc"),
                    tests: IndexMap::new(),
                });

            let (result, suspects) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            let step = &result.failures[0];
            assert_eq!(step.step_name, "compile");
            assert_eq!(step.suspected_cls.len(), 1);
            assert_eq!(step.suspected_cls[0].revision, "r99_2");
            assert_eq!(step.suspected_cls[0].build_number, 99);

            assert_eq!(suspects.len(), 1);
            assert_eq!(suspects[0].failures.get("compile"), Some(&Vec::new()));
            assert_eq!(suspects[0].top_score, 5);
            assert_eq!(
                result_analysis_status(Some(&result)),
                Some(ResultStatus::FoundUntriaged)
            );
        }

        #[tokio::test]
        async fn only_scans_builds_after_last_pass() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input
                .signals
                .insert("compile".to_string(), StepSignal {
                    signal: file_signal("a/old.cc"),
                    tests: IndexMap::new(),
                });

            let (result, suspects) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            assert!(
                result.failures[0].suspected_cls.is_empty(),
                "Build 98 passed, so r98 is out of range"
            );
            assert!(suspects.is_empty());
            assert_eq!(
                result_analysis_status(Some(&result)),
                Some(ResultStatus::NotFoundUntriaged)
            );
        }

        #[tokio::test]
        async fn records_test_level_suspects() {
            let mut test_step = step(99, 98, None);
            test_step.tests = Some(IndexMap::from([(
                "Suite.Test".to_string(),
                TestFailureInfo {
                    first_failure: 98,
                    last_pass: None,
                },
            )]));
            let mut input = input(vec![("unit_tests", test_step)]);
            input.signals.insert(
                "unit_tests".to_string(),
                StepSignal {
                    signal: file_signal("a/old.cc"),
                    tests: IndexMap::from([("Suite.Test".to_string(), file_signal("a/old.cc"))]),
                },
            );

            let (result, suspects) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            let step = &result.failures[0];
            let tests = step.tests.as_ref().expect("test results present");
            assert_eq!(tests[0].suspected_cls.len(), 1);
            assert_eq!(step.suspected_cls.len(), 1, "Step-level result is kept too");
            assert_eq!(
                suspects[0].failures.get("unit_tests"),
                Some(&vec!["Suite.Test".to_string()]),
                "Test-level steps save the test, not the whole step"
            );
        }

        #[tokio::test]
        async fn unsupported_step_is_not_scored() {
            let mut unsupported = step(99, 99, Some(98));
            unsupported.supported = false;
            let mut input = input(vec![("compile", unsupported)]);
            input
                .signals
                .insert("compile".to_string(), StepSignal {
                    signal: file_signal("b/y.cc"),
                    tests: IndexMap::new(),
                });

            let (result, suspects) = analyze_build_failure(&scorer(), &input, false)
                .await
                .unwrap();

            assert!(result.failures[0].suspected_cls.is_empty());
            assert!(suspects.is_empty());
            assert_eq!(
                result_analysis_status(Some(&result)),
                Some(ResultStatus::Unsupported)
            );
        }

        #[tokio::test]
        async fn adopts_ninja_suspects_when_nothing_else_found() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input.signals.insert(
                "compile".to_string(),
                StepSignal {
                    signal: FailureSignal {
                        files: IndexMap::new(),
                        failed_edges: vec![FailedEdge {
                            output_nodes: vec!["obj/b/y.o".to_string()],
                            dependencies: vec!["src/b/y.cc".to_string()],
                        }],
                    },
                    tests: IndexMap::new(),
                },
            );

            let (result, suspects) = analyze_build_failure(&scorer(), &input, true)
                .await
                .unwrap();

            let step = &result.failures[0];
            assert!(step.use_ninja_dependencies);
            assert_eq!(step.suspected_cls.len(), 1);
            assert_eq!(step.new_compile_suspected_cls.as_ref().map(Vec::len), Some(1));
            assert_eq!(suspects[0].top_score, NINJA_DEPENDENCY_SCORE);
        }

        #[tokio::test]
        async fn missing_change_log_is_an_error() {
            let mut input = input(vec![("compile", step(99, 99, Some(98)))]);
            input.change_logs.remove("r99_1");

            let result = analyze_build_failure(&scorer(), &input, false).await;

            assert!(matches!(result, Err(FinditError::Malformed(_))));
        }
    }

    #[tokio::test]
    async fn pulls_every_blamed_change_log() {
        let blame = FakeBlame::default()
            .with_change_log("https://repo", change_log("r98", "a@example.com", 1, vec![]))
            .with_change_log("https://repo", change_log("r99_1", "b@example.com", 2, vec![]))
            .with_change_log("https://repo", change_log("r99_2", "c@example.com", 3, vec![]));
        let input = input(Vec::new());

        let change_logs = pull_change_logs(&blame, "https://repo", &input.failure_info)
            .await
            .unwrap();

        assert_eq!(change_logs.len(), 3);
        assert_eq!(change_logs["r99_1"].author.email, "b@example.com");
    }

    #[tokio::test]
    async fn pulling_fails_on_unknown_revision() {
        let input = input(Vec::new());

        let result = pull_change_logs(&FakeBlame::default(), "https://repo", &input.failure_info).await;

        assert!(result.is_err());
    }
}
