use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::analysis::AnalysisResult;
use super::scorer::SuspectedClInfo;

/// Identifies a CL across the steps of one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClKey {
    pub repo_name: String,
    pub revision: String,
    pub commit_position: Option<u64>,
}

impl From<&SuspectedClInfo> for ClKey {
    fn from(cl: &SuspectedClInfo) -> Self {
        Self {
            repo_name: cl.repo_name.clone(),
            revision: cl.revision.clone(),
            commit_position: cl.commit_position,
        }
    }
}

#[derive(Debug, Default)]
struct ClFailureInfo {
    failures: IndexMap<String, Vec<String>>,
    top_score: u32,
    url: Option<String>,
}

/// A CL suspected somewhere in a build, with every failure it is blamed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectedCl {
    pub repo_name: String,
    pub revision: String,
    pub commit_position: Option<u64>,
    pub url: Option<String>,
    /// Step name -> failed tests; empty for a whole-step failure
    pub failures: IndexMap<String, Vec<String>>,
    pub top_score: u32,
}

/// Only the identifying fields of a suspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClSummary {
    pub repo_name: String,
    pub revision: String,
    pub commit_position: Option<u64>,
    pub url: Option<String>,
}

impl From<&SuspectedCl> for ClSummary {
    fn from(cl: &SuspectedCl) -> Self {
        Self {
            repo_name: cl.repo_name.clone(),
            revision: cl.revision.clone(),
            commit_position: cl.commit_position,
            url: cl.url.clone(),
        }
    }
}

/// Drops failures and scores so heuristic suspects look like any other.
pub fn simplify(suspected_cls: &[SuspectedCl]) -> Vec<ClSummary> {
    suspected_cls.iter().map(ClSummary::from).collect()
}

/// Merges per-step suspects of one build into per-CL records.
#[derive(Debug, Default)]
pub struct SuspectAggregator {
    cls: IndexMap<ClKey, ClFailureInfo>,
}

impl SuspectAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cls.is_empty()
    }

    /// Records that `cl` is suspected for `step_name` (or one of its tests).
    ///
    /// Saving a whole-step failure resets the step's test list. The first
    /// non-zero top score and the first URL seen win.
    pub fn save_failure(
        &mut self,
        cl: &SuspectedClInfo,
        step_name: &str,
        test_name: Option<&str>,
        top_score: u32,
    ) {
        let info = self.cls.entry(ClKey::from(cl)).or_default();

        match test_name {
            Some(test_name) => info
                .failures
                .entry(step_name.to_string())
                .or_default()
                .push(test_name.to_string()),
            None => {
                info.failures.insert(step_name.to_string(), Vec::new());
            }
        }

        if info.top_score == 0 {
            info.top_score = top_score;
        }
        if info.url.is_none() {
            info.url.clone_from(&cl.url);
        }
    }

    pub fn into_suspected_cls(self) -> Vec<SuspectedCl> {
        self.cls
            .into_iter()
            .map(|(key, info)| SuspectedCl {
                repo_name: key.repo_name,
                revision: key.revision,
                commit_position: key.commit_position,
                url: info.url,
                failures: info.failures,
                top_score: info.top_score,
            })
            .collect()
    }
}

/// Triage status of a heuristic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    FoundUntriaged,
    NotFoundUntriaged,
    Unsupported,
}

/// `None` when there is nothing to judge.
pub fn result_analysis_status(result: Option<&AnalysisResult>) -> Option<ResultStatus> {
    let failures = &result?.failures;
    if failures.is_empty() {
        return None;
    }

    let mut any_supported = false;
    for failure in failures {
        if !failure.suspected_cls.is_empty() {
            return Some(ResultStatus::FoundUntriaged);
        }
        any_supported |= failure.supported;
    }

    Some(if any_supported {
        ResultStatus::NotFoundUntriaged
    } else {
        ResultStatus::Unsupported
    })
}
