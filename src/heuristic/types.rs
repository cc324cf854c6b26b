use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a commit touched a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[serde(alias = "ADD")]
    Add,
    #[serde(alias = "DELETE")]
    Delete,
    #[serde(alias = "MODIFY")]
    Modify,
    #[serde(alias = "COPY")]
    Copy,
    #[serde(alias = "RENAME")]
    Rename,
}

impl ChangeType {
    /// Kinds whose `new_path` names a file present after the commit.
    pub fn has_new_side(self) -> bool {
        matches!(self, Self::Add | Self::Copy | Self::Rename | Self::Modify)
    }

    /// Kinds whose `old_path` names a file gone after the commit.
    pub fn has_old_side(self) -> bool {
        matches!(self, Self::Delete | Self::Rename)
    }
}

/// A single file change within a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TouchedFile {
    pub change_type: ChangeType,
    /// Set for DELETE and RENAME
    #[serde(default)]
    pub old_path: Option<String>,
    /// Set for ADD, MODIFY, COPY and RENAME
    #[serde(default)]
    pub new_path: Option<String>,
}

impl TouchedFile {
    /// The path that identifies this change when searching a commit for a file.
    pub fn effective_path(&self) -> Option<&str> {
        if self.change_type.has_old_side() {
            self.old_path.as_deref()
        } else {
            self.new_path.as_deref()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub time: DateTime<Utc>,
}

/// A commit as seen by the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub revision: String,
    pub author: Contributor,
    #[serde(default)]
    pub committer: Option<Contributor>,
    #[serde(default)]
    pub commit_position: Option<u64>,
    #[serde(default)]
    pub touched_files: Vec<TouchedFile>,
    #[serde(default)]
    pub code_review_url: Option<String>,
    #[serde(default)]
    pub commit_url: Option<String>,
}

impl ChangeLog {
    /// Review URL if the commit went through code review, else the commit URL.
    pub fn representative_url(&self) -> Option<&str> {
        self.code_review_url
            .as_deref()
            .or(self.commit_url.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEdge {
    #[serde(default)]
    pub output_nodes: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Files (and lines) implicated by a failed step or test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignal {
    /// Path as it appeared in the log -> implicated line numbers
    #[serde(default)]
    pub files: IndexMap<String, Vec<u32>>,
    /// Build-system edges that failed, with their dependency files
    #[serde(default)]
    pub failed_edges: Vec<FailedEdge>,
}

impl FailureSignal {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.failed_edges.is_empty()
    }
}

/// Repository and revision a build was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub repo_url: String,
    pub revision: String,
}

/// A CL that moved a pinned dependency from one revision to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRoll {
    pub path: String,
    pub repo_url: String,
    #[serde(default)]
    pub old_revision: Option<String>,
    #[serde(default)]
    pub new_revision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsInfo {
    /// Primary checkout used for blame lookups
    #[serde(default)]
    pub primary: Option<RepoInfo>,
    /// CL revision -> dependency rolls made by that CL
    #[serde(default)]
    pub deps_rolls: HashMap<String, Vec<DependencyRoll>>,
}

impl DepsInfo {
    pub fn rolls_for(&self, revision: &str) -> &[DependencyRoll] {
        self.deps_rolls
            .get(revision)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A contiguous range of lines last changed by one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlameRegion {
    pub revision: String,
    pub start: u32,
    pub count: u32,
}

impl BlameRegion {
    /// Whether `line` lies in `[start, start + count - 1]`.
    pub fn contains(&self, line: u32) -> bool {
        self.count > 0 && line >= self.start && line - self.start < self.count
    }
}
