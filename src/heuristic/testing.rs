//! In-memory fakes shared by the heuristic tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::types::{BlameRegion, ChangeLog, ChangeType, Contributor, TouchedFile};
use crate::error::{FinditError, Result};
use crate::oracles::BlameOracle;

pub const ADD: &str = "add";
pub const DELETE: &str = "delete";
pub const MODIFY: &str = "modify";
pub const RENAME: &str = "rename";

fn parse_change_type(kind: &str) -> ChangeType {
    match kind {
        ADD => ChangeType::Add,
        DELETE => ChangeType::Delete,
        RENAME => ChangeType::Rename,
        "copy" => ChangeType::Copy,
        _ => ChangeType::Modify,
    }
}

/// A touched file; DELETE fills the old side, RENAME both sides.
pub fn touched(kind: &str, path: &str) -> TouchedFile {
    let change_type = parse_change_type(kind);
    let old_path = change_type.has_old_side().then(|| path.to_string());
    let new_path = (change_type != ChangeType::Delete).then(|| path.to_string());

    TouchedFile {
        change_type,
        old_path,
        new_path,
    }
}

pub fn change_log(
    revision: &str,
    author_email: &str,
    author_time_secs: i64,
    touched_files: Vec<TouchedFile>,
) -> ChangeLog {
    ChangeLog {
        revision: revision.to_string(),
        author: Contributor {
            name: String::new(),
            email: author_email.to_string(),
            time: DateTime::<Utc>::from_timestamp(author_time_secs, 0).unwrap(),
        },
        committer: None,
        commit_position: None,
        touched_files,
        code_review_url: None,
        commit_url: None,
    }
}

#[derive(Debug, Default)]
pub struct FakeBlame {
    blames: HashMap<(String, String, String), Vec<BlameRegion>>,
    change_logs: HashMap<(String, String), ChangeLog>,
    rolls: HashMap<(String, String, String), Vec<ChangeLog>>,
}

impl FakeBlame {
    pub fn with_blame(
        mut self,
        repo_url: &str,
        revision: &str,
        path: &str,
        regions: Vec<BlameRegion>,
    ) -> Self {
        self.blames.insert(
            (repo_url.to_string(), revision.to_string(), path.to_string()),
            regions,
        );
        self
    }

    pub fn with_change_log(mut self, repo_url: &str, change_log: ChangeLog) -> Self {
        self.change_logs
            .insert((repo_url.to_string(), change_log.revision.clone()), change_log);
        self
    }

    pub fn with_roll(mut self, repo_url: &str, from: &str, to: &str, logs: Vec<ChangeLog>) -> Self {
        self.rolls
            .insert((repo_url.to_string(), from.to_string(), to.to_string()), logs);
        self
    }
}

impl BlameOracle for FakeBlame {
    async fn blame(
        &self,
        repo_url: &str,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<BlameRegion>>> {
        Ok(self
            .blames
            .get(&(repo_url.to_string(), revision.to_string(), path.to_string()))
            .cloned())
    }

    async fn change_log(&self, repo_url: &str, revision: &str) -> Result<ChangeLog> {
        self.change_logs
            .get(&(repo_url.to_string(), revision.to_string()))
            .cloned()
            .ok_or_else(|| FinditError::Malformed(format!("unknown revision {revision}")))
    }

    async fn change_logs(&self, repo_url: &str, from: &str, to: &str) -> Result<Vec<ChangeLog>> {
        Ok(self
            .rolls
            .get(&(repo_url.to_string(), from.to_string(), to.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
