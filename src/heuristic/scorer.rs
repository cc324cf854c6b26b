use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::justification::{ChangeAction, Justification};
use super::paths::base_name;
use super::types::{
    ChangeLog, ChangeType, DependencyRoll, DepsInfo, FailureSignal, RepoInfo, TouchedFile,
};
use crate::error::Result;
use crate::oracles::{BlameOracle, PathOracle};

/// Author timestamps inside a v8 roll can predate the old revision, so such
/// rolls cannot be ordered and are never checked.
const V8_DEPENDENCY_PATH: &str = "src/v8";

const DEFAULT_REPO_NAME: &str = "chromium";

pub const DEFAULT_NO_BLAME_ACCOUNT: &str = "chrome-release-bot@chromium.org";

/// Knobs for suspicion scoring.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Authors whose CLs are never flagged as suspects
    pub no_blame_accounts: HashSet<String>,
    /// Repository name recorded on suspected CLs
    pub repo_name: String,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            no_blame_accounts: HashSet::from([DEFAULT_NO_BLAME_ACCOUNT.to_string()]),
            repo_name: DEFAULT_REPO_NAME.to_string(),
        }
    }
}

/// A CL suspected for one failure, with the evidence against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspectedClInfo {
    pub build_number: u64,
    pub repo_name: String,
    pub revision: String,
    pub commit_position: Option<u64>,
    pub url: Option<String>,
    #[serde(flatten)]
    pub justification: Justification,
}

/// Decides how likely a CL caused a failure.
pub struct SuspicionScorer<P, B> {
    paths: P,
    blame: B,
    config: ScorerConfig,
}

impl<P: PathOracle, B: BlameOracle> SuspicionScorer<P, B> {
    pub fn new(paths: P, blame: B, config: ScorerConfig) -> Self {
        Self {
            paths,
            blame,
            config,
        }
    }

    pub fn blame_oracle(&self) -> &B {
        &self.blame
    }

    /// Scores one CL against one failure signal.
    ///
    /// Returns `None` when nothing the CL touched matches the signal and
    /// when the author is on the no-blame list.
    pub async fn analyze_one_cl(
        &self,
        build_number: u64,
        failure_signal: &FailureSignal,
        change_log: &ChangeLog,
        deps_info: &DepsInfo,
        use_ninja_output: bool,
    ) -> Result<Option<(SuspectedClInfo, u32)>> {
        if self
            .config
            .no_blame_accounts
            .contains(&change_log.author.email)
        {
            debug!(
                "Skipping {} by {}: author is never blamed",
                change_log.revision, change_log.author.email
            );
            return Ok(None);
        }

        let Some(justification) = self
            .check_files(failure_signal, change_log, deps_info, use_ninja_output)
            .await?
        else {
            return Ok(None);
        };

        let top_score = justification.top_hint_score().unwrap_or_default();
        debug!(
            "Suspected {} in build {build_number} with score {} (top hint {top_score})",
            change_log.revision,
            justification.score()
        );

        Ok(Some((
            self.create_cl_info(justification, build_number, change_log),
            top_score,
        )))
    }

    fn create_cl_info(
        &self,
        justification: Justification,
        build_number: u64,
        change_log: &ChangeLog,
    ) -> SuspectedClInfo {
        SuspectedClInfo {
            build_number,
            repo_name: self.config.repo_name.clone(),
            revision: change_log.revision.clone(),
            commit_position: change_log.commit_position,
            url: change_log.representative_url().map(str::to_string),
            justification,
        }
    }

    /// Checks the files of a CL against the failure signal.
    ///
    /// With `check_dependencies` the signal's ninja dependency edges are
    /// matched instead of log paths, and no line numbers are available.
    pub async fn check_files(
        &self,
        failure_signal: &FailureSignal,
        change_log: &ChangeLog,
        deps_info: &DepsInfo,
        check_dependencies: bool,
    ) -> Result<Option<Justification>> {
        let file_name_occurrences = count_file_names(&change_log.touched_files);
        let mut justification = Justification::new();

        let rolls = deps_info.rolls_for(&change_log.revision);
        let repo_info = deps_info.primary.as_ref();

        if check_dependencies {
            for failed_edge in &failure_signal.failed_edges {
                for dependency in &failed_edge.dependencies {
                    let dependency = self.paths.strip_root(dependency);
                    for touched_file in &change_log.touched_files {
                        self.check_file(
                            touched_file,
                            &dependency,
                            &mut justification,
                            &file_name_occurrences,
                            &[],
                            repo_info,
                            &change_log.revision,
                            true,
                        )
                        .await?;
                    }

                    self.check_file_in_dependency_rolls(&dependency, rolls, &mut justification, &[])
                        .await?;
                }
            }
        } else {
            for (file_path_in_log, line_numbers) in &failure_signal.files {
                let file_path_in_log = self.paths.strip_root(file_path_in_log);
                for touched_file in &change_log.touched_files {
                    self.check_file(
                        touched_file,
                        &file_path_in_log,
                        &mut justification,
                        &file_name_occurrences,
                        line_numbers,
                        repo_info,
                        &change_log.revision,
                        false,
                    )
                    .await?;
                }

                self.check_file_in_dependency_rolls(
                    &file_path_in_log,
                    rolls,
                    &mut justification,
                    line_numbers,
                )
                .await?;
            }
        }

        if justification.is_empty() {
            Ok(None)
        } else {
            Ok(Some(justification))
        }
    }

    /// Same-file check: base names when the base name is unique in the CL,
    /// full paths otherwise.
    fn is_same_file(
        &self,
        changed_path: &str,
        path_in_log: &str,
        file_name_occurrences: &HashMap<String, usize>,
    ) -> bool {
        let file_name = base_name(changed_path);
        if file_name_occurrences.get(file_name) == Some(&1) {
            self.paths
                .same_file(file_name, base_name(path_in_log))
        } else {
            self.paths.same_file(changed_path, path_in_log)
        }
    }

    /// 5 for an added/deleted file in the log, 1 for a related file.
    fn score_whole_file(
        &self,
        changed_path: &str,
        path_in_log: &str,
        file_name_occurrences: &HashMap<String, usize>,
    ) -> u32 {
        if self.is_same_file(changed_path, path_in_log, file_name_occurrences) {
            5
        } else if self.paths.is_related(changed_path, path_in_log) {
            1
        } else {
            0
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn check_file(
        &self,
        touched_file: &TouchedFile,
        file_path_in_log: &str,
        justification: &mut Justification,
        file_name_occurrences: &HashMap<String, usize>,
        line_numbers: &[u32],
        repo_info: Option<&RepoInfo>,
        suspected_revision: &str,
        check_dependencies: bool,
    ) -> Result<()> {
        let change_type = touched_file.change_type;
        let occurrences = |path: &str| {
            file_name_occurrences
                .get(base_name(path))
                .copied()
                .unwrap_or_default()
        };

        if change_type == ChangeType::Modify {
            if let Some(changed_path) = touched_file.new_path.as_deref() {
                let mut changed_lines = Vec::new();
                let score = if self.is_same_file(
                    changed_path,
                    file_path_in_log,
                    file_name_occurrences,
                ) {
                    changed_lines = self
                        .changed_lines_in_primary_repo(
                            repo_info,
                            changed_path,
                            line_numbers,
                            suspected_revision,
                        )
                        .await?;
                    if changed_lines.is_empty() {
                        2
                    } else {
                        4
                    }
                } else if self.paths.is_related(changed_path, file_path_in_log) {
                    1
                } else {
                    0
                };

                if score > 0 {
                    justification.add_file_change(
                        ChangeAction::Modified,
                        changed_path,
                        file_path_in_log,
                        score,
                        occurrences(changed_path),
                        &changed_lines,
                        check_dependencies,
                    );
                }
            }
        }

        if matches!(
            change_type,
            ChangeType::Add | ChangeType::Copy | ChangeType::Rename
        ) {
            if let Some(changed_path) = touched_file.new_path.as_deref() {
                let score =
                    self.score_whole_file(changed_path, file_path_in_log, file_name_occurrences);
                if score > 0 {
                    justification.add_file_change(
                        ChangeAction::Added,
                        changed_path,
                        file_path_in_log,
                        score,
                        occurrences(changed_path),
                        &[],
                        check_dependencies,
                    );
                }
            }
        }

        if change_type.has_old_side() {
            if let Some(changed_path) = touched_file.old_path.as_deref() {
                let score =
                    self.score_whole_file(changed_path, file_path_in_log, file_name_occurrences);
                if score > 0 {
                    justification.add_file_change(
                        ChangeAction::Deleted,
                        changed_path,
                        file_path_in_log,
                        score,
                        occurrences(changed_path),
                        &[],
                        check_dependencies,
                    );
                }
            }
        }

        Ok(())
    }

    /// Lines from the log that blame attributes to the suspected revision.
    async fn changed_lines_in_primary_repo(
        &self,
        repo_info: Option<&RepoInfo>,
        touched_path: &str,
        line_numbers: &[u32],
        suspected_revision: &str,
    ) -> Result<Vec<u32>> {
        let Some(repo_info) = repo_info else {
            return Ok(Vec::new());
        };
        if line_numbers.is_empty() {
            return Ok(Vec::new());
        }

        let Some(blame) = self
            .blame
            .blame(&repo_info.repo_url, &repo_info.revision, touched_path)
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut changed_lines = Vec::new();
        for &line_number in line_numbers {
            for region in &blame {
                if region.revision == suspected_revision && region.contains(line_number) {
                    changed_lines.push(line_number);
                }
            }
        }

        Ok(changed_lines)
    }

    async fn check_file_in_dependency_rolls(
        &self,
        file_path_in_log: &str,
        rolls: &[DependencyRoll],
        justification: &mut Justification,
        line_numbers: &[u32],
    ) -> Result<()> {
        for roll in rolls {
            if roll.path == V8_DEPENDENCY_PATH {
                continue;
            }

            let dep_path = self.paths.strip_root(&roll.path);
            let Some(relative_path) = file_path_in_log
                .strip_prefix(dep_path.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                continue;
            };

            let mut changed_lines = Vec::new();
            let mut roll_file_change_type = None;
            let (action, score) = match (roll.old_revision.as_deref(), roll.new_revision.as_deref())
            {
                (Some(old_revision), Some(new_revision)) => {
                    let Some((change_type, lines)) = self
                        .changed_lines_in_dependency_repo(
                            &roll.repo_url,
                            old_revision,
                            new_revision,
                            relative_path,
                            line_numbers,
                        )
                        .await?
                    else {
                        continue;
                    };

                    let score = match change_type {
                        ChangeType::Add | ChangeType::Delete => 5,
                        _ if lines.is_empty() => 1,
                        _ => 4,
                    };
                    roll_file_change_type = Some(change_type);
                    changed_lines = lines;
                    (ChangeAction::Rolled, score)
                }
                (None, Some(_)) => (ChangeAction::Added, 5),
                (Some(_), None) => (ChangeAction::Deleted, 5),
                (None, None) => {
                    warn!("Dependency roll of {} has no revisions", roll.path);
                    continue;
                }
            };

            justification.add_deps_roll(
                action,
                &dep_path,
                &roll.repo_url,
                roll.new_revision.as_deref(),
                roll.old_revision.as_deref(),
                relative_path,
                score,
                &changed_lines,
                roll_file_change_type,
            );
        }

        Ok(())
    }

    /// How the first commit of a roll touching `file_path` changed it, and the
    /// lines from the log changed within the roll.
    ///
    /// Returns `None` for downgrades and when no commit in the roll touches
    /// the file.
    async fn changed_lines_in_dependency_repo(
        &self,
        repo_url: &str,
        old_revision: &str,
        new_revision: &str,
        file_path: &str,
        line_numbers: &[u32],
    ) -> Result<Option<(ChangeType, Vec<u32>)>> {
        let old_change_log = self.blame.change_log(repo_url, old_revision).await?;
        let new_change_log = self.blame.change_log(repo_url, new_revision).await?;

        if old_change_log.author.time >= new_change_log.author.time {
            debug!("Roll {old_revision}..{new_revision} of {repo_url} is a downgrade, skipping");
            return Ok(None);
        }

        let changes_in_roll = self
            .blame
            .change_logs(repo_url, old_revision, new_revision)
            .await?;

        let Some((change_type, culprit_revision)) =
            self.first_commit_touching(file_path, &changes_in_roll)
        else {
            return Ok(None);
        };

        let mut changed_lines = Vec::new();
        if change_type == ChangeType::Modify && !line_numbers.is_empty() {
            if let Some(blame) = self
                .blame
                .blame(repo_url, culprit_revision, file_path)
                .await?
            {
                let revisions_in_roll: HashSet<&str> = changes_in_roll
                    .iter()
                    .map(|change| change.revision.as_str())
                    .collect();

                for region in &blame {
                    for &line_number in line_numbers {
                        if region.contains(line_number)
                            && revisions_in_roll.contains(region.revision.as_str())
                        {
                            changed_lines.push(line_number);
                        }
                    }
                }
            }
        }

        Ok(Some((change_type, changed_lines)))
    }

    fn first_commit_touching<'a>(
        &self,
        file_path: &str,
        change_logs: &'a [ChangeLog],
    ) -> Option<(ChangeType, &'a str)> {
        change_logs.iter().find_map(|change_log| {
            change_log.touched_files.iter().find_map(|touched_file| {
                touched_file
                    .effective_path()
                    .filter(|path| self.paths.same_file(path, file_path))
                    .map(|_| (touched_file.change_type, change_log.revision.as_str()))
            })
        })
    }
}

/// Occurrences of each touched base name; RENAME counts both sides.
fn count_file_names(touched_files: &[TouchedFile]) -> HashMap<String, usize> {
    let mut occurrences: HashMap<String, usize> = HashMap::new();

    for touched_file in touched_files {
        if touched_file.change_type.has_new_side() {
            if let Some(path) = touched_file.new_path.as_deref() {
                *occurrences.entry(base_name(path).to_string()).or_insert(0) += 1;
            }
        }
        if touched_file.change_type.has_old_side() {
            if let Some(path) = touched_file.old_path.as_deref() {
                *occurrences.entry(base_name(path).to_string()).or_insert(0) += 1;
            }
        }
    }

    occurrences
}
