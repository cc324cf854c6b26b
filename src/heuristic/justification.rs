use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::paths::base_name;
use super::types::ChangeType;

/// Score recorded for every match found through ninja dependency edges.
pub const NINJA_DEPENDENCY_SCORE: u32 = 2;

/// How a suspected CL changed the file behind a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Deleted,
    Modified,
    Rolled,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::Added => "added",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
            Self::Rolled => "rolled",
        };
        f.write_str(action)
    }
}

/// Why a CL might be suspected for a failure.
///
/// A hint describes one reason (e.g. "added x_impl.cc (and it was in log)")
/// and carries the score it contributed. Highly suspicious evidence such as
/// deleting a file named in a compile failure scores 5; a change to a merely
/// related file scores 1.
///
/// The total is 0 exactly when nothing matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Justification {
    score: u32,
    hints: IndexMap<String, u32>,
}

fn join_lines(lines: &[u32]) -> String {
    lines
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn short_revision(revision: &str) -> &str {
    revision.get(..12).unwrap_or(revision)
}

impl Justification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn hints(&self) -> &IndexMap<String, u32> {
        &self.hints
    }

    pub fn is_empty(&self) -> bool {
        self.score == 0
    }

    /// Highest single hint contribution.
    pub fn top_hint_score(&self) -> Option<u32> {
        self.hints.values().copied().max()
    }

    /// Records a touched file matching a path from the failure.
    ///
    /// When the base name occurs once in the CL the hint only shows base
    /// names. Matches found through ninja dependencies reset the total to
    /// [`NINJA_DEPENDENCY_SCORE`] instead of accumulating.
    #[allow(clippy::too_many_arguments)]
    pub fn add_file_change(
        &mut self,
        action: ChangeAction,
        changed_src_file_path: &str,
        file_path_in_log: &str,
        score: u32,
        num_file_name_occurrences: usize,
        changed_line_numbers: &[u32],
        check_dependencies: bool,
    ) {
        let (changed, in_log) = if num_file_name_occurrences == 1 {
            (base_name(changed_src_file_path), base_name(file_path_in_log))
        } else {
            (changed_src_file_path, file_path_in_log)
        };

        let hint = if changed != in_log {
            format!("{action} {changed} ({in_log} was in log)")
        } else if changed_line_numbers.is_empty() {
            format!("{action} {changed} (and it was in log)")
        } else {
            format!(
                "{action} {changed}[{}] (and it was in log)",
                join_lines(changed_line_numbers)
            )
        };

        if check_dependencies {
            self.score = NINJA_DEPENDENCY_SCORE;
            let hint = hint.replace("in log", "in dependencies found by ninja");
            self.hints.insert(hint, self.score);
        } else {
            self.score += score;
            *self.hints.entry(hint).or_insert(0) += score;
        }
    }

    /// Records a dependency roll that changed a file from the failure.
    ///
    /// A repeated hint overwrites its entry while the total still grows.
    #[allow(clippy::too_many_arguments)]
    pub fn add_deps_roll(
        &mut self,
        action: ChangeAction,
        dep_path: &str,
        dep_repo_url: &str,
        dep_new_revision: Option<&str>,
        dep_old_revision: Option<&str>,
        file_path_in_log: &str,
        score: u32,
        changed_line_numbers: &[u32],
        roll_file_change_type: Option<ChangeType>,
    ) {
        let changes_url = match (dep_old_revision, dep_new_revision) {
            (Some(old), Some(new)) => format!(
                "{dep_repo_url}/+log/{}..{}?pretty=fuller",
                short_revision(old),
                short_revision(new)
            ),
            (_, Some(new)) => format!("{dep_repo_url}/+log/{new}"),
            (Some(old), None) => format!("{dep_repo_url}/+log/{old}"),
            (None, None) => format!("{dep_repo_url}/+log"),
        };

        let prefix = format!("{action} dependency {dep_path} with changes in {changes_url}");
        let hint = match roll_file_change_type {
            Some(ChangeType::Add) => format!("{prefix} (and {file_path_in_log}(added) was in log)"),
            Some(ChangeType::Delete) => {
                format!("{prefix} (and {file_path_in_log}(deleted) was in log)")
            }
            _ if !changed_line_numbers.is_empty() => format!(
                "{prefix} (and {file_path_in_log}[{}] was in log)",
                join_lines(changed_line_numbers)
            ),
            _ => format!("{prefix} (and {file_path_in_log} was in log)"),
        };

        self.hints.insert(hint, score);
        self.score += score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_justification_is_empty() {
        let justification = Justification::new();
        assert!(justification.is_empty());
        assert_eq!(justification.top_hint_score(), None);
    }

    #[cfg(test)]
    mod add_file_change {
        use super::*;

        #[test]
        fn uses_base_names_when_unique() {
            let mut justification = Justification::new();
            justification.add_file_change(
                ChangeAction::Added,
                "a/b/x.cc",
                "b/x.cc",
                5,
                1,
                &[],
                false,
            );

            assert_eq!(justification.score(), 5);
            assert_eq!(
                justification.hints().get("added x.cc (and it was in log)"),
                Some(&5)
            );
        }

        #[test]
        fn keeps_full_paths_when_base_name_repeats() {
            let mut justification = Justification::new();
            justification.add_file_change(
                ChangeAction::Deleted,
                "a/b/x.cc",
                "b/x.cc",
                5,
                2,
                &[],
                false,
            );

            assert_eq!(
                justification.hints().get("deleted a/b/x.cc (b/x.cc was in log)"),
                Some(&5)
            );
        }

        #[test]
        fn lists_changed_lines() {
            let mut justification = Justification::new();
            justification.add_file_change(
                ChangeAction::Modified,
                "a/x.cc",
                "a/x.cc",
                4,
                1,
                &[12, 30],
                false,
            );

            assert_eq!(
                justification
                    .hints()
                    .get("modified x.cc[12, 30] (and it was in log)"),
                Some(&4)
            );
        }

        #[test]
        fn repeated_hints_accumulate() {
            let mut justification = Justification::new();
            for _ in 0..2 {
                justification.add_file_change(
                    ChangeAction::Modified,
                    "a/x.cc",
                    "a/x.cc",
                    2,
                    1,
                    &[],
                    false,
                );
            }

            assert_eq!(justification.score(), 4);
            assert_eq!(
                justification.hints().get("modified x.cc (and it was in log)"),
                Some(&4),
                "Same hint twice should add both contributions"
            );
        }

        #[test]
        fn ninja_dependencies_overwrite_total() {
            let mut justification = Justification::new();
            justification.add_file_change(
                ChangeAction::Added,
                "a/x.cc",
                "a/x.cc",
                5,
                1,
                &[],
                true,
            );
            justification.add_file_change(
                ChangeAction::Added,
                "a/y.cc",
                "a/y.cc",
                5,
                1,
                &[],
                true,
            );

            assert_eq!(
                justification.score(),
                NINJA_DEPENDENCY_SCORE,
                "Dependency matches reset the total rather than adding"
            );
            assert_eq!(
                justification
                    .hints()
                    .get("added x.cc (and it was in dependencies found by ninja)"),
                Some(&2)
            );
            assert_eq!(justification.hints().len(), 2);
        }
    }

    #[cfg(test)]
    mod add_deps_roll {
        use super::*;

        #[test]
        fn builds_range_url_with_short_revisions() {
            let mut justification = Justification::new();
            justification.add_deps_roll(
                ChangeAction::Rolled,
                "third_party/dep",
                "https://repo.example/dep",
                Some("1234567890abcdef"),
                Some("fedcba0987654321"),
                "a/x.cc",
                5,
                &[],
                Some(ChangeType::Add),
            );

            let expected = "rolled dependency third_party/dep with changes in \
                https://repo.example/dep/+log/fedcba098765..1234567890ab?pretty=fuller \
                (and a/x.cc(added) was in log)";
            assert_eq!(justification.hints().get(expected), Some(&5));
        }

        #[test]
        fn single_revision_url_when_added() {
            let mut justification = Justification::new();
            justification.add_deps_roll(
                ChangeAction::Added,
                "third_party/dep",
                "https://repo.example/dep",
                Some("1234567890abcdef"),
                None,
                "a/x.cc",
                5,
                &[],
                None,
            );

            let expected = "added dependency third_party/dep with changes in \
                https://repo.example/dep/+log/1234567890abcdef (and a/x.cc was in log)";
            assert_eq!(justification.hints().get(expected), Some(&5));
        }

        #[test]
        fn lists_changed_lines_for_modified_file() {
            let mut justification = Justification::new();
            justification.add_deps_roll(
                ChangeAction::Rolled,
                "dep",
                "https://repo.example/dep",
                Some("new"),
                Some("old"),
                "x.cc",
                4,
                &[7],
                Some(ChangeType::Modify),
            );

            let expected = "rolled dependency dep with changes in \
                https://repo.example/dep/+log/old..new?pretty=fuller (and x.cc[7] was in log)";
            assert_eq!(justification.hints().get(expected), Some(&4));
        }

        #[test]
        fn repeated_hint_is_set_but_total_grows() {
            let mut justification = Justification::new();
            for score in [5, 1] {
                justification.add_deps_roll(
                    ChangeAction::Deleted,
                    "dep",
                    "https://repo.example/dep",
                    None,
                    Some("old"),
                    "x.cc",
                    score,
                    &[],
                    None,
                );
            }

            assert_eq!(justification.score(), 6, "Total accumulates every roll");
            assert_eq!(justification.hints().len(), 1);
            assert_eq!(
                justification.hints().values().next(),
                Some(&1),
                "Hint entry keeps the last score"
            );
            assert_eq!(justification.top_hint_score(), Some(1));
        }
    }
}
