use std::fmt::Write;

use comfy_table::Cell;
use findit::flake::{FlakeAnalysis, RegressionRange, StabilityThresholds};
use findit::heuristic::{FailureInfo, ResultStatus, SuspectedCl};
use findit::oracles::StabilityClassifier;

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{
    color_coded_pass_rate_cell, color_coded_score_cell, create_cyan_header, create_table,
    optional_cell,
};

const MAX_SUSPECT_ROWS: usize = 20;

/// Prints the suspects of a heuristic analysis to stderr.
///
/// Scores are color coded: red for files the CL added, deleted or touched
/// exactly where the failure points, yellow for blamed line ranges and green
/// for related files only.
pub fn print_heuristic_summary(
    failure_info: &FailureInfo,
    status: Option<ResultStatus>,
    suspected_cls: &[SuspectedCl],
) {
    eprintln!(
        "{}",
        render_heuristic_summary(failure_info, status, suspected_cls)
    );
}

/// Prints a flake analysis' data points and the build a commit resolved to.
pub fn print_bisect_summary<C: StabilityClassifier>(
    analysis: &FlakeAnalysis,
    commit_position: u64,
    build_number: u64,
    classifier: &C,
    thresholds: &StabilityThresholds,
) {
    eprintln!(
        "{}",
        render_bisect_summary(analysis, commit_position, build_number, classifier, thresholds)
    );
}

pub fn print_prune_summary(analysis: &FlakeAnalysis, removed: usize) {
    eprintln!("{}", render_prune_summary(analysis, removed));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn short_revision(revision: &str) -> &str {
    revision.get(..12).unwrap_or(revision)
}

fn status_label(status: Option<ResultStatus>) -> console::StyledObject<String> {
    match status {
        Some(ResultStatus::FoundUntriaged) => bright_red("Suspects found"),
        Some(ResultStatus::NotFoundUntriaged) => bright_yellow("No suspect found"),
        Some(ResultStatus::Unsupported) => dim("Unsupported"),
        None => dim("Nothing to analyze"),
    }
}

fn format_failures(cl: &SuspectedCl) -> String {
    cl.failures
        .iter()
        .map(|(step, tests)| {
            if tests.is_empty() {
                step.clone()
            } else {
                format!("{step}: {}", tests.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_heuristic_summary(
    failure_info: &FailureInfo,
    status: Option<ResultStatus>,
    suspected_cls: &[SuspectedCl],
) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Build:"),
        cyan(format!(
            "{}/{}/{}",
            failure_info.master_name, failure_info.builder_name, failure_info.build_number
        )),
        dim("Failed steps:"),
        bright_yellow(failure_info.failed_steps.len()),
        dim("Status:"),
        status_label(status),
        dim("Suspected CLs:"),
        bright_yellow(suspected_cls.len()),
    );

    if suspected_cls.is_empty() {
        return output;
    }

    add_section_header(&mut output, "🔎", "Suspected CLs");
    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Revision",
        "Commit Position",
        "Top Score",
        "Failures",
        "URL",
    ]));

    let mut by_score: Vec<&SuspectedCl> = suspected_cls.iter().collect();
    by_score.sort_by(|a, b| b.top_score.cmp(&a.top_score));

    for cl in by_score.iter().take(MAX_SUSPECT_ROWS) {
        table.add_row(vec![
            Cell::new(short_revision(&cl.revision)),
            optional_cell(cl.commit_position),
            color_coded_score_cell(cl.top_score),
            Cell::new(format_failures(cl)),
            optional_cell(cl.url.as_deref()),
        ]);
    }
    if suspected_cls.len() > MAX_SUSPECT_ROWS {
        let _ = writeln!(
            output,
            "{}",
            dim(format!("... and {} more", suspected_cls.len() - MAX_SUSPECT_ROWS))
        );
    }
    let _ = writeln!(output, "{table}");

    output
}

fn format_range(range: &RegressionRange) -> String {
    let bound = |value: Option<u64>| value.map_or_else(|| "?".to_string(), |v| v.to_string());
    format!("({}, {}]", bound(range.lower), bound(range.upper))
}

fn render_bisect_summary<C: StabilityClassifier>(
    analysis: &FlakeAnalysis,
    commit_position: u64,
    build_number: u64,
    classifier: &C,
    thresholds: &StabilityThresholds,
) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "🧪", "Flake Analysis");
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        dim("Builder:"),
        cyan(format!("{}/{}", analysis.master_name, analysis.builder_name)),
        dim("Data points:"),
        bright_yellow(analysis.data_points.len()),
        dim("Regression range:"),
        bright_yellow(format_range(
            &analysis.latest_regression_range(classifier, thresholds)
        )),
        dim("Commit position:"),
        bright_green(format!("{commit_position} → build {build_number}")),
    );

    if analysis.data_points.is_empty() {
        return output;
    }

    let mut table = create_table();
    table.set_header(create_cyan_header(&[
        "Build",
        "Commit Positions",
        "Pass Rate",
        "Iterations",
    ]));

    let mut points: Vec<_> = analysis.data_points.iter().collect();
    points.sort_by(|a, b| b.commit_position.cmp(&a.commit_position));

    for point in points {
        let stable = classifier.is_stable(point.pass_rate, thresholds.lower, thresholds.upper);
        let positions = point.commit_position_range().map_or_else(
            || {
                point
                    .commit_position
                    .map_or_else(|| "N/A".to_string(), |cp| cp.to_string())
            },
            |range| format!("{}..={}", range.earliest, range.latest),
        );
        table.add_row(vec![
            optional_cell(point.build_number),
            Cell::new(positions),
            color_coded_pass_rate_cell(point.pass_rate, stable),
            optional_cell(point.iterations),
        ]);
    }
    let _ = writeln!(output, "{table}");

    output
}

fn render_prune_summary(analysis: &FlakeAnalysis, removed: usize) -> String {
    let mut output = String::new();
    add_section_header(&mut output, "✂️", "Pruning");
    let removed_display = if removed == 0 {
        dim("nothing to remove".to_string())
    } else {
        bright_red(format!("{removed} unreliable stable point(s) removed"))
    };
    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n",
        dim("Result:"),
        removed_display,
        dim("Remaining data points:"),
        bright_yellow(analysis.data_points.len()),
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use findit::flake::{DataPoint, ThresholdClassifier};
    use indexmap::IndexMap;

    fn failure_info() -> FailureInfo {
        serde_json::from_value(serde_json::json!({
            "failed": true,
            "master_name": "chromium.linux",
            "builder_name": "Linux Tests",
            "build_number": 123,
            "chromium_revision": "r3",
            "failed_steps": {"compile": {"current_failure": 123, "first_failure": 123}}
        }))
        .unwrap()
    }

    fn suspect(revision: &str, top_score: u32, failures: &[(&str, &[&str])]) -> SuspectedCl {
        let mut map = IndexMap::new();
        for (step, tests) in failures {
            map.insert(
                (*step).to_string(),
                tests.iter().map(|t| (*t).to_string()).collect(),
            );
        }
        SuspectedCl {
            repo_name: "chromium".to_string(),
            revision: revision.to_string(),
            commit_position: Some(1000),
            url: Some(format!("https://codereview.example/c/{top_score}")),
            failures: map,
            top_score,
        }
    }

    #[test]
    fn test_render_heuristic_summary_without_suspects() {
        let output =
            render_heuristic_summary(&failure_info(), Some(ResultStatus::NotFoundUntriaged), &[]);

        assert!(output.contains("chromium.linux/Linux Tests/123"));
        assert!(output.contains("No suspect found"));
        assert!(!output.contains("Revision"), "No table without suspects");
    }

    #[test]
    fn test_render_heuristic_summary_with_suspects() {
        let cls = vec![
            suspect("aaaaaaaaaaaaaaaaaaaa", 1, &[("compile", &[])]),
            suspect("bbbbbbbbbbbbbbbbbbbb", 5, &[("browser_tests", &["Suite.Test"])]),
        ];

        let output =
            render_heuristic_summary(&failure_info(), Some(ResultStatus::FoundUntriaged), &cls);

        assert!(output.contains("Suspects found"));
        assert!(output.contains("aaaaaaaaaaaa"), "Revisions are shortened");
        assert!(!output.contains("aaaaaaaaaaaaaaaaaaaa"));
        assert!(output.contains("browser_tests: Suite.Test"));
        assert!(output.contains("https://codereview.example/c/5"), "Review URL is shown");
        assert!(
            output.find("bbbbbbbbbbbb") < output.find("aaaaaaaaaaaa"),
            "Highest score comes first"
        );
    }

    #[test]
    fn test_render_bisect_summary() {
        let mut analysis = FlakeAnalysis::new("m", "b", 20);
        analysis.data_points = vec![
            DataPoint {
                build_number: Some(10),
                commit_position: Some(100),
                previous_build_commit_position: Some(90),
                pass_rate: 1.0,
                iterations: Some(100),
                ..DataPoint::default()
            },
            DataPoint {
                build_number: Some(20),
                commit_position: Some(200),
                previous_build_commit_position: Some(190),
                pass_rate: 0.5,
                iterations: Some(100),
                ..DataPoint::default()
            },
        ];

        let output = render_bisect_summary(
            &analysis,
            150,
            15,
            &ThresholdClassifier,
            &StabilityThresholds::default(),
        );

        assert!(output.contains("(100, 200]"), "Regression range is shown");
        assert!(output.contains("150 → build 15"));
        assert!(output.contains("91..=100"));
        assert!(output.contains("50.0%"));
    }

    #[test]
    fn test_render_prune_summary() {
        let analysis = FlakeAnalysis::new("m", "b", 1);

        assert!(render_prune_summary(&analysis, 0).contains("nothing to remove"));
        assert!(render_prune_summary(&analysis, 2).contains("2 unreliable stable point(s)"));
    }
}
