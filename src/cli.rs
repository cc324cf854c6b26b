use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use findit::auth::Token;
use findit::config::Config;
use findit::flake::{
    Bisector, JsonAnalysisStore, Pruner, RegressionRange, ThresholdClassifier,
};
use findit::heuristic::aggregator::{result_analysis_status, simplify, ClSummary};
use findit::heuristic::analysis::pull_change_logs;
use findit::heuristic::{
    analyze_build_failure, AnalysisResult, BuildFailureInput, ChromiumPathOracle, ResultStatus,
    SuspectedCl, SuspicionScorer,
};
use findit::providers::{BuildInfoClient, GitilesClient};

use crate::output::{self, StepProgress};

#[derive(Parser)]
#[command(name = "findit")]
#[command(author, version, about = "Heuristic CI failure triage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./findit.toml or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Score the CLs in a failed build's blame lists
    Heuristic {
        /// JSON file with failure info, signals and optional change logs
        #[arg(short, long)]
        input: PathBuf,

        /// Fall back to ninja dependency edges for compile failures
        #[arg(long, default_value_t = false)]
        ninja: bool,

        #[arg(short, long, env = "GITILES_TOKEN")]
        token: Option<String>,
    },
    /// Find the earliest build containing a commit position
    Bisect {
        /// Flake analysis JSON file
        #[arg(short, long)]
        analysis: PathBuf,

        #[arg(short = 'C', long)]
        commit_position: u64,

        #[arg(short, long, env = "FINDIT_BUILD_INFO_URL")]
        build_info_url: Option<String>,

        #[arg(short, long, env = "BUILD_INFO_TOKEN")]
        token: Option<String>,

        #[arg(long)]
        max_probes: Option<usize>,
    },
    /// Remove stable data points measured with too few iterations
    Prune {
        /// Flake analysis JSON file, rewritten in place
        #[arg(short, long)]
        analysis: PathBuf,

        #[arg(short, long)]
        lower_build: u64,

        #[arg(short, long)]
        upper_build: u64,

        #[arg(short, long)]
        min_iterations: Option<u32>,
    },
}

#[derive(Serialize)]
struct HeuristicReport {
    analysis: AnalysisResult,
    suspected_cls: Vec<SuspectedCl>,
    summary: Vec<ClSummary>,
    status: Option<ResultStatus>,
}

#[derive(Serialize)]
struct BisectReport {
    commit_position: u64,
    build_number: u64,
    regression_range: RegressionRange,
}

#[derive(Serialize)]
struct PruneReport {
    removed: usize,
    remaining: usize,
}

impl Cli {
    fn write_json<T: Serialize>(&self, value: &T, pretty: bool) -> Result<()> {
        if let Some(output_path) = &self.output {
            let mut file = File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?;
            output::export_json(value, pretty, &mut file)?;
            info!("Results written to: {}", output_path.display());
        } else {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            output::export_json(value, pretty, &mut handle)?;
            handle.flush()?;
        }
        Ok(())
    }

    async fn execute_heuristic(
        &self,
        config: &Config,
        input_path: &Path,
        ninja: bool,
        token: Option<&str>,
    ) -> Result<()> {
        let contents = tokio::fs::read_to_string(input_path)
            .await
            .with_context(|| format!("Failed to read {}", input_path.display()))?;
        let mut input: BuildFailureInput = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", input_path.display()))?;

        let failure_info = &input.failure_info;
        info!(
            "Analyzing {}/{} build {}",
            failure_info.master_name, failure_info.builder_name, failure_info.build_number
        );

        let token = token.map(Token::from).or_else(|| config.gitiles.token());
        let gitiles = GitilesClient::new(token, config.gitiles.retry_policy())?;

        if input.change_logs.is_empty() {
            let progress = StepProgress::start("Pulling change logs");
            match pull_change_logs(&gitiles, &config.heuristic.repo_url, &input.failure_info).await
            {
                Ok(change_logs) => {
                    progress.finish(&format!("Pulled {} change logs", change_logs.len()));
                    input.change_logs = change_logs;
                }
                Err(e) => {
                    progress.abandon();
                    return Err(e).context("Failed to pull change logs");
                }
            }
        }

        let scorer = SuspicionScorer::new(
            ChromiumPathOracle::new(config.heuristic.root_prefix.clone()),
            gitiles,
            config.heuristic.scorer_config(),
        );
        let use_ninja_output = ninja || config.heuristic.use_ninja_output;
        let (analysis, suspected_cls) =
            analyze_build_failure(&scorer, &input, use_ninja_output).await?;

        let status = result_analysis_status(Some(&analysis));
        output::print_heuristic_summary(&input.failure_info, status, &suspected_cls);

        let report = HeuristicReport {
            summary: simplify(&suspected_cls),
            analysis,
            suspected_cls,
            status,
        };
        self.write_json(&report, self.pretty || config.output.pretty)
    }

    async fn execute_bisect(
        &self,
        config: &Config,
        analysis_path: &Path,
        commit_position: u64,
        build_info_url: Option<&str>,
        token: Option<&str>,
        max_probes: Option<usize>,
    ) -> Result<()> {
        let store = JsonAnalysisStore::new(analysis_path);
        let analysis = store
            .load()
            .await
            .with_context(|| format!("Failed to load {}", analysis_path.display()))?;

        let base_url = build_info_url
            .or(config.build_info.base_url.as_deref())
            .context("No build-info URL: pass --build-info-url or set [build-info] base-url")?;
        let token = token.map(Token::from).or_else(|| config.build_info.token());
        let client = BuildInfoClient::new(base_url, token, config.build_info.retry_policy())?;

        let bisector = Bisector::new(&client, &analysis.master_name, &analysis.builder_name)
            .with_max_probes(max_probes.or(config.flake.max_probes));
        let build_number = bisector
            .earliest_containing_build_number(commit_position, &analysis)
            .await?;

        let thresholds = config.flake.thresholds();
        output::print_bisect_summary(
            &analysis,
            commit_position,
            build_number,
            &ThresholdClassifier,
            &thresholds,
        );

        let report = BisectReport {
            commit_position,
            build_number,
            regression_range: analysis.latest_regression_range(&ThresholdClassifier, &thresholds),
        };
        self.write_json(&report, self.pretty || config.output.pretty)
    }

    async fn execute_prune(
        &self,
        config: &Config,
        analysis_path: &Path,
        lower_build: u64,
        upper_build: u64,
        min_iterations: Option<u32>,
    ) -> Result<()> {
        let store = JsonAnalysisStore::new(analysis_path);
        let mut analysis = store
            .load()
            .await
            .with_context(|| format!("Failed to load {}", analysis_path.display()))?;

        let classifier = ThresholdClassifier;
        let pruner = Pruner::new(&classifier, &store, config.flake.thresholds());
        let removed = pruner
            .prune_unreliable_stable_points(
                &mut analysis,
                lower_build,
                upper_build,
                min_iterations.unwrap_or(config.flake.minimum_iterations),
            )
            .await?;

        output::print_prune_summary(&analysis, removed);

        let report = PruneReport {
            removed,
            remaining: analysis.data_points.len(),
        };
        self.write_json(&report, self.pretty || config.output.pretty)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Heuristic {
                input,
                ninja,
                token,
            } => {
                self.execute_heuristic(&config, input, *ninja, token.as_deref())
                    .await
            }
            Commands::Bisect {
                analysis,
                commit_position,
                build_info_url,
                token,
                max_probes,
            } => {
                self.execute_bisect(
                    &config,
                    analysis,
                    *commit_position,
                    build_info_url.as_deref(),
                    token.as_deref(),
                    *max_probes,
                )
                .await
            }
            Commands::Prune {
                analysis,
                lower_build,
                upper_build,
                min_iterations,
            } => {
                self.execute_prune(
                    &config,
                    analysis,
                    *lower_build,
                    *upper_build,
                    *min_iterations,
                )
                .await
            }
        }
    }
}
