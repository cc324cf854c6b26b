mod exports;
mod progress;
mod styling;
mod summary;
mod tables;

pub use exports::export_json;
pub use progress::StepProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{print_bisect_summary, print_heuristic_summary, print_prune_summary};

/// Prints the findit banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🔍 findit"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Heuristic CI failure triage")
    );
}
