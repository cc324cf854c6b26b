use std::path::{Path, PathBuf};

use log::debug;

use super::analysis::FlakeAnalysis;
use crate::error::Result;
use crate::oracles::AnalysisStore;

/// Keeps a flake analysis as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonAnalysisStore {
    path: PathBuf,
}

impl JsonAnalysisStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<FlakeAnalysis> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl AnalysisStore for JsonAnalysisStore {
    async fn save(&self, analysis: &FlakeAnalysis) -> Result<()> {
        let json = serde_json::to_string_pretty(analysis)?;
        tokio::fs::write(&self.path, json).await?;
        debug!("Saved flake analysis to {}", self.path.display());
        Ok(())
    }
}
