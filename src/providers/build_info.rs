use log::debug;
use serde::Deserialize;
use url::Url;

use super::http::{parse_base_url, HttpClient, RetryPolicy};
use crate::auth::Token;
use crate::error::{FinditError, Result};
use crate::oracles::BuildInfoOracle;

#[derive(Debug, Deserialize)]
struct BuildResponse {
    number: u64,
    #[serde(default)]
    commit_position: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct BuildSummary {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct BuildListResponse {
    #[serde(default)]
    builds: Vec<BuildSummary>,
}

/// Client for a build-info service exposing builds per master and builder.
pub struct BuildInfoClient {
    http: HttpClient,
    base_url: Url,
}

impl BuildInfoClient {
    pub fn new(base_url: &str, token: Option<Token>, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new("Build info", token, retry)?,
            base_url: parse_base_url(base_url)?,
        })
    }

    fn builds_url(&self, master_name: &str, builder_name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| FinditError::Config(format!("Base URL cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend([master_name, "builders", builder_name, "builds"]);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self
            .http
            .get_text(url.clone())
            .await?
            .ok_or_else(|| FinditError::Api {
                status: 404,
                message: format!("{url} not found"),
            })?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl BuildInfoOracle for BuildInfoClient {
    async fn commit_position(
        &self,
        master_name: &str,
        builder_name: &str,
        build_number: u64,
    ) -> Result<u64> {
        let mut url = self.builds_url(master_name, builder_name)?;
        url.path_segments_mut()
            .map_err(|()| FinditError::Config("Base URL cannot have a path".to_string()))?
            .push(&build_number.to_string());

        let build: BuildResponse = self.get_json(url).await?;
        debug!(
            "{master_name}/{builder_name} build {} at commit position {:?}",
            build.number, build.commit_position
        );
        build
            .commit_position
            .ok_or(FinditError::MissingCommitPosition {
                build: build_number,
            })
    }

    async fn recent_completed_builds(&self, master_name: &str, builder_name: &str) -> Result<Vec<u64>> {
        let mut url = self.builds_url(master_name, builder_name)?;
        url.query_pairs_mut().append_pair("completed", "true");

        let response: BuildListResponse = self.get_json(url).await?;
        let mut builds: Vec<u64> = response.builds.into_iter().map(|build| build.number).collect();
        builds.sort_unstable_by(|a, b| b.cmp(a));
        Ok(builds)
    }
}
