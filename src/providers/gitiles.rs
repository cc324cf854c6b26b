use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::Deserialize;
use url::Url;

use super::http::{HttpClient, RetryPolicy};
use crate::auth::Token;
use crate::error::{FinditError, Result};
use crate::heuristic::{BlameRegion, ChangeLog, ChangeType, Contributor, TouchedFile};
use crate::oracles::BlameOracle;

const XSSI_PREFIX: &str = ")]}'";
const NULL_PATH: &str = "/dev/null";
const TIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";
const TIME_FORMAT_WITH_OFFSET: &str = "%a %b %d %H:%M:%S %Y %z";

#[derive(Debug, Deserialize)]
struct RawContributor {
    #[serde(default)]
    name: String,
    email: String,
    time: String,
}

#[derive(Debug, Deserialize)]
struct RawDiff {
    #[serde(rename = "type")]
    change_type: String,
    #[serde(default)]
    old_path: Option<String>,
    #[serde(default)]
    new_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    commit: String,
    author: RawContributor,
    #[serde(default)]
    committer: Option<RawContributor>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    tree_diff: Vec<RawDiff>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    #[serde(default)]
    log: Vec<RawCommit>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRegion {
    start: u32,
    count: u32,
    commit: String,
}

#[derive(Debug, Deserialize)]
struct RawBlame {
    #[serde(default)]
    regions: Vec<RawRegion>,
}

/// Gitiles JSON API client.
pub struct GitilesClient {
    http: HttpClient,
}

impl GitilesClient {
    pub fn new(token: Option<Token>, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new("Gitiles", token, retry)?,
        })
    }

    fn endpoint(repo_url: &str, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let repo_url = repo_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{repo_url}/{path}"))
            .map_err(|e| FinditError::Config(format!("Invalid repository URL '{repo_url}': {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let Some(body) = self.http.get_text(url).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(strip_xssi_prefix(&body)?)?))
    }
}

impl BlameOracle for GitilesClient {
    async fn blame(
        &self,
        repo_url: &str,
        revision: &str,
        path: &str,
    ) -> Result<Option<Vec<BlameRegion>>> {
        let url = Self::endpoint(repo_url, &format!("+blame/{revision}/{path}"), &[])?;
        let Some(blame) = self.get_json::<RawBlame>(url).await? else {
            debug!("No blame for {path}@{revision}");
            return Ok(None);
        };

        Ok(Some(
            blame
                .regions
                .into_iter()
                .map(|region| BlameRegion {
                    revision: region.commit,
                    start: region.start,
                    count: region.count,
                })
                .collect(),
        ))
    }

    async fn change_log(&self, repo_url: &str, revision: &str) -> Result<ChangeLog> {
        let url = Self::endpoint(repo_url, &format!("+/{revision}"), &[])?;
        let commit = self
            .get_json::<RawCommit>(url)
            .await?
            .ok_or_else(|| FinditError::Malformed(format!("Revision {revision} not found in {repo_url}")))?;

        to_change_log(repo_url, commit)
    }

    async fn change_logs(&self, repo_url: &str, from: &str, to: &str) -> Result<Vec<ChangeLog>> {
        let path = format!("+log/{from}..{to}");
        let mut change_logs = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let mut query = vec![("name-status", "1")];
            if let Some(start) = next.as_deref() {
                query.push(("s", start));
            }
            let url = Self::endpoint(repo_url, &path, &query)?;

            let Some(page) = self.get_json::<RawLog>(url).await? else {
                break;
            };
            for commit in page.log {
                change_logs.push(to_change_log(repo_url, commit)?);
            }

            match page.next {
                Some(start) => next = Some(start),
                None => break,
            }
        }

        debug!("{} commit(s) in {repo_url} {from}..{to}", change_logs.len());
        Ok(change_logs)
    }
}

fn strip_xssi_prefix(body: &str) -> Result<&str> {
    body.strip_prefix(XSSI_PREFIX)
        .map(str::trim_start)
        .ok_or_else(|| FinditError::Malformed(format!("Response does not begin with {XSSI_PREFIX}")))
}

/// Parses gitiles commit times, with or without a UTC offset.
pub fn parse_gitiles_time(time: &str) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_str(time, TIME_FORMAT_WITH_OFFSET) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(time, TIME_FORMAT)
        .map(|time| time.and_utc())
        .map_err(|e| FinditError::Malformed(format!("Invalid commit time '{time}': {e}")))
}

/// Drops the repository UUID some accounts carry (`user@host@uuid`).
fn normalize_email(email: &str) -> String {
    match email.match_indices('@').nth(1) {
        Some((idx, _)) => email[..idx].to_string(),
        None => email.to_string(),
    }
}

fn to_contributor(raw: RawContributor) -> Result<Contributor> {
    Ok(Contributor {
        name: raw.name,
        email: normalize_email(&raw.email),
        time: parse_gitiles_time(&raw.time)?,
    })
}

fn parse_change_type(change_type: &str) -> Result<ChangeType> {
    match change_type {
        "add" => Ok(ChangeType::Add),
        "delete" => Ok(ChangeType::Delete),
        "modify" => Ok(ChangeType::Modify),
        "copy" => Ok(ChangeType::Copy),
        "rename" => Ok(ChangeType::Rename),
        other => Err(FinditError::Malformed(format!("Unknown change type \"{other}\""))),
    }
}

fn real_path(path: Option<String>) -> Option<String> {
    path.filter(|path| path != NULL_PATH)
}

/// Value of the last `Cr-Commit-Position: refs/heads/main@{#N}` footer.
fn commit_position_footer(message: &str) -> Option<u64> {
    message.lines().rev().find_map(|line| {
        let value = line.trim().strip_prefix("Cr-Commit-Position:")?;
        let (_, position) = value.rsplit_once("@{#")?;
        position.strip_suffix('}')?.parse().ok()
    })
}

fn code_review_footer(message: &str) -> Option<String> {
    message.lines().rev().find_map(|line| {
        let line = line.trim();
        line.strip_prefix("Reviewed-on:")
            .or_else(|| line.strip_prefix("Review URL:"))
            .map(|url| url.trim().to_string())
    })
}

fn to_change_log(repo_url: &str, commit: RawCommit) -> Result<ChangeLog> {
    let touched_files = commit
        .tree_diff
        .into_iter()
        .map(|diff| {
            Ok(TouchedFile {
                change_type: parse_change_type(&diff.change_type)?,
                old_path: real_path(diff.old_path),
                new_path: real_path(diff.new_path),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let committer = commit.committer.map(to_contributor).transpose()?;

    Ok(ChangeLog {
        commit_url: Some(format!(
            "{}/+/{}",
            repo_url.trim_end_matches('/'),
            commit.commit
        )),
        commit_position: commit_position_footer(&commit.message),
        code_review_url: code_review_footer(&commit.message),
        revision: commit.commit,
        author: to_contributor(commit.author)?,
        committer,
        touched_files,
    })
}
