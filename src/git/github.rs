use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BlobEntry, ChangeStatus, FileChange, FileContent, SourceHost};
use crate::config::GithubConfig;
use crate::models::RepoRef;

/// GitHub REST API client.
pub struct GithubHost {
    client: reqwest::Client,
    api_url: String,
}

impl GithubHost {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-atlas"));
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("GITHUB_TOKEN is not a valid header value")?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// `{api}/repos/{owner}/{name}/{rest...}` with every segment escaped.
    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_url).with_context(|| format!("Invalid GitHub API URL {}", self.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API URL cannot be a base: {}", self.api_url))?
            .pop_if_empty()
            .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
            .extend(rest);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to call GitHub API for {what}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API returned {status} for {what}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse GitHub response for {what}"))
    }
}

// ─── Wire types ──────────────────────────────────────────

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct CompareResponse {
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
    previous_filename: Option<String>,
}

/// Decode a contents-API payload (base64, wrapped at 60 columns).
fn decode_content(raw: &str, encoding: Option<&str>) -> Result<String> {
    match encoding {
        Some("base64") | None => {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = general_purpose::STANDARD
                .decode(compact)
                .context("Invalid base64 file content")?;
            String::from_utf8(bytes).context("File content is not valid UTF-8")
        }
        Some(other) => anyhow::bail!("Unsupported content encoding: {other}"),
    }
}

fn map_change(file: CompareFile) -> FileChange {
    let status = match file.status.as_str() {
        "added" | "copied" => ChangeStatus::Added,
        "removed" => ChangeStatus::Removed,
        "renamed" => match file.previous_filename {
            Some(previous) => ChangeStatus::Renamed { previous },
            None => ChangeStatus::Added,
        },
        // "modified", "changed" and anything new GitHub may introduce
        _ => ChangeStatus::Modified,
    };
    FileChange {
        path: file.filename,
        status,
    }
}

#[async_trait]
impl SourceHost for GithubHost {
    async fn resolve_commit(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        let url = self.repo_url(repo, &["commits", branch])?;
        let commit: CommitResponse = self.get_json(url, &format!("{repo}@{branch}")).await?;
        Ok(commit.sha)
    }

    async fn list_tree(&self, repo: &RepoRef, commit: &str) -> Result<Vec<BlobEntry>> {
        let mut url = self.repo_url(repo, &["git", "trees", commit])?;
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: TreeResponse = self.get_json(url, &format!("tree of {repo}@{commit}")).await?;

        if tree.truncated {
            tracing::warn!("GitHub truncated the tree listing of {repo}@{commit}; some files will be missing");
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| BlobEntry {
                path: item.path,
                size: item.size.unwrap_or(0),
                sha: item.sha,
            })
            .collect())
    }

    async fn fetch_file(&self, repo: &RepoRef, commit: &str, path: &str) -> Result<FileContent> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.repo_url(repo, &segments)?;
        url.query_pairs_mut().append_pair("ref", commit);

        let body: ContentResponse = self.get_json(url, &format!("{repo}:{path}")).await?;
        let raw = body
            .content
            .with_context(|| format!("No content returned for {path} (is it a directory or submodule?)"))?;
        let content = decode_content(&raw, body.encoding.as_deref())
            .with_context(|| format!("Failed to decode {path}"))?;

        Ok(FileContent {
            content,
            sha: body.sha,
        })
    }

    async fn compare(&self, repo: &RepoRef, base: &str, head: &str) -> Result<Vec<FileChange>> {
        let range = format!("{base}...{head}");
        let url = self.repo_url(repo, &["compare", &range])?;
        let diff: CompareResponse = self.get_json(url, &format!("{repo} {range}")).await?;
        Ok(diff.files.into_iter().map(map_change).collect())
    }
}
