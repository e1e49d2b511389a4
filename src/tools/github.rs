//! Read-only GitHub REST and GraphQL calls exposed to the model as tools.
//!
//! Results are projected down to the fields the model needs so tool messages
//! stay small.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{ConfigError, ToolError};
use crate::prompt::trim_text;

pub const GITHUB_API: &str = "https://api.github.com";

const HTTP_TIMEOUT_SECS: u64 = 20;
const MAX_FILE_CHARS: usize = 12_000;
const DEFAULT_PER_PAGE: u64 = 30;
const MAX_PER_PAGE: u64 = 100;

const BLAME_QUERY: &str = r#"
query Blame($owner: String!, $repo: String!, $path: String!, $ref: String!) {
  repository(owner: $owner, name: $repo) {
    object(expression: $ref) {
      ... on Commit {
        blame(path: $path) {
          ranges {
            startingLine
            endingLine
            commit {
              oid
              messageHeadline
              url
              author { name email date user { login } }
            }
          }
        }
      }
    }
  }
}
"#;

pub struct GitHubClient {
    client: reqwest::Client,
    api_base: String,
    user: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, token: Option<&str>, user: String) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            user,
        })
    }

    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ToolError> {
        let url = reqwest::Url::parse_with_params(&format!("{}{}", self.api_base, path), params)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        debug!(%url, "GitHub request");
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    }

    pub async fn list_repos(&self, user: Option<&str>) -> Result<Value, ToolError> {
        let user = user.filter(|u| !u.is_empty()).unwrap_or(self.user.as_str());
        if user.is_empty() {
            return Ok(json!([]));
        }
        let repos = self
            .get_json(
                &format!("/users/{}/repos", user),
                &[("per_page", "100".into()), ("sort", "updated".into())],
            )
            .await?;

        Ok(Value::Array(
            items(&repos)
                .map(|r| {
                    json!({
                        "name": r["name"],
                        "full_name": r["full_name"],
                        "private": r["private"],
                        "html_url": r["html_url"],
                        "description": r["description"],
                        "language": r["language"],
                    })
                })
                .collect(),
        ))
    }

    pub async fn search_code(&self, q: &str, repo: Option<&str>) -> Result<Value, ToolError> {
        let query = match repo.filter(|r| !r.is_empty()) {
            Some(repo) => format!("{} repo:{}", q, repo),
            None => q.to_string(),
        };
        let found = self
            .get_json("/search/code", &[("q", query), ("per_page", "10".into())])
            .await?;

        Ok(Value::Array(
            items(&found["items"])
                .map(|it| {
                    json!({
                        "name": it["name"],
                        "path": it["path"],
                        "repository": it["repository"]["full_name"],
                        "html_url": it["html_url"],
                    })
                })
                .collect(),
        ))
    }

    pub async fn get_readme(&self, owner_repo: &str, git_ref: Option<&str>) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let data = self
            .get_json(&format!("/repos/{}/{}/readme", owner, repo), &ref_param(git_ref))
            .await?;

        Ok(json!({
            "repository": owner_repo,
            "path": data.get("path").cloned().unwrap_or_else(|| json!("README.md")),
            "content": trim_text(&decode_content(&data)?, MAX_FILE_CHARS),
            "sha": data["sha"],
        }))
    }

    pub async fn get_file(
        &self,
        owner_repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let path = path.trim_start_matches('/');
        let data = self
            .get_json(
                &format!("/repos/{}/{}/contents/{}", owner, repo, path),
                &ref_param(git_ref),
            )
            .await?;

        // directories come back as a listing
        if let Value::Array(entries) = &data {
            let listing: Vec<Value> = entries
                .iter()
                .map(|e| json!({ "name": e["name"], "path": e["path"], "type": e["type"] }))
                .collect();
            return Ok(json!({ "repository": owner_repo, "path": path, "entries": listing }));
        }

        Ok(json!({
            "repository": owner_repo,
            "path": path,
            "content": trim_text(&decode_content(&data)?, MAX_FILE_CHARS),
            "sha": data["sha"],
        }))
    }

    pub async fn list_commits(&self, owner_repo: &str, filter: CommitFilter<'_>) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let mut params = vec![("per_page", per_page(filter.per_page).to_string())];
        for (key, value) in [
            ("author", filter.author),
            ("path", filter.path),
            ("since", filter.since),
            ("until", filter.until),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                params.push((key, value.to_string()));
            }
        }

        let commits = self
            .get_json(&format!("/repos/{}/{}/commits", owner, repo), &params)
            .await?;
        Ok(Value::Array(items(&commits).map(commit_summary).collect()))
    }

    pub async fn get_commit(&self, owner_repo: &str, sha: &str) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let data = self
            .get_json(&format!("/repos/{}/{}/commits/{}", owner, repo, sha), &[])
            .await?;

        let files: Vec<Value> = items(&data["files"])
            .map(|f| {
                json!({
                    "filename": f["filename"],
                    "status": f["status"],
                    "additions": f["additions"],
                    "deletions": f["deletions"],
                    "changes": f["changes"],
                    "patch": f.get("patch").and_then(Value::as_str).map(|p| trim_text(p, 4_000)),
                })
            })
            .collect();

        let mut summary = commit_summary(&data);
        summary["files"] = Value::Array(files);
        Ok(summary)
    }

    pub async fn list_pull_requests(
        &self,
        owner_repo: &str,
        state: Option<&str>,
        author: Option<&str>,
        limit: Option<u64>,
    ) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let state = match state.unwrap_or("all") {
            s @ ("open" | "closed" | "all") => s,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "state must be open, closed or all, got {}",
                    other
                )));
            }
        };
        let pulls = self
            .get_json(
                &format!("/repos/{}/{}/pulls", owner, repo),
                &[("state", state.to_string()), ("per_page", per_page(limit).to_string())],
            )
            .await?;

        Ok(Value::Array(
            items(&pulls)
                .filter(|pr| match author.filter(|a| !a.is_empty()) {
                    Some(author) => pr["user"]["login"].as_str() == Some(author),
                    None => true,
                })
                .map(|pr| {
                    json!({
                        "number": pr["number"],
                        "title": pr["title"],
                        "state": pr["state"],
                        "user": pr["user"]["login"],
                        "merged_at": pr["merged_at"],
                        "html_url": pr["html_url"],
                    })
                })
                .collect(),
        ))
    }

    pub async fn get_pull_request(&self, owner_repo: &str, number: u64) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let pr = self
            .get_json(&format!("/repos/{}/{}/pulls/{}", owner, repo, number), &[])
            .await?;

        Ok(json!({
            "number": pr["number"],
            "title": pr["title"],
            "state": pr["state"],
            "user": pr["user"]["login"],
            "body": pr.get("body").and_then(Value::as_str).map(|b| trim_text(b, 4_000)),
            "additions": pr["additions"],
            "deletions": pr["deletions"],
            "changed_files": pr["changed_files"],
            "html_url": pr["html_url"],
        }))
    }

    pub async fn blame_file(
        &self,
        owner_repo: &str,
        path: &str,
        git_ref: Option<&str>,
    ) -> Result<Value, ToolError> {
        let (owner, repo) = split_owner_repo(owner_repo)?;
        let git_ref = git_ref.filter(|r| !r.is_empty()).unwrap_or("HEAD");
        let body = json!({
            "query": BLAME_QUERY,
            "variables": { "owner": owner, "repo": repo, "path": path, "ref": git_ref },
        });

        let data: Value = self
            .client
            .post(format!("{}/graphql", self.api_base))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ranges: Vec<Value> = items(&data["data"]["repository"]["object"]["blame"]["ranges"])
            .map(|rg| {
                let commit = &rg["commit"];
                json!({
                    "start": rg["startingLine"],
                    "end": rg["endingLine"],
                    "commit": {
                        "sha": commit["oid"],
                        "message": commit["messageHeadline"],
                        "author_login": commit["author"]["user"]["login"],
                        "author_name": commit["author"]["name"],
                        "author_email": commit["author"]["email"],
                        "date": commit["author"]["date"],
                        "url": commit["url"],
                    },
                })
            })
            .collect();

        Ok(json!({ "repository": owner_repo, "path": path, "ref": git_ref, "ranges": ranges }))
    }

    /// Commits and PRs authored by the configured account plus README mentions.
    pub async fn analyze_contributions(&self, owner_repo: &str) -> Result<Value, ToolError> {
        if self.user.is_empty() {
            return Err(ToolError::NotConfigured("GITHUB_USER is not configured"));
        }
        let user = self.user.as_str();

        let commits = self
            .list_commits(
                owner_repo,
                CommitFilter {
                    author: Some(user),
                    per_page: Some(MAX_PER_PAGE),
                    ..CommitFilter::default()
                },
            )
            .await?;
        let pulls = self
            .list_pull_requests(owner_repo, Some("all"), Some(user), Some(MAX_PER_PAGE))
            .await?;

        // a repo without a README is not an error here
        let readme_mentions = match self.get_readme(owner_repo, None).await {
            Ok(readme) => count_mentions(readme["content"].as_str().unwrap_or_default(), user),
            Err(_) => 0,
        };

        let commit_count = commits.as_array().map(Vec::len).unwrap_or(0);
        let recent_commits: Vec<Value> = items(&commits)
            .take(10)
            .map(|c| json!({ "sha": c["sha"], "message": c["commit_message"] }))
            .collect();

        Ok(json!({
            "repository": owner_repo,
            "user": user,
            "commit_count": commit_count,
            "recent_commits": recent_commits,
            "pull_requests": pulls,
            "readme_mentions": readme_mentions,
        }))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CommitFilter<'a> {
    pub author: Option<&'a str>,
    pub path: Option<&'a str>,
    pub since: Option<&'a str>,
    pub until: Option<&'a str>,
    pub per_page: Option<u64>,
}

pub fn split_owner_repo(owner_repo: &str) -> Result<(&str, &str), ToolError> {
    match owner_repo.trim().split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(ToolError::InvalidArguments(format!(
            "expected owner/name, got {:?}",
            owner_repo
        ))),
    }
}

fn per_page(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
}

fn ref_param(git_ref: Option<&str>) -> Vec<(&'static str, String)> {
    git_ref
        .filter(|r| !r.is_empty())
        .map(|r| vec![("ref", r.to_string())])
        .unwrap_or_default()
}

fn items(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

fn commit_summary(c: &Value) -> Value {
    json!({
        "sha": c["sha"],
        "author_login": c["author"]["login"],
        "commit_author": c["commit"]["author"],
        "commit_message": c["commit"]["message"],
        "html_url": c["html_url"],
    })
}

// Contents API returns base64 split over lines
pub fn decode_content(data: &Value) -> Result<String, ToolError> {
    let content = data["content"].as_str().unwrap_or_default();
    if data["encoding"].as_str() != Some("base64") {
        return Ok(content.to_string());
    }
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn count_mentions(text: &str, user: &str) -> usize {
    let needle = user.to_lowercase();
    text.to_lowercase().matches(&needle).count()
}
