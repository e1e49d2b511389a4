//! Tools the model may call before answering.
//!
//! [`Toolbox`] parses the model's JSON arguments, runs the matching
//! collaborator and always hands back a JSON string: failures become
//! `{"error": "..."}` so the model can recover instead of the request failing.

pub mod bio;
pub mod github;
pub mod web;

use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{ToolCache, make_cache_key};
use crate::error::ToolError;
use crate::metrics::TOOL_CALLS;
use bio::Bio;
use github::{CommitFilter, GitHubClient};
use web::WebFetcher;

fn function(name: &str, description: &str, parameters: Value) -> Value {
    json!({
        "type": "function",
        "function": { "name": name, "description": description, "parameters": parameters }
    })
}

lazy_static! {
    pub static ref TOOL_SPECS: Vec<Value> = vec![
        function(
            "bio_get",
            "Read the owner's biography. Optionally filter by top-level keys.",
            json!({
                "type": "object",
                "properties": { "keys": { "type": "array", "items": { "type": "string" } } },
                "required": []
            }),
        ),
        function(
            "get_professional_profile",
            "Use for personal or professional background: experience, skills, education, family, hobbies.",
            json!({ "type": "object", "properties": {} }),
        ),
        function(
            "github_list_repos",
            "Use first when asked about projects or code. Lists the owner's GitHub repositories.",
            json!({
                "type": "object",
                "properties": { "user": { "type": "string", "description": "GitHub username, defaults to the owner" } },
                "required": []
            }),
        ),
        function(
            "github_search_code",
            "Search code on GitHub, optionally restricted to one repository.",
            json!({
                "type": "object",
                "properties": {
                    "q": { "type": "string" },
                    "repo": { "type": "string", "description": "owner/name" }
                },
                "required": ["q"]
            }),
        ),
        function(
            "github_get_file",
            "Get the content of a file (or a directory listing) from a repository.",
            json!({
                "type": "object",
                "properties": {
                    "owner_repo": { "type": "string", "description": "owner/name" },
                    "path": { "type": "string" },
                    "ref": { "type": "string", "description": "branch, tag or commit SHA" }
                },
                "required": ["owner_repo", "path"]
            }),
        ),
        function(
            "github_get_readme",
            "Fetch the README of a repository.",
            json!({
                "type": "object",
                "properties": { "owner_repo": { "type": "string" }, "ref": { "type": "string" } },
                "required": ["owner_repo"]
            }),
        ),
        function(
            "github_list_commits",
            "List commits of a repository, filterable by author, path and date range.",
            json!({
                "type": "object",
                "properties": {
                    "owner_repo": { "type": "string" },
                    "author": { "type": "string" },
                    "path": { "type": "string" },
                    "since": { "type": "string", "description": "ISO8601" },
                    "until": { "type": "string", "description": "ISO8601" },
                    "per_page": { "type": "integer" }
                },
                "required": ["owner_repo"]
            }),
        ),
        function(
            "github_get_commit",
            "Get one commit with its changed files and patches.",
            json!({
                "type": "object",
                "properties": { "owner_repo": { "type": "string" }, "sha": { "type": "string" } },
                "required": ["owner_repo", "sha"]
            }),
        ),
        function(
            "github_list_pull_requests",
            "List pull requests of a repository, optionally only those by one author.",
            json!({
                "type": "object",
                "properties": {
                    "owner_repo": { "type": "string" },
                    "state": { "type": "string", "enum": ["open", "closed", "all"] },
                    "author": { "type": "string" },
                    "per_page": { "type": "integer" }
                },
                "required": ["owner_repo"]
            }),
        ),
        function(
            "github_get_pull_request",
            "Get a pull request's details: body, lines changed, files changed.",
            json!({
                "type": "object",
                "properties": { "owner_repo": { "type": "string" }, "number": { "type": "integer" } },
                "required": ["owner_repo", "number"]
            }),
        ),
        function(
            "github_blame_file",
            "Attribute the lines of a file to commits and authors.",
            json!({
                "type": "object",
                "properties": {
                    "owner_repo": { "type": "string" },
                    "path": { "type": "string" },
                    "ref": { "type": "string" }
                },
                "required": ["owner_repo", "path"]
            }),
        ),
        function(
            "analyze_my_contributions",
            "Summarize the owner's commits, pull requests and README mentions in a repository.",
            json!({
                "type": "object",
                "properties": { "owner_repo": { "type": "string", "description": "owner/name" } },
                "required": ["owner_repo"]
            }),
        ),
        function(
            "fetch_website_content",
            "Fetch the current text of the owner's portfolio website or another page.",
            json!({
                "type": "object",
                "properties": { "url": { "type": "string", "description": "defaults to the bio's site link" } }
            }),
        ),
    ];
}

#[async_trait]
pub trait ToolDispatch: Send + Sync {
    /// Runs one tool call. The result is always a JSON document.
    async fn execute(&self, name: &str, arguments: &str) -> String;
}

#[derive(Deserialize, Default)]
struct BioArgs {
    keys: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
struct UserArgs {
    user: Option<String>,
}

#[derive(Deserialize)]
struct SearchArgs {
    q: String,
    repo: Option<String>,
}

#[derive(Deserialize)]
struct FileArgs {
    owner_repo: String,
    path: String,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Deserialize)]
struct RepoArgs {
    owner_repo: String,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

#[derive(Deserialize)]
struct CommitListArgs {
    owner_repo: String,
    author: Option<String>,
    path: Option<String>,
    since: Option<String>,
    until: Option<String>,
    per_page: Option<u64>,
}

#[derive(Deserialize)]
struct CommitArgs {
    owner_repo: String,
    sha: String,
}

#[derive(Deserialize)]
struct PullListArgs {
    owner_repo: String,
    state: Option<String>,
    author: Option<String>,
    per_page: Option<u64>,
}

#[derive(Deserialize)]
struct PullArgs {
    owner_repo: String,
    number: u64,
}

#[derive(Deserialize, Default)]
struct UrlArgs {
    url: Option<String>,
}

// Empty argument strings are treated as `{}`
fn parse_args<T: DeserializeOwned>(arguments: &str) -> Result<T, ToolError> {
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub struct Toolbox {
    bio: Arc<Bio>,
    github: GitHubClient,
    web: WebFetcher,
    cache: Arc<ToolCache>,
}

impl Toolbox {
    pub fn new(bio: Arc<Bio>, github: GitHubClient, web: WebFetcher, cache: Arc<ToolCache>) -> Self {
        Self { bio, github, web, cache }
    }

    async fn run(&self, name: &str, arguments: &str) -> Result<Value, ToolError> {
        match name {
            "bio_get" => {
                let args: BioArgs = parse_args(arguments)?;
                Ok(self.bio.get(args.keys.as_deref()))
            }
            "get_professional_profile" => Ok(self.bio.profile()),
            "github_list_repos" => {
                let args: UserArgs = parse_args(arguments)?;
                self.github.list_repos(args.user.as_deref()).await
            }
            "github_search_code" => {
                let args: SearchArgs = parse_args(arguments)?;
                self.github.search_code(&args.q, args.repo.as_deref()).await
            }
            "github_get_file" => {
                let args: FileArgs = parse_args(arguments)?;
                self.github
                    .get_file(&args.owner_repo, &args.path, args.git_ref.as_deref())
                    .await
            }
            "github_get_readme" => {
                let args: RepoArgs = parse_args(arguments)?;
                self.github
                    .get_readme(&args.owner_repo, args.git_ref.as_deref())
                    .await
            }
            "github_list_commits" => {
                let args: CommitListArgs = parse_args(arguments)?;
                let filter = CommitFilter {
                    author: args.author.as_deref(),
                    path: args.path.as_deref(),
                    since: args.since.as_deref(),
                    until: args.until.as_deref(),
                    per_page: args.per_page,
                };
                self.github.list_commits(&args.owner_repo, filter).await
            }
            "github_get_commit" => {
                let args: CommitArgs = parse_args(arguments)?;
                self.github.get_commit(&args.owner_repo, &args.sha).await
            }
            "github_list_pull_requests" => {
                let args: PullListArgs = parse_args(arguments)?;
                self.github
                    .list_pull_requests(
                        &args.owner_repo,
                        args.state.as_deref(),
                        args.author.as_deref(),
                        args.per_page,
                    )
                    .await
            }
            "github_get_pull_request" => {
                let args: PullArgs = parse_args(arguments)?;
                self.github.get_pull_request(&args.owner_repo, args.number).await
            }
            "github_blame_file" => {
                let args: FileArgs = parse_args(arguments)?;
                self.github
                    .blame_file(&args.owner_repo, &args.path, args.git_ref.as_deref())
                    .await
            }
            "analyze_my_contributions" => {
                let args: RepoArgs = parse_args(arguments)?;
                self.github.analyze_contributions(&args.owner_repo).await
            }
            "fetch_website_content" => {
                let args: UrlArgs = parse_args(arguments)?;
                let url = args
                    .url
                    .filter(|u| !u.is_empty())
                    .or_else(|| self.bio.site_url().map(String::from))
                    .ok_or(ToolError::NotConfigured("no URL given and the bio has no site link"))?;
                self.web.fetch_text(&url).await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

#[async_trait]
impl ToolDispatch for Toolbox {
    async fn execute(&self, name: &str, arguments: &str) -> String {
        // model-supplied names are not used as labels unless they are real tools
        let label = if TOOL_SPECS.iter().any(|s| s["function"]["name"] == name) {
            name
        } else {
            "unknown"
        };
        TOOL_CALLS.with_label_values(&[label]).inc();

        let key = make_cache_key(name, arguments);
        if let Some(hit) = self.cache.get(&key) {
            debug!(tool = name, "tool cache hit");
            return hit;
        }

        match self.run(name, arguments).await {
            Ok(value) => {
                let rendered = value.to_string();
                self.cache.insert(key, rendered.clone());
                rendered
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn toolbox() -> Toolbox {
        let Value::Object(map) = json!({
            "name": "Alex Doe",
            "skills": ["Rust", "Go"],
        }) else {
            unreachable!()
        };
        // unroutable base so any accidental network call fails fast
        let github = GitHubClient::new("http://127.0.0.1:9", None, "alexdoe".into()).unwrap();
        Toolbox::new(
            Arc::new(Bio::from_map(map)),
            github,
            WebFetcher::new().unwrap(),
            Arc::new(ToolCache::new(Duration::from_secs(60))),
        )
    }

    fn parse(raw: &str) -> Value {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn every_schema_is_a_named_function() {
        let names: Vec<&str> = TOOL_SPECS
            .iter()
            .map(|s| s["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 13);
        assert!(names.contains(&"github_blame_file"));
        assert!(TOOL_SPECS.iter().all(|s| s["type"] == "function"));
    }

    #[tokio::test]
    async fn bio_get_filters_by_keys() {
        let out = parse(&toolbox().execute("bio_get", r#"{"keys": ["skills"]}"#).await);
        assert_eq!(out, json!({ "skills": ["Rust", "Go"] }));
    }

    #[tokio::test]
    async fn empty_arguments_mean_no_filter() {
        let out = parse(&toolbox().execute("bio_get", "").await);
        assert_eq!(out["name"], "Alex Doe");
    }

    #[tokio::test]
    async fn unknown_tool_reports_error() {
        let out = parse(&toolbox().execute("rm_rf", "{}").await);
        assert_eq!(out["error"], "unknown tool rm_rf");
    }

    #[tokio::test]
    async fn bad_arguments_report_error() {
        let tools = toolbox();
        let out = parse(&tools.execute("github_get_commit", r#"{"owner_repo": "a/b"}"#).await);
        assert!(out["error"].as_str().unwrap().starts_with("invalid arguments"));

        let out = parse(&tools.execute("github_get_readme", r#"{"owner_repo": "nope"}"#).await);
        assert!(out["error"].as_str().unwrap().contains("owner/name"));
    }

    #[tokio::test]
    async fn website_without_url_or_site_link_is_reported() {
        let out = parse(&toolbox().execute("fetch_website_content", "{}").await);
        assert!(out["error"].as_str().unwrap().contains("site link"));
    }
}
