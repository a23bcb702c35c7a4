//! HTTP implementations of the collaborators.
//!
//! Configuration is via environment variables:
//! - `ROADMAPPER_GENERATOR_URL` - text-generation service (default: `http://localhost:17020/api/v1`)
//! - `ROADMAPPER_GENERATOR_API_KEY` - bearer key for the generation service (optional)
//! - `ROADMAPPER_GITHUB_URL` - GitHub REST base URL (default: `https://api.github.com`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AdviceGenerator, CommitSource, ExternalError, Generator, ProgressAnalyzer};
use crate::caller::CallerContext;
use crate::models::*;

const DEFAULT_GENERATOR_URL: &str = "http://localhost:17020/api/v1";
const DEFAULT_GITHUB_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("roadmapper/", env!("CARGO_PKG_VERSION"));

/// Map a non-success response to an [`ExternalError`].
async fn error_for(response: reqwest::Response) -> ExternalError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExternalError::Unauthorized,
        _ => ExternalError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ExternalError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        Err(error_for(response).await)
    }
}

// ============================================================
// Generation service
// ============================================================

/// Client for the text-generation service. One JSON endpoint per verb.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Serialize)]
struct IdeaRequest {
    level: IdeaLevel,
}

#[derive(Serialize)]
struct QuestionsRequest<'a> {
    title: &'a str,
    description: &'a str,
}

#[derive(Deserialize)]
struct QuestionsResponse {
    questions: Vec<GeneratedQuestion>,
}

#[derive(Serialize)]
struct RoadmapRequest<'a> {
    title: &'a str,
    description: &'a str,
    answers: &'a [AnsweredQuestion],
}

#[derive(Deserialize)]
struct RoadmapResponse {
    modules: Vec<GeneratedModule>,
}

impl HttpGenerator {
    pub fn from_env() -> Self {
        let base_url = std::env::var("ROADMAPPER_GENERATOR_URL")
            .unwrap_or_else(|_| DEFAULT_GENERATOR_URL.to_string());
        let api_key = std::env::var("ROADMAPPER_GENERATOR_API_KEY").ok();
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ExternalError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "calling generation service");
        let mut req = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        handle_response(req.send().await?).await
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate_idea(&self, level: IdeaLevel) -> Result<ProjectIdea, ExternalError> {
        self.post("/ideas", &IdeaRequest { level }).await
    }

    async fn generate_questions(
        &self,
        project: &Project,
    ) -> Result<Vec<GeneratedQuestion>, ExternalError> {
        let response: QuestionsResponse = self
            .post(
                "/questions",
                &QuestionsRequest {
                    title: &project.title,
                    description: &project.description,
                },
            )
            .await?;
        Ok(response.questions)
    }

    async fn generate_roadmap(
        &self,
        project: &Project,
        answers: &[AnsweredQuestion],
    ) -> Result<Vec<GeneratedModule>, ExternalError> {
        let response: RoadmapResponse = self
            .post(
                "/roadmaps",
                &RoadmapRequest {
                    title: &project.title,
                    description: &project.description,
                    answers,
                },
            )
            .await?;
        Ok(response.modules)
    }
}

#[async_trait]
impl ProgressAnalyzer for HttpGenerator {
    async fn analyze(&self, request: &ProgressRequest) -> Result<ProgressAnalysis, ExternalError> {
        self.post("/progress", request).await
    }
}

#[async_trait]
impl AdviceGenerator for HttpGenerator {
    async fn task_help(&self, request: &HelpRequest) -> Result<TaskHelp, ExternalError> {
        self.post("/help", request).await
    }
}

// ============================================================
// GitHub commits
// ============================================================

/// Commit history from the GitHub REST API.
///
/// Lists recent commits, then reads each one to learn its changed files, so
/// a fetch costs `limit + 1` requests. Uses the caller's repository token
/// when present, otherwise an optional service-wide fallback token.
#[derive(Debug, Clone)]
pub struct GitHubCommits {
    base_url: String,
    fallback_token: Option<String>,
    client: Client,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: String,
    commit: GitHubCommitDetail,
    #[serde(default)]
    files: Vec<GitHubFile>,
}

#[derive(Deserialize)]
struct GitHubCommitDetail {
    message: String,
    author: Option<GitHubAuthor>,
}

#[derive(Deserialize)]
struct GitHubAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GitHubFile {
    filename: String,
}

impl From<GitHubCommit> for Commit {
    fn from(c: GitHubCommit) -> Self {
        let (author, date) = match c.commit.author {
            Some(a) => (a.name, a.date),
            None => ("unknown".to_string(), DateTime::<Utc>::UNIX_EPOCH),
        };
        Commit {
            sha: c.sha,
            message: c.commit.message,
            author,
            date,
            files_changed: c.files.into_iter().map(|f| f.filename).collect(),
        }
    }
}

impl GitHubCommits {
    pub fn from_env() -> Self {
        let base_url = std::env::var("ROADMAPPER_GITHUB_URL")
            .unwrap_or_else(|_| DEFAULT_GITHUB_URL.to_string());
        let fallback_token = std::env::var("ROADMAPPER_GITHUB_TOKEN").ok();
        Self::new(base_url, fallback_token)
    }

    pub fn new(base_url: impl Into<String>, fallback_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fallback_token,
            client: Client::new(),
        }
    }

    /// GET with GitHub's headers and the caller's token, or the fallback.
    fn get(&self, url: &str, caller: &CallerContext) -> reqwest::RequestBuilder {
        let req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT);
        match caller
            .repository_token
            .as_ref()
            .or(self.fallback_token.as_ref())
        {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl CommitSource for GitHubCommits {
    async fn recent_commits(
        &self,
        repository: &RepositoryRef,
        caller: &CallerContext,
        limit: usize,
    ) -> Result<Vec<Commit>, ExternalError> {
        let url = format!(
            "{}/repos/{}/{}/commits",
            self.base_url, repository.owner, repository.name
        );
        debug!(url = %url, caller = caller.caller(), "fetching commits");

        let listed: Vec<GitHubCommit> = handle_response(
            self.get(&url, caller)
                .query(&[("per_page", limit.to_string())])
                .send()
                .await?,
        )
        .await?;

        // The list endpoint omits changed files; only the per-commit view has them
        let mut commits = Vec::with_capacity(listed.len().min(limit));
        for summary in listed.into_iter().take(limit) {
            let detail_url = format!("{}/{}", url, summary.sha);
            let detail: GitHubCommit =
                handle_response(self.get(&detail_url, caller).send().await?).await?;
            commits.push(Commit::from(detail));
        }
        Ok(commits)
    }
}
