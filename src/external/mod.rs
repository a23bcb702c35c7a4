//! External collaborators consumed by the engine.
//!
//! Each collaborator is a trait so the engine can be driven by the HTTP
//! implementations in [`http`] or by in-process fakes in tests.

mod http;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use http::{GitHubCommits, HttpGenerator};

use crate::caller::CallerContext;
use crate::models::*;

/// Failure talking to a collaborator.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unauthorized: credentials missing or rejected")]
    Unauthorized,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unusable response: {0}")]
    Invalid(String),
}

/// Idea, question and roadmap generation.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate_idea(&self, level: IdeaLevel) -> Result<ProjectIdea, ExternalError>;

    async fn generate_questions(
        &self,
        project: &Project,
    ) -> Result<Vec<GeneratedQuestion>, ExternalError>;

    async fn generate_roadmap(
        &self,
        project: &Project,
        answers: &[AnsweredQuestion],
    ) -> Result<Vec<GeneratedModule>, ExternalError>;
}

/// Commit history of a versioned repository.
#[async_trait]
pub trait CommitSource: Send + Sync {
    /// Most recent commits first, at most `limit`.
    async fn recent_commits(
        &self,
        repository: &RepositoryRef,
        caller: &CallerContext,
        limit: usize,
    ) -> Result<Vec<Commit>, ExternalError>;
}

/// Judges whether commit evidence shows a task is done.
#[async_trait]
pub trait ProgressAnalyzer: Send + Sync {
    async fn analyze(&self, request: &ProgressRequest) -> Result<ProgressAnalysis, ExternalError>;
}

/// Produces guidance for completing a task.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn task_help(&self, request: &HelpRequest) -> Result<TaskHelp, ExternalError>;
}

/// Bound a collaborator call. Dropping the returned future cancels the call.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ExternalError>
where
    F: Future<Output = Result<T, ExternalError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(ExternalError::Timeout(limit)))
}
