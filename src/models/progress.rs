use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::RepositoryRef;
use super::roadmap::TaskCompletion;

/// A commit fetched from the versioned-repository service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
    /// Files touched by the commit, when the source reports them.
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// Everything sent to the progress analyzer for one task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressRequest {
    pub task_description: String,
    pub repository: RepositoryRef,
    /// One line per commit: `- {message} (by {author} on {date})`.
    pub commit_messages: String,
    /// One line per changed file.
    pub file_changes: String,
}

/// The analyzer's verdict on whether commit evidence shows a task is done.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressAnalysis {
    /// In `[0, 1]`.
    pub confidence: f64,
    pub suggested_completion: bool,
    pub reasoning: String,
    #[serde(default)]
    pub relevant_commits: Vec<String>,
}

/// Outcome of a progress check.
///
/// `analysis` is `None` only when the task was already completed and the
/// check short-circuited before contacting any collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressReport {
    pub task_id: Uuid,
    pub already_completed: bool,
    pub auto_marked_complete: bool,
    pub threshold: f64,
    pub analysis: Option<ProgressAnalysis>,
    /// Present when the check completed the task.
    pub completion: Option<TaskCompletion>,
}

/// Context sent to the advice generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelpRequest {
    pub task_id: Uuid,
    pub task_description: String,
    pub project_title: String,
    pub project_description: String,
}

/// Structured guidance for completing a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskHelp {
    pub overview: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub code_examples: Vec<CodeExample>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeExample {
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub title: String,
    pub url: String,
}
