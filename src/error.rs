//! Error taxonomy surfaced by every boundary operation.
//!
//! Variants are returned to the caller unmodified; nothing here retries.

use std::fmt;

use uuid::Uuid;

use crate::external::ExternalError;

/// Failure of a roadmap operation.
#[derive(Debug, thiserror::Error)]
pub enum RoadmapError {
    /// A workflow precondition is not met (e.g. roadmap requested before
    /// refinement closed).
    #[error("not ready: {0}")]
    NotReady(String),

    /// The answer set does not cover every question or picks an unknown choice.
    #[error("incomplete answers: {0}")]
    IncompleteAnswers(AnswerViolation),

    /// Answers were already accepted for this project.
    #[error("refinement session for project {0} is closed")]
    SessionClosed(Uuid),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// The external generator, analyzer or advisor failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Commit evidence could not be fetched.
    #[error("evidence unavailable: {0}")]
    EvidenceUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RoadmapError {
    pub fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn generation(e: impl fmt::Display) -> Self {
        Self::Generation(e.to_string())
    }

    pub fn evidence(e: impl fmt::Display) -> Self {
        Self::EvidenceUnavailable(e.to_string())
    }

    /// Stable snake_case tag used in serialized failures.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotReady(_) => "not_ready",
            Self::IncompleteAnswers(_) => "incomplete_answers",
            Self::SessionClosed(_) => "session_closed",
            Self::NotFound { .. } => "not_found",
            Self::Generation(_) => "generation",
            Self::EvidenceUnavailable(_) => "evidence_unavailable",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<ExternalError> for RoadmapError {
    /// Collaborator failures default to generation failures; evidence
    /// fetches map explicitly through [`RoadmapError::evidence`].
    fn from(e: ExternalError) -> Self {
        Self::generation(e)
    }
}

/// The kind of entity a [`RoadmapError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Project,
    Module,
    Task,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Project => "project",
            Self::Module => "module",
            Self::Task => "task",
        })
    }
}

/// Why an answer set was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerViolation {
    MissingAnswer { question_id: Uuid },
    DuplicateAnswer { question_id: Uuid },
    UnknownQuestion { question_id: Uuid },
    InvalidChoice { question_id: Uuid, choice: String },
}

impl fmt::Display for AnswerViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAnswer { question_id } => {
                write!(f, "question {} has no answer", question_id)
            }
            Self::DuplicateAnswer { question_id } => {
                write!(f, "question {} is answered more than once", question_id)
            }
            Self::UnknownQuestion { question_id } => {
                write!(f, "question {} does not belong to this session", question_id)
            }
            Self::InvalidChoice {
                question_id,
                choice,
            } => write!(
                f,
                "'{}' is not a choice of question {}",
                choice, question_id
            ),
        }
    }
}

pub type Result<T, E = RoadmapError> = std::result::Result<T, E>;
