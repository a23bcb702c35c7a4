use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The question/answer exchange that gates roadmap generation for a project.
///
/// There is at most one session per project. It must reach `Closed` exactly
/// once before a roadmap can be generated; see [`crate::refinement`] for the
/// transition rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementSession {
    pub project_id: Uuid,
    pub state: SessionState,
    /// Reason for the last failure, set while the session is `Failed`.
    pub failure: Option<String>,
    pub questions: Vec<Question>,
    /// Empty until the session is closed.
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefinementSession {
    /// A session that has not been persisted yet.
    pub fn new(project_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            project_id,
            state: SessionState::Created,
            failure: None,
            questions: Vec::new(),
            answers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The lifecycle state of a refinement session.
///
/// - `Created`: no questions requested yet
/// - `QuestionsRequested`: the generator has been asked for questions
/// - `QuestionsReady`: questions stored, waiting for answers
/// - `AnswersSubmitted`: a complete answer set was accepted
/// - `Closed`: terminal; roadmap generation is unlocked
/// - `Failed`: the last step failed; questions may be requested again
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    QuestionsRequested,
    QuestionsReady,
    AnswersSubmitted,
    Closed,
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::QuestionsRequested => "questions_requested",
            Self::QuestionsReady => "questions_ready",
            Self::AnswersSubmitted => "answers_submitted",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "questions_requested" => Some(Self::QuestionsRequested),
            "questions_ready" => Some(Self::QuestionsReady),
            "answers_submitted" => Some(Self::AnswersSubmitted),
            "closed" => Some(Self::Closed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A clarifying question with its ordered multiple-choice options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub choices: Vec<String>,
}

/// The user's pick for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Answer {
    pub question_id: Uuid,
    pub selected_choice: String,
}

/// Question as returned by the generator, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedQuestion {
    pub text: String,
    pub choices: Vec<String>,
}

/// A question paired with the chosen answer, handed to the roadmap generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnsweredQuestion {
    pub question: String,
    pub answer: String,
}

/// Input for submitting the full answer set of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswersInput {
    pub answers: Vec<Answer>,
}
