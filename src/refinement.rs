//! Refinement session transitions and answer validation.
//!
//! ```text
//! Created -> QuestionsRequested -> QuestionsReady -> AnswersSubmitted -> Closed
//!     \_____________\___________________\________________\-> Failed
//! ```
//!
//! `Failed` may request questions again. `Closed` is terminal. Storage
//! checks every state write against [`can_transition`] and applies it only
//! if the session is still in the state the caller saw.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::{AnswerViolation, RoadmapError};
use crate::models::{Answer, GeneratedQuestion, Question, RefinementSession, SessionState};

/// Minimum number of choices a generated question must offer.
pub const MIN_CHOICES: usize = 2;

pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::*;
    match from {
        Created => vec![QuestionsRequested, Failed],
        QuestionsRequested => vec![QuestionsRequested, QuestionsReady, Failed],
        QuestionsReady => vec![AnswersSubmitted, Failed],
        AnswersSubmitted => vec![Closed, Failed],
        Closed => vec![],
        Failed => vec![QuestionsRequested],
    }
}

pub fn can_transition(from: SessionState, to: SessionState) -> bool {
    allowed_transitions(from).contains(&to)
}

/// What a `requestQuestions` call should do in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionRequest {
    /// Ask the generator.
    Generate,
    /// Questions are already stored; hand them back unchanged.
    Reuse,
}

pub fn plan_question_request(session: &RefinementSession) -> Result<QuestionRequest, RoadmapError> {
    match session.state {
        SessionState::QuestionsReady => Ok(QuestionRequest::Reuse),
        SessionState::AnswersSubmitted | SessionState::Closed => {
            Err(RoadmapError::SessionClosed(session.project_id))
        }
        state if can_transition(state, SessionState::QuestionsRequested) => {
            Ok(QuestionRequest::Generate)
        }
        state => Err(RoadmapError::NotReady(format!(
            "cannot request questions while session is {}",
            state.as_str()
        ))),
    }
}

pub fn ensure_can_submit(session: &RefinementSession) -> Result<(), RoadmapError> {
    match session.state {
        SessionState::QuestionsReady => Ok(()),
        SessionState::AnswersSubmitted | SessionState::Closed => {
            Err(RoadmapError::SessionClosed(session.project_id))
        }
        state => Err(RoadmapError::NotReady(format!(
            "no questions to answer while session is {}",
            state.as_str()
        ))),
    }
}

/// Check the generator's questions against the session contract.
pub fn validate_questions(questions: &[GeneratedQuestion]) -> Result<(), String> {
    if questions.is_empty() {
        return Err("generator returned no questions".to_string());
    }
    for question in questions {
        if question.text.trim().is_empty() {
            return Err("generator returned a question with empty text".to_string());
        }
        if question.choices.len() < MIN_CHOICES {
            return Err(format!(
                "question '{}' has {} choice(s), need at least {}",
                question.text,
                question.choices.len(),
                MIN_CHOICES
            ));
        }
        let distinct: HashSet<&str> = question.choices.iter().map(String::as_str).collect();
        if distinct.len() != question.choices.len() {
            return Err(format!("question '{}' repeats a choice", question.text));
        }
    }
    Ok(())
}

/// Every question answered exactly once, with one of its own choices.
pub fn validate_answers(questions: &[Question], answers: &[Answer]) -> Result<(), AnswerViolation> {
    let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut seen = HashSet::new();

    for answer in answers {
        let question = by_id
            .get(&answer.question_id)
            .ok_or(AnswerViolation::UnknownQuestion {
                question_id: answer.question_id,
            })?;
        if !seen.insert(answer.question_id) {
            return Err(AnswerViolation::DuplicateAnswer {
                question_id: answer.question_id,
            });
        }
        if !question.choices.contains(&answer.selected_choice) {
            return Err(AnswerViolation::InvalidChoice {
                question_id: answer.question_id,
                choice: answer.selected_choice.clone(),
            });
        }
    }

    match questions.iter().find(|q| !seen.contains(&q.id)) {
        Some(missing) => Err(AnswerViolation::MissingAnswer {
            question_id: missing.id,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(text: &str, choices: &[&str]) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: text.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn answer(q: &Question, choice: &str) -> Answer {
        Answer {
            question_id: q.id,
            selected_choice: choice.to_string(),
        }
    }

    fn session_in(state: SessionState) -> RefinementSession {
        let mut session = RefinementSession::new(Uuid::new_v4());
        session.state = state;
        session
    }

    #[test]
    fn closed_is_terminal() {
        assert!(allowed_transitions(SessionState::Closed).is_empty());
    }

    #[test]
    fn closing_passes_through_answers_submitted() {
        use SessionState::*;
        assert!(can_transition(QuestionsReady, AnswersSubmitted));
        assert!(can_transition(AnswersSubmitted, Closed));
        assert!(!can_transition(QuestionsReady, Closed));
    }

    #[test]
    fn failed_is_reachable_from_every_non_terminal_state() {
        for state in [
            SessionState::Created,
            SessionState::QuestionsRequested,
            SessionState::QuestionsReady,
            SessionState::AnswersSubmitted,
        ] {
            assert!(can_transition(state, SessionState::Failed), "{:?}", state);
        }
    }

    #[test]
    fn question_request_depends_on_state() {
        use SessionState::*;
        for state in [Created, QuestionsRequested, Failed] {
            assert_eq!(
                plan_question_request(&session_in(state)).unwrap(),
                QuestionRequest::Generate
            );
        }
        assert_eq!(
            plan_question_request(&session_in(QuestionsReady)).unwrap(),
            QuestionRequest::Reuse
        );
        assert!(matches!(
            plan_question_request(&session_in(Closed)),
            Err(RoadmapError::SessionClosed(_))
        ));
    }

    #[test]
    fn submit_requires_ready_questions() {
        assert!(ensure_can_submit(&session_in(SessionState::QuestionsReady)).is_ok());
        assert!(matches!(
            ensure_can_submit(&session_in(SessionState::Created)),
            Err(RoadmapError::NotReady(_))
        ));
        assert!(matches!(
            ensure_can_submit(&session_in(SessionState::Failed)),
            Err(RoadmapError::NotReady(_))
        ));
        assert!(matches!(
            ensure_can_submit(&session_in(SessionState::Closed)),
            Err(RoadmapError::SessionClosed(_))
        ));
    }

    #[test]
    fn questions_need_two_distinct_choices() {
        let ok = GeneratedQuestion {
            text: "Platform?".to_string(),
            choices: vec!["Web".to_string(), "Mobile".to_string()],
        };
        assert!(validate_questions(std::slice::from_ref(&ok)).is_ok());

        let single = GeneratedQuestion {
            choices: vec!["Web".to_string()],
            ..ok.clone()
        };
        assert!(validate_questions(&[single]).is_err());

        let repeated = GeneratedQuestion {
            choices: vec!["Web".to_string(), "Web".to_string()],
            ..ok.clone()
        };
        assert!(validate_questions(&[repeated]).is_err());
        assert!(validate_questions(&[]).is_err());
    }

    #[test]
    fn accepts_complete_answer_set_in_any_order() {
        let a = question("Platform?", &["Web", "Mobile"]);
        let b = question("Auth?", &["None", "OAuth"]);
        let answers = vec![answer(&b, "OAuth"), answer(&a, "Web")];
        assert_eq!(validate_answers(&[a, b], &answers), Ok(()));
    }

    #[test]
    fn rejects_missing_answer() {
        let a = question("Platform?", &["Web", "Mobile"]);
        let b = question("Auth?", &["None", "OAuth"]);
        let answers = vec![answer(&a, "Web")];
        assert_eq!(
            validate_answers(&[a, b.clone()], &answers),
            Err(AnswerViolation::MissingAnswer { question_id: b.id })
        );
    }

    #[test]
    fn rejects_choice_outside_question() {
        let a = question("Platform?", &["Web", "Mobile"]);
        let answers = vec![answer(&a, "Desktop")];
        assert_eq!(
            validate_answers(std::slice::from_ref(&a), &answers),
            Err(AnswerViolation::InvalidChoice {
                question_id: a.id,
                choice: "Desktop".to_string()
            })
        );
    }

    #[test]
    fn rejects_duplicate_and_unknown_answers() {
        let a = question("Platform?", &["Web", "Mobile"]);
        let dup = vec![answer(&a, "Web"), answer(&a, "Mobile")];
        assert_eq!(
            validate_answers(std::slice::from_ref(&a), &dup),
            Err(AnswerViolation::DuplicateAnswer { question_id: a.id })
        );

        let stranger = question("Other?", &["x", "y"]);
        let unknown = vec![answer(&a, "Web"), answer(&stranger, "x")];
        assert_eq!(
            validate_answers(std::slice::from_ref(&a), &unknown),
            Err(AnswerViolation::UnknownQuestion {
                question_id: stranger.id
            })
        );
    }
}
