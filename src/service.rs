//! The roadmap engine: project lifecycle, refinement, roadmap generation and
//! task completion.
//!
//! Every boundary operation returns a [`RoadmapError`] variant on failure and
//! never retries. The database lock is only held inside `Database` calls, so
//! no lock is ever held across an `.await`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::caller::CallerContext;
use crate::config::EngineConfig;
use crate::db::{Database, RoadmapWrite};
use crate::error::{EntityKind, Result, RoadmapError};
use crate::external::{
    with_timeout, AdviceGenerator, CommitSource, Generator, GitHubCommits, HttpGenerator,
    ProgressAnalyzer,
};
use crate::models::*;
use crate::progress::ProgressVerifier;
use crate::refinement::{self, QuestionRequest};
use crate::roadmap::{self, RoadmapTree};

/// The external services the engine talks to.
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub commits: Arc<dyn CommitSource>,
    pub analyzer: Arc<dyn ProgressAnalyzer>,
    pub advisor: Arc<dyn AdviceGenerator>,
}

impl Collaborators {
    /// HTTP collaborators configured from `ROADMAPPER_*` variables.
    pub fn from_env() -> Self {
        let generator = Arc::new(HttpGenerator::from_env());
        Self {
            generator: generator.clone(),
            commits: Arc::new(GitHubCommits::from_env()),
            analyzer: generator.clone(),
            advisor: generator,
        }
    }
}

#[derive(Clone)]
pub struct RoadmapService {
    db: Database,
    collaborators: Arc<Collaborators>,
    config: EngineConfig,
}

impl RoadmapService {
    pub fn new(db: Database, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            db,
            collaborators: Arc::new(collaborators),
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    // ============================================================
    // Projects
    // ============================================================

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let project = self.db.create_project(input)?;
        info!(project = %project.id, title = %project.title, "Project created");
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.db.get_all_projects()?)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Project> {
        self.db
            .get_project(id)?
            .ok_or(RoadmapError::not_found(EntityKind::Project, id))
    }

    /// Point a project at the repository used as progress evidence.
    pub fn link_repository(&self, id: Uuid, repository: RepositoryRef) -> Result<Project> {
        let project = self
            .db
            .set_project_repository(id, &repository)?
            .ok_or(RoadmapError::not_found(EntityKind::Project, id))?;
        info!(project = %id, repository = %repository, "Repository linked");
        Ok(project)
    }

    pub async fn suggest_idea(&self, level: IdeaLevel) -> Result<ProjectIdea> {
        debug!(level = level.as_str(), "Requesting project idea");
        let idea = with_timeout(
            self.config.external_timeout,
            self.collaborators.generator.generate_idea(level),
        )
        .await?;
        Ok(idea)
    }

    // ============================================================
    // Refinement
    // ============================================================

    /// The project's refinement session. A project that never requested
    /// questions reports a fresh `Created` session.
    pub fn get_refinement(&self, project_id: Uuid) -> Result<RefinementSession> {
        self.get_project(project_id)?;
        self.load_refinement(project_id)
    }

    /// Request clarifying questions for a project.
    ///
    /// Calling again once questions are ready returns the same questions
    /// without contacting the generator.
    pub async fn start_refinement(&self, project_id: Uuid) -> Result<RefinementSession> {
        let project = self.get_project(project_id)?;
        let session = self.load_refinement(project_id)?;

        match refinement::plan_question_request(&session)? {
            QuestionRequest::Reuse => {
                debug!(project = %project_id, "Questions already generated");
                return Ok(session);
            }
            QuestionRequest::Generate => {}
        }

        if !self.db.advance_refinement(
            project_id,
            session.state,
            SessionState::QuestionsRequested,
            None,
        )? {
            return self.settled_refinement(project_id);
        }
        debug!(project = %project_id, "Requesting questions");

        let generated = with_timeout(
            self.config.external_timeout,
            self.collaborators.generator.generate_questions(&project),
        )
        .await
        .map_err(|e| e.to_string())
        .and_then(|questions| refinement::validate_questions(&questions).map(|_| questions));

        let generated = match generated {
            Ok(questions) => questions,
            Err(reason) => {
                warn!(project = %project_id, reason = %reason, "Question generation failed");
                // A concurrent request may already have settled the session
                self.db.advance_refinement(
                    project_id,
                    SessionState::QuestionsRequested,
                    SessionState::Failed,
                    Some(&reason),
                )?;
                return Err(RoadmapError::Generation(reason));
            }
        };

        match self.db.store_questions(project_id, &generated)? {
            Some(questions) => {
                info!(project = %project_id, count = questions.len(), "Questions ready");
                self.load_refinement(project_id)
            }
            None => {
                debug!(project = %project_id, "Session moved on while questions were generated");
                self.settled_refinement(project_id)
            }
        }
    }

    /// The session after another request won a race to change it.
    fn settled_refinement(&self, project_id: Uuid) -> Result<RefinementSession> {
        let session = self.load_refinement(project_id)?;
        match refinement::plan_question_request(&session)? {
            QuestionRequest::Reuse => Ok(session),
            QuestionRequest::Generate => Err(RoadmapError::NotReady(format!(
                "refinement session changed to {} by a concurrent request",
                session.state.as_str()
            ))),
        }
    }

    /// Accept a complete answer set and close the session.
    ///
    /// A rejected answer set leaves the session exactly as it was.
    pub fn submit_answers(&self, project_id: Uuid, answers: Vec<Answer>) -> Result<RefinementSession> {
        self.get_project(project_id)?;
        let session = self.load_refinement(project_id)?;
        refinement::ensure_can_submit(&session)?;

        if let Err(violation) = refinement::validate_answers(&session.questions, &answers) {
            warn!(project = %project_id, %violation, "Answers rejected");
            return Err(RoadmapError::IncompleteAnswers(violation));
        }

        if !self.db.close_refinement(project_id, &answers)? {
            let current = self.load_refinement(project_id)?;
            refinement::ensure_can_submit(&current)?;
            return Err(RoadmapError::NotReady(format!(
                "refinement session changed to {} before answers were stored",
                current.state.as_str()
            )));
        }
        info!(project = %project_id, "Refinement closed");
        self.load_refinement(project_id)
    }

    fn load_refinement(&self, project_id: Uuid) -> Result<RefinementSession> {
        Ok(self
            .db
            .get_refinement(project_id)?
            .unwrap_or_else(|| RefinementSession::new(project_id)))
    }

    // ============================================================
    // Roadmap
    // ============================================================

    /// Generate the project's roadmap from its closed refinement session.
    ///
    /// Allowed once per project; `regenerate` replaces a roadmap only while
    /// it has no modules.
    pub async fn generate_roadmap(&self, project_id: Uuid, regenerate: bool) -> Result<RoadmapStatus> {
        let project = self.get_project(project_id)?;
        let session = self.load_refinement(project_id)?;

        if session.state != SessionState::Closed {
            return Err(RoadmapError::NotReady(format!(
                "refinement session is {}; answers must be submitted first",
                session.state.as_str()
            )));
        }

        if self.db.get_roadmap_generated_at(project_id)?.is_some() {
            if !regenerate {
                return Err(roadmap_refused(RoadmapWrite::AlreadyGenerated));
            }
            if !self.db.get_modules_by_project(project_id)?.is_empty() {
                return Err(roadmap_refused(RoadmapWrite::NotEmpty));
            }
        }

        let answered = answered_questions(&session);
        debug!(project = %project_id, answers = answered.len(), "Requesting roadmap");
        let generated = with_timeout(
            self.config.external_timeout,
            self.collaborators
                .generator
                .generate_roadmap(&project, &answered),
        )
        .await?;
        roadmap::validate_generated(&generated).map_err(RoadmapError::Generation)?;

        let materialized = roadmap::materialize(project_id, &generated);
        // Re-checked under the write lock; a concurrent generation may have won
        match self.db.store_roadmap(project_id, &materialized, regenerate)? {
            RoadmapWrite::Stored => {}
            refused => {
                warn!(project = %project_id, ?refused, "Roadmap write refused");
                return Err(roadmap_refused(refused));
            }
        }
        info!(
            project = %project_id,
            modules = materialized.modules.len(),
            tasks = materialized.tasks.len(),
            "Roadmap generated"
        );

        self.get_status(project_id)
    }

    /// Current roadmap with freshly derived completion flags.
    pub fn get_status(&self, project_id: Uuid) -> Result<RoadmapStatus> {
        let project = self.get_project(project_id)?;
        let generated = self.db.get_roadmap_generated_at(project_id)?.is_some();
        let tree = self.load_tree(project_id)?;

        Ok(RoadmapStatus {
            project_id,
            title: project.title,
            generated,
            completed: generated && tree.all_completed(),
            progress: tree.progress(),
            modules: tree.snapshot(),
        })
    }

    /// Mark a task completed. Completing it again succeeds without change.
    pub fn complete_task(&self, task_id: Uuid) -> Result<TaskCompletion> {
        let project_id = self
            .db
            .get_task_project_id(task_id)?
            .ok_or(RoadmapError::not_found(EntityKind::Task, task_id))?;

        let now = Utc::now();
        let changed = self.db.mark_task_completed(task_id, now)?;
        let mut tree = self.load_tree(project_id)?;
        let mut completion = tree
            .complete_task(task_id, now)
            .ok_or(RoadmapError::not_found(EntityKind::Task, task_id))?;
        completion.already_completed = !changed;

        if changed {
            info!(
                task = %task_id,
                roadmap_completed = completion.roadmap_completed,
                "Task completed"
            );
        } else {
            debug!(task = %task_id, "Task already completed");
        }
        Ok(completion)
    }

    fn load_tree(&self, project_id: Uuid) -> Result<RoadmapTree> {
        let modules = self.db.get_modules_by_project(project_id)?;
        let tasks = self.db.get_tasks_by_project(project_id)?;
        RoadmapTree::from_rows(modules, tasks).map_err(|e| RoadmapError::Storage(e.into()))
    }

    // ============================================================
    // Progress
    // ============================================================

    pub async fn check_progress(&self, task_id: Uuid, caller: &CallerContext) -> Result<ProgressReport> {
        ProgressVerifier::new(self).check_progress(task_id, caller).await
    }

    pub async fn get_help(&self, task_id: Uuid) -> Result<TaskHelp> {
        ProgressVerifier::new(self).get_help(task_id).await
    }
}

fn roadmap_refused(write: RoadmapWrite) -> RoadmapError {
    RoadmapError::NotReady(
        match write {
            RoadmapWrite::NotEmpty => "roadmap already has modules and cannot be regenerated",
            _ => "roadmap already generated",
        }
        .to_string(),
    )
}

/// Question text paired with the chosen answer, in question order.
fn answered_questions(session: &RefinementSession) -> Vec<AnsweredQuestion> {
    session
        .questions
        .iter()
        .filter_map(|q| {
            session
                .answers
                .iter()
                .find(|a| a.question_id == q.id)
                .map(|a| AnsweredQuestion {
                    question: q.text.clone(),
                    answer: a.selected_choice.clone(),
                })
        })
        .collect()
}
