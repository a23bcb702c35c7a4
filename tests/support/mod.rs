//! Shared fixtures: an in-memory service driven by a scripted fake of every
//! collaborator.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use roadmapper::caller::CallerContext;
use roadmapper::config::EngineConfig;
use roadmapper::db::Database;
use roadmapper::external::{
    AdviceGenerator, CommitSource, ExternalError, Generator, ProgressAnalyzer,
};
use roadmapper::models::*;
use roadmapper::service::{Collaborators, RoadmapService};

pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Default)]
pub struct Calls {
    pub ideas: AtomicUsize,
    pub questions: AtomicUsize,
    pub roadmaps: AtomicUsize,
    pub commits: AtomicUsize,
    pub analyses: AtomicUsize,
    pub help: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// One fake standing in for the generator, commit source, analyzer and
/// advisor. Responses are scripted through the public fields.
#[derive(Default)]
pub struct Fake {
    pub calls: Calls,
    pub questions: Mutex<Vec<GeneratedQuestion>>,
    /// Fail the next question request with this body.
    pub fail_questions: Mutex<Option<String>>,
    /// Per-call delays for question requests, consumed in call order.
    pub question_delays: Mutex<VecDeque<Duration>>,
    pub modules: Mutex<Vec<GeneratedModule>>,
    pub fail_roadmap: Mutex<Option<String>>,
    /// Per-call delays for roadmap requests, consumed in call order.
    pub roadmap_delays: Mutex<VecDeque<Duration>>,
    pub commits: Mutex<Vec<Commit>>,
    pub fail_commits: Mutex<bool>,
    pub commit_delay: Mutex<Option<Duration>>,
    pub analysis: Mutex<Option<ProgressAnalysis>>,
    pub help: Mutex<Option<TaskHelp>>,

    pub last_answers: Mutex<Vec<AnsweredQuestion>>,
    pub last_caller: Mutex<Option<CallerContext>>,
    pub last_commit_limit: Mutex<Option<usize>>,
    pub last_progress_request: Mutex<Option<ProgressRequest>>,
    pub last_help_request: Mutex<Option<HelpRequest>>,
}

impl Fake {
    /// Scripted for the recipe app walkthrough: three questions and a
    /// two-module roadmap with a nested module.
    pub fn recipe() -> Self {
        let fake = Self::default();
        *fake.questions.lock().unwrap() = recipe_questions();
        *fake.modules.lock().unwrap() = recipe_modules();
        *fake.help.lock().unwrap() = Some(TaskHelp {
            overview: "Start with the data model".to_string(),
            steps: vec!["Define a Recipe struct".to_string(), "Add a table".to_string()],
            code_examples: vec![CodeExample {
                language: "rust".to_string(),
                code: "struct Recipe { name: String }".to_string(),
            }],
            resources: vec![],
            tips: vec!["Keep it small".to_string()],
        });
        fake
    }

    pub fn delay_questions(&self, delays: &[u64]) {
        *self.question_delays.lock().unwrap() =
            delays.iter().map(|ms| Duration::from_millis(*ms)).collect();
    }

    pub fn delay_roadmaps(&self, delays: &[u64]) {
        *self.roadmap_delays.lock().unwrap() =
            delays.iter().map(|ms| Duration::from_millis(*ms)).collect();
    }

    pub fn set_analysis(&self, confidence: f64, suggested_completion: bool) {
        *self.analysis.lock().unwrap() = Some(ProgressAnalysis {
            confidence,
            suggested_completion,
            reasoning: "scripted".to_string(),
            relevant_commits: vec!["Add recipe model".to_string()],
        });
    }
}

pub fn recipe_questions() -> Vec<GeneratedQuestion> {
    vec![
        question("Which platform should the app target?", &["Web", "Mobile"]),
        question("How should recipes be stored?", &["SQLite", "JSON files", "Cloud"]),
        question("Do users need accounts?", &["Yes", "No"]),
    ]
}

pub fn recipe_modules() -> Vec<GeneratedModule> {
    vec![
        GeneratedModule {
            name: "Foundations".to_string(),
            description: Some("Project skeleton and data model".to_string()),
            tasks: vec![
                "Set up the project".to_string(),
                "Design the recipe schema".to_string(),
            ],
            sub_modules: vec![GeneratedModule {
                name: "Storage".to_string(),
                description: None,
                tasks: vec!["Persist recipes".to_string()],
                sub_modules: vec![],
            }],
        },
        GeneratedModule {
            name: "Search".to_string(),
            description: None,
            tasks: vec!["Search recipes by ingredient".to_string()],
            sub_modules: vec![],
        },
    ]
}

pub fn question(text: &str, choices: &[&str]) -> GeneratedQuestion {
    GeneratedQuestion {
        text: text.to_string(),
        choices: choices.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn commit(message: &str, files: &[&str]) -> Commit {
    Commit {
        sha: format!("{:x}", message.len()),
        message: message.to_string(),
        author: "Dana".to_string(),
        date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        files_changed: files.iter().map(|f| f.to_string()).collect(),
    }
}

#[async_trait]
impl Generator for Fake {
    async fn generate_idea(&self, level: IdeaLevel) -> Result<ProjectIdea, ExternalError> {
        self.calls.ideas.fetch_add(1, Ordering::SeqCst);
        Ok(ProjectIdea {
            title: "Recipe App".to_string(),
            description: format!("A {} recipe organizer", level.as_str()),
        })
    }

    async fn generate_questions(
        &self,
        _project: &Project,
    ) -> Result<Vec<GeneratedQuestion>, ExternalError> {
        self.calls.questions.fetch_add(1, Ordering::SeqCst);
        let delay = self.question_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(body) = self.fail_questions.lock().unwrap().take() {
            return Err(ExternalError::Status { status: 503, body });
        }
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn generate_roadmap(
        &self,
        _project: &Project,
        answers: &[AnsweredQuestion],
    ) -> Result<Vec<GeneratedModule>, ExternalError> {
        self.calls.roadmaps.fetch_add(1, Ordering::SeqCst);
        *self.last_answers.lock().unwrap() = answers.to_vec();
        let delay = self.roadmap_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(body) = self.fail_roadmap.lock().unwrap().take() {
            return Err(ExternalError::Status { status: 503, body });
        }
        Ok(self.modules.lock().unwrap().clone())
    }
}

#[async_trait]
impl CommitSource for Fake {
    async fn recent_commits(
        &self,
        _repository: &RepositoryRef,
        caller: &CallerContext,
        limit: usize,
    ) -> Result<Vec<Commit>, ExternalError> {
        self.calls.commits.fetch_add(1, Ordering::SeqCst);
        *self.last_caller.lock().unwrap() = Some(caller.clone());
        *self.last_commit_limit.lock().unwrap() = Some(limit);

        let delay = *self.commit_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_commits.lock().unwrap() {
            return Err(ExternalError::Unauthorized);
        }
        Ok(self
            .commits
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProgressAnalyzer for Fake {
    async fn analyze(&self, request: &ProgressRequest) -> Result<ProgressAnalysis, ExternalError> {
        self.calls.analyses.fetch_add(1, Ordering::SeqCst);
        *self.last_progress_request.lock().unwrap() = Some(request.clone());
        self.analysis
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExternalError::Invalid("no analysis scripted".to_string()))
    }
}

#[async_trait]
impl AdviceGenerator for Fake {
    async fn task_help(&self, request: &HelpRequest) -> Result<TaskHelp, ExternalError> {
        self.calls.help.fetch_add(1, Ordering::SeqCst);
        *self.last_help_request.lock().unwrap() = Some(request.clone());
        self.help
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExternalError::Invalid("no help scripted".to_string()))
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default().with_external_timeout(TEST_TIMEOUT)
}

pub fn setup() -> (RoadmapService, Arc<Fake>) {
    setup_with(Fake::recipe(), test_config())
}

pub fn setup_with(fake: Fake, config: EngineConfig) -> (RoadmapService, Arc<Fake>) {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");

    let fake = Arc::new(fake);
    let collaborators = Collaborators {
        generator: fake.clone(),
        commits: fake.clone(),
        analyzer: fake.clone(),
        advisor: fake.clone(),
    };
    (RoadmapService::new(db, collaborators, config), fake)
}

pub fn create_project(service: &RoadmapService) -> Project {
    service
        .create_project(CreateProjectInput {
            title: "Recipe App".to_string(),
            description: "Organize and search family recipes".to_string(),
            repository: Some(RepositoryRef::new("dana", "recipes")),
        })
        .expect("Failed to create project")
}

/// Answer every question with its first choice.
pub fn first_choices(session: &RefinementSession) -> Vec<Answer> {
    session
        .questions
        .iter()
        .map(|q| Answer {
            question_id: q.id,
            selected_choice: q.choices[0].clone(),
        })
        .collect()
}

/// Create a project and drive it through refinement and generation.
pub async fn generated_roadmap(service: &RoadmapService) -> (Project, RoadmapStatus) {
    let project = create_project(service);
    let session = service
        .start_refinement(project.id)
        .await
        .expect("Failed to request questions");
    service
        .submit_answers(project.id, first_choices(&session))
        .expect("Failed to submit answers");
    let status = service
        .generate_roadmap(project.id, false)
        .await
        .expect("Failed to generate roadmap");
    (project, status)
}

/// Every task in a status snapshot, depth-first.
pub fn all_tasks(status: &RoadmapStatus) -> Vec<Task> {
    fn collect(module: &ModuleStatus, out: &mut Vec<Task>) {
        out.extend(module.tasks.iter().cloned());
        for sub in &module.sub_modules {
            collect(sub, out);
        }
    }
    let mut out = Vec::new();
    for module in &status.modules {
        collect(module, &mut out);
    }
    out
}
