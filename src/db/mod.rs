mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::*;
use crate::refinement;
use crate::roadmap::MaterializedRoadmap;

/// Outcome of [`Database::store_roadmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoadmapWrite {
    Stored,
    /// The project already has a roadmap and regeneration was not requested.
    AlreadyGenerated,
    /// Regeneration was requested but the roadmap already has modules.
    NotEmpty,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "roadmapper")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("roadmapper.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, repository, created_at
             FROM projects ORDER BY created_at, title",
        )?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.lock()?;
        let project = conn
            .query_row(
                "SELECT id, title, description, repository, created_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.lock()?;
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, title, description, repository, created_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.title,
                &input.description,
                input.repository.as_ref().map(|r| r.to_string()),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            title: input.title,
            description: input.description,
            repository: input.repository,
            created_at: now,
        })
    }

    pub fn set_project_repository(
        &self,
        id: Uuid,
        repository: &RepositoryRef,
    ) -> Result<Option<Project>> {
        let rows = {
            let conn = self.lock()?;
            conn.execute(
                "UPDATE projects SET repository = ? WHERE id = ?",
                (repository.to_string(), id.to_string()),
            )?
        };
        if rows == 0 {
            return Ok(None);
        }
        self.get_project(id)
    }

    // ============================================================
    // Refinement operations
    // ============================================================

    /// Load a project's refinement session with its questions and answers.
    pub fn get_refinement(&self, project_id: Uuid) -> Result<Option<RefinementSession>> {
        let conn = self.lock()?;
        let session = conn
            .query_row(
                "SELECT project_id, state, failure, created_at, updated_at
                 FROM refinement_sessions WHERE project_id = ?",
                [project_id.to_string()],
                |row| {
                    Ok(RefinementSession {
                        project_id: parse_uuid(row.get::<_, String>(0)?),
                        state: SessionState::from_str(&row.get::<_, String>(1)?)
                            .unwrap_or(SessionState::Failed),
                        failure: row.get(2)?,
                        questions: Vec::new(),
                        answers: Vec::new(),
                        created_at: parse_datetime(row.get::<_, String>(3)?),
                        updated_at: parse_datetime(row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;

        let Some(mut session) = session else {
            return Ok(None);
        };
        session.questions = query_questions(&conn, project_id)?;
        session.answers = query_answers(&conn, project_id)?;
        Ok(Some(session))
    }

    /// Move the session from `from` to `to`, recording `failure`.
    ///
    /// Nothing is written unless the session is still in `from`; returns
    /// whether the move happened. A move the transition table forbids is an
    /// error.
    pub fn advance_refinement(
        &self,
        project_id: Uuid,
        from: SessionState,
        to: SessionState,
        failure: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        advance_session(&conn, project_id, from, to, failure)
    }

    /// Store generated questions and mark the session `QuestionsReady`.
    ///
    /// Returns `None`, writing nothing, when the session has left
    /// `QuestionsRequested` since the questions were requested.
    pub fn store_questions(
        &self,
        project_id: Uuid,
        generated: &[GeneratedQuestion],
    ) -> Result<Option<Vec<Question>>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !advance_session(
            &tx,
            project_id,
            SessionState::QuestionsRequested,
            SessionState::QuestionsReady,
            None,
        )? {
            return Ok(None);
        }

        tx.execute(
            "DELETE FROM questions WHERE project_id = ?",
            [project_id.to_string()],
        )?;

        let mut questions = Vec::with_capacity(generated.len());
        for (position, q) in generated.iter().enumerate() {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO questions (id, project_id, position, text, choices)
                 VALUES (?, ?, ?, ?, ?)",
                (
                    id.to_string(),
                    project_id.to_string(),
                    position as i64,
                    &q.text,
                    serde_json::to_string(&q.choices)?,
                ),
            )?;
            questions.push(Question {
                id,
                text: q.text.clone(),
                choices: q.choices.clone(),
            });
        }

        tx.commit()?;
        Ok(Some(questions))
    }

    /// Store an accepted answer set and close the session, atomically.
    ///
    /// Returns `false`, writing nothing, unless the session is
    /// `QuestionsReady`.
    pub fn close_refinement(&self, project_id: Uuid, answers: &[Answer]) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        if !advance_session(
            &tx,
            project_id,
            SessionState::QuestionsReady,
            SessionState::AnswersSubmitted,
            None,
        )? {
            return Ok(false);
        }

        for answer in answers {
            tx.execute(
                "INSERT INTO answers (question_id, project_id, selected_choice, created_at)
                 VALUES (?, ?, ?, ?)",
                (
                    answer.question_id.to_string(),
                    project_id.to_string(),
                    &answer.selected_choice,
                    now.to_rfc3339(),
                ),
            )?;
        }

        advance_session(
            &tx,
            project_id,
            SessionState::AnswersSubmitted,
            SessionState::Closed,
            None,
        )?;
        tx.commit()?;
        Ok(true)
    }

    // ============================================================
    // Roadmap operations
    // ============================================================

    /// When the project's roadmap was generated, if it has been.
    pub fn get_roadmap_generated_at(&self, project_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let generated_at = conn
            .query_row(
                "SELECT generated_at FROM roadmaps WHERE project_id = ?",
                [project_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(generated_at.map(parse_datetime))
    }

    /// Persist a materialized roadmap.
    ///
    /// A project holds one roadmap. An existing one is only replaced when
    /// `regenerate` is set and it has no modules; otherwise nothing is
    /// written and the refusal is returned.
    ///
    /// Modules must be ordered parents-first, as `materialize` produces them.
    pub fn store_roadmap(
        &self,
        project_id: Uuid,
        roadmap: &MaterializedRoadmap,
        regenerate: bool,
    ) -> Result<RoadmapWrite> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();

        let existing = tx
            .query_row(
                "SELECT generated_at FROM roadmaps WHERE project_id = ?",
                [project_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if existing.is_some() {
            if !regenerate {
                return Ok(RoadmapWrite::AlreadyGenerated);
            }
            let modules: i64 = tx.query_row(
                "SELECT COUNT(*) FROM modules WHERE project_id = ?",
                [project_id.to_string()],
                |row| row.get(0),
            )?;
            if modules > 0 {
                return Ok(RoadmapWrite::NotEmpty);
            }
        }

        tx.execute(
            "INSERT INTO roadmaps (project_id, generated_at) VALUES (?, ?)
             ON CONFLICT(project_id) DO UPDATE SET generated_at = excluded.generated_at",
            (project_id.to_string(), now.to_rfc3339()),
        )?;

        for module in &roadmap.modules {
            tx.execute(
                "INSERT INTO modules (id, project_id, parent_id, name, description, position)
                 VALUES (?, ?, ?, ?, ?, ?)",
                (
                    module.id.to_string(),
                    project_id.to_string(),
                    module.parent_module_id.map(|u| u.to_string()),
                    &module.name,
                    &module.description,
                    module.position,
                ),
            )?;
        }

        for task in &roadmap.tasks {
            tx.execute(
                "INSERT INTO tasks (id, module_id, project_id, description, position, completed, completed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    task.id.to_string(),
                    task.module_id.to_string(),
                    project_id.to_string(),
                    &task.description,
                    task.position,
                    if task.completed { 1 } else { 0 },
                    task.completed_at.map(|t| t.to_rfc3339()),
                ),
            )?;
        }

        tx.commit()?;
        Ok(RoadmapWrite::Stored)
    }

    pub fn get_modules_by_project(&self, project_id: Uuid) -> Result<Vec<Module>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, parent_id, name, description, position
             FROM modules WHERE project_id = ? ORDER BY position",
        )?;

        let modules = stmt
            .query_map([project_id.to_string()], |row| {
                Ok(Module {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    project_id: parse_uuid(row.get::<_, String>(1)?),
                    parent_module_id: row.get::<_, Option<String>>(2)?.map(parse_uuid),
                    name: row.get(3)?,
                    description: row.get(4)?,
                    position: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(modules)
    }

    pub fn get_tasks_by_project(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, module_id, description, completed, completed_at, position
             FROM tasks WHERE project_id = ? ORDER BY position",
        )?;

        let tasks = stmt
            .query_map([project_id.to_string()], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                "SELECT id, module_id, description, completed, completed_at, position
                 FROM tasks WHERE id = ?",
                [id.to_string()],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// The project owning a task, if the task exists.
    pub fn get_task_project_id(&self, task_id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.lock()?;
        let project_id = conn
            .query_row(
                "SELECT project_id FROM tasks WHERE id = ?",
                [task_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(project_id.map(parse_uuid))
    }

    /// Mark a task completed. Returns `false` when it was already completed
    /// (or does not exist); a completed task is never touched again.
    pub fn mark_task_completed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE tasks SET completed = 1, completed_at = ? WHERE id = ? AND completed = 0",
            (at.to_rfc3339(), id.to_string()),
        )?;
        Ok(rows > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

fn advance_session(
    conn: &Connection,
    project_id: Uuid,
    from: SessionState,
    to: SessionState,
    failure: Option<&str>,
) -> Result<bool> {
    anyhow::ensure!(
        refinement::can_transition(from, to),
        "refinement session cannot move from {} to {}",
        from.as_str(),
        to.as_str()
    );

    let now = Utc::now().to_rfc3339();
    // A session with no row is `Created`
    let rows = if from == SessionState::Created {
        conn.execute(
            "INSERT INTO refinement_sessions (project_id, state, failure, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(project_id) DO UPDATE SET
                state = excluded.state, failure = excluded.failure, updated_at = excluded.updated_at
             WHERE refinement_sessions.state = ?5",
            (project_id.to_string(), to.as_str(), failure, &now, from.as_str()),
        )?
    } else {
        conn.execute(
            "UPDATE refinement_sessions SET state = ?, failure = ?, updated_at = ?
             WHERE project_id = ? AND state = ?",
            (to.as_str(), failure, &now, project_id.to_string(), from.as_str()),
        )?
    };
    Ok(rows > 0)
}

fn query_questions(conn: &Connection, project_id: Uuid) -> Result<Vec<Question>> {
    let mut stmt = conn.prepare(
        "SELECT id, text, choices FROM questions WHERE project_id = ? ORDER BY position",
    )?;

    let questions = stmt
        .query_map([project_id.to_string()], |row| {
            let choices_json: String = row.get(2)?;
            Ok(Question {
                id: parse_uuid(row.get::<_, String>(0)?),
                text: row.get(1)?,
                choices: serde_json::from_str(&choices_json).unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(questions)
}

fn query_answers(conn: &Connection, project_id: Uuid) -> Result<Vec<Answer>> {
    let mut stmt = conn.prepare(
        "SELECT a.question_id, a.selected_choice
         FROM answers a JOIN questions q ON q.id = a.question_id
         WHERE a.project_id = ? ORDER BY q.position",
    )?;

    let answers = stmt
        .query_map([project_id.to_string()], |row| {
            Ok(Answer {
                question_id: parse_uuid(row.get::<_, String>(0)?),
                selected_choice: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(answers)
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        repository: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| s.parse().ok()),
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        module_id: parse_uuid(row.get::<_, String>(1)?),
        description: row.get(2)?,
        completed: row.get::<_, i32>(3)? != 0,
        completed_at: row.get::<_, Option<String>>(4)?.map(parse_datetime),
        position: row.get(5)?,
    })
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
