//! Evidence-based progress checks and task guidance.
//!
//! A check reads recent commits from the project's linked repository, asks
//! the analyzer whether they show the task is done, and completes the task
//! when the analyzer agrees with enough confidence. Nothing is mutated on any
//! failure path.

use chrono::SecondsFormat;
use tracing::{debug, info};
use uuid::Uuid;

use crate::caller::CallerContext;
use crate::error::{EntityKind, Result, RoadmapError};
use crate::external::with_timeout;
use crate::models::*;
use crate::service::RoadmapService;

/// Most relevant commits kept from an analysis.
pub const MAX_RELEVANT_COMMITS: usize = 5;

pub struct ProgressVerifier<'a> {
    service: &'a RoadmapService,
}

impl<'a> ProgressVerifier<'a> {
    pub fn new(service: &'a RoadmapService) -> Self {
        Self { service }
    }

    pub async fn check_progress(
        &self,
        task_id: Uuid,
        caller: &CallerContext,
    ) -> Result<ProgressReport> {
        let db = self.service.db();
        let config = self.service.config();
        let threshold = config.completion_threshold;

        let task = db
            .get_task(task_id)?
            .ok_or(RoadmapError::not_found(EntityKind::Task, task_id))?;

        if task.completed {
            debug!(task = %task_id, "Task already completed, skipping check");
            return Ok(ProgressReport {
                task_id,
                already_completed: true,
                auto_marked_complete: false,
                threshold,
                analysis: None,
                completion: None,
            });
        }

        let project = self.project_of(task_id)?;
        let repository = project.repository.ok_or_else(|| {
            RoadmapError::EvidenceUnavailable(format!(
                "project {} has no linked repository",
                project.id
            ))
        })?;

        debug!(
            task = %task_id,
            repository = %repository,
            caller = caller.caller(),
            "Fetching commit evidence"
        );
        let commits = with_timeout(
            config.external_timeout,
            self.service.collaborators().commits.recent_commits(
                &repository,
                caller,
                config.commit_limit,
            ),
        )
        .await
        .map_err(RoadmapError::evidence)?;

        let request = ProgressRequest {
            task_description: task.description,
            repository,
            commit_messages: format_commit_messages(&commits),
            file_changes: format_file_changes(&commits),
        };
        let analysis = with_timeout(
            config.external_timeout,
            self.service.collaborators().analyzer.analyze(&request),
        )
        .await?;
        let analysis = normalize_analysis(analysis)?;

        if !(analysis.suggested_completion && analysis.confidence >= threshold) {
            debug!(
                task = %task_id,
                confidence = analysis.confidence,
                threshold,
                "Evidence not conclusive"
            );
            return Ok(ProgressReport {
                task_id,
                already_completed: false,
                auto_marked_complete: false,
                threshold,
                analysis: Some(analysis),
                completion: None,
            });
        }

        let completion = self.service.complete_task(task_id)?;
        let auto_marked_complete = !completion.already_completed;
        if auto_marked_complete {
            info!(
                task = %task_id,
                confidence = analysis.confidence,
                "Task auto-completed from commit evidence"
            );
        }

        Ok(ProgressReport {
            task_id,
            already_completed: completion.already_completed,
            auto_marked_complete,
            threshold,
            analysis: Some(analysis),
            completion: Some(completion),
        })
    }

    /// Guidance for completing a task. Never mutates anything.
    pub async fn get_help(&self, task_id: Uuid) -> Result<TaskHelp> {
        let task = self
            .service
            .db()
            .get_task(task_id)?
            .ok_or(RoadmapError::not_found(EntityKind::Task, task_id))?;
        let project = self.project_of(task_id)?;

        let request = HelpRequest {
            task_id,
            task_description: task.description,
            project_title: project.title,
            project_description: project.description,
        };
        debug!(task = %task_id, "Requesting task help");
        let help = with_timeout(
            self.service.config().external_timeout,
            self.service.collaborators().advisor.task_help(&request),
        )
        .await?;
        Ok(help)
    }

    fn project_of(&self, task_id: Uuid) -> Result<Project> {
        let project_id = self
            .service
            .db()
            .get_task_project_id(task_id)?
            .ok_or(RoadmapError::not_found(EntityKind::Task, task_id))?;
        self.service.get_project(project_id)
    }
}

/// One line per commit: `- {message} (by {author} on {date})`.
pub fn format_commit_messages(commits: &[Commit]) -> String {
    if commits.is_empty() {
        return "No recent commits".to_string();
    }
    commits
        .iter()
        .map(|c| {
            format!(
                "- {} (by {} on {})",
                c.message.lines().next().unwrap_or_default().trim(),
                c.author,
                c.date.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per distinct changed file, in first-seen order.
pub fn format_file_changes(commits: &[Commit]) -> String {
    let mut seen = std::collections::HashSet::new();
    let lines: Vec<String> = commits
        .iter()
        .flat_map(|c| c.files_changed.iter())
        .filter(|f| seen.insert(*f))
        .map(|f| format!("- {}", f))
        .collect();

    if lines.is_empty() {
        "No files changed".to_string()
    } else {
        lines.join("\n")
    }
}

/// Clamp confidence into `[0, 1]` and keep at most five relevant commits.
pub fn normalize_analysis(mut analysis: ProgressAnalysis) -> Result<ProgressAnalysis> {
    if analysis.confidence.is_nan() {
        return Err(RoadmapError::Generation(
            "analyzer returned a NaN confidence".to_string(),
        ));
    }
    analysis.confidence = analysis.confidence.clamp(0.0, 1.0);
    analysis.relevant_commits.truncate(MAX_RELEVANT_COMMITS);
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn commit(message: &str, files: &[&str]) -> Commit {
        Commit {
            sha: "abc".to_string(),
            message: message.to_string(),
            author: "Dana".to_string(),
            date: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            files_changed: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn analysis(confidence: f64) -> ProgressAnalysis {
        ProgressAnalysis {
            confidence,
            suggested_completion: true,
            reasoning: "looks done".to_string(),
            relevant_commits: Vec::new(),
        }
    }

    #[test]
    fn formats_commit_lines() {
        let commits = vec![
            commit("Add login form\n\nlong body", &[]),
            commit("Wire OAuth", &[]),
        ];
        assert_eq!(
            format_commit_messages(&commits),
            "- Add login form (by Dana on 2024-05-01T10:00:00Z)\n\
             - Wire OAuth (by Dana on 2024-05-01T10:00:00Z)"
        );
    }

    #[test]
    fn empty_evidence_has_placeholders() {
        assert_eq!(format_commit_messages(&[]), "No recent commits");
        assert_eq!(format_file_changes(&[]), "No files changed");
        assert_eq!(
            format_file_changes(&[commit("docs", &[])]),
            "No files changed"
        );
    }

    #[test]
    fn file_changes_are_deduplicated() {
        let commits = vec![
            commit("a", &["src/login.rs", "src/lib.rs"]),
            commit("b", &["src/login.rs", "tests/login.rs"]),
        ];
        assert_eq!(
            format_file_changes(&commits),
            "- src/login.rs\n- src/lib.rs\n- tests/login.rs"
        );
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(normalize_analysis(analysis(1.4)).unwrap().confidence, 1.0);
        assert_eq!(normalize_analysis(analysis(-0.2)).unwrap().confidence, 0.0);
        assert!(matches!(
            normalize_analysis(analysis(f64::NAN)),
            Err(RoadmapError::Generation(_))
        ));
    }

    #[test]
    fn relevant_commits_are_truncated() {
        let mut a = analysis(0.9);
        a.relevant_commits = (0..8).map(|i| format!("commit {}", i)).collect();
        let a = normalize_analysis(a).unwrap();
        assert_eq!(a.relevant_commits.len(), MAX_RELEVANT_COMMITS);
        assert_eq!(a.relevant_commits[0], "commit 0");
    }
}
