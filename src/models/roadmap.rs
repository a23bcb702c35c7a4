use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named grouping of tasks and nested modules, as stored.
///
/// `parent_module_id` is a lookup-only back-reference: `None` marks a
/// top-level module. Completion is never stored; it is derived from the
/// tasks underneath (see [`crate::roadmap::RoadmapTree`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Module {
    pub id: Uuid,
    pub project_id: Uuid,
    pub parent_module_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    /// Order among siblings.
    pub position: i64,
}

/// An atomic unit of work owned by exactly one module.
///
/// `completed` only ever moves from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub module_id: Uuid,
    pub description: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Order within the owning module.
    pub position: i64,
}

/// One module of the generator's output, before ids are assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedModule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub sub_modules: Vec<GeneratedModule>,
}

/// Task counts under a module or a whole roadmap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
}

impl Progress {
    pub fn add(self, other: Progress) -> Progress {
        Progress {
            total_tasks: self.total_tasks + other.total_tasks,
            completed_tasks: self.completed_tasks + other.completed_tasks,
        }
    }
}

/// A module with freshly derived completion and its nested children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleStatus {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_module_id: Option<Uuid>,
    pub completed: bool,
    pub progress: Progress,
    pub tasks: Vec<Task>,
    pub sub_modules: Vec<ModuleStatus>,
}

/// Snapshot of a project's roadmap with derived completion flags.
///
/// `completed` is true once a roadmap has been generated and every
/// top-level module is completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoadmapStatus {
    pub project_id: Uuid,
    pub title: String,
    pub generated: bool,
    pub completed: bool,
    pub progress: Progress,
    pub modules: Vec<ModuleStatus>,
}

/// Input for generating a roadmap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRoadmapInput {
    /// Replace an existing roadmap that has no modules.
    #[serde(default)]
    pub regenerate: bool,
}

/// Derived state of one module after a task mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleProgress {
    pub id: Uuid,
    pub completed: bool,
    pub progress: Progress,
}

/// Result of completing a task.
///
/// Carries the re-derived ancestor chain (nearest module first) and the
/// roadmap flag so callers do not need to re-fetch the whole status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskCompletion {
    pub task: Task,
    /// True when the task was already completed and nothing changed.
    pub already_completed: bool,
    pub ancestors: Vec<ModuleProgress>,
    pub roadmap_completed: bool,
}
