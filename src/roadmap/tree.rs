//! In-memory Module/Task tree for one project.
//!
//! Modules live in an arena; children are arena indices and parents are
//! weak back-links (index plus the stored `parent_module_id`). Two indices
//! give O(1) lookup by module id and by task id. Completion of modules and
//! of the roadmap is derived on every read and never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Module, ModuleProgress, ModuleStatus, Progress, Task, TaskCompletion};

/// Stored rows that cannot form a tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("module {module} references unknown parent {parent}")]
    UnknownParent { module: Uuid, parent: Uuid },

    #[error("task {task} references unknown module {module}")]
    UnknownModule { task: Uuid, module: Uuid },

    #[error("module {0} is not reachable from a top-level module")]
    Unreachable(Uuid),

    #[error("duplicate id {0}")]
    DuplicateId(Uuid),
}

#[derive(Debug, Clone)]
struct ModuleNode {
    module: Module,
    parent: Option<usize>,
    tasks: Vec<Task>,
    children: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RoadmapTree {
    nodes: Vec<ModuleNode>,
    roots: Vec<usize>,
    modules_by_id: HashMap<Uuid, usize>,
    /// task id -> (module arena index, position in that module's task list)
    tasks_by_id: HashMap<Uuid, (usize, usize)>,
}

impl RoadmapTree {
    /// Build a tree from flat rows. Siblings and tasks are ordered by `position`.
    ///
    /// Every module must be reachable from a top-level module, which rules
    /// out cycles in the stored parent references.
    pub fn from_rows(mut modules: Vec<Module>, mut tasks: Vec<Task>) -> Result<Self, TreeError> {
        modules.sort_by_key(|m| m.position);
        tasks.sort_by_key(|t| t.position);

        let mut tree = RoadmapTree::default();
        for module in modules {
            let idx = tree.nodes.len();
            if tree.modules_by_id.insert(module.id, idx).is_some() {
                return Err(TreeError::DuplicateId(module.id));
            }
            tree.nodes.push(ModuleNode {
                module,
                parent: None,
                tasks: Vec::new(),
                children: Vec::new(),
            });
        }

        for idx in 0..tree.nodes.len() {
            match tree.nodes[idx].module.parent_module_id {
                None => tree.roots.push(idx),
                Some(parent_id) => {
                    let parent = *tree.modules_by_id.get(&parent_id).ok_or(
                        TreeError::UnknownParent {
                            module: tree.nodes[idx].module.id,
                            parent: parent_id,
                        },
                    )?;
                    tree.nodes[idx].parent = Some(parent);
                    tree.nodes[parent].children.push(idx);
                }
            }
        }

        let mut reached = vec![false; tree.nodes.len()];
        let mut stack = tree.roots.clone();
        while let Some(idx) = stack.pop() {
            if !std::mem::replace(&mut reached[idx], true) {
                stack.extend(tree.nodes[idx].children.iter().copied());
            }
        }
        if let Some(idx) = reached.iter().position(|r| !r) {
            return Err(TreeError::Unreachable(tree.nodes[idx].module.id));
        }

        for task in tasks {
            let module_idx =
                *tree
                    .modules_by_id
                    .get(&task.module_id)
                    .ok_or(TreeError::UnknownModule {
                        task: task.id,
                        module: task.module_id,
                    })?;
            let slot = tree.nodes[module_idx].tasks.len();
            if tree.tasks_by_id.insert(task.id, (module_idx, slot)).is_some() {
                return Err(TreeError::DuplicateId(task.id));
            }
            tree.nodes[module_idx].tasks.push(task);
        }

        Ok(tree)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks_by_id
            .get(&id)
            .map(|&(module, slot)| &self.nodes[module].tasks[slot])
    }

    pub fn module(&self, id: Uuid) -> Option<&Module> {
        self.modules_by_id.get(&id).map(|&idx| &self.nodes[idx].module)
    }

    /// Derived completion of a module; `None` for unknown ids.
    pub fn is_module_completed(&self, id: Uuid) -> Option<bool> {
        self.modules_by_id
            .get(&id)
            .map(|&idx| self.node_completed(idx))
    }

    /// True when every top-level module is completed (vacuously true for an
    /// empty tree; callers decide what an empty roadmap means).
    pub fn all_completed(&self) -> bool {
        self.roots.iter().all(|&idx| self.node_completed(idx))
    }

    pub fn progress(&self) -> Progress {
        self.roots
            .iter()
            .fold(Progress::default(), |acc, &idx| acc.add(self.node_progress(idx)))
    }

    /// Mark a task completed and re-derive its ancestor chain.
    ///
    /// Returns `None` when the task is not in this tree, leaving the tree
    /// untouched. Completing an already completed task changes nothing and
    /// reports `already_completed`.
    pub fn complete_task(&mut self, id: Uuid, at: DateTime<Utc>) -> Option<TaskCompletion> {
        let &(module_idx, slot) = self.tasks_by_id.get(&id)?;

        let task = &mut self.nodes[module_idx].tasks[slot];
        let already_completed = task.completed;
        if !already_completed {
            task.completed = true;
            task.completed_at = Some(at);
        }
        let task = task.clone();

        let ancestors = self
            .ancestor_chain(module_idx)
            .into_iter()
            .map(|idx| ModuleProgress {
                id: self.nodes[idx].module.id,
                completed: self.node_completed(idx),
                progress: self.node_progress(idx),
            })
            .collect();

        Some(TaskCompletion {
            task,
            already_completed,
            ancestors,
            roadmap_completed: self.all_completed(),
        })
    }

    /// Nested status of every top-level module, in order.
    pub fn snapshot(&self) -> Vec<ModuleStatus> {
        self.roots.iter().map(|&idx| self.node_status(idx)).collect()
    }

    /// The module itself followed by each ancestor up to its top-level module.
    fn ancestor_chain(&self, mut idx: usize) -> Vec<usize> {
        let mut chain = vec![idx];
        while let Some(parent) = self.nodes[idx].parent {
            chain.push(parent);
            idx = parent;
        }
        chain
    }

    fn node_completed(&self, idx: usize) -> bool {
        let node = &self.nodes[idx];
        node.tasks.iter().all(|t| t.completed)
            && node.children.iter().all(|&c| self.node_completed(c))
    }

    fn node_progress(&self, idx: usize) -> Progress {
        let node = &self.nodes[idx];
        let own = Progress {
            total_tasks: node.tasks.len(),
            completed_tasks: node.tasks.iter().filter(|t| t.completed).count(),
        };
        node.children
            .iter()
            .fold(own, |acc, &c| acc.add(self.node_progress(c)))
    }

    fn node_status(&self, idx: usize) -> ModuleStatus {
        let node = &self.nodes[idx];
        let sub_modules: Vec<ModuleStatus> =
            node.children.iter().map(|&c| self.node_status(c)).collect();
        let own = Progress {
            total_tasks: node.tasks.len(),
            completed_tasks: node.tasks.iter().filter(|t| t.completed).count(),
        };
        let progress = sub_modules
            .iter()
            .fold(own, |acc, sub| acc.add(sub.progress));
        let completed =
            node.tasks.iter().all(|t| t.completed) && sub_modules.iter().all(|s| s.completed);

        ModuleStatus {
            id: node.module.id,
            name: node.module.name.clone(),
            description: node.module.description.clone(),
            parent_module_id: node.module.parent_module_id,
            completed,
            progress,
            tasks: node.tasks.clone(),
            sub_modules,
        }
    }
}
