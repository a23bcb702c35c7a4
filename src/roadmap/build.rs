//! Materialization of generator output into stored rows.

use uuid::Uuid;

use crate::models::{GeneratedModule, Module, Task};

/// Deepest module nesting accepted from the generator (top level is depth 1).
pub const MAX_MODULE_DEPTH: usize = 16;

/// Flat rows for a freshly generated roadmap.
#[derive(Debug, Clone, Default)]
pub struct MaterializedRoadmap {
    pub modules: Vec<Module>,
    pub tasks: Vec<Task>,
}

/// Check generator output before anything is persisted.
pub fn validate_generated(modules: &[GeneratedModule]) -> Result<(), String> {
    fn check(module: &GeneratedModule, depth: usize) -> Result<(), String> {
        if depth > MAX_MODULE_DEPTH {
            return Err(format!(
                "module tree is deeper than {} levels",
                MAX_MODULE_DEPTH
            ));
        }
        if module.name.trim().is_empty() {
            return Err("module with an empty name".to_string());
        }
        if module.tasks.iter().any(|t| t.trim().is_empty()) {
            return Err(format!("module '{}' has an empty task", module.name));
        }
        module
            .sub_modules
            .iter()
            .try_for_each(|sub| check(sub, depth + 1))
    }

    modules.iter().try_for_each(|m| check(m, 1))
}

/// Assign ids and positions, flattening the generated tree depth-first.
pub fn materialize(project_id: Uuid, generated: &[GeneratedModule]) -> MaterializedRoadmap {
    let mut out = MaterializedRoadmap::default();
    for (position, module) in generated.iter().enumerate() {
        materialize_module(project_id, None, position as i64, module, &mut out);
    }
    out
}

fn materialize_module(
    project_id: Uuid,
    parent_module_id: Option<Uuid>,
    position: i64,
    generated: &GeneratedModule,
    out: &mut MaterializedRoadmap,
) {
    let id = Uuid::new_v4();
    out.modules.push(Module {
        id,
        project_id,
        parent_module_id,
        name: generated.name.trim().to_string(),
        description: generated
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        position,
    });

    for (task_position, description) in generated.tasks.iter().enumerate() {
        out.tasks.push(Task {
            id: Uuid::new_v4(),
            module_id: id,
            description: description.trim().to_string(),
            completed: false,
            completed_at: None,
            position: task_position as i64,
        });
    }

    for (sub_position, sub) in generated.sub_modules.iter().enumerate() {
        materialize_module(project_id, Some(id), sub_position as i64, sub, out);
    }
}
