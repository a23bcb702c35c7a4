//! ASCII tree rendering for roadmap status.

use crate::models::{ModuleStatus, Progress, RoadmapStatus, Task};

const MODULE_DONE: char = '●';
const MODULE_OPEN: char = '○';
const TASK_DONE: char = '✓';
const TASK_OPEN: char = '·';

enum Entry<'a> {
    Task(&'a Task),
    Module(&'a ModuleStatus),
}

fn counts(progress: Progress) -> String {
    format!("({}/{})", progress.completed_tasks, progress.total_tasks)
}

/// Render a roadmap as ASCII art with completion markers.
///
/// Example output:
/// ```text
/// Recipe App (1/3)
/// ├── ● Setup (1/1)
/// │   └── ✓ Create repository
/// └── ○ Search (0/2)
///     ├── · Index recipes
///     └── ○ Filters (0/1)
///         └── · Filter by cuisine
/// ```
pub fn render_status(status: &RoadmapStatus) -> String {
    let mut output = format!("{} {}", status.title, counts(status.progress));
    if status.completed {
        output.push_str(" - complete");
    }
    output.push('\n');

    if !status.generated {
        output.push_str("(no roadmap generated)\n");
        return output;
    }

    for (i, module) in status.modules.iter().enumerate() {
        let is_last = i == status.modules.len() - 1;
        render_entry(&mut output, Entry::Module(module), "", is_last);
    }
    output
}

fn render_entry(output: &mut String, entry: Entry<'_>, prefix: &str, is_last: bool) {
    let branch = if is_last { "└── " } else { "├── " };
    output.push_str(prefix);
    output.push_str(branch);

    match entry {
        Entry::Task(task) => {
            output.push(if task.completed { TASK_DONE } else { TASK_OPEN });
            output.push(' ');
            output.push_str(&task.description);
            output.push('\n');
        }
        Entry::Module(module) => {
            output.push(if module.completed {
                MODULE_DONE
            } else {
                MODULE_OPEN
            });
            output.push(' ');
            output.push_str(&module.name);
            output.push(' ');
            output.push_str(&counts(module.progress));
            output.push('\n');

            let continuation = if is_last { "    " } else { "│   " };
            let child_prefix = format!("{}{}", prefix, continuation);

            // Tasks first, then nested modules
            let children: Vec<Entry<'_>> = module
                .tasks
                .iter()
                .map(Entry::Task)
                .chain(module.sub_modules.iter().map(Entry::Module))
                .collect();
            let count = children.len();
            for (i, child) in children.into_iter().enumerate() {
                render_entry(output, child, &child_prefix, i == count - 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn task(description: &str, completed: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            module_id: Uuid::nil(),
            description: description.to_string(),
            completed,
            completed_at: None,
            position: 0,
        }
    }

    fn module(name: &str, tasks: Vec<Task>, sub_modules: Vec<ModuleStatus>) -> ModuleStatus {
        let own = Progress {
            total_tasks: tasks.len(),
            completed_tasks: tasks.iter().filter(|t| t.completed).count(),
        };
        let progress = sub_modules.iter().fold(own, |acc, s| acc.add(s.progress));
        let completed = tasks.iter().all(|t| t.completed) && sub_modules.iter().all(|s| s.completed);
        ModuleStatus {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            parent_module_id: None,
            completed,
            progress,
            tasks,
            sub_modules,
        }
    }

    fn status(modules: Vec<ModuleStatus>, generated: bool) -> RoadmapStatus {
        let progress = modules
            .iter()
            .fold(Progress::default(), |acc, m| acc.add(m.progress));
        RoadmapStatus {
            project_id: Uuid::nil(),
            title: "Recipe App".to_string(),
            generated,
            completed: generated && modules.iter().all(|m| m.completed),
            progress,
            modules,
        }
    }

    #[test]
    fn test_not_generated() {
        let output = render_status(&status(vec![], false));
        assert_eq!(output, "Recipe App (0/0)\n(no roadmap generated)\n");
    }

    #[test]
    fn test_nested_modules() {
        let tree = status(
            vec![
                module("Setup", vec![task("Create repository", true)], vec![]),
                module(
                    "Search",
                    vec![task("Index recipes", false)],
                    vec![module("Filters", vec![task("Filter by cuisine", false)], vec![])],
                ),
            ],
            true,
        );
        let expected = "Recipe App (1/3)\n\
                        ├── ● Setup (1/1)\n\
                        │   └── ✓ Create repository\n\
                        └── ○ Search (0/2)\n    \
                        ├── · Index recipes\n    \
                        └── ○ Filters (0/1)\n        \
                        └── · Filter by cuisine\n";
        assert_eq!(render_status(&tree), expected);
    }

    #[test]
    fn test_completed_roadmap_is_marked() {
        let tree = status(vec![module("Setup", vec![task("Init", true)], vec![])], true);
        assert!(render_status(&tree).starts_with("Recipe App (1/1) - complete\n"));
    }
}
