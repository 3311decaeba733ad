//! Manifest validation
//!
//! `validate_manifest` reports problems that make a manifest unusable;
//! `lint_manifest` reports suspicious but runnable configurations.

use std::collections::{HashMap, HashSet};

use crate::manifest::{Manifest, ManifestError, TaskKind, Workflow, WorkflowMode};

/// All structural errors, in manifest order
pub fn validate_manifest(manifest: &Manifest) -> Vec<ManifestError> {
    let mut errors = Vec::new();
    let workflows = &manifest.workflows.workflow;

    let mut names = HashSet::new();
    for workflow in workflows {
        if !names.insert(workflow.name.as_str()) {
            errors.push(ManifestError::DuplicateWorkflow(workflow.name.clone()));
        }
    }

    let mut edges: HashMap<&str, Vec<String>> = HashMap::new();
    for workflow in workflows {
        for task in &workflow.tasks {
            match task.kind(&workflow.name) {
                Ok(TaskKind::RunWorkflow(target)) => {
                    if !names.contains(target.as_str()) {
                        errors.push(ManifestError::UnknownTarget {
                            workflow: workflow.name.clone(),
                            target: target.clone(),
                        });
                    }
                    edges.entry(workflow.name.as_str()).or_default().push(target);
                }
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
    }

    if let Some(cycle) = find_cycle(workflows, &edges) {
        errors.push(ManifestError::Cycle(cycle));
    }

    if let Some(run_button) = &manifest.workflows.run_button {
        if !names.contains(run_button.as_str()) {
            errors.push(ManifestError::UnknownRunButton(run_button.clone()));
        }
    }

    if let Some(deployment) = &manifest.deployment {
        if deployment.run.iter().all(|part| part.trim().is_empty()) {
            errors.push(ManifestError::EmptyDeployment);
        }
    }

    errors
}

/// First cycle of `workflow.run` references, as a path that ends where it started
fn find_cycle(workflows: &[Workflow], edges: &HashMap<&str, Vec<String>>) -> Option<Vec<String>> {
    fn visit(
        name: &str,
        edges: &HashMap<&str, Vec<String>>,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if done.contains(name) {
            return None;
        }
        path.push(name.to_string());
        for target in edges.get(name).into_iter().flatten() {
            if let Some(cycle) = visit(target, edges, path, done) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(name.to_string());
        None
    }

    let mut done = HashSet::new();
    workflows
        .iter()
        .find_map(|w| visit(&w.name, edges, &mut Vec::new(), &mut done))
}

fn reachable_from<'a>(manifest: &'a Manifest, entry: &'a str) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    let mut pending = vec![entry];
    while let Some(name) = pending.pop() {
        if !seen.insert(name) {
            continue;
        }
        let Some(workflow) = manifest.workflow(name) else {
            continue;
        };
        for task in &workflow.tasks {
            if task.task == crate::manifest::TASK_RUN_WORKFLOW {
                if let Some(target) = task.args.as_deref() {
                    pending.push(target.trim());
                }
            }
        }
    }
    seen
}

/// Warnings for manifests that validate but probably do not do what was intended
pub fn lint_manifest(manifest: &Manifest) -> Vec<String> {
    let mut warnings = Vec::new();
    let workflows = &manifest.workflows.workflow;

    if workflows.is_empty() {
        warnings.push("Manifest defines no workflows".to_string());
    }
    if manifest.workflows.run_button.is_none() && !workflows.is_empty() {
        warnings.push("No runButton workflow set".to_string());
    }
    if manifest.deployment.is_none() {
        warnings.push("No deployment run command".to_string());
    }
    if manifest.modules.is_empty() {
        warnings.push("No runtime modules listed".to_string());
    }

    for workflow in workflows {
        if workflow.tasks.is_empty() {
            warnings.push(format!("{}: Workflow has no tasks", workflow.name));
        }
        if workflow.author.is_empty() {
            warnings.push(format!("{}: No author set", workflow.name));
        }
        if workflow.mode == WorkflowMode::Parallel && workflow.tasks.len() > 1 {
            let installs = workflow
                .tasks
                .iter()
                .filter(|t| matches!(t.kind(&workflow.name), Ok(TaskKind::InstallForAll)))
                .count();
            if installs > 0 {
                warnings.push(format!(
                    "{}: Package install runs in parallel with other tasks",
                    workflow.name
                ));
            }
        }
    }

    if let Some(entry) = manifest.workflows.run_button.as_deref() {
        let reachable = reachable_from(manifest, entry);
        for workflow in workflows {
            if !reachable.contains(workflow.name.as_str()) {
                warnings.push(format!("{}: Not reachable from the run button", workflow.name));
            }
        }
    }

    warnings
}
