//! Workflow and deployment manifest
//!
//! A TOML file describing the runtime modules, the package channel, named workflows
//! made of tasks, and the command used to deploy the application:
//!
//! ```toml
//! modules = ["python-3.11"]
//!
//! [nix]
//! channel = "stable-24_05"
//!
//! [workflows]
//! runButton = "Project"
//!
//! [[workflows.workflow]]
//! name = "Project"
//! mode = "parallel"
//! author = "agent"
//!
//! [[workflows.workflow.tasks]]
//! task = "workflow.run"
//! args = "API Tester Application"
//!
//! [deployment]
//! run = ["sh", "-c", "python main.py"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MANIFEST_FILE: &str = "manifest.toml";

pub const TASK_RUN_WORKFLOW: &str = "workflow.run";
pub const TASK_SHELL_EXEC: &str = "shell.exec";
pub const TASK_INSTALL_FOR_ALL: &str = "packager.installForAll";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Workflow not found: {0}")]
    UnknownWorkflow(String),

    #[error("Duplicate workflow name: {0}")]
    DuplicateWorkflow(String),

    #[error("Workflow '{workflow}' has unknown task type: {task}")]
    UnknownTaskType { workflow: String, task: String },

    #[error("Workflow '{workflow}' task {task} requires an argument")]
    MissingArgument { workflow: String, task: String },

    #[error("Workflow '{workflow}' runs unknown workflow '{target}'")]
    UnknownTarget { workflow: String, target: String },

    #[error("Workflow cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Run button references unknown workflow: {0}")]
    UnknownRunButton(String),

    #[error("Deployment run command is empty")]
    EmptyDeployment,
}

/// How the tasks of one workflow are scheduled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowMode {
    Parallel,
    #[default]
    Sequential,
}

impl std::fmt::Display for WorkflowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowMode::Parallel => write!(f, "parallel"),
            WorkflowMode::Sequential => write!(f, "sequential"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nix: Option<NixConfig>,
    #[serde(default)]
    pub workflows: Workflows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NixConfig {
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Workflows {
    #[serde(rename = "runButton", default, skip_serializing_if = "Option::is_none")]
    pub run_button: Option<String>,
    #[serde(default)]
    pub workflow: Vec<Workflow>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub mode: WorkflowMode,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A task entry as written in the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

/// A task with its type resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    RunWorkflow(String),
    ShellExec(String),
    InstallForAll,
}

impl Task {
    fn argument(&self) -> Option<&str> {
        self.args.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    /// Resolve the task type; `workflow` names the owner for error messages
    pub fn kind(&self, workflow: &str) -> Result<TaskKind, ManifestError> {
        let missing = || ManifestError::MissingArgument {
            workflow: workflow.to_string(),
            task: self.task.clone(),
        };
        match self.task.as_str() {
            TASK_RUN_WORKFLOW => Ok(TaskKind::RunWorkflow(
                self.argument().ok_or_else(missing)?.to_string(),
            )),
            TASK_SHELL_EXEC => Ok(TaskKind::ShellExec(
                self.argument().ok_or_else(missing)?.to_string(),
            )),
            TASK_INSTALL_FOR_ALL => Ok(TaskKind::InstallForAll),
            other => Err(ManifestError::UnknownTaskType {
                workflow: workflow.to_string(),
                task: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::RunWorkflow(name) => write!(f, "{} {}", TASK_RUN_WORKFLOW, name),
            TaskKind::ShellExec(command) => write!(f, "{} {}", TASK_SHELL_EXEC, command),
            TaskKind::InstallForAll => write!(f, "{}", TASK_INSTALL_FOR_ALL),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    #[serde(default)]
    pub run: Vec<String>,
    #[serde(
        rename = "deploymentTarget",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deployment_target: Option<String>,
}

impl Deployment {
    /// Program and arguments to execute
    pub fn command(&self) -> Option<(&str, &[String])> {
        self.run
            .split_first()
            .map(|(program, args)| (program.as_str(), args))
    }

    /// The shell script when the command is `sh -c <script>` or `bash -c <script>`
    pub fn script(&self) -> Option<&str> {
        match self.run.as_slice() {
            [shell, flag, script] if is_shell(shell) && flag == "-c" => Some(script.as_str()),
            _ => None,
        }
    }

    /// Commands in execution order; `&&`-chained scripts are split into their parts
    pub fn steps(&self) -> Vec<String> {
        match self.script() {
            Some(script) => script
                .split("&&")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None if self.run.is_empty() => Vec::new(),
            None => vec![self.run.join(" ")],
        }
    }
}

fn is_shell(program: &str) -> bool {
    matches!(
        Path::new(program).file_name().and_then(|n| n.to_str()),
        Some("sh" | "bash" | "zsh")
    )
}

/// One leaf step of an expanded workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Workflow that owns the task
    pub workflow: String,
    /// Nesting level below the planned workflow
    pub depth: usize,
    pub mode: WorkflowMode,
    pub kind: TaskKind,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let manifest = Self::from_toml(&content)?;
        tracing::debug!(
            path = %path.display(),
            workflows = manifest.workflows.workflow.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    pub fn from_toml(content: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check the manifest; returns the first problem found
    pub fn validate(&self) -> Result<(), ManifestError> {
        match crate::validation::validate_manifest(self).into_iter().next() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.workflow.iter().find(|w| w.name == name)
    }

    /// The workflow started by the run button
    pub fn entry_workflow(&self) -> Option<&Workflow> {
        self.workflows
            .run_button
            .as_deref()
            .and_then(|name| self.workflow(name))
    }

    /// Expand `name` into its leaf steps; nested workflows are expanded in place
    pub fn plan(&self, name: &str) -> Result<Vec<PlanStep>, ManifestError> {
        let mut steps = Vec::new();
        let mut stack = Vec::new();
        self.expand(name, 0, &mut stack, &mut steps)?;
        Ok(steps)
    }

    fn expand(
        &self,
        name: &str,
        depth: usize,
        stack: &mut Vec<String>,
        steps: &mut Vec<PlanStep>,
    ) -> Result<(), ManifestError> {
        if stack.iter().any(|n| n == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(ManifestError::Cycle(cycle));
        }
        let workflow = self
            .workflow(name)
            .ok_or_else(|| ManifestError::UnknownWorkflow(name.to_string()))?;

        stack.push(name.to_string());
        for task in &workflow.tasks {
            match task.kind(name)? {
                TaskKind::RunWorkflow(target) => self.expand(&target, depth + 1, stack, steps)?,
                kind => steps.push(PlanStep {
                    workflow: name.to_string(),
                    depth,
                    mode: workflow.mode,
                    kind,
                }),
            }
        }
        stack.pop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
modules = ["python-3.11"]

[nix]
channel = "stable-24_05"

[workflows]
runButton = "Project"

[[workflows.workflow]]
name = "Project"
mode = "parallel"
author = "agent"

[[workflows.workflow.tasks]]
task = "workflow.run"
args = "App"

[[workflows.workflow]]
name = "App"
author = "agent"

[[workflows.workflow.tasks]]
task = "packager.installForAll"

[[workflows.workflow.tasks]]
task = "shell.exec"
args = "python main.py"

[deployment]
run = ["sh", "-c", "pip install requests && python main.py"]
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        assert_eq!(manifest.modules, vec!["python-3.11"]);
        assert_eq!(manifest.nix.as_ref().unwrap().channel, "stable-24_05");
        assert_eq!(manifest.entry_workflow().unwrap().name, "Project");
        assert_eq!(manifest.workflow("Project").unwrap().mode, WorkflowMode::Parallel);
        assert_eq!(manifest.workflow("App").unwrap().mode, WorkflowMode::Sequential);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_task_kinds() {
        let task = Task {
            task: "shell.exec".into(),
            args: Some("  ".into()),
        };
        assert!(matches!(task.kind("w"), Err(ManifestError::MissingArgument { .. })));

        let task = Task {
            task: "deploy.now".into(),
            args: None,
        };
        assert!(matches!(task.kind("w"), Err(ManifestError::UnknownTaskType { .. })));
    }

    #[test]
    fn test_plan_expands_nested_workflows() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        let plan = manifest.plan("Project").unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].kind, TaskKind::InstallForAll);
        assert_eq!(plan[1].kind, TaskKind::ShellExec("python main.py".into()));
        assert_eq!(plan[1].workflow, "App");
        assert_eq!(plan[1].depth, 1);
    }

    #[test]
    fn test_plan_reports_cycles() {
        let mut manifest = Manifest::from_toml(SAMPLE).unwrap();
        manifest.workflows.workflow[1].tasks.push(Task {
            task: TASK_RUN_WORKFLOW.into(),
            args: Some("Project".into()),
        });
        match manifest.plan("Project") {
            Err(ManifestError::Cycle(path)) => assert_eq!(path, vec!["Project", "App", "Project"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_deployment_steps() {
        let manifest = Manifest::from_toml(SAMPLE).unwrap();
        let deployment = manifest.deployment.unwrap();
        let (program, args) = deployment.command().unwrap();
        assert_eq!(program, "sh");
        assert_eq!(args.len(), 2);
        assert_eq!(deployment.steps(), vec!["pip install requests", "python main.py"]);

        let direct = Deployment {
            run: vec!["python".into(), "main.py".into()],
            deployment_target: None,
        };
        assert_eq!(direct.script(), None);
        assert_eq!(direct.steps(), vec!["python main.py"]);
    }
}
