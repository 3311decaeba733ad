//! Workflow runner for manifest workflows
//!
//! Executes the tasks of a workflow:
//! - sequential: tasks run in order, stopping at the first failure
//! - parallel: sibling tasks run concurrently and are all awaited
//! - workflow.run: the target workflow runs with its own mode
//!
//! Shell failures are reported as step outcomes, not as errors.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::manifest::{Manifest, ManifestError, TaskKind, WorkflowMode, TASK_INSTALL_FOR_ALL};

type StepsFuture = Pin<Box<dyn Future<Output = Vec<StepOutcome>> + Send>>;

/// Workflow run error
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Invalid manifest: {0}")]
    InvalidManifest(#[from] ManifestError),

    #[error("No workflow given and no runButton set")]
    NoEntryWorkflow,

    #[error("Manifest has no deployment section")]
    NoDeployment,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Dry run: would have executed
    Planned,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Succeeded => write!(f, "ok"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Planned => write!(f, "planned"),
        }
    }
}

/// Outcome of one leaf task
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepOutcome {
    pub workflow: String,
    pub task: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: f64,
}

impl StepOutcome {
    pub fn failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub dry_run: bool,
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.steps.iter().all(|s| !s.failed())
    }
}

/// Runs manifest workflows on the tokio runtime
#[derive(Clone)]
pub struct WorkflowRunner {
    manifest: Arc<Manifest>,
    dry_run: bool,
    working_dir: Option<PathBuf>,
}

impl WorkflowRunner {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest: Arc::new(manifest),
            dry_run: false,
            working_dir: None,
        }
    }

    /// Report what would run without executing anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Directory shell steps run in
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Run a workflow by name, or the run button workflow when `name` is None
    pub async fn run(&self, name: Option<&str>) -> Result<RunReport, WorkflowError> {
        self.manifest.validate()?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self
                .manifest
                .workflows
                .run_button
                .clone()
                .ok_or(WorkflowError::NoEntryWorkflow)?,
        };
        if self.manifest.workflow(&name).is_none() {
            return Err(ManifestError::UnknownWorkflow(name).into());
        }

        tracing::info!(workflow = %name, dry_run = self.dry_run, "Running workflow");
        let steps = self.clone().run_workflow(name.clone()).await;
        let report = RunReport {
            workflow: name,
            dry_run: self.dry_run,
            steps,
        };
        tracing::info!(
            workflow = %report.workflow,
            steps = report.steps.len(),
            success = report.success(),
            "Workflow finished"
        );
        Ok(report)
    }

    /// Execute the deployment run command
    pub async fn deploy(&self) -> Result<StepOutcome, WorkflowError> {
        let deployment = self
            .manifest
            .deployment
            .as_ref()
            .ok_or(WorkflowError::NoDeployment)?;
        let (program, args) = deployment.command().ok_or(ManifestError::EmptyDeployment)?;

        let label = deployment.run.join(" ");
        tracing::info!(command = %label, dry_run = self.dry_run, "Deploying");
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        Ok(self.exec("deployment", label, command).await)
    }

    fn run_workflow(self, name: String) -> StepsFuture {
        Box::pin(async move {
            let Some(workflow) = self.manifest.workflow(&name).cloned() else {
                return Vec::new();
            };
            tracing::debug!(workflow = %name, mode = %workflow.mode, "Starting workflow");

            let kinds: Vec<TaskKind> = workflow
                .tasks
                .iter()
                .filter_map(|task| task.kind(&name).ok())
                .collect();

            match workflow.mode {
                WorkflowMode::Sequential => {
                    let mut steps = Vec::new();
                    for kind in kinds {
                        let outcomes = self.clone().run_task(name.clone(), kind).await;
                        let failed = outcomes.iter().any(StepOutcome::failed);
                        steps.extend(outcomes);
                        if failed && !self.dry_run {
                            tracing::warn!(workflow = %name, "Stopping after failed step");
                            break;
                        }
                    }
                    steps
                }
                WorkflowMode::Parallel => {
                    let mut set = JoinSet::new();
                    for (idx, kind) in kinds.into_iter().enumerate() {
                        let runner = self.clone();
                        let owner = name.clone();
                        set.spawn(async move { (idx, runner.run_task(owner, kind).await) });
                    }

                    let mut results = Vec::new();
                    while let Some(joined) = set.join_next().await {
                        match joined {
                            Ok(result) => results.push(result),
                            Err(e) => results.push((
                                usize::MAX,
                                vec![StepOutcome {
                                    workflow: name.clone(),
                                    task: "task".to_string(),
                                    status: StepStatus::Failed,
                                    exit_code: None,
                                    error: Some(format!("Task panicked: {}", e)),
                                    duration_ms: 0.0,
                                }],
                            )),
                        }
                    }
                    results.sort_by_key(|(idx, _)| *idx);
                    results.into_iter().flat_map(|(_, steps)| steps).collect()
                }
            }
        })
    }

    fn run_task(self, workflow: String, kind: TaskKind) -> StepsFuture {
        Box::pin(async move {
            match kind {
                TaskKind::RunWorkflow(target) => self.run_workflow(target).await,
                TaskKind::ShellExec(script) => {
                    let mut command = tokio::process::Command::new("sh");
                    command.arg("-c").arg(&script);
                    vec![self.exec(&workflow, format!("shell.exec {}", script), command).await]
                }
                TaskKind::InstallForAll => vec![StepOutcome {
                    workflow,
                    task: TASK_INSTALL_FOR_ALL.to_string(),
                    status: if self.dry_run {
                        StepStatus::Planned
                    } else {
                        StepStatus::Succeeded
                    },
                    exit_code: None,
                    error: None,
                    duration_ms: 0.0,
                }],
            }
        })
    }

    async fn exec(
        &self,
        workflow: &str,
        task: String,
        mut command: tokio::process::Command,
    ) -> StepOutcome {
        let mut outcome = StepOutcome {
            workflow: workflow.to_string(),
            task,
            status: StepStatus::Planned,
            exit_code: None,
            error: None,
            duration_ms: 0.0,
        };
        if self.dry_run {
            return outcome;
        }

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        let start = Instant::now();
        let result = command.status().await;
        outcome.duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(status) => {
                outcome.exit_code = status.code();
                outcome.status = if status.success() {
                    StepStatus::Succeeded
                } else {
                    StepStatus::Failed
                };
            }
            Err(e) => {
                outcome.status = StepStatus::Failed;
                outcome.error = Some(format!("Failed to start: {}", e));
            }
        }
        tracing::debug!(
            workflow = %outcome.workflow,
            task = %outcome.task,
            status = %outcome.status,
            exit_code = ?outcome.exit_code,
            "Step finished"
        );
        outcome
    }
}
