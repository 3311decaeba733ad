// Integration tests for the project manifest shipped at the repository root

use api_tester::manifest::{Manifest, TaskKind, WorkflowMode, DEFAULT_MANIFEST_FILE};
use api_tester::validation::lint_manifest;
use api_tester::workflow::{StepStatus, WorkflowRunner};
use std::path::Path;

fn project_manifest() -> Manifest {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_MANIFEST_FILE);
    Manifest::load(&path).unwrap()
}

#[test]
fn test_manifest_is_valid() {
    let manifest = project_manifest();
    assert!(manifest.validate().is_ok());
    assert_eq!(manifest.modules, vec!["python-3.11"]);
    assert_eq!(manifest.nix.as_ref().unwrap().channel, "stable-24_05");
    assert!(lint_manifest(&manifest).is_empty());
}

#[test]
fn test_deployment_installs_packages_before_running_script() {
    let manifest = project_manifest();
    let deployment = manifest.deployment.as_ref().unwrap();

    let (program, _) = deployment.command().unwrap();
    assert_eq!(program, "sh");

    let steps = deployment.steps();
    let install = steps
        .iter()
        .position(|s| s == "pip install customtkinter requests urllib3")
        .expect("install step");
    let script = steps
        .iter()
        .position(|s| s == "python main.py")
        .expect("script step");
    assert!(install < script);

    for package in ["customtkinter", "requests", "urllib3"] {
        assert!(steps[install].split_whitespace().any(|word| word == package));
    }
}

#[test]
fn test_project_workflow_runs_the_application_workflow() {
    let manifest = project_manifest();
    let project = manifest.entry_workflow().unwrap();
    assert_eq!(project.name, "Project");
    assert_eq!(project.mode, WorkflowMode::Parallel);
    assert_eq!(project.tasks.len(), 1);
    assert_eq!(
        project.tasks[0].kind(&project.name).unwrap(),
        TaskKind::RunWorkflow("API Tester Application".into())
    );

    let plan = manifest.plan("Project").unwrap();
    assert_eq!(plan.len(), 2);
    assert!(plan.iter().all(|step| step.workflow == "API Tester Application"));
    assert_eq!(plan[1].kind, TaskKind::ShellExec("python main.py".into()));
}

#[test]
fn test_manifest_roundtrips_through_toml() {
    let manifest = project_manifest();
    let text = manifest.to_toml().unwrap();
    assert!(text.contains("runButton"));
    assert_eq!(Manifest::from_toml(&text).unwrap(), manifest);
}

#[tokio::test]
async fn test_dry_run_of_project_and_deployment() {
    let runner = WorkflowRunner::new(project_manifest()).dry_run(true);

    let report = runner.run(None).await.unwrap();
    assert_eq!(report.workflow, "Project");
    assert!(report.dry_run);
    assert!(report.success());
    assert_eq!(report.steps.len(), 2);
    assert!(report.steps.iter().all(|s| s.status == StepStatus::Planned));

    let outcome = runner.deploy().await.unwrap();
    assert_eq!(outcome.status, StepStatus::Planned);
    assert!(outcome.task.contains("pip install customtkinter requests urllib3"));
}
