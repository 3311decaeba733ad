//! `manifest` subcommands: inspect and run the project's run configuration

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use super::OutputFormat;
use crate::manifest::{Manifest, TaskKind, DEFAULT_MANIFEST_FILE};
use crate::validation::lint_manifest;
use crate::workflow::{RunReport, StepOutcome, WorkflowRunner};

fn manifest_path(file: Option<&Path>) -> PathBuf {
    file.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_FILE))
}

fn load(file: Option<&Path>) -> Result<(PathBuf, Manifest)> {
    let path = manifest_path(file);
    let manifest = Manifest::load(&path)
        .with_context(|| format!("Failed to load manifest {}", path.display()))?;
    Ok((path, manifest))
}

/// Directory the manifest's shell steps run in
fn project_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn show(file: Option<&Path>) -> Result<()> {
    let (path, manifest) = load(file)?;

    println!("Manifest: {}", path.display());
    println!("{}", "=".repeat(50));
    if !manifest.modules.is_empty() {
        println!("Modules:    {}", manifest.modules.join(", "));
    }
    if let Some(nix) = &manifest.nix {
        println!("Channel:    {}", nix.channel);
    }
    if let Some(run_button) = &manifest.workflows.run_button {
        println!("Run button: {}", run_button);
    }

    println!();
    println!("Workflows:");
    for workflow in &manifest.workflows.workflow {
        let author = if workflow.author.is_empty() {
            String::new()
        } else {
            format!(", by {}", workflow.author)
        };
        println!("  {} ({}{})", workflow.name, workflow.mode, author);
        for task in &workflow.tasks {
            match task.kind(&workflow.name) {
                Ok(kind) => println!("    - {}", kind),
                Err(error) => println!("    ! {}", error),
            }
        }
    }

    if let Some(deployment) = &manifest.deployment {
        println!();
        println!("Deployment:");
        if let Some(target) = &deployment.deployment_target {
            println!("  Target: {}", target);
        }
        for (idx, step) in deployment.steps().iter().enumerate() {
            println!("  {}. {}", idx + 1, step);
        }
    }
    Ok(())
}

/// Report errors and lint warnings; fails when the manifest has errors
pub fn validate(file: Option<&Path>) -> Result<()> {
    let (path, manifest) = load(file)?;
    let errors = crate::validation::validate_manifest(&manifest);
    let warnings = lint_manifest(&manifest);

    for error in &errors {
        println!("error: {}", error);
    }
    for warning in &warnings {
        println!("warning: {}", warning);
    }

    if !errors.is_empty() {
        bail!("{} has {} error(s)", path.display(), errors.len());
    }
    println!("✓ {} is valid ({} warning(s))", path.display(), warnings.len());
    Ok(())
}

/// Print the expanded steps of a workflow
pub fn plan(file: Option<&Path>, name: Option<&str>) -> Result<()> {
    let (_, manifest) = load(file)?;
    let name = match name {
        Some(name) => name.to_string(),
        None => manifest
            .workflows
            .run_button
            .clone()
            .context("No workflow given and the manifest has no runButton")?,
    };
    let steps = manifest.plan(&name)?;

    println!("Plan for {}", name);
    println!("{}", "=".repeat(50));
    for (idx, step) in steps.iter().enumerate() {
        let indent = "  ".repeat(step.depth);
        let what = match &step.kind {
            TaskKind::ShellExec(command) => format!("$ {}", command),
            kind => kind.to_string(),
        };
        println!("{:>3}. {}[{} / {}] {}", idx + 1, indent, step.workflow, step.mode, what);
    }
    Ok(())
}

pub async fn run(
    file: Option<&Path>,
    name: Option<&str>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let (path, manifest) = load(file)?;
    let runner = WorkflowRunner::new(manifest)
        .dry_run(dry_run)
        .working_dir(project_dir(&path));
    let report = runner.run(name).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Summary => print_report(&report),
    }

    if !report.success() {
        bail!("Workflow '{}' failed", report.workflow);
    }
    Ok(())
}

pub async fn deploy(file: Option<&Path>, dry_run: bool, format: OutputFormat) -> Result<()> {
    let (path, manifest) = load(file)?;
    let runner = WorkflowRunner::new(manifest)
        .dry_run(dry_run)
        .working_dir(project_dir(&path));
    let outcome = runner.deploy().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Summary => print_outcome(&outcome),
    }

    if outcome.failed() {
        bail!("Deployment failed");
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let title = if report.dry_run { "Dry run" } else { "Run" };
    println!("{}: {}", title, report.workflow);
    println!("{}", "=".repeat(50));
    for outcome in &report.steps {
        print_outcome(outcome);
    }
    println!();
    let failed = report.steps.iter().filter(|s| s.failed()).count();
    if failed == 0 {
        println!("✓ {} step(s) completed", report.steps.len());
    } else {
        println!("✗ {} of {} step(s) failed", failed, report.steps.len());
    }
}

fn print_outcome(outcome: &StepOutcome) {
    let mark = if outcome.failed() { "✗" } else { "✓" };
    println!(
        "{} [{}] {} ({}, {:.0}ms)",
        mark, outcome.workflow, outcome.task, outcome.status, outcome.duration_ms
    );
    if let Some(code) = outcome.exit_code.filter(|c| *c != 0) {
        println!("    exit code {}", code);
    }
    if let Some(error) = &outcome.error {
        println!("    {}", error);
    }
}
