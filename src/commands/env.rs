//! `env` subcommands

use anyhow::{bail, Context, Result};

use super::{truncate, OutputFormat, Workspace};
use crate::config::AppPaths;
use crate::models::{format_timestamp, Environment};

fn load(ws: &Workspace, name: &str) -> Result<Environment> {
    ws.db
        .get_environment(name)?
        .with_context(|| format!("Environment not found: {}", name))
}

pub fn list(paths: &AppPaths, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let environments = ws.db.get_environments()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&environments)?);
        return Ok(());
    }
    if environments.is_empty() {
        println!("No environments found.");
        println!("Create one with: api-tester env create <name>");
        return Ok(());
    }

    println!("{:<3} {:<30} {:<10} {:<20}", "", "NAME", "VARIABLES", "CREATED");
    println!("{}", "-".repeat(65));
    for env in environments {
        println!(
            "{:<3} {:<30} {:<10} {:<20}",
            if env.is_active { "*" } else { "" },
            truncate(&env.name, 28),
            env.variables.len(),
            format_timestamp(env.created_at)
        );
    }
    Ok(())
}

pub fn show(paths: &AppPaths, name: &str, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let env = load(&ws, name)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&env)?),
        OutputFormat::Summary => {
            println!("Environment: {}{}", env.name, if env.is_active { " (active)" } else { "" });
            println!("{}", "=".repeat(50));
            if env.variables.is_empty() {
                println!("No variables.");
            }
            for var in &env.variables {
                let marker = if var.enabled { " " } else { "-" };
                if var.description.is_empty() {
                    println!("{} {} = {}", marker, var.key, var.value);
                } else {
                    println!("{} {} = {}    # {}", marker, var.key, var.value, var.description);
                }
            }
        }
    }
    Ok(())
}

/// Create an environment from `KEY=VALUE` pairs
pub fn create(paths: &AppPaths, name: &str, vars: &[String], activate: bool) -> Result<()> {
    let ws = Workspace::open(paths)?;
    if name.trim().is_empty() {
        bail!("Environment name is required");
    }
    if ws.db.get_environment(name)?.is_some() {
        bail!("Environment already exists: {}", name);
    }

    let mut env = Environment::new(name);
    for pair in vars {
        let (key, value) = parse_pair(pair)?;
        env.set_variable(key, value, None);
    }
    env.is_active = activate;
    ws.db.save_environment(&env)?;

    tracing::info!(%name, "Created environment");
    println!("✓ Created environment '{}' with {} variable(s)", name, env.variables.len());
    Ok(())
}

pub fn set(paths: &AppPaths, name: &str, key: &str, value: &str, description: Option<&str>) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let mut env = load(&ws, name)?;
    env.set_variable(key, value, description);
    ws.db.save_environment(&env)?;
    println!("✓ {}: {} = {}", name, key, value);
    Ok(())
}

pub fn unset(paths: &AppPaths, name: &str, key: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let mut env = load(&ws, name)?;
    if !env.remove_variable(key) {
        bail!("Variable '{}' not found in {}", key, name);
    }
    ws.db.save_environment(&env)?;
    println!("✓ Removed {} from {}", key, name);
    Ok(())
}

pub fn delete(paths: &AppPaths, name: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    if ws.db.delete_environment(name)? {
        println!("✓ Deleted environment '{}'", name);
    } else {
        println!("Environment not found: {}", name);
    }
    Ok(())
}

/// Activate an environment, or deactivate all when `name` is None
pub fn activate(paths: &AppPaths, name: Option<&str>) -> Result<()> {
    let ws = Workspace::open(paths)?;
    match name {
        Some(name) => {
            if !ws.db.set_active_environment(name)? {
                bail!("Environment not found: {}", name);
            }
            println!("✓ Active environment: {}", name);
        }
        None => {
            ws.db.clear_active_environment()?;
            println!("✓ No active environment");
        }
    }
    Ok(())
}

/// Copy an environment under a new name; the copy is never active
pub fn duplicate(paths: &AppPaths, name: &str, new_name: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    if ws.db.get_environment(new_name)?.is_some() {
        bail!("Environment already exists: {}", new_name);
    }
    let source = load(&ws, name)?;
    let copy = Environment {
        name: new_name.to_string(),
        variables: source.variables.clone(),
        ..Environment::default()
    };
    ws.db.save_environment(&copy)?;
    println!("✓ Duplicated '{}' as '{}'", name, new_name);
    Ok(())
}

fn parse_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value)),
        _ => bail!("Invalid variable '{}', expected KEY=VALUE", pair),
    }
}
