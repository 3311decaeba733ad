//! `history` subcommands

use anyhow::{Context, Result};

use super::{send_prepared, truncate, OutputFormat, Workspace};
use crate::config::AppPaths;
use crate::curl::to_curl;
use crate::models::{format_timestamp, HistoryEntry, HistoryFilter, HttpMethod};

pub fn list(
    paths: &AppPaths,
    query: Option<&str>,
    method: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let method = method
        .map(|m| m.parse::<HttpMethod>())
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let filter = HistoryFilter {
        query: query.map(str::to_string),
        method,
        limit: Some(limit),
    };
    let entries = ws.db.search_history(&filter)?;

    if let OutputFormat::Json = format {
        let rows: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "timestamp": e.timestamp,
                    "request": e.request,
                    "response": e.response,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history entries found.");
        return Ok(());
    }

    println!(
        "{:<6} {:<20} {:<8} {:<7} {:<10} {}",
        "ID", "TIME", "METHOD", "STATUS", "DURATION", "URL"
    );
    println!("{}", "-".repeat(100));
    for entry in &entries {
        println!(
            "{:<6} {:<20} {:<8} {:<7} {:<10} {}",
            entry.id,
            truncate(&format_timestamp(entry.timestamp), 19),
            entry.request.method,
            entry.response.status_code,
            entry.response.formatted_time(),
            truncate(&entry.request.url, 50)
        );
    }
    println!();
    println!("{} entries", entries.len());
    Ok(())
}

fn load(ws: &Workspace, id: i64) -> Result<HistoryEntry> {
    ws.db
        .get_history_item(id)?
        .with_context(|| format!("History entry not found: {}", id))
}

pub fn show(paths: &AppPaths, id: i64, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let entry = load(&ws, id)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
        OutputFormat::Summary => {
            let request = &entry.request;
            let response = &entry.response;
            println!("History entry: {}", entry.id);
            println!("{}", "=".repeat(50));
            println!("Time:     {}", format_timestamp(entry.timestamp));
            println!("Request:  {} {}", request.method, request.url);
            if !request.params.is_empty() {
                println!("Params:");
                for (k, v) in &request.params {
                    println!("  {} = {}", k, v);
                }
            }
            if !request.headers.is_empty() {
                println!("Headers:");
                for (k, v) in &request.headers {
                    println!("  {}: {}", k, v);
                }
            }
            if request.auth_type != crate::models::AuthType::None {
                println!("Auth:     {}", request.auth_type);
            }
            if !request.body.is_empty() {
                println!("Body ({}):", request.body_type);
                println!("{}", request.body);
            }
            println!();
            println!(
                "Response: {}  ({}, {})",
                response.status_line(),
                response.formatted_time(),
                response.formatted_size()
            );
            let body = ws.formatter().safe_format(&response.body, None);
            if !body.is_empty() {
                println!("{}", body);
            }
        }
    }
    Ok(())
}

pub fn delete(paths: &AppPaths, id: i64) -> Result<()> {
    let ws = Workspace::open(paths)?;
    if ws.db.delete_history_item(id)? {
        println!("✓ Deleted history entry {}", id);
    } else {
        println!("History entry not found: {}", id);
    }
    Ok(())
}

pub fn clear(paths: &AppPaths) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let removed = ws.db.clear_history()?;
    println!("✓ Cleared {} history entries", removed);
    Ok(())
}

pub fn curl(paths: &AppPaths, id: i64) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let entry = load(&ws, id)?;
    println!("{}", to_curl(&entry.request));
    Ok(())
}

/// Send a recorded request again
pub async fn resend(paths: &AppPaths, id: i64, env: Option<&str>, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let entry = load(&ws, id)?;
    send_prepared(&ws, &entry.request, env, true, false, format).await
}
