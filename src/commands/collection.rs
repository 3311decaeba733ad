//! `collection` subcommands

use anyhow::{bail, Context, Result};
use std::path::Path;

use super::{send_prepared, truncate, OutputFormat, Workspace};
use crate::collections::CollectionManager;
use crate::config::AppPaths;
use crate::models::{format_timestamp, ApiRequest, RequestCollection, TreeNode};

fn resolve(manager: &CollectionManager<'_>, id_or_name: &str) -> Result<RequestCollection> {
    manager
        .resolve(id_or_name)?
        .with_context(|| format!("Collection not found: {}", id_or_name))
}

/// Resolve an item by id, or by name when the name is unique in the collection
fn resolve_item(collection: &RequestCollection, id_or_name: &str) -> Result<String> {
    if collection.get_item(id_or_name).is_some() {
        return Ok(id_or_name.to_string());
    }
    let matches: Vec<_> = collection
        .items
        .iter()
        .filter(|item| item.name == id_or_name)
        .collect();
    match matches.as_slice() {
        [item] => Ok(item.id.clone()),
        [] => bail!("Item not found in {}: {}", collection.name, id_or_name),
        _ => bail!("Item name '{}' is ambiguous; use its id", id_or_name),
    }
}

fn resolve_parent(collection: &RequestCollection, parent: Option<&str>) -> Result<Option<String>> {
    parent.map(|p| resolve_item(collection, p)).transpose()
}

pub fn list(paths: &AppPaths, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let collections = manager.list_collections()?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&collections)?);
        return Ok(());
    }

    println!("{:<38} {:<28} {:<8} {:<20}", "ID", "NAME", "ITEMS", "MODIFIED");
    println!("{}", "-".repeat(96));
    for collection in collections {
        println!(
            "{:<38} {:<28} {:<8} {:<20}",
            collection.id,
            truncate(&collection.name, 26),
            collection.items.len(),
            format_timestamp(collection.modified_at)
        );
    }
    Ok(())
}

pub fn create(paths: &AppPaths, name: &str, description: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let collection = manager.create_collection(name, description)?;
    println!("✓ Created collection '{}' ({})", collection.name, collection.id);
    Ok(())
}

pub fn delete(paths: &AppPaths, collection: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    manager.delete_collection(&target.id)?;
    println!("✓ Deleted collection '{}'", target.name);
    Ok(())
}

pub fn rename(paths: &AppPaths, collection: &str, new_name: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    manager.rename_collection(&target.id, new_name)?;
    println!("✓ Renamed '{}' to '{}'", target.name, new_name);
    Ok(())
}

pub fn tree(paths: &AppPaths, collection: &str, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let nodes = target.tree();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&nodes)?),
        OutputFormat::Summary => {
            println!("{}", target.name);
            if !target.description.is_empty() {
                println!("  {}", target.description);
            }
            print_nodes(&nodes, "");
        }
    }
    Ok(())
}

fn print_nodes(nodes: &[TreeNode], prefix: &str) {
    for (idx, node) in nodes.iter().enumerate() {
        let last = idx + 1 == nodes.len();
        let branch = if last { "└── " } else { "├── " };
        match (&node.method, &node.url) {
            (Some(method), Some(url)) => {
                println!("{}{}{} [{} {}]  {}", prefix, branch, node.name, method, url, short_id(&node.id))
            }
            _ => println!("{}{}{}/  {}", prefix, branch, node.name, short_id(&node.id)),
        }
        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        print_nodes(&node.children, &child_prefix);
    }
}

fn short_id(id: &str) -> String {
    format!("({})", id.chars().take(8).collect::<String>())
}

pub fn add_folder(
    paths: &AppPaths,
    collection: &str,
    name: &str,
    parent: Option<&str>,
    description: &str,
) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let parent = resolve_parent(&target, parent)?;
    let item = manager
        .add_folder(&target.id, name, parent.as_deref(), description)?
        .context("Collection disappeared")?;
    println!("✓ Added folder '{}' ({})", item.name, item.id);
    Ok(())
}

pub fn add_request(
    paths: &AppPaths,
    collection: &str,
    request: ApiRequest,
    name: &str,
    parent: Option<&str>,
) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let parent = resolve_parent(&target, parent)?;
    let item = manager
        .add_request(&target.id, request, parent.as_deref(), name)?
        .context("Collection disappeared")?;
    println!("✓ Added request '{}' ({})", item.name, item.id);
    Ok(())
}

/// Save a history entry as a request in a collection
pub fn add_from_history(
    paths: &AppPaths,
    collection: &str,
    history_id: i64,
    name: &str,
    parent: Option<&str>,
) -> Result<()> {
    let request = {
        let ws = Workspace::open(paths)?;
        ws.db
            .get_history_item(history_id)?
            .with_context(|| format!("History entry not found: {}", history_id))?
            .request
    };
    add_request(paths, collection, request, name, parent)
}

pub fn remove(paths: &AppPaths, collection: &str, item: &str) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let item_id = resolve_item(&target, item)?;
    manager.remove_item(&target.id, &item_id)?;
    println!("✓ Removed {}", item);
    Ok(())
}

pub fn move_item(paths: &AppPaths, collection: &str, item: &str, parent: Option<&str>) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let item_id = resolve_item(&target, item)?;
    let parent = resolve_parent(&target, parent)?;
    manager.move_item(&target.id, &item_id, parent.as_deref())?;
    println!("✓ Moved {} to {}", item, parent.as_deref().unwrap_or("root"));
    Ok(())
}

pub fn update(
    paths: &AppPaths,
    collection: &str,
    item: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let item_id = resolve_item(&target, item)?;
    manager.update_item(&target.id, &item_id, name, description)?;
    println!("✓ Updated {}", item);
    Ok(())
}

pub fn duplicate(paths: &AppPaths, collection: &str, item: &str, new_name: Option<&str>) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let item_id = resolve_item(&target, item)?;
    let copy_id = manager
        .duplicate_item(&target.id, &item_id, new_name)?
        .context("Item disappeared")?;
    println!("✓ Duplicated {} ({})", item, copy_id);
    Ok(())
}

pub fn search(paths: &AppPaths, query: &str, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let hits = manager.search_across_collections(query)?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No matches for '{}'", query);
        return Ok(());
    }
    for hit in &hits {
        match (&hit.method, &hit.url) {
            (Some(method), Some(url)) => println!(
                "{} / {}  [{} {}]",
                hit.collection_name, hit.item_name, method, truncate(url, 60)
            ),
            _ => println!("{} / {}/", hit.collection_name, hit.item_name),
        }
    }
    println!();
    println!("{} match(es)", hits.len());
    Ok(())
}

pub fn stats(paths: &AppPaths, format: OutputFormat) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let stats = manager.collection_stats()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Summary => {
            println!("Collections: {}", stats.total_collections);
            println!("Folders:     {}", stats.total_folders);
            println!("Requests:    {}", stats.total_requests);
            if !stats.method_distribution.is_empty() {
                println!();
                println!("Methods:");
                for (method, count) in &stats.method_distribution {
                    println!("  {:<8} {}", method, count);
                }
            }
        }
    }
    Ok(())
}

pub fn export(paths: &AppPaths, collection: &str, output: Option<&Path>) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let target = resolve(&manager, collection)?;
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => ws
            .paths
            .exports
            .join(format!("{}.json", crate::fsutil::clean_filename(&target.name))),
    };
    manager.export_collection(&target.id, &path)?;
    println!("✓ Exported '{}' to {}", target.name, path.display());
    Ok(())
}

pub fn import(paths: &AppPaths, input: &Path) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let manager = CollectionManager::new(&ws.db)?;
    let collection = manager.import_collection(input)?;
    println!(
        "✓ Imported '{}' with {} item(s) ({})",
        collection.name,
        collection.items.len(),
        collection.id
    );
    Ok(())
}

/// Send a saved request
pub async fn run(
    paths: &AppPaths,
    collection: &str,
    item: &str,
    env: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let request = {
        let manager = CollectionManager::new(&ws.db)?;
        let target = resolve(&manager, collection)?;
        let item_id = resolve_item(&target, item)?;
        target
            .get_item(&item_id)
            .and_then(|item| item.request().cloned())
            .with_context(|| format!("{} is a folder, not a request", item))?
    };
    send_prepared(&ws, &request, env, true, false, format).await
}
