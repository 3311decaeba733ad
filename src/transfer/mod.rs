//! Export and import of history, environments and collections as JSON bundles

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::db::{Database, HISTORY_LIMIT};
use crate::fsutil;
use crate::models::{Environment, HistoryEntry, RequestCollection};

/// Which sections an export contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferScope {
    #[default]
    All,
    History,
    Environments,
    Collections,
}

impl TransferScope {
    fn includes(self, section: TransferScope) -> bool {
        self == TransferScope::All || self == section
    }
}

impl std::fmt::Display for TransferScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransferScope::All => "all",
            TransferScope::History => "history",
            TransferScope::Environments => "environments",
            TransferScope::Collections => "collections",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TransferScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(TransferScope::All),
            "history" => Ok(TransferScope::History),
            "environments" | "envs" => Ok(TransferScope::Environments),
            "collections" => Ok(TransferScope::Collections),
            _ => Err(format!(
                "Invalid scope: {}. Use: all, history, environments, collections",
                s
            )),
        }
    }
}

/// On-disk bundle; absent sections are left untouched on import
#[derive(Debug, Default, Serialize)]
pub struct ExportBundle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environments: Option<Vec<Environment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<RequestCollection>>,
}

/// Bundle as read from disk, before each entry is checked
#[derive(Debug, Deserialize)]
struct RawBundle {
    history: Option<Vec<serde_json::Value>>,
    environments: Option<Vec<serde_json::Value>>,
    collections: Option<Vec<serde_json::Value>>,
}

/// Counts of what an import wrote
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub history: Option<usize>,
    pub environments: Option<usize>,
    pub collections: Option<usize>,
    pub skipped: usize,
}

/// Write the selected sections to `path`
pub fn export_data(db: &Database, path: &Path, scope: TransferScope) -> Result<()> {
    let mut bundle = ExportBundle::default();
    if scope.includes(TransferScope::History) {
        bundle.history = Some(db.get_history(HISTORY_LIMIT)?);
    }
    if scope.includes(TransferScope::Environments) {
        bundle.environments = Some(db.get_environments()?);
    }
    if scope.includes(TransferScope::Collections) {
        bundle.collections = Some(db.list_collections()?);
    }

    fsutil::safe_write_json(path, &bundle, false)?;
    tracing::info!(path = %path.display(), %scope, "Exported data");
    Ok(())
}

/// Read a bundle and merge it into the database, or replace each present section
/// when `merge` is false
pub fn import_data(db: &Database, path: &Path, merge: bool) -> Result<ImportSummary> {
    let raw: RawBundle = fsutil::safe_read_json(path)?
        .with_context(|| format!("File not found: {}", path.display()))?;
    let mut summary = ImportSummary::default();

    if let Some(values) = raw.history {
        let imported: Vec<HistoryEntry> = decode_entries(values, "history", &mut summary.skipped);
        let history = if merge {
            merge_history(imported, db.get_history(HISTORY_LIMIT)?)
        } else {
            imported
        };
        db.replace_history(&history)?;
        summary.history = Some(history.len().min(HISTORY_LIMIT));
    }

    if let Some(values) = raw.environments {
        let imported: Vec<Environment> =
            decode_entries(values, "environment", &mut summary.skipped);
        let environments = if merge {
            merge_by_name(db.get_environments()?, imported, |e| e.name.clone())
        } else {
            imported
        };
        db.replace_environments(&environments)?;
        summary.environments = Some(environments.len());
    }

    if let Some(values) = raw.collections {
        let imported: Vec<RequestCollection> =
            decode_entries(values, "collection", &mut summary.skipped);
        let mut collections = if merge {
            merge_by_name(db.list_collections()?, imported, |c| c.name.clone())
        } else {
            imported
        };
        let mut ids = HashSet::new();
        for collection in &mut collections {
            if !ids.insert(collection.id.clone()) {
                collection.id = uuid::Uuid::new_v4().to_string();
                ids.insert(collection.id.clone());
            }
        }
        db.replace_collections(&collections)?;
        summary.collections = Some(collections.len());
    }

    tracing::info!(path = %path.display(), merge, ?summary, "Imported data");
    Ok(summary)
}

fn decode_entries<T: DeserializeOwned>(
    values: Vec<serde_json::Value>,
    what: &str,
    skipped: &mut usize,
) -> Vec<T> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping invalid {} entry", what);
                *skipped += 1;
                None
            }
        })
        .collect()
}

/// Imported entries first, duplicates by timestamp dropped, capped
fn merge_history(imported: Vec<HistoryEntry>, existing: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
    let mut seen = HashSet::new();
    imported
        .into_iter()
        .chain(existing)
        .filter(|entry| seen.insert(entry.timestamp.to_bits()))
        .take(HISTORY_LIMIT)
        .collect()
}

/// Merge keeping existing order; imported items replace same-named ones in place
fn merge_by_name<T>(existing: Vec<T>, imported: Vec<T>, name: impl Fn(&T) -> String) -> Vec<T> {
    let mut merged = existing;
    for item in imported {
        let key = name(&item);
        match merged.iter().position(|e| name(e) == key) {
            Some(idx) => merged[idx] = item,
            None => merged.push(item),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: f64) -> HistoryEntry {
        HistoryEntry {
            id: 0,
            request: crate::models::ApiRequest::default(),
            response: crate::models::ApiResponse::default(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("ALL".parse::<TransferScope>(), Ok(TransferScope::All));
        assert_eq!("envs".parse::<TransferScope>(), Ok(TransferScope::Environments));
        assert!("bogus".parse::<TransferScope>().is_err());
        assert!(TransferScope::All.includes(TransferScope::History));
        assert!(!TransferScope::History.includes(TransferScope::Collections));
    }

    #[test]
    fn test_merge_history_prefers_imported_and_dedupes() {
        let merged = merge_history(vec![entry(3.0), entry(2.0)], vec![entry(2.0), entry(1.0)]);
        let stamps: Vec<f64> = merged.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_merge_history_is_capped() {
        let imported: Vec<HistoryEntry> = (0..900).map(|i| entry(i as f64)).collect();
        let existing: Vec<HistoryEntry> = (1000..1300).map(|i| entry(i as f64)).collect();
        assert_eq!(merge_history(imported, existing).len(), HISTORY_LIMIT);
    }

    #[test]
    fn test_merge_by_name_imported_wins() {
        let mut staging = Environment::new("staging");
        staging.add_variable("host", "old", "");
        let mut imported = Environment::new("staging");
        imported.add_variable("host", "new", "");

        let merged = merge_by_name(
            vec![staging, Environment::new("prod")],
            vec![imported, Environment::new("dev")],
            |e| e.name.clone(),
        );
        let names: Vec<&str> = merged.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["staging", "prod", "dev"]);
        assert_eq!(merged[0].variables_map()["host"], "new");
    }
}
