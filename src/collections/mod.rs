//! Collection management on top of the database
//!
//! Every mutating operation loads the collection, applies the change and writes it
//! back. Unknown collections or items are reported as `None`/`false`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::db::Database;
use crate::fsutil;
use crate::models::{
    now_timestamp, ApiRequest, CollectionItem, CollectionStats, ItemKind, RequestCollection,
};

pub const DEFAULT_COLLECTION_NAME: &str = "My Requests";
const DEFAULT_COLLECTION_DESCRIPTION: &str = "Default collection for API requests";
const EXPORT_VERSION: &str = "1.0";
const EXPORT_TYPE: &str = "collection";

/// File envelope for a single exported collection
#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionExport {
    pub version: String,
    pub export_type: String,
    pub exported_at: f64,
    pub collection: RequestCollection,
}

/// A search hit across all collections
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub collection_id: String,
    pub collection_name: String,
    pub item_id: String,
    pub item_name: String,
    pub item_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A saved request with its location
#[derive(Debug, Clone)]
pub struct SavedRequest {
    pub collection_id: String,
    pub collection_name: String,
    pub item_id: String,
    pub name: String,
    pub request: ApiRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub id: String,
    pub name: String,
    pub stats: CollectionStats,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverallStats {
    pub total_collections: usize,
    pub total_folders: usize,
    pub total_requests: usize,
    pub method_distribution: BTreeMap<String, usize>,
    pub collections: Vec<CollectionSummary>,
}

/// Collection operations backed by the database
pub struct CollectionManager<'a> {
    db: &'a Database,
}

impl<'a> CollectionManager<'a> {
    /// Open the manager, creating the default collection when none exist
    pub fn new(db: &'a Database) -> Result<Self> {
        let manager = Self { db };
        if manager.db.list_collections()?.is_empty() {
            let default =
                RequestCollection::new(DEFAULT_COLLECTION_NAME, DEFAULT_COLLECTION_DESCRIPTION);
            manager.db.insert_collection(&default)?;
            tracing::info!(id = %default.id, "Created default collection");
        }
        Ok(manager)
    }

    pub fn list_collections(&self) -> Result<Vec<RequestCollection>> {
        self.db.list_collections()
    }

    pub fn create_collection(&self, name: &str, description: &str) -> Result<RequestCollection> {
        let collection = RequestCollection::new(name, description);
        self.db.insert_collection(&collection)?;
        tracing::info!(id = %collection.id, %name, "Created collection");
        Ok(collection)
    }

    pub fn get_collection(&self, collection_id: &str) -> Result<Option<RequestCollection>> {
        self.db.get_collection(collection_id)
    }

    pub fn get_collection_by_name(&self, name: &str) -> Result<Option<RequestCollection>> {
        Ok(self
            .db
            .list_collections()?
            .into_iter()
            .find(|c| c.name == name))
    }

    /// Look a collection up by id, then by name
    pub fn resolve(&self, id_or_name: &str) -> Result<Option<RequestCollection>> {
        match self.get_collection(id_or_name)? {
            Some(collection) => Ok(Some(collection)),
            None => self.get_collection_by_name(id_or_name),
        }
    }

    pub fn delete_collection(&self, collection_id: &str) -> Result<bool> {
        self.db.delete_collection(collection_id)
    }

    pub fn rename_collection(&self, collection_id: &str, new_name: &str) -> Result<bool> {
        self.modify(collection_id, |collection| {
            collection.name = new_name.to_string();
            collection.modified_at = now_timestamp();
            Ok(true)
        })
        .map(|r| r.unwrap_or(false))
    }

    pub fn add_folder(
        &self,
        collection_id: &str,
        name: &str,
        parent_id: Option<&str>,
        description: &str,
    ) -> Result<Option<CollectionItem>> {
        self.modify(collection_id, |collection| {
            collection.check_parent(parent_id)?;
            Ok(collection.add_folder(name, parent_id, description).clone())
        })
    }

    pub fn add_request(
        &self,
        collection_id: &str,
        request: ApiRequest,
        parent_id: Option<&str>,
        name: &str,
    ) -> Result<Option<CollectionItem>> {
        self.modify(collection_id, |collection| {
            collection.check_parent(parent_id)?;
            Ok(collection.add_request(request, parent_id, name).clone())
        })
    }

    pub fn remove_item(&self, collection_id: &str, item_id: &str) -> Result<bool> {
        self.modify(collection_id, |collection| Ok(collection.remove_item(item_id)))
            .map(|r| r.unwrap_or(false))
    }

    /// Move an item under a new parent folder (or to the root)
    ///
    /// Moving a folder into its own subtree is an error.
    pub fn move_item(
        &self,
        collection_id: &str,
        item_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<bool> {
        self.modify(collection_id, |collection| {
            if collection.get_item(item_id).is_none() {
                return Ok(false);
            }
            collection.move_item(item_id, new_parent_id)?;
            Ok(true)
        })
        .map(|r| r.unwrap_or(false))
    }

    pub fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        self.modify(collection_id, |collection| {
            let now = now_timestamp();
            let Some(item) = collection.get_item_mut(item_id) else {
                return Ok(false);
            };
            if let Some(name) = name {
                item.name = name.to_string();
            }
            if let Some(description) = description {
                item.description = description.to_string();
            }
            item.modified_at = now;
            collection.modified_at = now;
            Ok(true)
        })
        .map(|r| r.unwrap_or(false))
    }

    /// Copy an item next to the original; folders are copied with their contents.
    /// Returns the id of the copy.
    pub fn duplicate_item(
        &self,
        collection_id: &str,
        item_id: &str,
        new_name: Option<&str>,
    ) -> Result<Option<String>> {
        self.modify(collection_id, |collection| {
            let Some(source) = collection.get_item(item_id).cloned() else {
                return Ok(None);
            };
            let name = match new_name {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("{} Copy", source.name),
            };
            let parent = source.parent_id.clone();
            Ok(Some(copy_subtree(collection, &source, parent.as_deref(), &name)))
        })
        .map(Option::flatten)
    }

    pub fn search_across_collections(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for collection in self.db.list_collections()? {
            for item in collection.search(query) {
                hits.push(SearchHit {
                    collection_id: collection.id.clone(),
                    collection_name: collection.name.clone(),
                    item_id: item.id.clone(),
                    item_name: item.name.clone(),
                    item_type: item.type_name().to_string(),
                    description: item.description.clone(),
                    method: item.request().map(|r| r.method.to_string()),
                    url: item.request().map(|r| r.url.clone()),
                });
            }
        }
        Ok(hits)
    }

    pub fn all_requests(&self) -> Result<Vec<SavedRequest>> {
        let mut requests = Vec::new();
        for collection in self.db.list_collections()? {
            for item in &collection.items {
                if let Some(request) = item.request() {
                    requests.push(SavedRequest {
                        collection_id: collection.id.clone(),
                        collection_name: collection.name.clone(),
                        item_id: item.id.clone(),
                        name: item.name.clone(),
                        request: request.clone(),
                    });
                }
            }
        }
        Ok(requests)
    }

    /// Write a collection to `path` inside a versioned envelope
    pub fn export_collection(&self, collection_id: &str, path: &Path) -> Result<bool> {
        let Some(collection) = self.get_collection(collection_id)? else {
            return Ok(false);
        };
        let export = CollectionExport {
            version: EXPORT_VERSION.to_string(),
            export_type: EXPORT_TYPE.to_string(),
            exported_at: now_timestamp(),
            collection,
        };
        fsutil::safe_write_json(path, &export, false)?;
        tracing::info!(path = %path.display(), "Exported collection");
        Ok(true)
    }

    /// Import a collection envelope; the name gets a " (n)" suffix until unique
    pub fn import_collection(&self, path: &Path) -> Result<RequestCollection> {
        let value: serde_json::Value = fsutil::safe_read_json(path)?
            .with_context(|| format!("File not found: {}", path.display()))?;

        if value.get("export_type").and_then(|v| v.as_str()) != Some(EXPORT_TYPE) {
            bail!("{} is not a collection export", path.display());
        }
        let data = value.get("collection").cloned().unwrap_or_default();
        let mut collection: RequestCollection =
            serde_json::from_value(data).context("Failed to parse exported collection")?;

        let original_name = collection.name.clone();
        let mut counter = 1;
        while self.get_collection_by_name(&collection.name)?.is_some() {
            collection.name = format!("{} ({})", original_name, counter);
            counter += 1;
        }
        if self.db.get_collection(&collection.id)?.is_some() {
            collection.id = uuid::Uuid::new_v4().to_string();
        }

        self.db.insert_collection(&collection)?;
        tracing::info!(id = %collection.id, name = %collection.name, "Imported collection");
        Ok(collection)
    }

    pub fn collection_stats(&self) -> Result<OverallStats> {
        let mut overall = OverallStats::default();
        for collection in self.db.list_collections()? {
            let stats = collection.stats();
            overall.total_collections += 1;
            overall.total_folders += stats.folders;
            overall.total_requests += stats.requests;
            for (method, count) in &stats.methods {
                *overall.method_distribution.entry(method.clone()).or_insert(0) += count;
            }
            overall.collections.push(CollectionSummary {
                id: collection.id.clone(),
                name: collection.name.clone(),
                stats,
            });
        }
        Ok(overall)
    }

    /// Load, change and persist a collection. None when the collection does not exist.
    fn modify<T>(
        &self,
        collection_id: &str,
        change: impl FnOnce(&mut RequestCollection) -> Result<T, crate::models::CollectionError>,
    ) -> Result<Option<T>> {
        let Some(mut collection) = self.db.get_collection(collection_id)? else {
            return Ok(None);
        };
        let result = change(&mut collection)?;
        self.db.update_collection(&collection)?;
        Ok(Some(result))
    }
}

/// Copy `source` (and, for folders, everything below it) under `parent`
fn copy_subtree(
    collection: &mut RequestCollection,
    source: &CollectionItem,
    parent: Option<&str>,
    name: &str,
) -> String {
    match &source.kind {
        ItemKind::Request { request } => {
            let copy_id = collection.add_request(request.clone(), parent, name).id.clone();
            if let Some(copy) = collection.get_item_mut(&copy_id) {
                copy.description = source.description.clone();
            }
            copy_id
        }
        ItemKind::Folder => {
            let copy_id = collection
                .add_folder(name, parent, &source.description)
                .id
                .clone();
            let children: Vec<CollectionItem> = collection
                .children(Some(source.id.as_str()))
                .into_iter()
                .cloned()
                .collect();
            for child in &children {
                copy_subtree(collection, child, Some(copy_id.as_str()), &child.name);
            }
            copy_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;

    #[test]
    fn test_default_collection_is_created_once() {
        let db = Database::in_memory().unwrap();
        CollectionManager::new(&db).unwrap();
        let manager = CollectionManager::new(&db).unwrap();
        let collections = manager.list_collections().unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].name, DEFAULT_COLLECTION_NAME);
    }

    #[test]
    fn test_unknown_collection_is_not_an_error() {
        let db = Database::in_memory().unwrap();
        let manager = CollectionManager::new(&db).unwrap();
        assert!(!manager.rename_collection("missing", "x").unwrap());
        assert!(manager.add_folder("missing", "f", None, "").unwrap().is_none());
        assert!(manager.duplicate_item("missing", "i", None).unwrap().is_none());
    }

    #[test]
    fn test_add_request_under_request_is_rejected() {
        let db = Database::in_memory().unwrap();
        let manager = CollectionManager::new(&db).unwrap();
        let collection = manager.create_collection("API", "").unwrap();
        let item = manager
            .add_request(&collection.id, ApiRequest::new(HttpMethod::Get, "https://x.io"), None, "")
            .unwrap()
            .unwrap();
        let result = manager.add_folder(&collection.id, "inner", Some(item.id.as_str()), "");
        assert!(result.is_err());
    }
}
