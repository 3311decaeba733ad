//! Collections of saved requests organized in folders
//!
//! Items are stored flat; the tree is expressed through `parent_id`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{new_id, now_timestamp, ApiRequest};

/// Collection operation error
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Parent {0} is not a folder in this collection")]
    InvalidParent(String),

    #[error("Cannot move {item} into its own subtree ({parent})")]
    Cycle { item: String, parent: String },
}

/// What a collection item holds
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Request { request: ApiRequest },
}

/// A folder or saved request inside a collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "RawCollectionItem")]
pub struct CollectionItem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: f64,
    pub modified_at: f64,
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub kind: ItemKind,
}

/// Lenient on-disk shape: every field optional, missing type means request
#[derive(Deserialize)]
struct RawCollectionItem {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    created_at: Option<f64>,
    modified_at: Option<f64>,
    parent_id: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<String>,
    request: Option<ApiRequest>,
}

impl From<RawCollectionItem> for CollectionItem {
    fn from(raw: RawCollectionItem) -> Self {
        let now = now_timestamp();
        let kind = match raw.item_type.as_deref() {
            Some("folder") => ItemKind::Folder,
            _ => ItemKind::Request {
                request: raw.request.unwrap_or_default(),
            },
        };
        let mut name = raw.name;
        if let ItemKind::Request { request } = &kind {
            if name.is_empty() && !request.name.is_empty() {
                name = request.name.clone();
            }
        }
        Self {
            id: raw.id.unwrap_or_else(new_id),
            name,
            description: raw.description,
            created_at: raw.created_at.unwrap_or(now),
            modified_at: raw.modified_at.unwrap_or(now),
            parent_id: raw.parent_id,
            kind,
        }
    }
}

impl CollectionItem {
    fn new(name: String, description: String, parent_id: Option<String>, kind: ItemKind) -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            name,
            description,
            created_at: now,
            modified_at: now,
            parent_id,
            kind,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder)
    }

    pub fn request(&self) -> Option<&ApiRequest> {
        match &self.kind {
            ItemKind::Request { request } => Some(request),
            ItemKind::Folder => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ItemKind::Folder => "folder",
            ItemKind::Request { .. } => "request",
        }
    }
}

/// Nested view of a collection
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CollectionStats {
    pub total_items: usize,
    pub folders: usize,
    pub requests: usize,
    pub methods: BTreeMap<String, usize>,
}

/// A named collection of folders and requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RequestCollection {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_at: f64,
    pub modified_at: f64,
    pub items: Vec<CollectionItem>,
}

impl Default for RequestCollection {
    fn default() -> Self {
        let now = now_timestamp();
        Self {
            id: new_id(),
            name: String::new(),
            description: String::new(),
            created_at: now,
            modified_at: now,
            items: Vec::new(),
        }
    }
}

impl RequestCollection {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    fn touch(&mut self) {
        self.modified_at = now_timestamp();
    }

    pub fn add_folder(&mut self, name: &str, parent_id: Option<&str>, description: &str) -> &CollectionItem {
        let folder = CollectionItem::new(
            name.to_string(),
            description.to_string(),
            parent_id.map(str::to_string),
            ItemKind::Folder,
        );
        self.items.push(folder);
        self.touch();
        &self.items[self.items.len() - 1]
    }

    /// Add a request; an empty name falls back to the request's display name
    pub fn add_request(&mut self, request: ApiRequest, parent_id: Option<&str>, name: &str) -> &CollectionItem {
        let name = if name.is_empty() {
            request.display_name()
        } else {
            name.to_string()
        };
        let item = CollectionItem::new(
            name,
            String::new(),
            parent_id.map(str::to_string),
            ItemKind::Request { request },
        );
        self.items.push(item);
        self.touch();
        &self.items[self.items.len() - 1]
    }

    pub fn get_item(&self, item_id: &str) -> Option<&CollectionItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn get_item_mut(&mut self, item_id: &str) -> Option<&mut CollectionItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    /// Direct children of a parent, or root items when `parent_id` is None
    pub fn children(&self, parent_id: Option<&str>) -> Vec<&CollectionItem> {
        self.items
            .iter()
            .filter(|item| item.parent_id.as_deref() == parent_id)
            .collect()
    }

    /// Ids of every item below `item_id`
    pub fn descendant_ids(&self, item_id: &str) -> HashSet<String> {
        let mut found = HashSet::new();
        let mut pending = vec![item_id.to_string()];
        while let Some(parent) = pending.pop() {
            for child in self.children(Some(parent.as_str())) {
                if found.insert(child.id.clone()) {
                    pending.push(child.id.clone());
                }
            }
        }
        found
    }

    /// Check that `parent_id` names a folder in this collection
    pub fn check_parent(&self, parent_id: Option<&str>) -> Result<(), CollectionError> {
        match parent_id {
            None => Ok(()),
            Some(id) => match self.get_item(id) {
                Some(item) if item.is_folder() => Ok(()),
                _ => Err(CollectionError::InvalidParent(id.to_string())),
            },
        }
    }

    /// Remove an item together with its whole subtree
    pub fn remove_item(&mut self, item_id: &str) -> bool {
        if self.get_item(item_id).is_none() {
            return false;
        }
        let mut doomed = self.descendant_ids(item_id);
        doomed.insert(item_id.to_string());
        self.items.retain(|item| !doomed.contains(&item.id));
        self.touch();
        true
    }

    pub fn move_item(&mut self, item_id: &str, new_parent_id: Option<&str>) -> Result<(), CollectionError> {
        if self.get_item(item_id).is_none() {
            return Err(CollectionError::ItemNotFound(item_id.to_string()));
        }
        if let Some(parent) = new_parent_id {
            if parent == item_id || self.descendant_ids(item_id).contains(parent) {
                return Err(CollectionError::Cycle {
                    item: item_id.to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        self.check_parent(new_parent_id)?;

        let now = now_timestamp();
        if let Some(item) = self.get_item_mut(item_id) {
            item.parent_id = new_parent_id.map(str::to_string);
            item.modified_at = now;
        }
        self.modified_at = now;
        Ok(())
    }

    /// Nested tree; siblings are ordered folders first, then by name
    pub fn tree(&self) -> Vec<TreeNode> {
        self.build_tree(None)
    }

    fn build_tree(&self, parent_id: Option<&str>) -> Vec<TreeNode> {
        let mut children = self.children(parent_id);
        children.sort_by(|a, b| {
            (!a.is_folder(), a.name.as_str()).cmp(&(!b.is_folder(), b.name.as_str()))
        });

        children
            .into_iter()
            .map(|child| TreeNode {
                id: child.id.clone(),
                name: child.name.clone(),
                node_type: child.type_name().to_string(),
                description: child.description.clone(),
                method: child.request().map(|r| r.method.to_string()),
                url: child.request().map(|r| r.url.clone()),
                children: if child.is_folder() {
                    self.build_tree(Some(child.id.as_str()))
                } else {
                    Vec::new()
                },
            })
            .collect()
    }

    /// Case-insensitive search on name and description, and URL/method for requests
    pub fn search(&self, query: &str) -> Vec<&CollectionItem> {
        let query = query.to_lowercase();
        self.items
            .iter()
            .filter(|item| {
                item.name.to_lowercase().contains(&query)
                    || item.description.to_lowercase().contains(&query)
                    || item.request().is_some_and(|r| {
                        r.url.to_lowercase().contains(&query)
                            || r.method.as_str().to_lowercase().contains(&query)
                    })
            })
            .collect()
    }

    pub fn stats(&self) -> CollectionStats {
        let mut stats = CollectionStats {
            total_items: self.items.len(),
            ..CollectionStats::default()
        };
        for item in &self.items {
            match item.request() {
                None => stats.folders += 1,
                Some(request) => {
                    stats.requests += 1;
                    *stats.methods.entry(request.method.to_string()).or_insert(0) += 1;
                }
            }
        }
        stats
    }
}
