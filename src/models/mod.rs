//! Data models for api-tester
//!
//! Requests, responses, environments and collections serialize to the same JSON
//! shapes used by the export bundles and stored in SQLite.

use serde::{Deserialize, Serialize};

pub mod collection;
pub mod environment;
pub mod request;
pub mod response;

pub use collection::{
    CollectionError, CollectionItem, CollectionStats, ItemKind, RequestCollection, TreeNode,
};
pub use environment::{substitute_variables, Environment, EnvironmentVariable};
pub use request::{
    remove_header, set_header, ApiRequest, AuthType, BodyType, HttpMethod, KeyValueMap,
    RequestBody, RequestError,
};
pub use response::ApiResponse;

/// Current time as fractional epoch seconds
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A request/response pair recorded after a send
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    /// Row id; not part of exported bundles
    #[serde(skip)]
    pub id: i64,
    pub request: ApiRequest,
    pub response: ApiResponse,
    pub timestamp: f64,
}

/// Filters applied when listing history
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Matched against URL, method, status code and status text
    pub query: Option<String>,
    pub method: Option<HttpMethod>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(method) = self.method {
            if entry.request.method != method {
                return false;
            }
        }
        match self.query.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(query) => {
                let query = query.to_lowercase();
                entry.request.url.to_lowercase().contains(&query)
                    || entry.request.method.as_str().to_lowercase().contains(&query)
                    || entry.response.status_code.to_string().contains(&query)
                    || entry.response.status_text.to_lowercase().contains(&query)
            }
        }
    }
}

/// Format a fractional epoch timestamp for display
pub fn format_timestamp(ts: f64) -> String {
    chrono::DateTime::from_timestamp_millis((ts * 1000.0) as i64)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
