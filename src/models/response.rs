//! HTTP response model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::now_timestamp;

/// A received response, or the error that prevented one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Elapsed time in milliseconds
    pub response_time: f64,
    /// Body size in bytes
    pub size: usize,
    pub timestamp: f64,
    pub error: Option<String>,
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self {
            status_code: 0,
            status_text: String::new(),
            headers: BTreeMap::new(),
            body: String::new(),
            response_time: 0.0,
            size: 0,
            timestamp: now_timestamp(),
            error: None,
        }
    }
}

impl ApiResponse {
    /// Response describing a failed request
    pub fn failed(error: impl Into<String>, response_time: f64) -> Self {
        Self {
            error: Some(error.into()),
            response_time,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Look up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("text/plain")
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .map(|ct| ct.to_lowercase().contains("application/json"))
            .unwrap_or(false)
    }

    /// Body pretty-printed when it is JSON, otherwise as received
    pub fn formatted_body(&self) -> String {
        if self.body.is_empty() {
            return String::new();
        }
        if self.is_json() {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&self.body) {
                if let Ok(pretty) = serde_json::to_string_pretty(&parsed) {
                    return pretty;
                }
            }
        }
        self.body.clone()
    }

    pub fn formatted_size(&self) -> String {
        const KB: f64 = 1024.0;
        let size = self.size as f64;
        if self.size < 1024 {
            format!("{} B", self.size)
        } else if size < KB * KB {
            format!("{:.1} KB", size / KB)
        } else {
            format!("{:.1} MB", size / (KB * KB))
        }
    }

    pub fn formatted_time(&self) -> String {
        if self.response_time < 1000.0 {
            format!("{:.0} ms", self.response_time)
        } else {
            format!("{:.1} s", self.response_time / 1000.0)
        }
    }

    /// One-line status summary, e.g. "200 OK"
    pub fn status_line(&self) -> String {
        match &self.error {
            Some(error) => format!("Error: {}", error),
            None => format!("{} {}", self.status_code, self.status_text)
                .trim_end()
                .to_string(),
        }
    }
}
