//! JSON formatting, validation and inspection helpers

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// Element counts and sizes of a JSON document
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct JsonStats {
    pub size_bytes: usize,
    pub size_formatted: usize,
    pub size_minified: usize,
    pub max_depth: usize,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub objects: usize,
    pub arrays: usize,
    pub strings: usize,
    pub numbers: usize,
    pub booleans: usize,
    pub nulls: usize,
    pub total_keys: usize,
}

impl JsonStats {
    fn count(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                self.objects += 1;
                self.total_keys += map.len();
                map.values().for_each(|v| self.count(v));
            }
            Value::Array(items) => {
                self.arrays += 1;
                items.iter().for_each(|v| self.count(v));
            }
            Value::String(_) => self.strings += 1,
            Value::Number(_) => self.numbers += 1,
            Value::Bool(_) => self.booleans += 1,
            Value::Null => self.nulls += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JsonComparison {
    pub are_equal: bool,
    pub both_valid: bool,
    pub left: JsonStats,
    pub right: JsonStats,
    /// Right minus left
    pub size_difference: i64,
    pub depth_difference: i64,
}

#[derive(Debug, Clone)]
pub struct JsonFormatter {
    indent: usize,
    sort_keys: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new(2, false)
    }
}

impl JsonFormatter {
    pub fn new(indent: usize, sort_keys: bool) -> Self {
        Self { indent, sort_keys }
    }

    /// Re-serialize `text`; blank input formats to an empty string
    pub fn format(&self, text: &str, compact: bool) -> Result<String, FormatError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let mut value = parse(text)?;
        if self.sort_keys {
            value = sorted(value);
        }
        if compact {
            return serde_json::to_string(&value).map_err(|e| FormatError::InvalidJson(e.to_string()));
        }
        self.pretty(&value)
    }

    pub fn minify(&self, text: &str) -> Result<String, FormatError> {
        self.format(text, true)
    }

    pub fn prettify(&self, text: &str) -> Result<String, FormatError> {
        self.format(text, false)
    }

    pub fn validate(&self, text: &str) -> Result<(), String> {
        if text.trim().is_empty() {
            return Err("Empty JSON string".to_string());
        }
        serde_json::from_str::<Value>(text)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// First balanced object, or failing that array, inside `text` that parses
    pub fn extract_json_from_text(&self, text: &str) -> Option<String> {
        [('{', '}'), ('[', ']')]
            .into_iter()
            .find_map(|(open, close)| find_balanced(text, open, close))
    }

    /// Pretty-print, falling back to `fallback` (or the input) when it is not JSON
    pub fn safe_format(&self, text: &str, fallback: Option<&str>) -> String {
        self.prettify(text)
            .unwrap_or_else(|_| fallback.unwrap_or(text).to_string())
    }

    pub fn size_bytes(&self, text: &str) -> usize {
        text.len()
    }

    /// Nesting depth of a JSON document; 0 when it does not parse
    pub fn depth(&self, text: &str) -> usize {
        serde_json::from_str(text).map(|v| depth(&v)).unwrap_or(0)
    }

    pub fn stats(&self, text: &str) -> JsonStats {
        let mut stats = JsonStats {
            size_bytes: text.len(),
            ..JsonStats::default()
        };
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                stats.is_valid = true;
                stats.max_depth = depth(&value);
                stats.size_formatted = self.prettify(text).map(|s| s.len()).unwrap_or(0);
                stats.size_minified = self.minify(text).map(|s| s.len()).unwrap_or(0);
                stats.count(&value);
            }
            Err(e) => stats.error = Some(e.to_string()),
        }
        stats
    }

    pub fn compare(&self, left: &str, right: &str) -> JsonComparison {
        let left_stats = self.stats(left);
        let right_stats = self.stats(right);
        let are_equal = match (parse(left), parse(right)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        JsonComparison {
            are_equal,
            both_valid: left_stats.is_valid && right_stats.is_valid,
            size_difference: right_stats.size_bytes as i64 - left_stats.size_bytes as i64,
            depth_difference: right_stats.max_depth as i64 - left_stats.max_depth as i64,
            left: left_stats,
            right: right_stats,
        }
    }

    /// Flatten into `separator`-joined paths; array indices become path segments
    pub fn flatten(&self, text: &str, separator: &str) -> Map<String, Value> {
        let mut out = Map::new();
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            flatten_into(&value, String::new(), separator, &mut out);
        }
        out
    }

    fn pretty(&self, value: &Value) -> Result<String, FormatError> {
        let indent = " ".repeat(self.indent);
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut buf = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value
            .serialize(&mut serializer)
            .map_err(|e| FormatError::InvalidJson(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| FormatError::InvalidJson(e.to_string()))
    }
}

/// Escape text for embedding inside a JSON string literal
pub fn escape_string(text: &str) -> String {
    let quoted = Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Reverse of [`escape_string`]; returns the input unchanged when it is not a valid escape
pub fn unescape_string(text: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", text)).unwrap_or_else(|_| text.to_string())
}

fn parse(text: &str) -> Result<Value, FormatError> {
    serde_json::from_str(text).map_err(|e| FormatError::InvalidJson(e.to_string()))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) if !map.is_empty() => 1 + map.values().map(depth).max().unwrap_or(0),
        Value::Array(items) if !items.is_empty() => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn flatten_into(value: &Value, prefix: String, separator: &str, out: &mut Map<String, Value>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}{}", prefix, separator, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, join(key), separator, out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                flatten_into(child, join(&idx.to_string()), separator, out);
            }
        }
        scalar => {
            out.insert(prefix, scalar.clone());
        }
    }
}

/// Scan for `open`..`close` spans, skipping brackets inside strings
fn find_balanced(text: &str, open: char, close: char) -> Option<String> {
    let starts = text
        .char_indices()
        .filter(|&(_, c)| c == open)
        .map(|(idx, _)| idx);

    for start in starts {
        let mut level = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, c) in text[start..].char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            if c == '"' {
                in_string = true;
            } else if c == open {
                level += 1;
            } else if c == close {
                level -= 1;
                if level == 0 {
                    let candidate = &text[start..start + offset + c.len_utf8()];
                    if serde_json::from_str::<Value>(candidate).is_ok() {
                        return Some(candidate.to_string());
                    }
                    break;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_blank_and_invalid() {
        let f = JsonFormatter::default();
        assert_eq!(f.format("   ", false), Ok(String::new()));
        assert!(matches!(f.format("{oops", false), Err(FormatError::InvalidJson(_))));
    }

    #[test]
    fn test_prettify_with_indent_and_sorting() {
        let f = JsonFormatter::new(4, true);
        let pretty = f.prettify(r#"{"b": 1, "a": [true]}"#).unwrap();
        assert_eq!(pretty, "{\n    \"a\": [\n        true\n    ],\n    \"b\": 1\n}");

        let unsorted = JsonFormatter::default().minify(r#"{ "b": 1, "a": 2 }"#).unwrap();
        assert_eq!(unsorted, r#"{"b":1,"a":2}"#);
    }

    #[test]
    fn test_validate_messages() {
        let f = JsonFormatter::default();
        assert_eq!(f.validate(""), Err("Empty JSON string".to_string()));
        assert!(f.validate("[1, 2]").is_ok());
        assert!(f.validate("[1,").is_err());
    }

    #[test]
    fn test_extract_json_from_text() {
        let f = JsonFormatter::default();
        let text = r#"log line {not json} then {"ok": {"nested": "a}b"}} trailing"#;
        assert_eq!(
            f.extract_json_from_text(text).as_deref(),
            Some(r#"{"ok": {"nested": "a}b"}}"#)
        );
        assert_eq!(f.extract_json_from_text("ids: [1, 2]").as_deref(), Some("[1, 2]"));
        assert_eq!(f.extract_json_from_text("nothing here"), None);
    }

    #[test]
    fn test_safe_format_fallbacks() {
        let f = JsonFormatter::default();
        assert_eq!(f.safe_format("nope", None), "nope");
        assert_eq!(f.safe_format("nope", Some("-")), "-");
    }

    #[test]
    fn test_depth_ignores_empty_containers() {
        let f = JsonFormatter::default();
        assert_eq!(f.depth("1"), 0);
        assert_eq!(f.depth("{}"), 0);
        assert_eq!(f.depth(r#"{"a": []}"#), 1);
        assert_eq!(f.depth(r#"{"a": [{"b": 1}]}"#), 3);
        assert_eq!(f.depth("{broken"), 0);
    }

    #[test]
    fn test_stats_counts_elements() {
        let stats = JsonFormatter::default().stats(r#"{"a": [1, "x", null, false], "b": {}}"#);
        assert!(stats.is_valid);
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.arrays, 1);
        assert_eq!(stats.numbers, 1);
        assert_eq!(stats.strings, 1);
        assert_eq!(stats.nulls, 1);
        assert_eq!(stats.booleans, 1);
        assert_eq!(stats.total_keys, 2);
        assert_eq!(stats.max_depth, 2);

        let invalid = JsonFormatter::default().stats("{");
        assert!(!invalid.is_valid);
        assert!(invalid.error.is_some());
    }

    #[test]
    fn test_compare_ignores_whitespace() {
        let cmp = JsonFormatter::default().compare(r#"{"a":1}"#, r#"{ "a" : 1 }"#);
        assert!(cmp.are_equal);
        assert!(cmp.both_valid);
        assert_eq!(cmp.size_difference, 4);
        assert_eq!(cmp.depth_difference, 0);
    }

    #[test]
    fn test_escape_roundtrip_and_bad_unescape() {
        assert_eq!(escape_string("say \"hi\"\n"), r#"say \"hi\"\n"#);
        assert_eq!(unescape_string(r#"tab\there"#), "tab\there");
        assert_eq!(unescape_string(r#"bad\q"#), r#"bad\q"#);
    }

    #[test]
    fn test_flatten_paths() {
        let flat = JsonFormatter::default().flatten(r#"{"a": {"b": [10, {"c": true}]}}"#, ".");
        assert_eq!(flat.get("a.b.0"), Some(&Value::from(10)));
        assert_eq!(flat.get("a.b.1.c"), Some(&Value::Bool(true)));
        assert_eq!(flat.len(), 2);
    }
}
