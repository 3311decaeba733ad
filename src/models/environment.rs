//! Environments and their variables

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::now_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
    pub description: String,
    pub enabled: bool,
}

impl Default for EnvironmentVariable {
    fn default() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
            description: String::new(),
            enabled: true,
        }
    }
}

/// A named set of variables substituted into `{{key}}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Environment {
    pub name: String,
    pub variables: Vec<EnvironmentVariable>,
    pub created_at: f64,
    pub is_active: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            name: String::new(),
            variables: Vec::new(),
            created_at: now_timestamp(),
            is_active: false,
        }
    }
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Enabled variables with non-empty keys
    pub fn variables_map(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .filter(|var| var.enabled && !var.key.is_empty())
            .map(|var| (var.key.clone(), var.value.clone()))
            .collect()
    }

    pub fn add_variable(&mut self, key: &str, value: &str, description: &str) {
        self.variables.push(EnvironmentVariable {
            key: key.to_string(),
            value: value.to_string(),
            description: description.to_string(),
            enabled: true,
        });
    }

    /// Remove the first variable with this key
    pub fn remove_variable(&mut self, key: &str) -> bool {
        match self.variables.iter().position(|var| var.key == key) {
            Some(idx) => {
                self.variables.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn update_variable(&mut self, key: &str, value: &str, description: Option<&str>) -> bool {
        match self.variables.iter_mut().find(|var| var.key == key) {
            Some(var) => {
                var.value = value.to_string();
                if let Some(description) = description {
                    var.description = description.to_string();
                }
                true
            }
            None => false,
        }
    }

    /// Update the variable if present, otherwise add it
    pub fn set_variable(&mut self, key: &str, value: &str, description: Option<&str>) {
        if !self.update_variable(key, value, description) {
            self.add_variable(key, value, description.unwrap_or(""));
        }
    }

    pub fn substitute(&self, text: &str) -> String {
        substitute_variables(text, &self.variables_map())
    }
}

/// Replace every `{{key}}` placeholder in `text` with its value
pub fn substitute_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staging() -> Environment {
        let mut env = Environment::new("staging");
        env.add_variable("host", "staging.example.com", "API host");
        env.add_variable("token", "t-123", "");
        env
    }

    #[test]
    fn test_substitutes_every_occurrence() {
        let env = staging();
        assert_eq!(
            env.substitute("https://{{host}}/a?next=https://{{host}}/b"),
            "https://staging.example.com/a?next=https://staging.example.com/b"
        );
    }

    #[test]
    fn test_unknown_placeholders_are_kept() {
        let env = staging();
        assert_eq!(env.substitute("{{missing}}/{{token}}"), "{{missing}}/t-123");
    }

    #[test]
    fn test_disabled_and_blank_variables_are_ignored() {
        let mut env = staging();
        env.variables[1].enabled = false;
        env.add_variable("", "orphan", "");
        let vars = env.variables_map();
        assert_eq!(vars.len(), 1);
        assert_eq!(env.substitute("{{token}}"), "{{token}}");
    }

    #[test]
    fn test_update_and_remove() {
        let mut env = staging();
        assert!(env.update_variable("host", "prod.example.com", None));
        assert_eq!(env.variables[0].description, "API host");
        assert!(!env.update_variable("nope", "x", None));

        assert!(env.remove_variable("token"));
        assert!(!env.remove_variable("token"));
        assert_eq!(env.variables.len(), 1);
    }

    #[test]
    fn test_set_variable_upserts() {
        let mut env = staging();
        env.set_variable("port", "8443", None);
        env.set_variable("host", "other", Some("changed"));
        assert_eq!(env.variables.len(), 3);
        assert_eq!(env.variables[0].value, "other");
        assert_eq!(env.variables[0].description, "changed");
    }
}
