//! HTTP request model

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::now_timestamp;

/// HTTP methods supported by the client
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Head,
        HttpMethod::Options,
    ];

    /// Whether a request body is sent for this method
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Invalid method: {}. Use: GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS",
                    s
                )
            })
    }
}

/// Authentication schemes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
    ApiKey,
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::None => write!(f, "none"),
            AuthType::Basic => write!(f, "basic"),
            AuthType::Bearer => write!(f, "bearer"),
            AuthType::ApiKey => write!(f, "api_key"),
        }
    }
}

impl std::str::FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(AuthType::None),
            "basic" => Ok(AuthType::Basic),
            "bearer" => Ok(AuthType::Bearer),
            "api_key" | "apikey" => Ok(AuthType::ApiKey),
            _ => Err(format!(
                "Invalid auth type: {}. Use: none, basic, bearer, api_key",
                s
            )),
        }
    }
}

/// How the request body is encoded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum BodyType {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "form-data")]
    FormData,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "x-www-form-urlencoded")]
    UrlEncoded,
}

impl std::fmt::Display for BodyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyType::Json => write!(f, "json"),
            BodyType::FormData => write!(f, "form-data"),
            BodyType::Raw => write!(f, "raw"),
            BodyType::UrlEncoded => write!(f, "x-www-form-urlencoded"),
        }
    }
}

impl std::str::FromStr for BodyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(BodyType::Json),
            "form-data" | "form" => Ok(BodyType::FormData),
            "raw" | "text" => Ok(BodyType::Raw),
            "x-www-form-urlencoded" | "urlencoded" => Ok(BodyType::UrlEncoded),
            _ => Err(format!(
                "Invalid body type: {}. Use: json, form-data, raw, x-www-form-urlencoded",
                s
            )),
        }
    }
}

/// Request validation error
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("URL is required")]
    MissingUrl,

    #[error("URL must start with http:// or https://")]
    InvalidScheme,

    #[error("Invalid JSON in body: {0}")]
    InvalidJsonBody(String),
}

/// Header or query pairs in the order they were entered
pub type KeyValueMap = IndexMap<String, String>;

/// Set `name` to `value`, replacing any header whose name differs only in case
pub fn set_header(headers: &mut KeyValueMap, name: &str, value: impl Into<String>) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_string(), value.into());
}

/// Remove every header named `name`, ignoring case; returns whether one was present
pub fn remove_header(headers: &mut KeyValueMap, name: &str) -> bool {
    let before = headers.len();
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.len() != before
}

/// Body prepared for sending
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// An API request as composed by the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: KeyValueMap,
    pub params: KeyValueMap,
    pub body: String,
    pub body_type: BodyType,
    pub auth_type: AuthType,
    pub auth_data: BTreeMap<String, String>,
    pub name: String,
    pub description: String,
    pub created_at: f64,
}

impl Default for ApiRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: HttpMethod::Get,
            headers: KeyValueMap::new(),
            params: KeyValueMap::new(),
            body: String::new(),
            body_type: BodyType::Json,
            auth_type: AuthType::None,
            auth_data: BTreeMap::new(),
            name: String::new(),
            description: String::new(),
            created_at: now_timestamp(),
        }
    }
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    fn auth_value(&self, key: &str) -> &str {
        self.auth_data.get(key).map(String::as_str).unwrap_or("")
    }

    /// Headers to send, including authentication and content type
    pub fn effective_headers(&self) -> KeyValueMap {
        let mut headers = self.headers.clone();

        match self.auth_type {
            AuthType::Bearer => {
                let token = self.auth_value("token");
                if !token.is_empty() {
                    set_header(&mut headers, "Authorization", format!("Bearer {}", token));
                }
            }
            AuthType::ApiKey => {
                if let Some((key, value)) = self.api_key_pair() {
                    if self.api_key_location() == "header" {
                        set_header(&mut headers, key, value);
                    }
                }
            }
            AuthType::Basic | AuthType::None => {}
        }

        if !self.body.is_empty() && self.method.allows_body() {
            match self.body_type {
                BodyType::Json => {
                    set_header(&mut headers, "Content-Type", "application/json");
                }
                BodyType::UrlEncoded => {
                    set_header(
                        &mut headers,
                        "Content-Type",
                        "application/x-www-form-urlencoded",
                    );
                }
                BodyType::FormData | BodyType::Raw => {}
            }
        }

        headers
    }

    /// Query parameters to send, including an API key placed in the query
    pub fn effective_params(&self) -> KeyValueMap {
        let mut params = self.params.clone();
        if self.auth_type == AuthType::ApiKey && self.api_key_location() == "query" {
            if let Some((key, value)) = self.api_key_pair() {
                params.insert(key.to_string(), value.to_string());
            }
        }
        params
    }

    /// Basic credentials when both username and password are set
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        if self.auth_type != AuthType::Basic {
            return None;
        }
        let username = self.auth_value("username");
        let password = self.auth_value("password");
        (!username.is_empty() && !password.is_empty()).then_some((username, password))
    }

    fn api_key_pair(&self) -> Option<(&str, &str)> {
        let key = self.auth_value("key");
        let value = self.auth_value("value");
        (!key.is_empty() && !value.is_empty()).then_some((key, value))
    }

    fn api_key_location(&self) -> &str {
        match self.auth_value("location") {
            "" => "header",
            location => location,
        }
    }

    /// Body prepared for sending; JSON bodies that fail to parse are sent as text
    pub fn parsed_body(&self) -> Option<RequestBody> {
        if self.body.is_empty() {
            return None;
        }
        if self.body_type == BodyType::Json {
            if let Ok(value) = serde_json::from_str(&self.body) {
                return Some(RequestBody::Json(value));
            }
        }
        Some(RequestBody::Text(self.body.clone()))
    }

    /// Check that the request can be sent
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.url.is_empty() {
            return Err(RequestError::MissingUrl);
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(RequestError::InvalidScheme);
        }
        if self.body_type == BodyType::Json && !self.body.is_empty() {
            serde_json::from_str::<serde_json::Value>(&self.body)
                .map_err(|e| RequestError::InvalidJsonBody(e.to_string()))?;
        }
        Ok(())
    }

    /// Name shown in listings
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("{} {}", self.method, self.url)
        } else {
            self.name.clone()
        }
    }
}
