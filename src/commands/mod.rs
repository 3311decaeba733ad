//! CLI commands for api-tester

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::client::ApiClient;
use crate::config::{load_config, save_config, AppPaths, Config};
use crate::db::Database;
use crate::format::JsonFormatter;
use crate::models::{set_header, ApiRequest, AuthType, BodyType, HttpMethod};
use crate::session::{self, print_response, resolve_environment, Session};

pub mod collection;
pub mod data;
pub mod env;
pub mod history;
pub mod manifest;

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Summary,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Summary
        }
    }
}

/// Opened state shared by the commands
pub struct Workspace {
    pub paths: AppPaths,
    pub config: Config,
    pub db: Database,
}

impl Workspace {
    pub fn open(paths: &AppPaths) -> Result<Self> {
        ensure_initialized(paths)?;
        Ok(Self {
            paths: paths.clone(),
            config: load_config(paths)?,
            db: Database::open(paths)?,
        })
    }

    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(self.config.network.clone())
    }

    pub fn formatter(&self) -> JsonFormatter {
        JsonFormatter::new(self.config.editor.indent, self.config.editor.sort_keys)
    }
}

/// Initialize api-tester for first-time setup
pub fn init(paths: &AppPaths) -> Result<()> {
    if paths.is_initialized() {
        println!("api-tester is already initialized at {}", paths.root.display());
        return Ok(());
    }

    println!("Initializing api-tester at {}...", paths.root.display());

    paths.ensure_dirs()?;
    println!("  Created directory structure");

    if !paths.config.exists() {
        save_config(paths, &Config::default())?;
        println!("  Created config.toml");
    }

    let db = Database::init(paths)?;
    crate::collections::CollectionManager::new(&db)?;
    println!("  Created database with default collection");

    tracing::info!(root = %paths.root.display(), "Initialized api-tester");

    println!();
    println!("api-tester initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  api-tester send GET https://httpbin.org/get    Send a request");
    println!("  api-tester env create dev                      Create an environment");
    println!("  api-tester session                             Start an interactive session");

    Ok(())
}

/// Options for a one-shot send
#[derive(Debug, Default, Clone)]
pub struct SendOptions {
    pub method: String,
    pub url: String,
    /// `Name: value` or `Name=value`
    pub headers: Vec<String>,
    /// `name=value`
    pub params: Vec<String>,
    /// Body text, or `@path` to read it from a file
    pub data: Option<String>,
    pub body_type: Option<String>,
    /// `user:password`
    pub basic: Option<String>,
    pub bearer: Option<String>,
    /// `name=value`
    pub api_key: Option<String>,
    pub api_key_in_query: bool,
    pub env: Option<String>,
    pub no_history: bool,
    pub include_headers: bool,
    pub json: bool,
}

impl SendOptions {
    /// Build the request described by the options
    pub fn to_request(&self) -> Result<ApiRequest> {
        let method: HttpMethod = self.method.parse().map_err(anyhow::Error::msg)?;
        let mut request = ApiRequest::new(method, self.url.clone());

        for header in &self.headers {
            let (name, value) = split_header(header)
                .with_context(|| format!("Invalid header '{}', expected 'Name: value'", header))?;
            set_header(&mut request.headers, &name, value);
        }
        for param in &self.params {
            let (name, value) = param
                .split_once('=')
                .with_context(|| format!("Invalid parameter '{}', expected name=value", param))?;
            request.params.insert(name.to_string(), value.to_string());
        }

        if let Some(data) = &self.data {
            request.body = match data.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read body from {}", path))?,
                None => data.clone(),
            };
        }
        if let Some(body_type) = &self.body_type {
            request.body_type = body_type.parse::<BodyType>().map_err(anyhow::Error::msg)?;
        }

        if let Some(basic) = &self.basic {
            let (username, password) = basic
                .split_once(':')
                .context("Basic auth expects user:password")?;
            request.auth_type = AuthType::Basic;
            request.auth_data.insert("username".into(), username.into());
            request.auth_data.insert("password".into(), password.into());
        } else if let Some(token) = &self.bearer {
            request.auth_type = AuthType::Bearer;
            request.auth_data.insert("token".into(), token.clone());
        } else if let Some(api_key) = &self.api_key {
            let (key, value) = api_key
                .split_once('=')
                .context("API key expects name=value")?;
            request.auth_type = AuthType::ApiKey;
            request.auth_data.insert("key".into(), key.into());
            request.auth_data.insert("value".into(), value.into());
            let location = if self.api_key_in_query { "query" } else { "header" };
            request.auth_data.insert("location".into(), location.into());
        }

        Ok(request)
    }
}

fn split_header(header: &str) -> Option<(String, String)> {
    let (name, value) = header.split_once(':').or_else(|| header.split_once('='))?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Send a single request and print the response
pub async fn send(paths: &AppPaths, options: &SendOptions) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let request = options.to_request()?;
    send_prepared(
        &ws,
        &request,
        options.env.as_deref(),
        !options.no_history,
        options.include_headers,
        OutputFormat::from_flag(options.json),
    )
    .await
}

/// Send an already-built request (used by `send`, `history resend` and `collection run`)
pub(crate) async fn send_prepared(
    ws: &Workspace,
    request: &ApiRequest,
    env: Option<&str>,
    record: bool,
    include_headers: bool,
    format: OutputFormat,
) -> Result<()> {
    let environment = resolve_environment(&ws.db, env)?;
    if let Some(environment) = &environment {
        tracing::debug!(environment = %environment.name, "Using environment");
    }

    let client = ws.client()?;
    let Some(response) =
        session::send_request(&ws.db, &client, request, environment.as_ref(), record).await?
    else {
        println!("Request cancelled");
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Summary => {
            let formatter = if ws.config.editor.auto_format_json {
                ws.formatter()
            } else {
                JsonFormatter::new(0, false)
            };
            print_response(&response, &formatter, include_headers);
        }
    }

    if let Some(error) = &response.error {
        bail!("Request failed: {}", error);
    }
    Ok(())
}

/// Start the interactive session
pub async fn start_session(paths: &AppPaths) -> Result<()> {
    let ws = Workspace::open(paths)?;
    let client = ws.client()?;
    let mut session = Session::new(ws.db, client, &ws.config.editor)?;
    session.run().await
}

/// Show, get or set configuration values
pub fn config_show(paths: &AppPaths) -> Result<()> {
    ensure_initialized(paths)?;
    let config = load_config(paths)?;
    println!("Config: {}", paths.config.display());
    println!("{}", "=".repeat(50));
    for key in Config::KEYS {
        println!("{:<26} {}", key, config.get(key)?);
    }
    Ok(())
}

pub fn config_get(paths: &AppPaths, key: &str) -> Result<()> {
    ensure_initialized(paths)?;
    let config = load_config(paths)?;
    println!("{}", config.get(key)?);
    Ok(())
}

pub fn config_set(paths: &AppPaths, key: &str, value: &str) -> Result<()> {
    ensure_initialized(paths)?;
    let mut config = load_config(paths)?;
    config.set(key, value)?;
    save_config(paths, &config)?;
    println!("✓ {} = {}", key, config.get(key)?);
    Ok(())
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max.saturating_sub(3)).collect::<String>())
    }
}

pub(crate) fn ensure_initialized(paths: &AppPaths) -> Result<()> {
    if !paths.is_initialized() {
        bail!("api-tester not initialized. Run `api-tester init` first.");
    }
    Ok(())
}

/// Read text from a file, or stdin when the path is `-` or absent
pub(crate) fn read_input(path: Option<&Path>) -> Result<String> {
    use std::io::Read;
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}
