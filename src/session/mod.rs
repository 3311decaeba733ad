//! Interactive request session
//!
//! A REPL that holds the request being composed, sends it on a background task that
//! Ctrl-C abandons, and records successful responses in history.

use anyhow::{bail, Context, Result};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::future::Future;

use crate::client::ApiClient;
use crate::collections::CollectionManager;
use crate::config::EditorConfig;
use crate::curl::to_curl;
use crate::db::Database;
use crate::format::JsonFormatter;
use crate::models::{
    remove_header, set_header, ApiRequest, ApiResponse, AuthType, Environment, KeyValueMap,
};

/// Environment to use for a send: the named one, or the active one
pub fn resolve_environment(db: &Database, name: Option<&str>) -> Result<Option<Environment>> {
    match name {
        Some(name) => db
            .get_environment(name)?
            .map(Some)
            .with_context(|| format!("Environment not found: {}", name)),
        None => db.get_active_environment(),
    }
}

/// Validate, send on a background task and record the exchange when a response came back.
/// Returns `None` when the send was interrupted with Ctrl-C.
pub async fn send_request(
    db: &Database,
    client: &ApiClient,
    request: &ApiRequest,
    environment: Option<&Environment>,
    record: bool,
) -> Result<Option<ApiResponse>> {
    send_request_until(db, client, request, environment, record, interrupted()).await
}

/// Like [`send_request`], abandoning the request once `cancel` completes
pub async fn send_request_until(
    db: &Database,
    client: &ApiClient,
    request: &ApiRequest,
    environment: Option<&Environment>,
    record: bool,
    cancel: impl Future<Output = ()>,
) -> Result<Option<ApiResponse>> {
    let variables = environment
        .map(Environment::variables_map)
        .unwrap_or_default();
    crate::client::resolve_request(request, &variables).validate()?;

    let mut handle = client.dispatch(request.clone(), variables);
    let response = tokio::select! {
        joined = &mut handle => joined.context("Request task failed")?,
        _ = cancel => {
            handle.abort();
            tracing::info!(url = %request.url, "Request cancelled");
            return Ok(None);
        }
    };

    if record && response.error.is_none() {
        db.save_to_history(request, &response)?;
    }
    Ok(Some(response))
}

async fn interrupted() {
    // without a signal handler the send can only finish or time out
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Print a response the way `send` and the session show it
pub fn print_response(response: &ApiResponse, formatter: &JsonFormatter, show_headers: bool) {
    println!(
        "{}  ({}, {})",
        response.status_line(),
        response.formatted_time(),
        response.formatted_size()
    );
    if response.error.is_some() {
        return;
    }
    if show_headers {
        for (name, value) in &response.headers {
            println!("{}: {}", name, value);
        }
    }
    let body = if response.is_json() {
        formatter.safe_format(&response.body, None)
    } else {
        response.body.clone()
    };
    if !body.is_empty() {
        println!();
        println!("{}", body);
    }
}

pub struct Session {
    db: Database,
    client: ApiClient,
    formatter: JsonFormatter,
    auto_format: bool,
    request: ApiRequest,
    environment: Option<Environment>,
    last_response: Option<ApiResponse>,
}

impl Session {
    pub fn new(db: Database, client: ApiClient, editor: &EditorConfig) -> Result<Self> {
        let environment = db.get_active_environment()?;
        Ok(Self {
            db,
            client,
            formatter: JsonFormatter::new(editor.indent, editor.sort_keys),
            auto_format: editor.auto_format_json,
            request: ApiRequest::default(),
            environment,
            last_response: None,
        })
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Start the prompt loop
    pub async fn run(&mut self) -> Result<()> {
        println!("api-tester interactive session");
        match &self.environment {
            Some(env) => println!("Active environment: {}", env.name),
            None => println!("No active environment"),
        }
        println!("Type /help for commands, /exit to quit.");
        println!();

        let mut rl = DefaultEditor::new()?;
        loop {
            let prompt = format!("{} {}> ", self.request.method, short_url(&self.request.url));
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match self.handle_command(trimmed).await {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => println!("✗ Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted. Use /exit to quit.");
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    println!("Error: {:?}", err);
                    break;
                }
            }
        }

        println!("Session ended.");
        Ok(())
    }

    /// Apply one command; returns true when the session should end
    pub async fn handle_command(&mut self, line: &str) -> Result<bool> {
        let (cmd, rest) = match line.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        match cmd {
            "/exit" | "/quit" => return Ok(true),
            "/help" => print_help(),
            "/method" => {
                self.request.method = required(rest, "/method <METHOD>")?
                    .parse()
                    .map_err(anyhow::Error::msg)?;
            }
            "/url" => self.request.url = required(rest, "/url <URL>")?.to_string(),
            "/header" => match args.as_slice() {
                [] => bail!("Usage: /header <name> [value]"),
                [name] => {
                    remove_header(&mut self.request.headers, name);
                }
                [name, value @ ..] => set_header(&mut self.request.headers, name, value.join(" ")),
            },
            "/param" => set_pair(&mut self.request.params, &args, "/param <name> [value]")?,
            "/body" => self.request.body = rest.to_string(),
            "/body-type" => {
                self.request.body_type = required(rest, "/body-type <type>")?
                    .parse()
                    .map_err(anyhow::Error::msg)?;
            }
            "/auth" => self.set_auth(&args)?,
            "/env" => self.set_environment(args.first().copied())?,
            "/send" => self.send().await?,
            "/save" => self.save(&args)?,
            "/curl" => println!("{}", to_curl(&self.request)),
            "/show" => println!("{}", serde_json::to_string_pretty(&self.request)?),
            "/new" => {
                self.request = ApiRequest::default();
                self.last_response = None;
                println!("✓ New request");
            }
            other if other.starts_with('/') => bail!("Unknown command: {}. Try /help", other),
            _ => bail!("Commands start with '/'. Try /help"),
        }
        Ok(false)
    }

    fn set_auth(&mut self, args: &[&str]) -> Result<()> {
        let Some(kind) = args.first() else {
            bail!("Usage: /auth none | basic <user> <pass> | bearer <token> | api_key <key> <value> [header|query]");
        };
        let auth_type: AuthType = kind.parse().map_err(anyhow::Error::msg)?;
        let fields: &[&str] = match auth_type {
            AuthType::None => &[],
            AuthType::Basic => &["username", "password"],
            AuthType::Bearer => &["token"],
            AuthType::ApiKey => &["key", "value", "location"],
        };
        let values = &args[1..];
        let required_count = if auth_type == AuthType::ApiKey { 2 } else { fields.len() };
        if values.len() < required_count {
            bail!("{} auth needs: {}", auth_type, fields.join(", "));
        }

        self.request.auth_type = auth_type;
        self.request.auth_data = fields
            .iter()
            .zip(values)
            .map(|(field, value)| (field.to_string(), value.to_string()))
            .collect();
        Ok(())
    }

    fn set_environment(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            None => match &self.environment {
                Some(env) => println!("Environment: {}", env.name),
                None => println!("No environment selected"),
            },
            Some("none") => {
                self.environment = None;
                println!("✓ Environment cleared");
            }
            Some(name) => {
                self.environment = resolve_environment(&self.db, Some(name))?;
                println!("✓ Using environment '{}'", name);
            }
        }
        Ok(())
    }

    async fn send(&mut self) -> Result<()> {
        let response = send_request(
            &self.db,
            &self.client,
            &self.request,
            self.environment.as_ref(),
            true,
        )
        .await?;
        let Some(response) = response else {
            println!("Request cancelled");
            return Ok(());
        };

        let formatter = if self.auto_format {
            self.formatter.clone()
        } else {
            JsonFormatter::new(0, false)
        };
        print_response(&response, &formatter, false);
        self.last_response = Some(response);
        Ok(())
    }

    fn save(&mut self, args: &[&str]) -> Result<()> {
        let Some((name, collection)) = args.split_first() else {
            bail!("Usage: /save <name> [collection]");
        };
        let manager = CollectionManager::new(&self.db)?;
        let target = match collection.first() {
            Some(collection) => manager
                .resolve(collection)?
                .with_context(|| format!("Collection not found: {}", collection))?,
            None => manager
                .list_collections()?
                .into_iter()
                .next()
                .context("No collections available")?,
        };

        let mut request = self.request.clone();
        request.name = name.to_string();
        manager.add_request(&target.id, request, None, name)?;
        println!("✓ Saved '{}' to {}", name, target.name);
        Ok(())
    }
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str> {
    if value.is_empty() {
        bail!("Usage: {}", usage);
    }
    Ok(value)
}

/// `<name> <value...>` sets, `<name>` alone removes
fn set_pair(map: &mut KeyValueMap, args: &[&str], usage: &str) -> Result<()> {
    match args {
        [] => bail!("Usage: {}", usage),
        [name] => {
            map.shift_remove(*name);
        }
        [name, value @ ..] => {
            map.insert(name.to_string(), value.join(" "));
        }
    }
    Ok(())
}

fn short_url(url: &str) -> String {
    const MAX: usize = 40;
    if url.is_empty() {
        "(no url)".to_string()
    } else if url.chars().count() > MAX {
        format!("{}...", url.chars().take(MAX - 3).collect::<String>())
    } else {
        url.to_string()
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /method <METHOD>            Set the HTTP method");
    println!("  /url <URL>                  Set the URL");
    println!("  /header <name> [value]      Set or remove a header");
    println!("  /param <name> [value]       Set or remove a query parameter");
    println!("  /body <text>                Set the body (empty clears it)");
    println!("  /body-type <type>           json, form-data, raw, x-www-form-urlencoded");
    println!("  /auth <type> [args]         none | basic u p | bearer t | api_key k v [header|query]");
    println!("  /env [name|none]            Show or select the environment");
    println!("  /send                       Send the request");
    println!("  /save <name> [collection]   Save the request to a collection");
    println!("  /curl                       Print the request as a curl command");
    println!("  /show                       Print the request as JSON");
    println!("  /new                        Start a new request");
    println!("  /exit                       Leave the session");
}
