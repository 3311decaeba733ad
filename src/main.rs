//! api-tester - a local-first REST API testing tool
//!
//! Send requests, keep a history, organize saved requests into collections
//! and switch variables between environments.

use std::path::PathBuf;

use api_tester::commands::{self, collection, data, env, history, manifest, OutputFormat, SendOptions};
use api_tester::config::{self, AppPaths};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "api-tester")]
#[command(author, version, about = "A local-first REST API testing tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Request definition shared by `send` and `collection add-request`
#[derive(Args)]
struct RequestArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS)
    method: String,

    /// Request URL; may contain {{variables}}
    url: String,

    /// Header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query parameter as name=value (repeatable)
    #[arg(short = 'q', long = "param")]
    params: Vec<String>,

    /// Request body, or @file to read it from a file
    #[arg(short, long)]
    data: Option<String>,

    /// Body type: json, form-data, raw, x-www-form-urlencoded
    #[arg(long)]
    body_type: Option<String>,

    /// Basic auth as user:password
    #[arg(long = "auth-basic", conflicts_with_all = ["bearer", "api_key"])]
    basic: Option<String>,

    /// Bearer token
    #[arg(long = "auth-bearer", conflicts_with = "api_key")]
    bearer: Option<String>,

    /// API key as name=value
    #[arg(long = "auth-key")]
    api_key: Option<String>,

    /// Send the API key as a query parameter instead of a header
    #[arg(long = "auth-key-in-query", requires = "api_key")]
    api_key_in_query: bool,
}

impl RequestArgs {
    fn into_options(self) -> SendOptions {
        SendOptions {
            method: self.method,
            url: self.url,
            headers: self.headers,
            params: self.params,
            data: self.data,
            body_type: self.body_type,
            basic: self.basic,
            bearer: self.bearer,
            api_key: self.api_key,
            api_key_in_query: self.api_key_in_query,
            ..SendOptions::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize api-tester (first-time setup)
    Init,

    /// Send a request and print the response
    Send {
        #[command(flatten)]
        request: RequestArgs,

        /// Environment to resolve variables from (defaults to the active one)
        #[arg(short, long)]
        env: Option<String>,

        /// Don't record the request in history
        #[arg(long)]
        no_history: bool,

        /// Print response headers
        #[arg(short, long)]
        include: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive request session
    Session,

    /// Request history
    History {
        #[command(subcommand)]
        operation: HistoryCommand,
    },

    /// Environments and their variables
    Env {
        #[command(subcommand)]
        operation: EnvCommand,
    },

    /// Collections of saved requests
    Collection {
        #[command(subcommand)]
        operation: CollectionCommand,
    },

    /// Export history, environments and collections to a JSON file
    Export {
        /// Output file (defaults to the exports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// What to export: all, history, environments, collections
        #[arg(short, long, default_value = "all")]
        scope: String,
    },

    /// Import an exported JSON file
    Import {
        /// File to import
        input: PathBuf,

        /// Replace existing data instead of merging
        #[arg(long)]
        replace: bool,
    },

    /// JSON tools: prettify, minify, validate, stats, flatten, extract, escape, unescape
    Format {
        /// Operation to apply
        #[arg(default_value = "prettify")]
        operation: String,

        /// Input file ("-" or absent reads stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Indentation width
        #[arg(long)]
        indent: Option<usize>,

        /// Sort object keys
        #[arg(long)]
        sort_keys: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two JSON files
    Compare {
        left: PathBuf,
        right: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        operation: Option<ConfigCommand>,
    },

    /// Inspect and run the project manifest
    Manifest {
        /// Manifest file
        #[arg(short, long, global = true)]
        file: Option<PathBuf>,

        #[command(subcommand)]
        operation: ManifestCommand,
    },
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List recent requests, newest first
    List {
        /// Match URL or method
        #[arg(short, long)]
        query: Option<String>,

        /// Only this method
        #[arg(short, long)]
        method: Option<String>,

        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a history entry
    Show {
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a recorded request again
    Resend {
        id: i64,

        /// Environment to resolve variables from
        #[arg(short, long)]
        env: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a history entry as a curl command
    Curl { id: i64 },

    /// Delete a history entry
    Delete { id: i64 },

    /// Delete all history
    Clear,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// List environments (* marks the active one)
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an environment's variables
    Show {
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an environment
    Create {
        name: String,

        /// Variables as KEY=VALUE
        vars: Vec<String>,

        /// Make it the active environment
        #[arg(short, long)]
        activate: bool,
    },

    /// Set a variable
    Set {
        name: String,
        key: String,
        value: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Remove a variable
    Unset { name: String, key: String },

    /// Make an environment active; without a name, deactivate all
    Activate { name: Option<String> },

    /// Copy an environment under a new name
    Duplicate { name: String, new_name: String },

    /// Delete an environment
    Delete { name: String },
}

#[derive(Subcommand)]
enum CollectionCommand {
    /// List collections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a collection
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Delete a collection
    Delete { collection: String },

    /// Rename a collection
    Rename { collection: String, new_name: String },

    /// Show a collection as a tree
    Tree {
        collection: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a folder
    AddFolder {
        collection: String,
        name: String,

        /// Parent folder id or name
        #[arg(short, long)]
        parent: Option<String>,

        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Save a request into a collection
    AddRequest {
        collection: String,

        /// Name of the saved request
        #[arg(short, long)]
        name: String,

        /// Parent folder id or name
        #[arg(short, long)]
        parent: Option<String>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Save a history entry into a collection
    Save {
        collection: String,

        /// History entry id
        history_id: i64,

        #[arg(short, long)]
        name: String,

        /// Parent folder id or name
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Remove an item and everything below it
    Remove { collection: String, item: String },

    /// Move an item under another folder (or the root when omitted)
    Move {
        collection: String,
        item: String,

        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Rename an item or change its description
    Update {
        collection: String,
        item: String,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Copy an item, including a folder's contents
    Duplicate {
        collection: String,
        item: String,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Search all collections
    Search {
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Counts across all collections
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export a collection to a JSON file
    Export {
        collection: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a collection from a JSON file
    Import { input: PathBuf },

    /// Send a saved request
    Run {
        collection: String,
        item: String,

        #[arg(short, long)]
        env: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print a value
    Get { key: String },

    /// Change a value
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum ManifestCommand {
    /// Print the manifest
    Show,

    /// Check for errors and warnings
    Validate,

    /// Print the steps a workflow expands to
    Plan {
        /// Workflow (defaults to the run button)
        workflow: Option<String>,
    },

    /// Run a workflow
    Run {
        /// Workflow (defaults to the run button)
        workflow: Option<String>,

        /// Report steps without executing them
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the deployment command
    Deploy {
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = AppPaths::new()?;

    let level = config::load_config(&paths)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    config::init_logging(&level)?;

    match cli.command {
        Commands::Init => commands::init(&paths)?,
        Commands::Send {
            request,
            env,
            no_history,
            include,
            json,
        } => {
            let options = SendOptions {
                env,
                no_history,
                include_headers: include,
                json,
                ..request.into_options()
            };
            commands::send(&paths, &options).await?;
        }
        Commands::Session => commands::start_session(&paths).await?,
        Commands::History { operation } => match operation {
            HistoryCommand::List {
                query,
                method,
                limit,
                json,
            } => history::list(
                &paths,
                query.as_deref(),
                method.as_deref(),
                limit,
                OutputFormat::from_flag(json),
            )?,
            HistoryCommand::Show { id, json } => {
                history::show(&paths, id, OutputFormat::from_flag(json))?
            }
            HistoryCommand::Resend { id, env, json } => {
                history::resend(&paths, id, env.as_deref(), OutputFormat::from_flag(json)).await?
            }
            HistoryCommand::Curl { id } => history::curl(&paths, id)?,
            HistoryCommand::Delete { id } => history::delete(&paths, id)?,
            HistoryCommand::Clear => history::clear(&paths)?,
        },
        Commands::Env { operation } => match operation {
            EnvCommand::List { json } => env::list(&paths, OutputFormat::from_flag(json))?,
            EnvCommand::Show { name, json } => {
                env::show(&paths, &name, OutputFormat::from_flag(json))?
            }
            EnvCommand::Create {
                name,
                vars,
                activate,
            } => env::create(&paths, &name, &vars, activate)?,
            EnvCommand::Set {
                name,
                key,
                value,
                description,
            } => env::set(&paths, &name, &key, &value, description.as_deref())?,
            EnvCommand::Unset { name, key } => env::unset(&paths, &name, &key)?,
            EnvCommand::Activate { name } => env::activate(&paths, name.as_deref())?,
            EnvCommand::Duplicate { name, new_name } => env::duplicate(&paths, &name, &new_name)?,
            EnvCommand::Delete { name } => env::delete(&paths, &name)?,
        },
        Commands::Collection { operation } => run_collection(&paths, operation).await?,
        Commands::Export { output, scope } => data::export(&paths, output.as_deref(), &scope)?,
        Commands::Import { input, replace } => data::import(&paths, &input, replace)?,
        Commands::Format {
            operation,
            input,
            indent,
            sort_keys,
            json,
        } => data::format(
            &paths,
            input.as_deref(),
            &operation,
            indent,
            sort_keys,
            OutputFormat::from_flag(json),
        )?,
        Commands::Compare { left, right, json } => {
            data::compare(&paths, &left, &right, OutputFormat::from_flag(json))?
        }
        Commands::Config { operation } => match operation {
            None => commands::config_show(&paths)?,
            Some(ConfigCommand::Get { key }) => commands::config_get(&paths, &key)?,
            Some(ConfigCommand::Set { key, value }) => commands::config_set(&paths, &key, &value)?,
        },
        Commands::Manifest { file, operation } => {
            let file = file.as_deref();
            match operation {
                ManifestCommand::Show => manifest::show(file)?,
                ManifestCommand::Validate => manifest::validate(file)?,
                ManifestCommand::Plan { workflow } => manifest::plan(file, workflow.as_deref())?,
                ManifestCommand::Run {
                    workflow,
                    dry_run,
                    json,
                } => {
                    manifest::run(file, workflow.as_deref(), dry_run, OutputFormat::from_flag(json))
                        .await?
                }
                ManifestCommand::Deploy { dry_run, json } => {
                    manifest::deploy(file, dry_run, OutputFormat::from_flag(json)).await?
                }
            }
        }
    }

    Ok(())
}

async fn run_collection(paths: &AppPaths, operation: CollectionCommand) -> anyhow::Result<()> {
    match operation {
        CollectionCommand::List { json } => collection::list(paths, OutputFormat::from_flag(json)),
        CollectionCommand::Create { name, description } => {
            collection::create(paths, &name, &description)
        }
        CollectionCommand::Delete { collection: c } => collection::delete(paths, &c),
        CollectionCommand::Rename {
            collection: c,
            new_name,
        } => collection::rename(paths, &c, &new_name),
        CollectionCommand::Tree { collection: c, json } => {
            collection::tree(paths, &c, OutputFormat::from_flag(json))
        }
        CollectionCommand::AddFolder {
            collection: c,
            name,
            parent,
            description,
        } => collection::add_folder(paths, &c, &name, parent.as_deref(), &description),
        CollectionCommand::AddRequest {
            collection: c,
            name,
            parent,
            request,
        } => {
            let request = request.into_options().to_request()?;
            collection::add_request(paths, &c, request, &name, parent.as_deref())
        }
        CollectionCommand::Save {
            collection: c,
            history_id,
            name,
            parent,
        } => collection::add_from_history(paths, &c, history_id, &name, parent.as_deref()),
        CollectionCommand::Remove { collection: c, item } => collection::remove(paths, &c, &item),
        CollectionCommand::Move {
            collection: c,
            item,
            parent,
        } => collection::move_item(paths, &c, &item, parent.as_deref()),
        CollectionCommand::Update {
            collection: c,
            item,
            name,
            description,
        } => collection::update(paths, &c, &item, name.as_deref(), description.as_deref()),
        CollectionCommand::Duplicate {
            collection: c,
            item,
            name,
        } => collection::duplicate(paths, &c, &item, name.as_deref()),
        CollectionCommand::Search { query, json } => {
            collection::search(paths, &query, OutputFormat::from_flag(json))
        }
        CollectionCommand::Stats { json } => collection::stats(paths, OutputFormat::from_flag(json)),
        CollectionCommand::Export { collection: c, output } => {
            collection::export(paths, &c, output.as_deref())
        }
        CollectionCommand::Import { input } => collection::import(paths, &input),
        CollectionCommand::Run {
            collection: c,
            item,
            env,
            json,
        } => collection::run(paths, &c, &item, env.as_deref(), OutputFormat::from_flag(json)).await,
    }
}
