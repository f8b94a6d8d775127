//! Command-line interface parsing and handling
//!
//! Every invocation opens the state file, runs one command against a
//! [`ChatApp`], and exits.

pub mod model_list;
pub mod say;
pub mod workspace;


use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::cli::model_list::list_models;
use crate::cli::say::run_say;
use crate::core::app::ChatApp;
use crate::core::config::{path_display, Config, CONFIG_KEYS};
use crate::core::ids::TimestampIdGenerator;
use crate::core::repository::ConversationRepository;
use crate::core::store::FileStore;
use crate::core::transport::HttpTransport;

#[derive(Parser)]
#[command(name = "chatdeck", version)]
#[command(about = "Project-organized chats with streamed completions from OpenAI-compatible APIs")]
#[command(
    long_about = "Chatdeck keeps chats grouped into projects in a local state file and streams \
assistant replies from any OpenAI-compatible chat completions endpoint.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY    API key used when none has been stored with 'chatdeck set-key'\n\
  OPENAI_BASE_URL   Custom API base URL (optional, defaults to https://api.openai.com/v1)\n\
  CHATDECK_LOG      Log filter, e.g. 'chatdeck=debug' (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State file to use instead of the configured one
    #[arg(long, global = true, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// API base URL, overriding OPENAI_BASE_URL and the config
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Model to use for this invocation
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, remove and list projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Create, remove and list chats
    Chat {
        #[command(subcommand)]
        command: ChatCommands,
    },
    /// Send a message to a chat and stream the reply to stdout
    Say {
        /// Chat to send to
        #[arg(long, value_name = "CHAT_ID")]
        chat: String,
        /// Message text (can be multiple words)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// List chat models offered by the API
    Models,
    /// Store the API key in the state file
    SetKey {
        /// API key; pass an empty string to clear it
        key: String,
    },
    /// Set configuration values, or print them when no value is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    Add {
        #[arg(required = true, trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Remove a project with all of its chats
    Rm { id: String },
    /// List projects
    List,
}

#[derive(Subcommand)]
pub enum ChatCommands {
    /// Create a chat in a project
    Add {
        /// Project that will own the chat
        #[arg(long, value_name = "PROJECT_ID")]
        project: String,
        #[arg(required = true, trailing_var_arg = true)]
        name: Vec<String>,
    },
    /// Remove a chat and its messages
    Rm { id: String },
    /// List chats, optionally for one project
    List {
        #[arg(long, value_name = "PROJECT_ID")]
        project: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    crate::logging::init();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let mut stdout = io::stdout();
    run(args, &config_path, &mut stdout).await
}

/// Execute one parsed command. Output that is not streamed goes to `out`.
pub async fn run(args: Args, config_path: &Path, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load_from_path(config_path)?;
    debug!(path = %path_display(config_path), "Loaded config");

    match args.command {
        Commands::Set { key, value } => {
            let Some(key) = key.filter(|_| !value.is_empty()) else {
                return print_config(&config, out);
            };
            config.set_value(&key, &value.join(" "))?;
            config.save_to_path(config_path)?;
            writeln!(out, "✅ Set {key} to: {}", value.join(" "))?;
            return Ok(());
        }
        Commands::Unset { key } => {
            config.unset_value(&key)?;
            config.save_to_path(config_path)?;
            writeln!(out, "✅ Unset {key}")?;
            return Ok(());
        }
        _ => {}
    }

    let mut app = open_app(
        &config,
        args.state.as_deref(),
        args.base_url.as_deref(),
        args.model.as_deref(),
    )?;

    match args.command {
        Commands::Project { command } => match command {
            ProjectCommands::Add { name } => workspace::add_project(&mut app, &name.join(" "), out),
            ProjectCommands::Rm { id } => workspace::remove_project(&mut app, &id, out),
            ProjectCommands::List => workspace::list_projects(&app, out),
        },
        Commands::Chat { command } => match command {
            ChatCommands::Add { project, name } => {
                workspace::add_chat(&mut app, &project, &name.join(" "), out)
            }
            ChatCommands::Rm { id } => workspace::remove_chat(&mut app, &id, out),
            ChatCommands::List { project } => workspace::list_chats(&app, project.as_deref(), out),
        },
        Commands::Say { chat, text } => run_say(&mut app, &chat, &text.join(" ")).await,
        Commands::Models => list_models(&mut app, out).await,
        Commands::SetKey { key } => {
            app.set_api_key(&key)?;
            if key.trim().is_empty() {
                writeln!(out, "✅ Cleared stored API key")?;
            } else {
                writeln!(out, "✅ Stored API key")?;
            }
            Ok(())
        }
        Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
    }
}

fn print_config(config: &Config, out: &mut impl Write) -> Result<(), Box<dyn Error>> {
    writeln!(out, "Current configuration:")?;
    for (key, value) in config.entries() {
        match value {
            Some(value) => writeln!(out, "  {key}: {value}")?,
            None => writeln!(out, "  {key}: (unset)")?,
        }
    }
    writeln!(out)?;
    writeln!(out, "Available keys: {}", CONFIG_KEYS.join(", "))?;
    Ok(())
}

/// Flag, then `OPENAI_BASE_URL`, then the config file, then the default.
pub(crate) fn resolve_base_url(flag: Option<&str>, env: Option<String>, config: &Config) -> String {
    flag.map(str::to_string)
        .or(env)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| config.base_url().to_string())
}

pub(crate) fn open_app(
    config: &Config,
    state_override: Option<&Path>,
    base_url: Option<&str>,
    model: Option<&str>,
) -> Result<ChatApp, Box<dyn Error>> {
    let store = match state_override.map(Path::to_path_buf).or_else(|| config.state_path.clone()) {
        Some(path) => FileStore::new(path),
        None => FileStore::default_location()?,
    };
    debug!(path = %path_display(store.path()), "Opening conversation state");
    let repository =
        ConversationRepository::open(Box::new(store), Box::new(TimestampIdGenerator::new()))?;

    let mut settings = config.app_settings();
    if let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) {
        settings.model = model.to_string();
    }
    let base_url = resolve_base_url(base_url, std::env::var("OPENAI_BASE_URL").ok(), config);
    let transport = Arc::new(HttpTransport::new(base_url));

    let mut app = ChatApp::new(repository, transport, settings);
    app.set_fallback_api_key(std::env::var("OPENAI_API_KEY").ok());
    Ok(app)
}
