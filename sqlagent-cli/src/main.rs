//! # sqlagent CLI
//!
//! Ask a SQL database questions in plain language.
//!
//! Usage:
//!   sqlagent                      chat with the Chinook sample database
//!   sqlagent --db example.db      chat with a local SQLite file
//!   sqlagent tables               list the tables and exit
//!   sqlagent prompt               print the system prompt and exit
//!
//! Examples:
//!   OPENAI_API_KEY=sk-... sqlagent
//!   sqlagent --db example.db --prompt builtin --stateless

mod config;

use clap::{Parser, Subcommand};
use config::AppConfig;
use sqlagent_agent::{ReactAgent, SessionLoop};
use sqlagent_core::error::provider_failed;
use sqlagent_core::{OpenAIProvider, SqlDatabase, SqlToolkit};
use sqlagent_error::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sqlagent")]
#[command(author, version, about = "sqlagent - talk to a SQL database through an LLM agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Open an existing SQLite file instead of downloading a script
    #[arg(long, global = true, conflicts_with = "script_url")]
    db: Option<PathBuf>,

    /// SQL script to load into an in-memory database (default: Chinook)
    #[arg(long, global = true)]
    script_url: Option<String>,

    /// Chat model
    #[arg(long, global = true, default_value = "gpt-4o-mini")]
    model: String,

    /// Sampling temperature (provider default when omitted)
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Result limit the system prompt asks the model to respect
    #[arg(long, global = true, default_value = "5")]
    top_k: usize,

    /// SQL dialect named in the system prompt
    #[arg(long, global = true, default_value = "SQLite")]
    dialect: String,

    /// System prompt source: `hub`, `builtin`, or a file path
    #[arg(long, global = true, default_value = "hub")]
    prompt: String,

    /// Maximum model calls per query
    #[arg(long, global = true, default_value = "25")]
    max_steps: usize,

    /// Start every query from an empty conversation
    #[arg(long, global = true)]
    stateless: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq, Debug)]
enum Commands {
    /// Interactive question loop (default)
    Chat,
    /// Print the database tables and exit
    Tables,
    /// Print the formatted system prompt and exit
    Prompt,
}

/// Render names the way the start-up banner shows them: `['a', 'b']`
fn list_repr(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("'{}'", s)).collect();
    format!("[{}]", quoted.join(", "))
}

async fn provision(config: &AppConfig) -> Result<SqlDatabase> {
    SqlDatabase::provision(&config.database).await
}

/// Resolve the prompt template and fill in dialect and result limit.
async fn system_prompt(config: &AppConfig) -> Result<String> {
    let template = config.prompt.resolve().await?.single_message()?;
    println!("Input variables: {}", list_repr(template.input_variables()));

    let vars = config.prompt_variables();
    let vars: Vec<(&str, &str)> = vars.iter().map(|(k, v)| (*k, v.as_str())).collect();
    template.format(&vars)
}

async fn chat(config: &AppConfig) -> Result<()> {
    let db = Arc::new(provision(config).await?);
    println!("Available tables: {}", list_repr(&db.table_names()?));

    let llm = Arc::new(OpenAIProvider::new(config.provider_config()?).map_err(provider_failed)?);
    let toolkit = SqlToolkit::new(db, llm.clone());
    let system_message = system_prompt(config).await?;
    tracing::debug!(chars = system_message.len(), "system prompt ready");

    let agent = ReactAgent::with_config(system_message, toolkit, llm, config.agent_config());

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut session =
        SessionLoop::with_options(&agent, stdin.lock(), stdout.lock(), config.session_options());
    let summary = session.run().await?;

    let usage = agent.usage();
    tracing::info!(
        turns = summary.turns,
        failed = summary.failed_turns,
        calls = usage.total_calls,
        tokens = usage.total_tokens(),
        "session ended"
    );
    Ok(())
}

async fn list_tables(config: &AppConfig) -> Result<()> {
    let db = provision(config).await?;
    for name in db.table_names()? {
        println!("{}", name);
    }
    Ok(())
}

async fn show_prompt(config: &AppConfig) -> Result<()> {
    let system_message = system_prompt(config).await?;
    println!("{}", system_message);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr and stay quiet by default so they don't interleave
    // with the prompt
    let default_filter = if cli.verbose { "sqlagent=debug" } else { "sqlagent=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match AppConfig::from_cli(&cli, |key| std::env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(&config).await,
        Commands::Tables => list_tables(&config).await,
        Commands::Prompt => show_prompt(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
