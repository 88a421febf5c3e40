//! # askbase CLI
//!
//! The `askbase` binary is the operator interface for the service. It
//! provides commands for database initialization, user provisioning,
//! retrieval debugging, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! askbase --config ./config/askbase.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askbase init` | Create the SQLite database and run schema migrations |
//! | `askbase serve` | Start the HTTP API server |
//! | `askbase user add` | Create a user with a role and an API token |
//! | `askbase user list` | List users and their roles |
//! | `askbase search "<query>"` | Run role-scoped retrieval directly |
//! | `askbase ask "<query>"` | Ask a question through the full chat pipeline |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! askbase init --config ./config/askbase.toml
//!
//! # Provision an admin
//! askbase user add --email ops@example.com --role admin
//!
//! # Inspect what the hr role would retrieve
//! askbase search "parental leave" --role hr
//!
//! # Stream an answer with citations
//! askbase ask "how do I rotate the API keys?" --role developer
//!
//! # Start the API for the web frontend
//! askbase serve --config ./config/askbase.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use askbase::{chat, config, db, migrate, retrieval, server, users};

/// askbase — a role-scoped document ingestion and retrieval-augmented chat
/// service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askbase.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askbase",
    about = "askbase — role-scoped document ingestion and retrieval-augmented chat",
    version,
    long_about = "askbase lets an organization upload documents, extracts and indexes their \
    text, and answers natural-language questions by retrieving relevant passages and \
    streaming a grounded, cited answer back to the caller."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/askbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables (users,
    /// documents, chunks, conversations, messages, chunks_fts). This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, ingest, and chat endpoints.
    Serve,

    /// Manage users and their API tokens.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Run role-scoped retrieval directly and print the results.
    ///
    /// Useful for verifying what a given role can see without going
    /// through the model.
    Search {
        /// The search query string.
        query: String,

        /// Role to retrieve as: `admin`, `hr`, `developer`, or anything
        /// else for the most restrictive scope.
        #[arg(long, default_value = "admin")]
        role: String,
    },

    /// Ask a question through the full retrieval + chat pipeline.
    ///
    /// Streams the answer to stdout, printing the citation list first.
    /// Requires the gateway API key in the environment.
    Ask {
        /// The question to ask.
        query: String,

        /// Role to retrieve as: `admin`, `hr`, `developer`, or anything
        /// else for the most restrictive scope.
        #[arg(long, default_value = "admin")]
        role: String,
    },
}

/// User management subcommands.
#[derive(Subcommand)]
enum UserAction {
    /// Create a user, assign a role, and print a one-time API token.
    Add {
        /// Email address (unique).
        #[arg(long)]
        email: String,

        /// Role: `admin`, `hr`, or `developer`. Anything else leaves the
        /// user unassigned (most restrictive scope).
        #[arg(long, default_value = "unassigned")]
        role: String,
    },
    /// List all users and their roles.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::User { action } => match action {
            UserAction::Add { email, role } => {
                users::run_user_add(&cfg, &email, &role).await?;
            }
            UserAction::List => {
                users::run_user_list(&cfg).await?;
            }
        },
        Commands::Search { query, role } => {
            retrieval::run_search(&cfg, &query, &role).await?;
        }
        Commands::Ask { query, role } => {
            chat::run_ask(&cfg, &query, &role).await?;
        }
    }

    Ok(())
}
