//! # Databank CLI Module
//!
//! This module implements the CLI interface for Databank.
//!
//! ## Available Commands
//!
//! - `init` - Create the storage and load it once
//! - `status` - Show bank notations and counts
//! - `list` - List contacts, optionally filtered and ordered
//! - `add` - Save a new contact
//! - `drop` - Drop contacts by id or name
//! - `touch` - Re-persist a stored contact as-is

mod commands;

use crate::AppError;
use crate::config::{BackendKind, Config};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Databank - typed record store
///
/// Manages an address book of contacts on a pluggable storage backend.
#[derive(Parser, Debug)]
#[command(name = "databank")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ./databank.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory, overrides the config file
    #[arg(short = 'D', long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Storage backend, overrides the config file
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Sort key for `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderKey {
    Id,
    Name,
    Email,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the storage if needed and load it
    Init,

    /// Show bank notations and counts
    Status,

    /// List contacts
    List {
        /// Include dropped (disabled) contacts
        #[arg(short, long)]
        all: bool,

        /// Keep contacts whose name or email contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Order by this key
        #[arg(short, long, value_enum)]
        order: Option<OrderKey>,

        /// Descending order
        #[arg(long, requires = "order")]
        desc: bool,
    },

    /// Save a new contact
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,
    },

    /// Drop contacts by id or by exact name
    Drop {
        #[arg(short, long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<i64>,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Re-persist a stored contact without changing it
    Touch {
        #[arg(short, long)]
        id: i64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.data_dir, cli.backend);
    let ctx = Context::open(config, cli.json_mode)?;

    match cli.command {
        Commands::Init => cmd_init(&ctx).await,
        Commands::Status => cmd_status(&ctx).await,
        Commands::List {
            all,
            filter,
            order,
            desc,
        } => cmd_list(&ctx, all, filter, order, desc).await,
        Commands::Add { name, email } => cmd_add(&ctx, name, email).await,
        Commands::Drop { id, name } => cmd_drop(&ctx, id, name).await,
        Commands::Touch { id } => cmd_touch(&ctx, id).await,
    }
}
