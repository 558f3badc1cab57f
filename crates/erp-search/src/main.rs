//! # ERP Search CLI (`erp-search`)
//!
//! ## Usage
//!
//! ```bash
//! erp-search --config ./config/erp-search.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `erp-search init` | Create the SQLite database and run schema migrations |
//! | `erp-search seed <file>` | Load source tables from a JSON file |
//! | `erp-search rebuild` | Clear and rebuild the search index |
//! | `erp-search search "<query>"` | Hybrid search with filters |
//! | `erp-search facets` | Index-wide facet counts |
//! | `erp-search stats` | Record totals per object type |
//! | `erp-search embed pending` | Backfill missing embeddings |
//! | `erp-search remove <type> <id>` | Remove one record from the index |
//! | `erp-search serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use erp_search::search::FilterArgs;
use erp_search::{config, index_cmd, logging, migrate, search, server, stats};

/// ERP Search: hybrid keyword + semantic search over CRM, PMO, Training
/// and Purchase records.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/erp-search.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "erp-search",
    about = "Hybrid keyword + semantic search over ERP records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/erp-search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file, the `search_index` table and the source
    /// tables. Safe to run repeatedly.
    Init,

    /// Load source tables from a JSON file.
    ///
    /// Rows are upserted by id. Run `rebuild` afterwards to index them.
    Seed {
        /// JSON file with `customers`, `opportunities`, `leads`, `projects`,
        /// `trainings` and `purchases` arrays.
        file: PathBuf,
    },

    /// Clear the search index and re-project every source row.
    Rebuild,

    /// Search the index.
    Search {
        /// The search query. An empty string lists the newest records.
        query: String,

        /// Restrict to object types (`CRM`, `PMO`, `Training`, `Purchase`). Repeatable.
        #[arg(long = "type")]
        object_type: Vec<String>,

        /// Restrict to statuses. Repeatable.
        #[arg(long)]
        status: Vec<String>,

        /// Restrict to one owner id.
        #[arg(long)]
        owner: Option<String>,

        /// Restrict to one department.
        #[arg(long)]
        department: Option<String>,

        /// Date window on the primary date: 7days, 14days, 30days, 90days, 1year, 3years.
        #[arg(long)]
        date_range: Option<String>,

        /// Page number (1-based).
        #[arg(long)]
        page: Option<i64>,

        /// Results per page.
        #[arg(long)]
        size: Option<i64>,

        /// Show keyword, semantic and hybrid scores per result.
        #[arg(long)]
        explain: bool,
    },

    /// Print facet counts over the whole index.
    Facets {
        #[arg(long)]
        json: bool,
    },

    /// Print record totals per object type.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Remove one source object from the index.
    Remove {
        /// Object type (`CRM`, `PMO`, `Training`, `Purchase`).
        object_type: String,
        /// Index object id. CRM ids carry the source kind:
        /// `cust:<id>`, `opp:<id>` or `lead:<id>`.
        object_id: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed index records that have no vector yet.
    Pending {
        /// Maximum number of records to embed in this run.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Seed { file } => {
            index_cmd::run_seed(&cfg, &file).await?;
        }
        Commands::Rebuild => {
            index_cmd::run_rebuild(&cfg).await?;
        }
        Commands::Search {
            query,
            object_type,
            status,
            owner,
            department,
            date_range,
            page,
            size,
            explain,
        } => {
            let filters = FilterArgs {
                object_types: object_type,
                statuses: status,
                owner,
                department,
                date_range,
            };
            search::run_search(&cfg, &query, filters, page, size, explain).await?;
        }
        Commands::Facets { json } => {
            stats::run_facets(&cfg, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit } => {
                index_cmd::run_embed_pending(&cfg, limit).await?;
            }
        },
        Commands::Remove {
            object_type,
            object_id,
        } => {
            index_cmd::run_remove(&cfg, &object_type, &object_id).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
