use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use gatebot_core::eligibility::{is_eligible_to_withdraw, remaining_referrals};
use gatebot_core::{ConfigDocument, UserDocument, UserId};
use gatebot_server::repository::{DocumentRepository, SqliteRepository};
use gatebot_server::status::StatusSummary;
use gatebot_server::{Document, DocumentStore};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DB_FILE_NAME: &str = "gatebot-state.db";

/// Gatebot: inspect and migrate the referral bot's stored state
#[derive(Parser, Debug)]
#[command(name = "gatebot")]
#[command(about = "Inspect and migrate gatebot state", long_about = None)]
struct Cli {
    /// SQLite database (defaults to $STATE_DIR/gatebot-state.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print user, eligibility and configuration counts
    Stats,
    /// Print one user's record as JSON
    User(UserArgs),
    /// Load legacy JSON files into the store, replacing each document given
    Import(ImportArgs),
    /// Print both documents as JSON
    Export,
}

#[derive(Parser, Debug)]
struct UserArgs {
    /// Telegram user id
    id: UserId,
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// Users file (`{"users": {...}, "admins": [...]}`)
    #[arg(long)]
    users: Option<PathBuf>,

    /// Channels file (`{"channels": [...], "folders": {...}}`)
    #[arg(long)]
    config: Option<PathBuf>,
}

struct Stores {
    users: DocumentStore<UserDocument>,
    config: DocumentStore<ConfigDocument>,
}

impl Stores {
    fn open(path: &Path) -> Result<Self> {
        let repo = SqliteRepository::new(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Ok(Self::over(Arc::new(repo)))
    }

    fn over(repo: Arc<dyn DocumentRepository>) -> Self {
        Self {
            users: DocumentStore::new(repo.clone()),
            config: DocumentStore::new(repo),
        }
    }
}

fn default_db_path(state_dir: Option<String>) -> PathBuf {
    state_dir
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DB_FILE_NAME)
}

fn read_document<D: DeserializeOwned>(path: &Path) -> Result<D> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn run_stats(stores: &Stores) -> Result<String> {
    let users = stores.users.load().await?;
    let config = stores.config.load().await?;
    let summary = StatusSummary::from_documents(&users, &config);

    Ok(format!(
        "Users:      {}\n\
         Referred:   {}\n\
         Eligible:   {}\n\
         Withdrawn:  {}\n\
         Channels:   {}\n\
         Folders:    {}\n\
         Admins:     {}",
        summary.total_users,
        summary.referred,
        summary.eligible,
        summary.withdrawn,
        summary.channels,
        summary.folders,
        summary.admins
    ))
}

async fn run_user(stores: &Stores, args: UserArgs) -> Result<String> {
    let users = stores.users.load().await?;
    let record = users
        .user(args.id)
        .ok_or_else(|| anyhow!("User {} not found", args.id))?;

    let output = json!({
        "id": args.id,
        "record": record,
        "eligible": is_eligible_to_withdraw(&users, args.id),
        "remaining_referrals": remaining_referrals(&users, args.id),
        "admin": users.admins.contains(&args.id),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

async fn run_import(stores: &Stores, args: ImportArgs) -> Result<String> {
    if args.users.is_none() && args.config.is_none() {
        return Err(anyhow!("Nothing to import; pass --users and/or --config"));
    }

    // Parse everything before writing anything.
    let users = args
        .users
        .as_deref()
        .map(read_document::<UserDocument>)
        .transpose()?;
    let config = args
        .config
        .as_deref()
        .map(read_document::<ConfigDocument>)
        .transpose()?;

    let mut lines = Vec::new();
    if let Some(users) = users {
        let revision = stores.users.save(&users).await?;
        lines.push(format!(
            "Imported {} users and {} admins into '{}' (revision {})",
            users.users.len(),
            users.admins.len(),
            UserDocument::KEY,
            revision
        ));
    }
    if let Some(config) = config {
        let revision = stores.config.save(&config).await?;
        lines.push(format!(
            "Imported {} channels and {} folders into '{}' (revision {})",
            config.channels.len(),
            config.folders.len(),
            ConfigDocument::KEY,
            revision
        ));
    }
    Ok(lines.join("\n"))
}

async fn run_export(stores: &Stores) -> Result<String> {
    let users = stores.users.load().await?;
    let config = stores.config.load().await?;
    Ok(serde_json::to_string_pretty(&json!({
        "users": users,
        "config": config,
    }))?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let db_path = cli
        .db
        .unwrap_or_else(|| default_db_path(std::env::var("STATE_DIR").ok()));
    let stores = Stores::open(&db_path)?;

    let output = match cli.command {
        Commands::Stats => run_stats(&stores).await,
        Commands::User(args) => run_user(&stores, args).await,
        Commands::Import(args) => run_import(&stores, args).await,
        Commands::Export => run_export(&stores).await,
    }?;

    println!("{}", output);
    Ok(())
}
