//! HereAndAlways CLI - digital legacy vault
//!
//! Usage:
//!   hereandalways login     - Save owner id and session token
//!   hereandalways logout    - Forget the session token
//!   hereandalways vault     - Manage credentials
//!   hereandalways trustees  - List trustees credentials can be linked to

mod vault;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hereandalways_core::{config, AppConfig, SecretError};
use hereandalways_crypto::{KeychainError, TokenKeychain};
use hereandalways_storage::Category;
use secrecy::SecretString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const KEYCHAIN_SERVICE: &str = "hereandalways";

#[derive(Parser)]
#[command(name = "hereandalways")]
#[command(author = "HereAndAlways")]
#[command(version)]
#[command(about = "Encrypted credential vault for the people you leave behind", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.hereandalways/config.json)
    #[arg(long, global = true, env = "HAA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save your owner id and store a session token (read from stdin)
    Login {
        #[arg(long)]
        owner_id: Uuid,
        /// Account name the token is stored under, usually your email
        #[arg(long)]
        account: String,
    },

    /// Remove the stored session token
    Logout,

    /// Manage stored credentials
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// List your trustees
    Trustees,
}

#[derive(Subcommand)]
pub(crate) enum VaultAction {
    /// Encrypt and store a credential; the secret is read from stdin
    Add {
        title: String,
        #[arg(long, short)]
        username: String,
        #[arg(long, short, default_value = "social")]
        category: Category,
        #[arg(long)]
        notes: Option<String>,
        /// Trustee id to link (repeatable)
        #[arg(long = "trustee")]
        trustees: Vec<Uuid>,
    },

    /// List credentials
    List {
        #[arg(long, short)]
        category: Option<Category>,
    },

    /// Decrypt and show a credential's secret
    Reveal {
        id: Uuid,
        /// Also print a time-limited download link for the ciphertext
        #[arg(long)]
        share: bool,
    },

    /// Edit a credential
    Edit {
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, short)]
        username: Option<String>,
        #[arg(long, short)]
        category: Option<Category>,
        #[arg(long)]
        notes: Option<String>,
        /// Replace linked trustees (repeatable)
        #[arg(long = "trustee")]
        trustees: Vec<Uuid>,
        /// Replace the secret with a new one read from stdin
        #[arg(long)]
        rotate: bool,
    },

    /// Delete a credential and its ciphertext
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<SecretError>() {
            Some(secret_error) => {
                tracing::debug!(error = %secret_error, "Command failed");
                eprintln!("❌ {}", secret_error.user_message());
            }
            None => eprintln!("❌ {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&path)?;

    match cli.command {
        Commands::Login { owner_id, account } => {
            let token = vault::read_secret("Session token: ")?;
            TokenKeychain::new(KEYCHAIN_SERVICE).store_token(&account, &token)?;

            let mut file = config::read_file(&path)?;
            file.owner_id = Some(owner_id);
            file.account = Some(account.clone());
            config::write_file(&path, &file)?;

            println!("✅ Logged in as {}", account);
        }

        Commands::Logout => {
            let Some(account) = config.account.clone() else {
                println!("Not logged in.");
                return Ok(());
            };
            TokenKeychain::new(KEYCHAIN_SERVICE).clear_token(&account)?;

            let mut file = config::read_file(&path)?;
            file.account = None;
            config::write_file(&path, &file)?;

            println!("👋 Logged out {}", account);
        }

        Commands::Vault { action } => {
            let token = session_token(&config);
            vault::run(&config, token, action).await?;
        }

        Commands::Trustees => {
            let owner_id = config.require_owner()?;
            let orchestrator = vault::connect(&config, session_token(&config))?;
            let trustees = orchestrator.list_trustees(owner_id).await?;
            if trustees.is_empty() {
                println!("No trustees yet.");
            }
            for trustee in trustees {
                println!("{}  {}", trustee.trustee_id, trustee.label());
            }
        }
    }

    Ok(())
}

/// Session token for the configured account, if one is stored.
fn session_token(config: &AppConfig) -> Option<SecretString> {
    let account = config.account.as_deref()?;
    match TokenKeychain::new(KEYCHAIN_SERVICE).retrieve_token(account) {
        Ok(token) => Some(token),
        Err(KeychainError::NotFound(_)) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Could not read session token; continuing unauthenticated");
            None
        }
    }
}
