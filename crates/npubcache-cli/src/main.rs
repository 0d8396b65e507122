//! npubcache CLI
//!
//! Thin wrapper around npubcache-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Convert a hex public key to its npub
//! npubcache convert <hex|npub>
//!
//! # Load profiles from the profile snapshot
//! npubcache --profiles profiles.json profile load <npub> <npub>
//!
//! # Add a local account (secret is read from stdin and encrypted with the PIN)
//! npubcache --profiles profiles.json account add --pin 1234 < secret.txt
//!
//! # List local accounts
//! npubcache account list
//!
//! # Check a PIN against a stored account
//! npubcache account verify <npub> --pin 1234
//!
//! # Remove a local account
//! npubcache account remove <npub>
//! ```

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use npubcache_core::{
    identity, AccountStore, JsonFileSource, Npub, PinEncryptor, Profile, ProfileCache,
    ProfileOrchestrator, Storage,
};
use tracing::debug;

/// npubcache - Profile cache and local account registry
#[derive(Parser)]
#[command(name = "npubcache")]
#[command(version = "0.1.0")]
#[command(about = "npubcache - Profile cache and local account registry")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.npubcache/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// JSON file of profile records used as the profile source
    /// (default: <data-dir>/profiles.json)
    #[arg(short, long, global = true)]
    profiles: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a public key (hex or npub) to its canonical npub
    Convert {
        /// Public key
        key: String,
    },

    /// Profile loading
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Local account management
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Load one or more profiles
    Load {
        /// Public keys (hex or npub)
        #[arg(required = true)]
        keys: Vec<String>,

        /// Print profiles as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// List local accounts
    List,

    /// Create an account from a secret key and store it
    Add {
        /// Secret key (hex or nsec); read from stdin when omitted
        secret: Option<String>,

        /// PIN protecting the stored secret
        #[arg(long)]
        pin: Option<String>,
    },

    /// Remove a local account
    Remove {
        /// Account public key (hex or npub)
        key: String,
    },

    /// Check that a PIN unlocks an account
    Verify {
        /// Account public key (hex or npub)
        key: String,

        /// PIN protecting the stored secret
        #[arg(long)]
        pin: Option<String>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.npubcache/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".npubcache")
        .join("data")
}

/// Parse a public key from hex or npub
fn parse_npub(s: &str) -> Result<Npub> {
    identity::to_canonical_identifier(s).map_err(|e| anyhow::anyhow!("{}", e))
}

/// Read a secret key from stdin, prompting on a terminal
fn read_secret() -> Result<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprint!("Secret key (hex or nsec): ");
        std::io::stderr().flush()?;
    }

    let mut secret = String::new();
    stdin.lock().read_line(&mut secret)?;
    let secret = secret.trim().to_string();
    if secret.is_empty() {
        anyhow::bail!("No secret key given");
    }
    Ok(secret)
}

fn print_profile(profile: &Profile) {
    println!("{}  [{}]", profile.npub, profile.load_state);
    println!("  name: {}", profile.label());
    if let Some(about) = &profile.content.about {
        println!("  about: {}", about);
    }
    if let Some(picture) = &profile.content.picture {
        println!("  picture: {}", picture);
    }
    if let Some(nip05) = &profile.content.nip05 {
        println!("  nip05: {}", nip05);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Commands::Convert { key } = &cli.command {
        let npub = parse_npub(key)?;
        println!("{}", npub);
        return Ok(());
    }

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let profiles_path = cli.profiles.unwrap_or_else(|| data_dir.join("profiles.json"));
    debug!(?data_dir, ?profiles_path, "Starting npubcache");

    let storage = Storage::new(data_dir.join("npubcache.redb"))?;
    let accounts = Arc::new(AccountStore::open(
        Arc::new(storage),
        Arc::new(PinEncryptor::new()),
    )?);
    let orchestrator = ProfileOrchestrator::new(
        Arc::new(JsonFileSource::new(&profiles_path)),
        Arc::new(ProfileCache::new()),
        accounts.clone(),
    );

    match cli.command {
        Commands::Convert { .. } => {}

        Commands::Profile { action } => match action {
            ProfileAction::Load { keys, json } => {
                let npubs = keys
                    .iter()
                    .map(|k| parse_npub(k))
                    .collect::<Result<Vec<_>>>()?;
                let profiles = orchestrator.load_many(&npubs).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&profiles)?);
                } else {
                    for profile in &profiles {
                        print_profile(profile);
                    }
                }
            }
        },

        Commands::Account { action } => match action {
            AccountAction::List => {
                let list = accounts.list();
                if list.is_empty() {
                    println!("No accounts.");
                }
                for account in list {
                    let label = account
                        .profile
                        .as_ref()
                        .map(|p| p.label().to_string())
                        .unwrap_or_else(|| account.npub.to_string());
                    println!("{}  {}", account.npub, label);
                }
            }

            AccountAction::Add { secret, pin } => {
                let secret = match secret {
                    Some(secret) => secret,
                    None => read_secret()?,
                };
                let account = orchestrator
                    .load_account(&secret, pin.as_deref())
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Could not encrypt account secret"))?;
                let npub = account.npub.clone();
                accounts.add_account(account)?;
                println!("Added account {}", npub);
            }

            AccountAction::Remove { key } => {
                let npub = parse_npub(&key)?;
                if accounts.remove_npub(&npub)? {
                    println!("Removed account {}", npub);
                } else {
                    println!("No account for {}", npub);
                }
            }

            AccountAction::Verify { key, pin } => {
                let npub = parse_npub(&key)?;
                accounts.unlock(&npub, pin.as_deref())?;
                println!("PIN ok for {}", npub);
            }
        },
    }

    Ok(())
}
