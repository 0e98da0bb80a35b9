use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
mod auth;
use caveau::device::{KeyringKeystore, QuickUnlock, TerminalVerifier};
use caveau::{
    FileStore, PasswordEntry, RemoteStore, Vault, VaultError, VaultStore, backup, generator,
};
use chrono::TimeZone;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "caveau")]
#[command(
    version,
    about = "Personal password vault with client-side encryption and optional remote sync."
)]
struct Cli {
    /// Path to the local vault file
    #[arg(long, global = true, value_name = "PATH", env = "CAVEAU_STORE")]
    store: Option<PathBuf>,

    /// Base URL of the sync server; replaces the local file store
    #[arg(long, global = true, value_name = "URL", env = "CAVEAU_SERVER")]
    server: Option<String>,

    /// Bearer token for the sync server
    #[arg(long, global = true, value_name = "TOKEN", env = "CAVEAU_TOKEN")]
    token: Option<String>,

    /// Unlock with the device gesture instead of typing the password
    #[arg(long, global = true, default_value_t = false)]
    quick: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initializes a new vault
    Init,

    /// Adds an entry
    #[command(arg_required_else_help = true)]
    Add {
        site: String,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// Password for the entry
        #[arg(short, long, conflicts_with = "generate", required_unless_present = "generate")]
        password: Option<String>,

        /// Generate the entry password and print it
        #[arg(short, long, default_value_t = false)]
        generate: bool,

        /// Length of the generated password
        #[arg(long, default_value_t = generator::DEFAULT_LENGTH, requires = "generate")]
        length: usize,

        /// Generate without punctuation
        #[arg(long, default_value_t = false, requires = "generate")]
        no_symbols: bool,
    },

    /// Shows an entry by site name
    #[command(arg_required_else_help = true)]
    Get {
        site: String,

        /// Print only the password, in the clear
        #[arg(long, default_value_t = false)]
        show: bool,

        /// Copy the password to the clipboard instead of printing
        #[arg(short, long, default_value_t = false)]
        copy: bool,

        /// Seconds until the clipboard is cleared again
        #[arg(long, default_value_t = 15, requires = "copy")]
        timeout: u64,
    },

    /// Lists all entries
    List,

    /// Searches entries by site name or username
    #[command(arg_required_else_help = true)]
    Search { query: String },

    /// Updates an entry
    #[command(arg_required_else_help = true)]
    Update {
        site: String,

        /// New site name
        #[arg(long, value_name = "NAME")]
        rename: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,

        /// New password for the entry
        #[arg(short, long, conflicts_with = "generate")]
        password: Option<String>,

        /// Generate a new entry password and print it
        #[arg(short, long, default_value_t = false)]
        generate: bool,

        /// Length of the generated password
        #[arg(long, default_value_t = generator::DEFAULT_LENGTH, requires = "generate")]
        length: usize,

        /// Generate without punctuation
        #[arg(long, default_value_t = false, requires = "generate")]
        no_symbols: bool,
    },

    /// Removes an entry by site name
    #[command(arg_required_else_help = true)]
    Remove { site: String },

    /// Generates a random password
    Generate {
        /// Length of the generated password
        #[arg(long, default_value_t = generator::DEFAULT_LENGTH)]
        length: usize,

        /// Generate without punctuation
        #[arg(long, default_value_t = false)]
        no_symbols: bool,
    },

    /// Writes an encrypted backup file
    Export {
        /// Target path (default: caveau-backup-<date>.json)
        path: Option<PathBuf>,
    },

    /// Restores a backup file, replacing the stored vault
    #[command(arg_required_else_help = true)]
    Import { path: PathBuf },

    /// Changes the master password
    ChangeMaster,

    /// Manages gesture-based quick unlock on this device
    #[command(subcommand)]
    QuickUnlock(QuickUnlockAction),

    /// Erases the stored vault
    Reset {
        /// Confirm the erase
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Shows vault status without unlocking
    Status,
}

#[derive(Debug, Subcommand)]
enum QuickUnlockAction {
    /// Wraps the master password for this device
    Enable,
    /// Forgets the wrapped master password
    Disable,
    /// Shows whether quick unlock is enabled
    Status,
}

fn resolve_store(args: &Cli) -> Result<Box<dyn VaultStore>> {
    if let Some(server) = &args.server {
        let token = args
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("--server needs --token (or CAVEAU_TOKEN)"))?;
        return Ok(Box::new(RemoteStore::new(server, token)));
    }

    let path = match &args.store {
        Some(path) => path.clone(),
        None => caveau::default_vault_path()?,
    };
    Ok(Box::new(FileStore::new(path)))
}

/// Quick unlock state lives next to the vault file it belongs to; the
/// wrapped password is only good for that one vault.
fn quick_state_path(args: &Cli) -> Result<PathBuf> {
    match (&args.server, &args.store) {
        (None, Some(store)) => Ok(store.with_extension("quick.json")),
        _ => Ok(caveau::default_quick_unlock_path()?),
    }
}

fn quick_unlock(args: &Cli) -> Result<QuickUnlock<KeyringKeystore, TerminalVerifier>> {
    Ok(QuickUnlock::new(
        KeyringKeystore::new(),
        TerminalVerifier::new(),
        quick_state_path(args)?,
    ))
}

/// Unlock a session, via gesture when `--quick` was given. A wrapped
/// password that no longer matches (master changed since registration)
/// disables quick unlock and falls back to the prompt.
fn open_vault(args: &Cli) -> Result<Vault> {
    if args.quick {
        let quick = quick_unlock(args)?;
        match quick.authenticate() {
            Ok(password) => match Vault::unlock(resolve_store(args)?, &password) {
                Ok(vault) => return Ok(vault),
                Err(VaultError::InvalidPassword) => {
                    quick.disable()?;
                    eprintln!("quick unlock no longer matches the vault and has been disabled");
                }
                Err(e) => return Err(e.into()),
            },
            Err(VaultError::GestureCancelled | VaultError::QuickUnlockNotEnabled) => {
                eprintln!("falling back to password entry");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let password = auth::read_password()?;
    Ok(Vault::unlock(resolve_store(args)?, &password)?)
}

fn format_updated(millis: i64) -> String {
    chrono::Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn print_entries(entries: &[&PasswordEntry]) {
    if entries.is_empty() {
        println!("no entries");
        return;
    }

    let site_width = entries
        .iter()
        .map(|e| e.site_name().len())
        .chain(std::iter::once("Site".len()))
        .max()
        .unwrap();

    let user_width = entries
        .iter()
        .map(|e| e.username().unwrap_or("-").len())
        .chain(std::iter::once("Username".len()))
        .max()
        .unwrap();

    println!("{:<site_width$}  {:<user_width$}  {}", "Site", "Username", "Updated");
    println!("{:-<site_width$}  {:-<user_width$}  {:-<16}", "", "", "");

    for e in entries {
        println!(
            "{:<site_width$}  {:<user_width$}  {}",
            e.site_name(),
            e.username().unwrap_or("-"),
            format_updated(e.updated_at())
        );
    }
}

fn print_entry_detail(entry: &PasswordEntry) {
    println!("site:     {}", entry.site_name());
    println!("username: {}", entry.username().unwrap_or("-"));
    println!("password: ********");
    if let Some(notes) = entry.notes() {
        println!("notes:    {notes}");
    }
    println!("updated:  {}", format_updated(entry.updated_at()));
}

/// Resolve a site name to exactly one entry id.
fn entry_id_for_site(vault: &mut Vault, site: &str) -> Result<String> {
    let matches = vault.find_by_site(site)?;
    match matches.len() {
        0 => bail!("no entry for '{site}'"),
        1 => Ok(matches[0].id().to_string()),
        n => {
            let usernames: Vec<&str> =
                matches.iter().map(|e| e.username().unwrap_or("-")).collect();
            bail!(
                "'{site}' matches {n} entries (usernames: {}), not touching any",
                usernames.join(", ")
            )
        }
    }
}

/// Put a secret on the clipboard and clear it again after `timeout`
/// seconds. Ctrl-C clears immediately instead of leaving it behind.
fn copy_with_timeout(secret: &str, timeout: u64) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(secret.to_string())?;

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    eprintln!("password copied, clearing in {timeout}s (Ctrl-C clears now)");
    let _ = rx.recv_timeout(Duration::from_secs(timeout));

    clipboard.clear()?;
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let args = Cli::parse();
    match &args.command {
        Commands::Init => {
            let password = auth::read_new_password_with_confirmation()?;
            Vault::create(resolve_store(&args)?, &password)?;
            println!("vault initialized");
        }

        Commands::Add {
            site,
            username,
            notes,
            password,
            generate,
            length,
            no_symbols,
        } => {
            let entry_password = if *generate {
                let generated = generator::generate(*length, !no_symbols);
                println!("{generated}");
                generated
            } else {
                password.clone().ok_or_else(|| anyhow!("missing entry password"))?
            };

            let mut vault = open_vault(&args)?;
            vault.add_entry(
                site.clone(),
                username.clone(),
                entry_password,
                notes.clone(),
            )?;
            vault.save()?;
            println!("added '{site}'");
        }

        Commands::Get {
            site,
            show,
            copy,
            timeout,
        } => {
            let mut vault = open_vault(&args)?;
            let matches = vault.find_by_site(site)?;
            if matches.is_empty() {
                bail!("no entry for '{site}'");
            }

            if *copy {
                if matches.len() > 1 {
                    bail!("'{site}' matches several entries, cannot pick one to copy");
                }
                let password = matches[0].password().to_string();
                copy_with_timeout(&password, *timeout)?;
            } else if *show {
                for entry in &matches {
                    println!("{}", entry.password());
                }
            } else {
                for (i, entry) in matches.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    print_entry_detail(entry);
                }
            }
        }

        Commands::List => {
            let mut vault = open_vault(&args)?;
            let entries: Vec<&PasswordEntry> = vault.entries()?.collect();
            print_entries(&entries);
        }

        Commands::Search { query } => {
            let mut vault = open_vault(&args)?;
            let matches = vault.search(query)?;
            print_entries(&matches);
        }

        Commands::Update {
            site,
            rename,
            username,
            notes,
            password,
            generate,
            length,
            no_symbols,
        } => {
            let new_password = if *generate {
                let generated = generator::generate(*length, !no_symbols);
                println!("{generated}");
                Some(generated)
            } else {
                password.clone()
            };

            let mut vault = open_vault(&args)?;
            let id = entry_id_for_site(&mut vault, site)?;
            vault.update_entry(
                &id,
                rename.clone(),
                username.clone(),
                new_password,
                notes.clone(),
            )?;
            vault.save()?;
            println!("updated '{site}'");
        }

        Commands::Remove { site } => {
            let mut vault = open_vault(&args)?;
            let id = entry_id_for_site(&mut vault, site)?;
            vault.remove_entry(&id)?;
            vault.save()?;
            println!("removed '{site}'");
        }

        Commands::Generate { length, no_symbols } => {
            println!("{}", generator::generate(*length, !no_symbols));
        }

        Commands::Export { path } => {
            let store = resolve_store(&args)?;
            let path = match path {
                Some(path) => path.clone(),
                None => PathBuf::from(backup::default_file_name()),
            };
            backup::export(store.as_ref(), &path)?;
            println!("exported to {}", path.display());
        }

        Commands::Import { path } => {
            let loaded = backup::load(path)?;
            let password = auth::read_password()?;
            let mut vault = Vault::restore_backup(resolve_store(&args)?, loaded, &password)?;
            println!("imported {} entries", vault.entries()?.count());
        }

        Commands::ChangeMaster => {
            let mut vault = open_vault(&args)?;
            let new_password = auth::read_new_password_with_confirmation()?;
            vault.change_master(&new_password)?;
            println!("master password changed");

            // the wrapped password is stale from here on
            let quick = quick_unlock(&args)?;
            if quick.is_enabled() {
                match quick.register(&new_password) {
                    Ok(()) => println!("quick unlock re-registered"),
                    Err(_) => {
                        quick.disable()?;
                        println!("quick unlock disabled, enable it again when needed");
                    }
                }
            }
        }

        Commands::QuickUnlock(action) => match action {
            QuickUnlockAction::Enable => {
                let mut vault = open_vault(&args)?;
                let quick = quick_unlock(&args)?;
                quick.register(vault.master_password()?)?;
                println!("quick unlock enabled");
            }
            QuickUnlockAction::Disable => {
                quick_unlock(&args)?.disable()?;
                println!("quick unlock disabled");
            }
            QuickUnlockAction::Status => {
                let quick = quick_unlock(&args)?;
                if quick.is_enabled() {
                    println!("quick unlock: enabled");
                } else if quick.is_supported() {
                    println!("quick unlock: disabled");
                } else {
                    println!("quick unlock: not supported here");
                }
            }
        },

        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to erase the vault without --yes");
            }
            resolve_store(&args)?.erase()?;
            quick_unlock(&args)?.disable()?;
            println!("vault erased");
        }

        Commands::Status => {
            let store = resolve_store(&args)?;
            let initialized = store.fetch()?.is_some();

            let location = match &args.server {
                Some(server) => format!("server {server}"),
                None => {
                    let path = match &args.store {
                        Some(path) => path.clone(),
                        None => caveau::default_vault_path()?,
                    };
                    format!("file {}", path.display())
                }
            };

            if initialized {
                println!("vault: initialized ({location})");
            } else {
                println!("vault: not initialized ({location})");
            }

            let quick = quick_unlock(&args)?;
            if quick.is_enabled() {
                println!("quick unlock: enabled");
            } else {
                println!("quick unlock: disabled");
            }
        }
    }

    Ok(())
}
