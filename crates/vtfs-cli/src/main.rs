//! vtfs operator CLI
//!
//! Opens a SQLite-backed store and runs one operation for one tenant.
//!
//! ## Usage
//!
//! ```bash
//! vtfs --token acme ls
//! vtfs --token acme mkdir 100 docs
//! vtfs --token acme touch 201 notes.txt --mode 600
//! echo hello | vtfs --token acme put 202
//! vtfs --token acme cat 202
//! vtfs --db /tmp/scratch.db --token acme ln 202 100 notes-link
//! vtfs config
//! ```
//!
//! A failing operation exits with the POSIX errno of the error.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use vtfs_store::{
    DirEntry, Ino, Inode, OverlapPolicy, ROOT_INO, S_IFREG, StoreConfig, StoreError, StoreOps,
    VirtualStore,
};

#[derive(Parser, Debug)]
#[command(name = "vtfs")]
#[command(about = "Inspect and modify a vtfs inode store")]
struct Cli {
    /// TOML config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Tenant token
    #[arg(long, short, global = true)]
    token: Option<String>,

    /// Keep the untouched parts of overwritten chunks
    #[arg(long, global = true)]
    splice: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value_t = ROOT_INO)]
        parent: Ino,
    },
    /// Show inode attributes
    Stat { ino: Ino },
    /// Resolve a name in a directory
    Lookup { parent: Ino, name: String },
    /// Create a regular file
    Touch {
        parent: Ino,
        name: String,
        /// Permission bits, octal
        #[arg(long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    /// Create a directory
    Mkdir {
        parent: Ino,
        name: String,
        /// Permission bits, octal
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    /// Write file content to stdout
    Cat {
        ino: Ino,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Bytes to read (default: to end of file)
        #[arg(long)]
        length: Option<u64>,
    },
    /// Write a file (or stdin) into an inode
    Put {
        ino: Ino,
        /// Source file; stdin when omitted
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Delete an inode and all of its names
    Rm { ino: Ino },
    /// Remove an empty directory
    Rmdir { ino: Ino },
    /// Add a hard link
    Ln { ino: Ino, parent: Ino, name: String },
    /// Remove one name of an inode
    Unlink { ino: Ino },
    /// Remove the name at (parent, name)
    UnlinkAt { parent: Ino, name: String },
    /// Print the effective configuration
    Config,
}

fn parse_mode(s: &str) -> Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode {s:?}: {e}"))
        .and_then(|mode| {
            if mode > 0o7777 {
                Err(format!("mode {s} out of range"))
            } else {
                Ok(mode)
            }
        })
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("vtfs: {e:#}");
            exit_code(&e)
        }
    }
}

/// Exit with the store errno when there is one.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    errno(err).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}

fn errno(err: &anyhow::Error) -> Option<u8> {
    err.downcast_ref::<StoreError>()
        .and_then(|e| u8::try_from(e.errno()).ok())
}

fn load_config(cli: &Cli) -> Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(db) = &cli.db {
        config = config.with_database(db);
    }
    if cli.splice {
        config = config.with_overlap_policy(OverlapPolicy::Splice);
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    if let Command::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let token = cli
        .token
        .as_deref()
        .context("--token is required for store operations")?;
    let store = VirtualStore::open(config)?;

    match cli.command {
        Command::Ls { parent } => {
            for entry in store.list(token, parent).await? {
                print_entry(&entry);
            }
        }
        Command::Stat { ino } => print_inode(&store.getattr(token, ino).await?),
        Command::Lookup { parent, name } => print_entry(&store.lookup(token, parent, &name).await?),
        Command::Touch { parent, name, mode } => {
            let entry = store.create(token, parent, &name, S_IFREG | mode).await?;
            print_entry(&entry);
        }
        Command::Mkdir { parent, name, mode } => {
            print_entry(&store.mkdir(token, parent, &name, mode).await?);
        }
        Command::Cat {
            ino,
            offset,
            length,
        } => {
            let data = match length {
                Some(n) => store.read(token, ino, offset, n).await?,
                None => store.read_to_end(token, ino, offset).await?,
            };
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Command::Put { ino, file, offset } => {
            let data = match &file {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            store.write(token, ino, offset, &data).await?;
            tracing::info!(ino, offset, len = data.len(), "wrote");
        }
        Command::Rm { ino } => store.delete(token, ino).await?,
        Command::Rmdir { ino } => store.rmdir(token, ino).await?,
        Command::Ln { ino, parent, name } => {
            print_entry(&store.link(token, ino, parent, &name).await?);
        }
        Command::Unlink { ino } => store.unlink(token, ino).await?,
        Command::UnlinkAt { parent, name } => store.unlink_at(token, parent, &name).await?,
        Command::Config => {}
    }
    Ok(())
}

fn print_entry(entry: &DirEntry) {
    println!(
        "{}\t{:06o}\t{}\t{}\t{}",
        entry.ino, entry.mode, entry.nlink, entry.size, entry.name
    );
}

fn print_inode(inode: &Inode) {
    println!(
        "{}\t{:06o}\t{}\t{}",
        inode.ino, inode.mode, inode.nlink, inode.size
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644"), Ok(0o644));
        assert_eq!(parse_mode("0o755"), Ok(0o755));
        assert!(parse_mode("9").is_err());
        assert!(parse_mode("17777").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["vtfs", "ls", "--token", "acme", "--splice"]).unwrap();
        assert_eq!(cli.token.as_deref(), Some("acme"));
        assert!(cli.splice);
        assert!(matches!(cli.command, Command::Ls { parent: ROOT_INO }));
    }

    #[test]
    fn test_overrides_applied() {
        let cli =
            Cli::try_parse_from(["vtfs", "--db", "/tmp/x.db", "--splice", "config"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.overlap_policy, OverlapPolicy::Splice);
    }

    #[test]
    fn test_store_errors_carry_errno() {
        let err = anyhow::Error::from(StoreError::ino_not_found(7));
        assert_eq!(errno(&err), Some(2));
        let err = anyhow::Error::from(StoreError::NameTooLong).context("touch");
        assert_eq!(errno(&err), Some(36));
        assert_eq!(errno(&anyhow::anyhow!("other")), None);
    }
}
