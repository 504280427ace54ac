//! Command-line front end for ad-hoc inspection of a `fidx` store.

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};

use fidx::{FixedBytes, Handle, OpenOptions};

type K = FixedBytes<32>;
type V = FixedBytes<32>;

#[derive(Parser)]
#[command(name = "fidx", about = "Inspect and exercise a fidx store")]
struct Cli {
    /// Root directory of the store.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Number of log entries to hold before a write triggers a merge.
    #[arg(long)]
    log_size: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sets a key to a value. Both are hex-encoded, 32 bytes each.
    Set { key: String, value: String },
    /// Looks up a key and prints its value, or reports it absent.
    Get { key: String },
    /// Forces a merge of the log into the index, regardless of size.
    Merge,
    /// Prints the current generation counter.
    Generation,
}

fn parse_fixed(s: &str) -> Result<FixedBytes<32>, String> {
    let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(FixedBytes(arr))
}

fn run() -> fidx::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let handle = Handle::<K, V>::open(&cli.root, OpenOptions::new(cli.log_size))?;

    match cli.command {
        Command::Set { key, value } => {
            let key = parse_fixed(&key).unwrap_or_else(|e| {
                eprintln!("{e}");
                exit(1);
            });
            let value = parse_fixed(&value).unwrap_or_else(|e| {
                eprintln!("{e}");
                exit(1);
            });
            handle.replace(key, value)?;
        }
        Command::Get { key } => {
            let key = parse_fixed(&key).unwrap_or_else(|e| {
                eprintln!("{e}");
                exit(1);
            });
            match handle.find(&key) {
                Ok(value) => println!("{}", hex::encode(value.0)),
                Err(fidx::Error::NotFound) => {
                    eprintln!("Key not found");
                    exit(1);
                }
                Err(e) => return Err(e),
            }
        }
        Command::Merge => handle.force_merge()?,
        Command::Generation => println!("{}", handle.generation()?),
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        exit(1);
    }
}
