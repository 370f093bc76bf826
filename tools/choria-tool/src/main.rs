//! # choria-tool
//!
//! Inspect Choria protocol messages and JWTs from files.
//!
//! ```text
//! choria-tool protocol message.json   # every envelope, outermost first
//! choria-tool jwt client.jwt          # purpose, expiry and claims
//! ```
//!
//! Nothing is verified. Use the output for debugging only.

mod inspect;
mod jwt;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Inspect Choria protocol messages and JWTs
#[derive(Parser, Debug)]
#[command(name = "choria-tool")]
#[command(about = "Inspect Choria protocol messages and JWTs")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a protocol message layer by layer
    Protocol {
        /// File holding the JSON message
        file: PathBuf,
    },

    /// View the claims of a JWT without verifying it
    Jwt {
        /// File holding the token
        file: PathBuf,
    },
}

fn show_protocol(file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("could not read {}", file.display()))?;

    for (i, layer) in inspect::decode_layers(&data)?.iter().enumerate() {
        println!("Layer {}: {}", i + 1, layer.version);
        for (name, value) in &layer.details {
            println!("  {:>10}: {}", name, value);
        }
        println!("{}\n", serde_json::to_string_pretty(&layer.document)?);
    }

    Ok(())
}

fn show_jwt(file: &Path) -> Result<()> {
    let token = std::fs::read_to_string(file).with_context(|| format!("could not read {}", file.display()))?;
    let view = jwt::view_token(&token)?;

    println!("Purpose: {}", view.purpose);
    match view.expires {
        Some(at) if view.expired => println!("Expired: {}", at),
        Some(at) => println!("Expires: {}", at),
        None => println!("Expires: never"),
    }
    println!("{}", serde_json::to_string_pretty(&view.claims)?);

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Protocol { file } => show_protocol(&file),
        Command::Jwt { file } => show_jwt(&file),
    }
}
