//! Vamp CLI - The `vamp` command.
//!
//! Replays recorded or hand-written session scripts through the playback
//! engine and manages the configuration file.
//!
//! # Architecture
//!
//! The CLI binary sits on top of **vamp-core**, which owns the playback state
//! machine, loop detection, clip reconciliation and the runtime thread.

mod config;
mod logger;
mod replay;
mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use config::Config;
use script::Script;

/// Vamp - collaborative looping, replayed from the terminal
#[derive(Parser, Debug)]
#[command(name = "vamp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Playback and loop engine for collaborative vamps", long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a session script
    Replay {
        /// Path to the TOML session script
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Run against the runtime thread in wall-clock time
        #[arg(long)]
        realtime: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Init {
        /// User id to store in the [session] table
        #[arg(long)]
        user_id: Option<String>,

        /// Vamp id to store in the [session] table
        #[arg(long)]
        vamp_id: Option<String>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file location
    ConfigPath,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_logger(args.verbose);

    match args.command {
        Commands::Replay {
            script,
            realtime,
            json,
        } => {
            let config = load_config(args.config.as_ref())?;
            run_replay(script, realtime, json, config)
        }
        Commands::Init {
            user_id,
            vamp_id,
            force,
        } => init_config(user_id, vamp_id, force),
        Commands::ConfigPath => {
            let path = match args.config {
                Some(path) => path,
                None => Config::config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(Config::load_or_default()),
    }
}

fn init_config(user_id: Option<String>, vamp_id: Option<String>, force: bool) -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() && !force {
        anyhow::bail!("Config already exists at {} (use --force to overwrite)", path.display());
    }

    if user_id.is_none() && vamp_id.is_none() {
        Config::create_default_config_file().context("Failed to write default config")?;
    } else {
        let mut config = Config::default();
        config.session.user_id = user_id.unwrap_or_default();
        config.session.vamp_id = vamp_id.unwrap_or_default();
        config.save().context("Failed to write config")?;
    }
    println!("Wrote {}", path.display());
    Ok(())
}

fn run_replay(path: PathBuf, realtime: bool, json: bool, config: Config) -> Result<()> {
    let script = Script::load(&path)?;
    let identity = script.session.clone().unwrap_or(config.session);

    log::info!(
        "Replaying {} ({} steps, {} ms)",
        path.display(),
        script.steps.len(),
        script.end_ms()
    );
    let report = if realtime {
        replay::replay_realtime(&script, identity, config.runtime)?
    } else {
        replay::replay_virtual(&script, identity, &config.runtime)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
