// CLASSIFICATION: COMMUNITY
// Filename: cli.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-01-24

//! Command-line adapter over the volume manager.
//!
//! Each invocation loads the configuration, recovers the registry from
//! sidecars, and runs one operation. Streams use stdin/stdout unless a
//! file is named, so the binary composes with shell pipelines.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};

use crate::config;
use crate::volume::{Flavor, Properties, Strategy, Volume, VolumeManager};
use crate::CancelToken;

#[derive(Parser)]
#[command(name = "cohvault", about = "Host-local volume vault", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision a volume, empty or cloned from a parent.
    Create {
        handle: String,
        /// Clone copy-on-write from this parent handle.
        #[arg(long)]
        parent: Option<String>,
        /// Store ownership natively instead of shifted.
        #[arg(long)]
        privileged: bool,
        /// key=value metadata, repeatable.
        #[arg(long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },
    /// Print one volume record as JSON.
    Show { handle: String },
    /// List volumes, optionally filtered by property equality.
    List {
        #[arg(long = "property", value_parser = parse_property)]
        filter: Vec<(String, String)>,
    },
    /// Convert a volume between privilege flavors in place.
    Convert {
        handle: String,
        #[arg(long)]
        privileged: bool,
    },
    /// Attach or overwrite one property.
    SetProperty {
        handle: String,
        key: String,
        value: String,
    },
    /// Unpack a tar stream into a volume subpath.
    StreamIn {
        handle: String,
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Read the archive from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Pack a volume subpath as a tar stream.
    StreamOut {
        handle: String,
        #[arg(long, default_value = ".")]
        path: PathBuf,
        /// Write the archive to this file instead of stdout.
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Unregister a volume and tear down its storage.
    Destroy { handle: String },
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_active();
    let manager = VolumeManager::new(
        cfg.volumes_dir(),
        cfg.build_driver()?,
        cfg.id_range().context("resolving identity range")?,
    )?;
    manager.recover()?;
    let cancel = CancelToken::new();

    match cli.command {
        Command::Create {
            handle,
            parent,
            privileged,
            properties,
        } => {
            let strategy = match parent {
                Some(parent) => Strategy::Cow { parent },
                None => Strategy::Empty,
            };
            let volume = manager.create_volume(
                &handle,
                strategy,
                flavor(privileged),
                collect(properties),
                &cancel,
            )?;
            print_volume(&volume)
        }
        Command::Show { handle } => print_volume(&manager.lookup(&handle)?),
        Command::List { filter } => {
            let volumes = manager.list(&collect(filter))?;
            let out = io::stdout();
            serde_json::to_writer_pretty(out.lock(), &volumes)?;
            println!();
            Ok(())
        }
        Command::Convert { handle, privileged } => {
            manager.set_flavor(&handle, flavor(privileged), &cancel)?;
            Ok(())
        }
        Command::SetProperty { handle, key, value } => {
            manager.set_property(&handle, &key, &value)?;
            Ok(())
        }
        Command::StreamIn { handle, path, file } => {
            let mut input: Box<dyn Read> = match file {
                Some(f) => Box::new(File::open(&f).with_context(|| f.display().to_string())?),
                None => Box::new(io::stdin().lock()),
            };
            manager.stream_in(&handle, &path, &mut input, &cancel)?;
            Ok(())
        }
        Command::StreamOut { handle, path, file } => {
            let mut out: Box<dyn Write> = match file {
                Some(f) => Box::new(File::create(&f).with_context(|| f.display().to_string())?),
                None => Box::new(io::stdout().lock()),
            };
            manager.stream_out(&handle, &path, &mut out, &cancel)?;
            out.flush()?;
            Ok(())
        }
        Command::Destroy { handle } => {
            manager.destroy(&handle)?;
            Ok(())
        }
    }
}

fn flavor(privileged: bool) -> Flavor {
    if privileged {
        Flavor::Privileged
    } else {
        Flavor::Unprivileged
    }
}

fn collect(pairs: Vec<(String, String)>) -> Properties {
    pairs.into_iter().collect()
}

fn print_volume(volume: &Volume) -> anyhow::Result<()> {
    let out = io::stdout();
    serde_json::to_writer_pretty(out.lock(), volume)?;
    println!();
    Ok(())
}

fn parse_property(raw: &str) -> Result<(String, String), anyhow::Error> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| anyhow!("expected key=value, got {raw:?}"))
}
