// CLASSIFICATION: COMMUNITY
// Filename: main.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-01-24
// Status: 🟢 Hydrated

//! Entry point for the cohvault binary.

fn main() {
    env_logger::init();
    if let Err(err) = cohvault::cli::run() {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
