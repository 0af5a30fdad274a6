//! `mnemos` – interactive shell over the memory store.
//!
//! 1. Checks for `~/.mnemos/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Probes the local Ollama instance used for intent classification.
//! 3. Opens the memory database, rebuilding the cache from disk. A corrupt
//!    database stops the program here.
//! 4. Drops the user into the **REPL** (`/help` lists the commands).
//! 5. **Ctrl-C** asks the REPL to stop after the current command.

mod command;
mod config;
mod ollama;
mod repl;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, warn};

use mnemos_memory::MemoryManager;

use crate::config::Config;
use crate::repl::prompt_line;

fn main() -> ExitCode {
    let _telemetry = mnemos_runtime::init_tracing("mnemos");

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing up …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            cfg.apply_env_overrides();
            cfg
        }
    };

    if cfg.classifier_enabled {
        probe_ollama(&cfg);
    }

    if let Some(parent) = cfg.db_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        error!(path = %parent.display(), error = %e, "cannot create database directory");
        println!("{}: {}", "Cannot create database directory".red(), e);
        return ExitCode::FAILURE;
    }
    let manager = match MemoryManager::open(&cfg.db_path) {
        Ok(manager) => manager,
        Err(e) => {
            error!(path = %cfg.db_path.display(), error = %e, "failed to open memory store");
            println!("{}: {}", "Cannot open memory database".red(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  {} memories loaded from {}",
        manager.len().to_string().bold(),
        cfg.db_path.display().to_string().dimmed()
    );

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(repl::Session::new(manager, cfg), shutdown);
    ExitCode::SUCCESS
}

fn probe_ollama(cfg: &Config) {
    print!("\n  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    std::io::Write::flush(&mut std::io::stdout()).ok();
    match ollama::fetch_models(&cfg.ollama_url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            if !models.iter().any(|m| m.name == cfg.active_model) {
                println!(
                    "  {} '{}' is not pulled; /ask will fall back to general talk.",
                    "Note:".yellow(),
                    cfg.active_model
                );
            }
        }
        Err(e) => {
            warn!(error = %e, "Ollama probe failed");
            println!("{}", "offline".yellow());
            println!(
                "  {}  /ask will treat input as general talk until `{}` is running.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       Mnemos First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Mnemos.\n");

    let mut cfg = Config::default();
    cfg.apply_env_overrides();

    let db_path = prompt_line(
        &format!("  Memory database [{}]: ", cfg.db_path.display()),
        "",
    );
    if !db_path.is_empty() {
        cfg.db_path = db_path.into();
    }

    println!("  Classify free-form input with a local model via Ollama?");
    let classify = prompt_line("  Enable classifier (y/n) [y]: ", "y");
    cfg.classifier_enabled = !classify.eq_ignore_ascii_case("n");
    if cfg.classifier_enabled {
        cfg.ollama_url = prompt_line(
            &format!("  Ollama URL [{}]: ", cfg.ollama_url),
            &cfg.ollama_url,
        );
        cfg.active_model = prompt_line(
            &format!("  Model [{}]: ", cfg.active_model),
            &cfg.active_model,
        );
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"   __  ___                        "#.bold().cyan());
    println!("{}", r#"  /  |/  /__  ___ __ _  ___  ___  "#.bold().cyan());
    println!("{}", r#" / /|_/ / _ \/ -_)  ' \/ _ \(_-<  "#.bold().cyan());
    println!("{}", r#"/_/  /_/_//_/\__/_/_/_/\___/___/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Mnemos".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Multimodal memory for things you point at");
    println!();
}
