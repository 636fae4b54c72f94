//! `navisim` – headless agent and LiDAR simulator.
//!
//! 1. Initialises tracing (see [`telemetry`]).
//! 2. Loads `~/.navisim/config.toml`, writing the defaults on first run, and
//!    applies `NAVISIM_*` overrides.
//! 3. Runs the [`node::Node`] on a Tokio runtime until Ctrl-C, then logs the
//!    primitive registry.

mod config;
mod node;
mod telemetry;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, warn};

fn main() -> ExitCode {
    let _telemetry = telemetry::init_tracing("navisim");

    print_banner();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    if let Err(e) = cfg.validate() {
        println!("{}: {}", "Invalid configuration".red(), e);
        return ExitCode::FAILURE;
    }

    // ── Shutdown flag ─────────────────────────────────────────────────────
    // One sender stays here so the flag only closes when main returns.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let ctrlc_tx = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        ctrlc_tx.send_replace(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the simulator must be killed to stop");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let node = match node::Node::new(&cfg) {
        Ok(node) => node,
        Err(e) => {
            println!("{}: {}", "Startup failed".red(), e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "  Simulating at {} ms per tick, LiDAR at {} Hz. Press {} to stop.\n",
        cfg.tick_period_ms,
        cfg.lidar.scan_rate_hz,
        "Ctrl-C".bold()
    );
    runtime.block_on(node.run(shutdown_rx));
    drop(shutdown_tx);

    println!("{}", "  ✓ Exiting NaviSim.".green());
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _  __          _ _____ _         "#.bold().cyan());
    println!("{}", r#"  / |/ /__ __  __(_) ___/(_)_ _     "#.bold().cyan());
    println!("{}", r#" /    / _ `/ |/ / /\__ \/ /  ' \    "#.bold().cyan());
    println!("{}", r#"/_/|_/\_,_/|___/_/___/_/_/_/_/_/    "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "NaviSim".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Planar agent and LiDAR simulator");
    println!();
}
