//! `relayctl-cli` – bench console for the relay controller
//!
//! This binary:
//!
//! 1. Initialises logging (and OTLP export when configured).
//! 2. Loads `~/.relayctl/config.toml`, writing a bench layout on first run.
//! 3. Builds a controller on the simulated pin bank.
//! 4. Drops the user into an **interactive REPL** (`/invoke`, `/describe`, …).
//! 5. Intercepts **Ctrl-C** to deactivate every relay before exiting.

mod config;
mod repl;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use colored::Colorize;
use relayctl_hal::{SimPinBank, SimSubDriverFactory, SystemClock};
use relayctl_runtime::RelayController;
use tracing::{error, warn};

fn main() {
    let _telemetry = relayctl_runtime::init_tracing("relayctl");

    print_banner();

    let cfg = load_config();
    let controller = match RelayController::from_definitions(
        cfg.name.clone(),
        &cfg.relays,
        Arc::new(SimPinBank::new()),
        &SimSubDriverFactory::new(),
        Arc::new(SystemClock),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %e, "failed to build controller");
            eprintln!("{}: {}", "Cannot start controller".red().bold(), e);
            std::process::exit(1);
        }
    };
    println!(
        "  Controller {} ready with {} relay(s).",
        cfg.name.bold(),
        controller.registry().len()
    );

    let controller: repl::SharedController = Arc::new(Mutex::new(controller));
    let stop = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    // Waits for any in-flight command to finish, then sweeps every relay.
    let ctrlc_controller = controller.clone();
    let ctrlc_stop = stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – deactivating relays …".yellow().bold());
        let ok = repl::lock(&ctrlc_controller).shutdown();
        if ok {
            println!("{}", "  ✓ All relays deactivated.".green());
        } else {
            println!("{}", "  ✗ Some relays failed to deactivate.".red());
        }
        ctrlc_stop.store(true, Ordering::SeqCst);
        std::process::exit(if ok { 0 } else { 1 });
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; relays will not be swept on Ctrl-C");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(controller.clone(), stop);

    let mut controller = repl::lock(&controller);
    if !controller.is_shut_down() && !controller.shutdown() {
        std::process::exit(1);
    }
}

fn load_config() -> config::Config {
    let path = config::config_path();
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save_to(&cfg, &path) {
                Ok(()) => println!(
                    "  {} Bench config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using the bench configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

fn print_banner() {
    println!();
    println!("{}", r#"           __               __  __"#.bold().cyan());
    println!("{}", r#"  _______ / /__ ___ ______ / /_/ /"#.bold().cyan());
    println!("{}", r#" / __/ -_) / _ `/ // / __// __/ / "#.bold().cyan());
    println!("{}", r#"/_/  \__/_/\_,_/\_, /\__/ \__/_/  "#.bold().cyan());
    println!("{}", r#"               /___/              "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "relayctl".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  GPIO-expander relay controller");
    println!();
}
