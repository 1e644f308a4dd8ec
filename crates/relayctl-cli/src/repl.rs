//! REPL – bench console for a running controller.
//!
//! Supported slash-commands:
//!   /help                              – show this list
//!   /relays                            – list configured relays
//!   /invoke <relay> <method> [json]    – send a command
//!   /describe                          – print the controller report
//!   /shutdown                          – deactivate every relay
//!   /quit | /exit                      – shut down and exit

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use colored::Colorize;
use relayctl_hal::RelayKind;
use relayctl_runtime::RelayController;
use relayctl_types::Payload;

pub type SharedController = Arc<Mutex<RelayController>>;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Help,
    Relays,
    Invoke {
        relay: String,
        method: String,
        payload: Payload,
    },
    Describe,
    Shutdown,
    Quit,
}

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (head, rest) = split_token(line);
    let cmd = match head {
        "/help" => ReplCommand::Help,
        "/relays" => ReplCommand::Relays,
        "/describe" => ReplCommand::Describe,
        "/shutdown" => ReplCommand::Shutdown,
        "/quit" | "/exit" => ReplCommand::Quit,
        "/invoke" => parse_invoke(rest)?,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(cmd))
}

fn parse_invoke(args: &str) -> Result<ReplCommand, String> {
    let (relay, rest) = split_token(args);
    let (method, raw_payload) = split_token(rest);
    if relay.is_empty() || method.is_empty() {
        return Err("usage: /invoke <relay> <method> [json]".to_string());
    }

    let payload = if raw_payload.is_empty() {
        Payload::new()
    } else {
        match serde_json::from_str(raw_payload) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return Err("payload must be a JSON object".to_string()),
            Err(e) => return Err(format!("invalid JSON payload: {e}")),
        }
    };

    Ok(ReplCommand::Invoke {
        relay: relay.to_string(),
        method: method.to_string(),
        payload,
    })
}

fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (s, ""),
    }
}

pub(crate) fn lock(controller: &SharedController) -> MutexGuard<'_, RelayController> {
    controller.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for the interactive REPL.
///
/// `stop` is polled each iteration; when set the REPL exits.
pub fn run(controller: SharedController, stop: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "relayctl>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let cmd = match parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };

        match cmd {
            ReplCommand::Help => cmd_help(),
            ReplCommand::Relays => cmd_relays(&controller),
            ReplCommand::Describe => cmd_describe(&controller),
            ReplCommand::Invoke { relay, method, payload } => {
                cmd_invoke(&controller, &relay, &method, payload)
            }
            ReplCommand::Shutdown => cmd_shutdown(&controller),
            ReplCommand::Quit => {
                println!("{}", "Goodbye.".green());
                stop.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "relayctl Commands".bold().underline());
    println!("  {}                           – list configured relays", "/relays".bold().cyan());
    println!("  {} – send a command", "/invoke <relay> <method> [json]".bold().cyan());
    println!("  {}                         – print the controller report", "/describe".bold().cyan());
    println!("  {}                         – deactivate every relay", "/shutdown".bold().cyan());
    println!("  {}                     – shut down and exit", "/quit  /exit".bold().cyan());
    println!();
    println!("  e.g. {}", r#"/invoke lamp switch {"status": "toggle"}"#.dimmed());
    println!();
}

fn cmd_relays(controller: &SharedController) {
    let controller = lock(controller);
    println!("{}", "Relays".bold().underline());
    for relay in controller.registry().iter() {
        let detail = match relay.kind() {
            RelayKind::Local(local) => {
                let methods: Vec<&str> = local.methods().keys().map(|m| m.as_str()).collect();
                format!("{}  [{}]", local.pin(), methods.join(", "))
            }
            RelayKind::Delegated(_) => "sub-driver".to_string(),
        };
        println!("  {:<12} {:<20} {}", relay.id().bold(), relay.name(), detail.dimmed());
    }
}

fn cmd_describe(controller: &SharedController) {
    let report = lock(controller).describe().to_value();
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(e) => println!("{}: {}", "Failed to render report".red(), e),
    }
}

fn cmd_invoke(controller: &SharedController, relay: &str, method: &str, payload: Payload) {
    let result = lock(controller).invoke(relay, method, payload);
    match result {
        Ok(resp) => println!("{} {}", "✓".green().bold(), resp.to_value()),
        Err(e) => println!("{} {}", "✗".red().bold(), e.to_string().red()),
    }
}

fn cmd_shutdown(controller: &SharedController) {
    if lock(controller).shutdown() {
        println!("{}", "✓ All relays deactivated.".green());
    } else {
        println!("{}", "⚠  Some relays failed to deactivate; see log.".yellow());
    }
}
