//! The interactive menu.
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use colored::Colorize;
use ra_core::{RaError, RaService, Registry, ReplyStatus};

use crate::shutdown;

pub fn run(service: Arc<RaService>, registry: Arc<dyn Registry>) {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print_menu();
        let Some(Ok(choice)) = lines.next() else {
            break;
        };

        match choice.trim() {
            "1" => request_cs(&service),
            "2" => exit_cs(&service),
            "3" => list_peers(&service),
            "4" | "q" | "quit" => {
                shutdown(&service, registry.as_ref());
                break;
            }
            _ => println!("{}", "Invalid option.".red()),
        }
    }
}

fn print_menu() {
    println!("\n1. Request critical section");
    println!("2. Release critical section");
    println!("3. List active peers");
    println!("4. Quit");
    print!("Choose an option: ");
    let _ = io::stdout().flush();
}

fn request_cs(service: &Arc<RaService>) {
    match service.request_cs() {
        Ok(()) => println!("{}", "Critical section acquired.".green()),
        Err(RaError::AlreadyHeld) => println!("{}", "Already in the critical section.".yellow()),
        Err(err) => println!("{}", format!("Error: {err}").red()),
    }
}

fn exit_cs(service: &Arc<RaService>) {
    match service.exit_cs() {
        Ok(()) => println!("{}", "Critical section released.".green()),
        Err(RaError::NotHeld) => println!("{}", "Not in the critical section.".yellow()),
        Err(err) => println!("{}", format!("Error: {err}").red()),
    }
}

fn list_peers(service: &Arc<RaService>) {
    let peers = service.list_peers();
    if peers.is_empty() {
        println!("No active peers.");
        return;
    }
    println!("Active peers:");
    for (id, status, last_heartbeat) in peers {
        let status = match status {
            ReplyStatus::Accept => "ACCEPT".green(),
            ReplyStatus::Deny => "DENY".red(),
            ReplyStatus::Pending => "PENDING".yellow(),
        };
        let when = Local
            .timestamp_opt(last_heartbeat.as_secs_f64() as i64, 0)
            .single()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("  {id}  {status}  last heartbeat: {when}");
    }
}
