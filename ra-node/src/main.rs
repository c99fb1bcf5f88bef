mod cli;
mod conn;
mod config;
mod registry;
mod rpc;
mod wire;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::info;
use ra_core::{PeerId, RaService, RefClock, Registry, RegistryError, Timing};

use registry::{EmbeddedRegistry, TcpRegistryClient};

fn main() -> Result<()> {
    let opts = config::parse()?;

    let level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let registry = connect_registry(&opts.registry)?;
    let timing = Timing::default();
    let (peer_id, my_uri, service) = bootstrap(&opts, registry.clone(), timing)?;

    ra_core::heartbeat::start(&service);
    install_signal_handler(service.clone(), registry.clone());

    println!("Ready as {peer_id} at {my_uri}");
    println!("Registry reachable at {}", registry.locate());

    cli::run(service.clone(), registry.clone());

    shutdown(&service, registry.as_ref());
    Ok(())
}

/// Connect to the configured registry; if unreachable, spawn an
/// embedded one on the same address.
fn connect_registry(addr: &str) -> Result<Arc<dyn Registry>> {
    let timeout = Duration::from_secs(5);
    let probe = TcpRegistryClient::new(addr, timeout);
    if probe.is_reachable() {
        info!("using registry at {addr}");
        return Ok(Arc::new(probe));
    }

    info!("no registry reachable at {addr}, starting an embedded one");
    let embedded = EmbeddedRegistry::bind(addr).context("failed to start embedded registry")?;
    Ok(Arc::new(TcpRegistryClient::new(embedded.addr(), timeout)))
}

/// Prompt for (or take from `--id`) a peer id, bind our RPC surface,
/// and register in the discovery registry, re-prompting on a naming
/// conflict.
fn bootstrap(
    opts: &config::Opts,
    registry: Arc<dyn Registry>,
    timing: Timing,
) -> Result<(PeerId, String, Arc<RaService>)> {
    let transport = Arc::new(rpc::TcpTransport::new(registry.clone(), timing.rpc_timeout));

    let mut requested_id = opts.id.clone();
    loop {
        let id_str = match requested_id.take() {
            Some(id) => id,
            None => prompt("Choose a name for this peer: ")?,
        };
        let peer_id = match PeerId::new(id_str) {
            Ok(id) => id,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        let service = RaService::new(
            peer_id.clone(),
            registry.clone(),
            transport.clone(),
            RefClock::system(),
            timing,
        );
        let uri = rpc::serve(service.clone(), "0.0.0.0:0").context("failed to bind peer RPC server")?;

        match registry.register(&peer_id.registry_name(), &uri) {
            Ok(()) => return Ok((peer_id, uri, service)),
            Err(RegistryError::NameConflict(_)) => {
                println!("'{peer_id}' is already registered, choose another name.");
                continue;
            }
            Err(err) => return Err(err).context("failed to register with the discovery registry"),
        }
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Graceful teardown on quit or SIGINT: stop our scheduler jobs, then
/// deregister. The RPC listener threads and any embedded registry are
/// daemon-style background threads that exit with the process.
fn shutdown(service: &Arc<RaService>, registry: &dyn Registry) {
    service.stop_heartbeat();
    let _ = registry.remove(&service.self_id().registry_name());
}

fn install_signal_handler(service: Arc<RaService>, registry: Arc<dyn Registry>) {
    let _ = ctrlc::set_handler(move || {
        shutdown(&service, registry.as_ref());
        std::process::exit(0);
    });
}
