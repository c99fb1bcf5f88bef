//! Discovery registry: a TCP client for a remote registry, and an
//! embeddable server a peer can spawn when none answers at startup.
use std::collections::BTreeMap;
use std::io::BufRead;
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};
use ra_core::{Registry, RegistryError, TransportError};

use crate::conn;
use crate::wire::{Request, Response};

/// Talks to a registry reachable at a fixed `host:port` over the TCP
/// wire protocol.
pub struct TcpRegistryClient {
    addr: String,
    timeout: Duration,
}

impl TcpRegistryClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// A cheap reachability probe used at startup to decide whether to
    /// fall back to an embedded registry.
    pub fn is_reachable(&self) -> bool {
        self.locate_checked().is_ok()
    }

    fn locate_checked(&self) -> Result<String, TransportError> {
        let stream = conn::dial(&self.addr, self.timeout)?;
        match conn::call(stream, &Request::RegistryLocate)? {
            Response::Ok(v) => Ok(v.as_str().unwrap_or_default().to_string()),
            Response::Err(e) => Err(TransportError::Protocol(e)),
        }
    }

    fn call(&self, req: Request) -> Result<Response, TransportError> {
        let stream = conn::dial(&self.addr, self.timeout)?;
        conn::call(stream, &req)
    }
}

impl Registry for TcpRegistryClient {
    fn register(&self, name: &str, uri: &str) -> Result<(), RegistryError> {
        match self.call(Request::RegistryRegister {
            name: name.to_string(),
            uri: uri.to_string(),
        })? {
            Response::Ok(_) => Ok(()),
            Response::Err(e) if e.contains("conflict") => Err(RegistryError::NameConflict(name.to_string())),
            Response::Err(e) => Err(RegistryError::Unreachable(TransportError::Protocol(e))),
        }
    }

    fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.call(Request::RegistryRemove {
            name: name.to_string(),
        })?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<BTreeMap<String, String>, RegistryError> {
        match self.call(Request::RegistryList {
            prefix: prefix.to_string(),
        })? {
            Response::Ok(v) => Ok(serde_json::from_value(v).unwrap_or_default()),
            Response::Err(e) => Err(RegistryError::Unreachable(TransportError::Protocol(e))),
        }
    }

    fn locate(&self) -> String {
        self.addr.clone()
    }
}

/// An in-process registry server, spawned when no external registry
/// answers at startup. Serves the same wire protocol so other peers on
/// the network can reach it through [`TcpRegistryClient`] like any
/// other registry.
pub struct EmbeddedRegistry {
    addr: String,
}

impl EmbeddedRegistry {
    /// Bind and start serving in a background thread. Fails if the
    /// address can't be bound (e.g. something else already owns the
    /// port without speaking our protocol).
    pub fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        let bound = listener.local_addr()?.to_string();
        let store: std::sync::Arc<Mutex<BTreeMap<String, String>>> =
            std::sync::Arc::new(Mutex::new(BTreeMap::new()));

        std::thread::Builder::new()
            .name("ra-registry".into())
            .spawn(move || serve(listener, store))
            .expect("failed to spawn embedded registry thread");

        Ok(Self { addr: bound })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

fn serve(listener: TcpListener, store: std::sync::Arc<Mutex<BTreeMap<String, String>>>) {
    for conn in listener.incoming() {
        let Ok(mut stream) = conn else { continue };
        let store = store.clone();
        std::thread::spawn(move || {
            if let Err(err) = handle_one(&mut stream, &store) {
                debug!("embedded registry connection error: {}", err);
            }
        });
    }
}

fn handle_one(
    stream: &mut TcpStream,
    store: &Mutex<BTreeMap<String, String>>,
) -> std::io::Result<()> {
    let mut reader = std::io::BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(());
    }
    let request: Request = match serde_json::from_str(line.trim()) {
        Ok(r) => r,
        Err(err) => {
            warn!("malformed registry request: {}", err);
            let _ = conn::write_line(stream, &Response::Err(err.to_string()));
            return Ok(());
        }
    };

    let response = match request {
        Request::RegistryRegister { name, uri } => {
            let mut store = store.lock().unwrap();
            match store.get(&name) {
                Some(existing) if existing != &uri => {
                    Response::Err(format!("name conflict: {name}"))
                }
                _ => {
                    store.insert(name, uri);
                    Response::ok()
                }
            }
        }
        Request::RegistryRemove { name } => {
            store.lock().unwrap().remove(&name);
            Response::ok()
        }
        Request::RegistryList { prefix } => {
            let matches: BTreeMap<String, String> = store
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Response::Ok(serde_json::to_value(matches).unwrap())
        }
        Request::RegistryLocate => Response::Ok(serde_json::Value::String(
            stream.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        )),
        other => Response::Err(format!("not a registry request: {other:?}")),
    };

    let _ = conn::write_line(stream, &response);
    Ok(())
}
