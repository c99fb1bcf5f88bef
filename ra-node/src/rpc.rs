//! Concrete [`Transport`] over the TCP wire protocol, plus the inbound
//! RPC server that dispatches to a [`RaService`].
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use ra_core::{PeerId, RaService, Registry, Response as RaResponse, Timestamp, Transport, TransportError};

use crate::conn;
use crate::wire::{Request, Response};

/// Dials peers by looking up their registered `uri` in the discovery
/// registry, then speaking the line-delimited JSON protocol.
pub struct TcpTransport {
    registry: Arc<dyn Registry>,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(registry: Arc<dyn Registry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    fn resolve(&self, peer: &PeerId) -> Result<String, TransportError> {
        let name = peer.registry_name();
        let entries = self.registry.list(&name).map_err(|err| {
            TransportError::Protocol(format!("registry lookup for {name} failed: {err}"))
        })?;
        entries
            .get(&name)
            .cloned()
            .ok_or_else(|| TransportError::Protocol(format!("peer {peer} not registered")))
    }

    fn call(&self, peer: &PeerId, request: &Request) -> Result<Response, TransportError> {
        let addr = self.resolve(peer)?;
        let stream = conn::dial(&addr, self.timeout)?;
        conn::call(stream, request)
    }
}

fn expect_ok(response: Response) -> Result<(), TransportError> {
    match response {
        Response::Ok(_) => Ok(()),
        Response::Err(e) => Err(TransportError::Protocol(e)),
    }
}

impl Transport for TcpTransport {
    fn receive_critical_section_request(
        &self,
        peer: &PeerId,
        timestamp: Timestamp,
        sender_id: &PeerId,
    ) -> Result<(), TransportError> {
        let req = Request::ReceiveCriticalSectionRequest {
            timestamp: timestamp.as_secs_f64(),
            sender_id: sender_id.to_string(),
        };
        expect_ok(self.call(peer, &req)?)
    }

    fn reply_critical_section_request(
        &self,
        peer: &PeerId,
        sender_id: &PeerId,
        response: RaResponse,
    ) -> Result<(), TransportError> {
        let req = Request::ReplyCriticalSectionRequest {
            sender_id: sender_id.to_string(),
            response: serde_json::Value::from(response.to_code()),
        };
        expect_ok(self.call(peer, &req)?)
    }

    fn receive_heartbeat(&self, peer: &PeerId, sender_id: &PeerId) -> Result<(), TransportError> {
        let req = Request::ReceiveHeartbeat {
            sender_id: sender_id.to_string(),
        };
        expect_ok(self.call(peer, &req)?)
    }
}

/// Bind a listener for this peer's own RPC surface and start serving
/// inbound requests against `service` on a background thread per
/// connection. Returns the bound address to register in the registry.
pub fn serve(service: Arc<RaService>, bind_addr: &str) -> std::io::Result<String> {
    let listener = TcpListener::bind(bind_addr)?;
    let addr = listener.local_addr()?.to_string();

    std::thread::Builder::new()
        .name("ra-rpc-server".into())
        .spawn(move || {
            for conn in listener.incoming() {
                let Ok(stream) = conn else { continue };
                let service = service.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &service) {
                        debug!("rpc connection error: {}", err);
                    }
                });
            }
        })
        .expect("failed to spawn rpc server thread");

    Ok(addr)
}

fn handle_connection(mut stream: TcpStream, service: &Arc<RaService>) -> std::io::Result<()> {
    use std::io::BufRead;

    let mut reader = std::io::BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(());
    }

    let request: Request = match serde_json::from_str(line.trim()) {
        Ok(r) => r,
        Err(err) => {
            warn!("malformed rpc request: {}", err);
            let _ = conn::write_line(&mut stream, &Response::Err(err.to_string()));
            return Ok(());
        }
    };

    let response = dispatch(service, request);
    let _ = conn::write_line(&mut stream, &response);
    Ok(())
}

fn dispatch(service: &Arc<RaService>, request: Request) -> Response {
    match request {
        Request::ReceiveCriticalSectionRequest { timestamp, sender_id } => {
            match PeerId::new(sender_id) {
                Ok(sender_id) => {
                    service.on_request(Timestamp(timestamp), sender_id);
                    Response::ok()
                }
                Err(err) => Response::Err(err.to_string()),
            }
        }
        Request::ReplyCriticalSectionRequest { sender_id, response } => {
            match (PeerId::new(sender_id), ra_core::types::decode_response(&response)) {
                (Ok(sender_id), Some(response)) => {
                    service.on_reply(sender_id, response);
                    Response::ok()
                }
                (Err(err), _) => Response::Err(err.to_string()),
                (_, None) => Response::Err("unrecognized response encoding".into()),
            }
        }
        Request::ReceiveHeartbeat { sender_id } => match PeerId::new(sender_id) {
            Ok(sender_id) => {
                service.on_heartbeat(sender_id);
                Response::ok()
            }
            Err(err) => Response::Err(err.to_string()),
        },
        other => Response::Err(format!("not a peer request: {other:?}")),
    }
}
