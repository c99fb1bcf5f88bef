//! Error taxonomy.
//!
//! Kept small and local: transient RPC failures never surface past
//! the component that can act on them (they become a `drop(peer_id)`),
//! so only precondition violations and transport/registry failures
//! need a public error type.
use thiserror::Error;

/// Protocol precondition violations from the RA state machine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaError {
    #[error("critical section already held")]
    AlreadyHeld,
    #[error("critical section not held")]
    NotHeld,
}

/// Failure talking to a remote peer over the transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("call timed out")]
    Timeout,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Failure talking to the discovery registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("name already registered: {0}")]
    NameConflict(String),
    #[error("registry unreachable: {0}")]
    Unreachable(#[from] TransportError),
}
