//! Core Ricart–Agrawala distributed mutual-exclusion state machine.
//!
//! This crate implements the algorithm itself: the RA state machine,
//! membership tracking, heartbeat-driven
//! failure detection, the request table's reply-deadline timers, and
//! the scheduler they all run on. It depends only on the [`Transport`]
//! and [`Registry`] traits for the outside world — concrete
//! implementations (real sockets, a real name service) live in the
//! `ra-node` binary crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod membership;
pub mod pool;
pub mod registry;
pub mod request;
pub mod scheduler;
pub mod service;
pub mod transport;
pub mod types;

pub use clock::{Clock, RefClock, Timestamp};
pub use config::Timing;
pub use error::{RaError, RegistryError, TransportError};
pub use membership::{Membership, PeerEntry};
pub use registry::Registry;
pub use scheduler::Scheduler;
pub use service::RaService;
pub use transport::Transport;
pub use types::{PeerId, ReplyStatus, Response, State};
