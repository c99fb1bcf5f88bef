//! The RPC surface a peer exposes to, and calls on, its remotes.
//!
//! This module only defines the contract. The concrete wire implementation — a TCP + newline-delimited JSON
//! protocol — lives in `ra-node`, since the transport is treated as an
//! external collaborator: the RA state machine only ever talks to a
//! `Transport`.
use crate::clock::Timestamp;
use crate::error::TransportError;
use crate::types::{PeerId, Response};

/// A handle capable of invoking the three RPC methods on one specific
/// remote peer.
///
/// Every call is expected to enforce its own 5s wall-clock timeout and
/// translate any failure (refused connection, timeout, malformed
/// reply) into a [`TransportError`] — callers interpret any error as
/// "the peer is gone" and evict it.
pub trait Transport: Send + Sync {
    fn receive_critical_section_request(
        &self,
        peer: &PeerId,
        timestamp: Timestamp,
        sender_id: &PeerId,
    ) -> Result<(), TransportError>;

    fn reply_critical_section_request(
        &self,
        peer: &PeerId,
        sender_id: &PeerId,
        response: Response,
    ) -> Result<(), TransportError>;

    fn receive_heartbeat(&self, peer: &PeerId, sender_id: &PeerId) -> Result<(), TransportError>;
}
