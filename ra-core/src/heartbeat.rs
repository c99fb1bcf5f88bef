//! Heartbeat Engine.
//!
//! The engine's two halves — the periodic broadcast-and-prune tick,
//! and handling an inbound `HEARTBEAT` — are implemented as
//! [`crate::service::RaService`] methods, since both need to operate
//! under the single mutual-exclusion discipline that guards
//! `peers`/`state`/`timestamp`/`queued_requests`. This module is
//! the public entry point that wires the periodic tick into the
//! scheduler at startup.
use std::sync::Arc;

use crate::service::RaService;

/// Arm the heartbeat interval job. Call once, after constructing the
/// service and before serving RPCs.
pub fn start(service: &Arc<RaService>) {
    service.start_heartbeat();
}
