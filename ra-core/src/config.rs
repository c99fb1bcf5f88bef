//! Timing constants — the observable contract peers run on.
use std::time::Duration;

/// The protocol's timing constants, overridable so tests can run the
/// full RA lifecycle in milliseconds instead of real seconds.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    /// How often the heartbeat engine broadcasts.
    pub heartbeat_interval: Duration,
    /// Max age of a peer's last heartbeat before it's considered dead.
    pub liveness_window: Duration,
    /// Max time to wait for a reply before pruning the peer.
    pub reply_deadline: Duration,
    /// How long the CS is held before auto-release.
    pub cs_auto_release: Duration,
    /// Wall-clock timeout for a single outbound RPC call.
    pub rpc_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            liveness_window: Duration::from_secs(15),
            reply_deadline: Duration::from_secs(10),
            cs_auto_release: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

impl Timing {
    /// A scaled-down timing profile for tests: keeps the same ratios
    /// between the constants (liveness window = 1.5x heartbeat, etc.)
    /// the protocol depends on, at a fraction of the real time.
    pub fn fast() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(40),
            liveness_window: Duration::from_millis(60),
            reply_deadline: Duration::from_millis(40),
            cs_auto_release: Duration::from_millis(40),
            rpc_timeout: Duration::from_millis(20),
        }
    }
}
