//! Request Table.
//!
//! Owns the per-peer reply-deadline timers for the request currently
//! in flight. The reply *status* itself lives on each
//! [`crate::membership::PeerEntry`] — this component is purely the
//! timer bookkeeping layered on top of the [`Scheduler`].
use std::sync::Arc;

use crate::config::Timing;
use crate::scheduler::Scheduler;
use crate::types::PeerId;

fn deadline_job_id(peer: &PeerId) -> String {
    format!("check_{}", peer)
}

pub struct RequestTable {
    scheduler: Arc<Scheduler>,
}

impl RequestTable {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Arm a one-shot reply-deadline timer for `peer`. `on_expire` runs
    /// if the peer hasn't replied within `timing.reply_deadline`.
    pub fn arm_deadline(&self, peer: &PeerId, timing: &Timing, on_expire: impl FnMut() + Send + 'static) {
        self.scheduler
            .schedule_once(deadline_job_id(peer), timing.reply_deadline, on_expire);
    }

    /// Cancel `peer`'s deadline timer, e.g. because its reply arrived.
    pub fn cancel_deadline(&self, peer: &PeerId) {
        self.scheduler.cancel(deadline_job_id(peer));
    }

    /// Cancel every deadline timer for the given peer snapshot, e.g.
    /// when the request round concludes.
    pub fn cancel_all(&self, peers: &[PeerId]) {
        for peer in peers {
            self.cancel_deadline(peer);
        }
    }
}
