//! The RA state machine — the core of this crate.
//!
//! `RaService` owns a single mutual-exclusion domain:
//! `{state, timestamp, queued_requests, peers}` are all
//! inside one [`Mutex`], and the CS-entry gate is a [`Condvar`] wait
//! re-checked on every reply, peer eviction, or peer-count change —
//! no busy-polling.
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, info, trace, warn};

use crate::clock::{RefClock, Timestamp};
use crate::config::Timing;
use crate::error::RaError;
use crate::membership::Membership;
use crate::pool::DispatchPool;
use crate::registry::Registry;
use crate::request::RequestTable;
use crate::scheduler::Scheduler;
use crate::transport::Transport;
use crate::types::{PeerId, ReplyStatus, Response, State};

const AUTO_RELEASE_JOB: &str = "exit_cs";
const HEARTBEAT_JOB: &str = "heartbeat";

struct Inner {
    state: State,
    timestamp: Option<Timestamp>,
    queue: VecDeque<(Timestamp, PeerId)>,
    membership: Membership,
}

fn gate_open(inner: &Inner) -> bool {
    inner.membership.is_empty()
        || inner
            .membership
            .iter()
            .all(|(_, entry)| entry.response == ReplyStatus::Accept)
}

/// One peer's view of the distributed mutual-exclusion protocol.
pub struct RaService {
    self_id: PeerId,
    inner: Mutex<Inner>,
    gate: Condvar,
    transport: Arc<dyn Transport>,
    scheduler: Arc<Scheduler>,
    request_table: RequestTable,
    pool: DispatchPool,
    clock: RefClock,
    timing: Timing,
}

impl RaService {
    pub fn new(
        self_id: PeerId,
        registry: Arc<dyn Registry>,
        transport: Arc<dyn Transport>,
        clock: RefClock,
        timing: Timing,
    ) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler::new());
        let request_table = RequestTable::new(scheduler.clone());
        let membership = Membership::new(self_id.clone(), registry, clock.clone(), timing);

        Arc::new(Self {
            self_id,
            inner: Mutex::new(Inner {
                state: State::Released,
                timestamp: None,
                queue: VecDeque::new(),
                membership,
            }),
            gate: Condvar::new(),
            transport,
            scheduler,
            request_table,
            pool: DispatchPool::new(),
            clock,
            timing,
        })
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Arm the periodic heartbeat broadcast. Call once at startup.
    pub fn start_heartbeat(self: &Arc<Self>) {
        let svc = Arc::clone(self);
        self.scheduler
            .schedule_interval(HEARTBEAT_JOB, self.timing.heartbeat_interval, move || {
                svc.heartbeat_tick();
            });
    }

    pub fn stop_heartbeat(&self) {
        self.scheduler.cancel(HEARTBEAT_JOB);
    }

    pub fn state(&self) -> State {
        self.inner.lock().unwrap().state
    }

    /// Snapshot of known peers for the `list_peers` CLI operation:
    /// id, current reply status, last heartbeat.
    pub fn list_peers(&self) -> Vec<(PeerId, ReplyStatus, Timestamp)> {
        let inner = self.inner.lock().unwrap();
        inner
            .membership
            .iter()
            .map(|(id, entry)| (id.clone(), entry.response, entry.last_heartbeat))
            .collect()
    }

    // ---- RA state machine ----------------------------------------

    /// Request exclusive access to the critical section. Blocks the
    /// caller until the gate opens, then returns with the CS held.
    pub fn request_cs(self: &Arc<Self>) -> Result<(), RaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == State::Held {
            return Err(RaError::AlreadyHeld);
        }

        inner.membership.refresh_from_registry();
        inner.state = State::Wanted;
        let now = self.clock.now();
        inner.timestamp = Some(now);

        let ids = inner.membership.reset_for_request();
        trace!("{}: requesting CS at T={} against {:?}", self.self_id, now, ids);

        for id in &ids {
            let svc = Arc::clone(self);
            let peer = id.clone();
            self.request_table.arm_deadline(id, &self.timing, move || {
                svc.check_response(&peer);
            });
        }
        for id in &ids {
            let svc = Arc::clone(self);
            let peer = id.clone();
            self.pool.submit(move || {
                if let Err(err) =
                    svc.transport
                        .receive_critical_section_request(&peer, now, &svc.self_id)
                {
                    warn!("{}: REQUEST to {} failed: {}", svc.self_id, peer, err);
                    svc.evict_peer(&peer);
                }
            });
        }

        while !gate_open(&inner) {
            inner = self.gate.wait(inner).unwrap();
        }

        inner.state = State::Held;
        self.request_table.cancel_all(&ids);
        info!("{}: critical section acquired", self.self_id);
        drop(inner);

        let svc = Arc::clone(self);
        self.scheduler
            .schedule_once(AUTO_RELEASE_JOB, self.timing.cs_auto_release, move || {
                if let Err(err) = svc.exit_cs() {
                    debug!("{}: auto-release no-op: {}", svc.self_id, err);
                }
            });

        Ok(())
    }

    /// Release the critical section, flushing the deferred queue.
    pub fn exit_cs(&self) -> Result<(), RaError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != State::Held {
            return Err(RaError::NotHeld);
        }
        self.scheduler.cancel(AUTO_RELEASE_JOB);

        inner.state = State::Released;
        inner.timestamp = None;

        let queue = std::mem::take(&mut inner.queue);
        let to_accept: Vec<PeerId> = queue
            .into_iter()
            .filter(|(_, id)| inner.membership.is_live(id))
            .map(|(_, id)| id)
            .collect();
        drop(inner);

        info!("{}: critical section released", self.self_id);
        for id in to_accept {
            let svc_self_id = self.self_id.clone();
            let transport = Arc::clone(&self.transport);
            let peer = id.clone();
            self.pool.submit(move || {
                if let Err(err) =
                    transport.reply_critical_section_request(&peer, &svc_self_id, Response::Accept)
                {
                    warn!("flush ACCEPT to {} failed: {}", peer, err);
                }
            });
        }
        self.gate.notify_all();

        Ok(())
    }

    /// Handle an incoming `REQUEST` RPC.
    pub fn on_request(&self, timestamp: Timestamp, sender_id: PeerId) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.membership.is_live(&sender_id) {
            trace!("ignoring REQUEST from unknown/stale peer {}", sender_id);
            return;
        }

        let should_deny = match inner.state {
            State::Held => true,
            State::Wanted => {
                let my_ts = inner.timestamp.expect("WANTED implies a timestamp");
                my_ts < timestamp || (my_ts.0 == timestamp.0 && self.self_id < sender_id)
            }
            State::Released => false,
        };

        let response = if should_deny {
            inner.queue.push_back((timestamp, sender_id.clone()));
            Response::Deny
        } else {
            Response::Accept
        };
        drop(inner);

        debug!("{}: {} to {}'s REQUEST", self.self_id, response, sender_id);
        let transport = Arc::clone(&self.transport);
        let self_id = self.self_id.clone();
        let peer = sender_id.clone();
        self.pool.submit(move || {
            if let Err(err) = transport.reply_critical_section_request(&peer, &self_id, response) {
                warn!("reply {} to {} failed: {}", response, peer, err);
            }
        });
    }

    /// Handle an incoming `REPLY` RPC.
    pub fn on_reply(&self, sender_id: PeerId, response: Response) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.membership.contains(&sender_id) {
            trace!("ignoring stale reply from {}", sender_id);
            return;
        }
        inner.membership.set_response(&sender_id, response.into());
        drop(inner);

        self.request_table.cancel_deadline(&sender_id);
        self.gate.notify_all();
    }

    /// Handle an incoming `HEARTBEAT` RPC.
    pub fn on_heartbeat(&self, sender_id: PeerId) {
        let mut inner = self.inner.lock().unwrap();
        inner.membership.touch(&sender_id);
    }

    /// Reply-deadline expiry hook: if `peer` is still PENDING, it's pruned.
    fn check_response(&self, peer: &PeerId) {
        let mut inner = self.inner.lock().unwrap();
        let still_pending = matches!(
            inner.membership.get(peer).map(|e| e.response),
            Some(ReplyStatus::Pending)
        );
        if still_pending {
            debug!("{}: reply deadline expired for {}", self.self_id, peer);
            inner.membership.drop_peer(peer);
            drop(inner);
            self.gate.notify_all();
        }
    }

    fn evict_peer(&self, peer: &PeerId) {
        let mut inner = self.inner.lock().unwrap();
        inner.membership.drop_peer(peer);
        drop(inner);
        self.request_table.cancel_deadline(peer);
        self.gate.notify_all();
    }

    // ---- Heartbeat Engine -----------------------------------------

    fn heartbeat_tick(self: &Arc<Self>) {
        let mut inner = self.inner.lock().unwrap();
        let pruned = inner.membership.prune_stale();
        let mut ids = inner.membership.ids();
        drop(inner);

        if !pruned.is_empty() {
            for id in &pruned {
                self.request_table.cancel_deadline(id);
            }
            self.gate.notify_all();
        }

        // Jitter the fan-out order so peers sharing the same heartbeat
        // interval don't all land on each other in the same BTreeMap
        // order tick after tick.
        fastrand::shuffle(&mut ids);

        for id in ids {
            let svc = Arc::clone(self);
            let peer = id.clone();
            self.pool.submit(move || {
                if let Err(err) = svc.transport.receive_heartbeat(&peer, &svc.self_id) {
                    warn!("{}: heartbeat to {} failed: {}", svc.self_id, peer, err);
                    svc.evict_peer(&peer);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::{RegistryError, TransportError};
    use std::collections::BTreeMap as StdBTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct NullRegistry;
    impl Registry for NullRegistry {
        fn register(&self, _name: &str, _uri: &str) -> Result<(), RegistryError> {
            Ok(())
        }
        fn remove(&self, _name: &str) -> Result<(), RegistryError> {
            Ok(())
        }
        fn list(&self, _prefix: &str) -> Result<StdBTreeMap<String, String>, RegistryError> {
            Ok(StdBTreeMap::new())
        }
        fn locate(&self) -> String {
            "inproc://null".into()
        }
    }

    /// A transport over an in-process routing table, for deterministic
    /// unit tests of the RA state machine without real sockets.
    #[derive(Default)]
    struct LoopbackTransport {
        routes: StdMutex<StdBTreeMap<String, Arc<RaService>>>,
        fail: StdMutex<std::collections::BTreeSet<String>>,
    }

    impl LoopbackTransport {
        fn register(&self, id: &PeerId, svc: Arc<RaService>) {
            self.routes.lock().unwrap().insert(id.to_string(), svc);
        }

        fn fail_calls_to(&self, id: &PeerId) {
            self.fail.lock().unwrap().insert(id.to_string());
        }
    }

    impl Transport for LoopbackTransport {
        fn receive_critical_section_request(
            &self,
            peer: &PeerId,
            timestamp: Timestamp,
            sender_id: &PeerId,
        ) -> Result<(), TransportError> {
            if self.fail.lock().unwrap().contains(peer.as_str()) {
                return Err(TransportError::Timeout);
            }
            let routes = self.routes.lock().unwrap();
            if let Some(svc) = routes.get(peer.as_str()) {
                svc.on_request(timestamp, sender_id.clone());
            }
            Ok(())
        }

        fn reply_critical_section_request(
            &self,
            peer: &PeerId,
            sender_id: &PeerId,
            response: Response,
        ) -> Result<(), TransportError> {
            if self.fail.lock().unwrap().contains(peer.as_str()) {
                return Err(TransportError::Timeout);
            }
            let routes = self.routes.lock().unwrap();
            if let Some(svc) = routes.get(peer.as_str()) {
                svc.on_reply(sender_id.clone(), response);
            }
            Ok(())
        }

        fn receive_heartbeat(&self, peer: &PeerId, sender_id: &PeerId) -> Result<(), TransportError> {
            if self.fail.lock().unwrap().contains(peer.as_str()) {
                return Err(TransportError::Timeout);
            }
            let routes = self.routes.lock().unwrap();
            if let Some(svc) = routes.get(peer.as_str()) {
                svc.on_heartbeat(sender_id.clone());
            }
            Ok(())
        }
    }

    fn make(id: &str, transport: Arc<LoopbackTransport>, clock: RefClock, timing: Timing) -> Arc<RaService> {
        let self_id = PeerId::new(id).unwrap();
        RaService::new(self_id, Arc::new(NullRegistry), transport, clock, timing)
    }

    #[test]
    fn solo_peer_enters_immediately() {
        let clock = RefClock::new(Arc::new(FakeClock::new(100.0)));
        let transport = Arc::new(LoopbackTransport::default());
        let a = make("a", transport, clock, Timing::fast());

        a.request_cs().unwrap();
        assert_eq!(a.state(), State::Held);
        assert!(a.list_peers().is_empty());

        a.exit_cs().unwrap();
        assert_eq!(a.state(), State::Released);
    }

    #[test]
    fn already_held_errors() {
        let clock = RefClock::new(Arc::new(FakeClock::new(100.0)));
        let transport = Arc::new(LoopbackTransport::default());
        let a = make("a", transport, clock, Timing::fast());
        a.request_cs().unwrap();
        assert_eq!(a.request_cs().unwrap_err(), RaError::AlreadyHeld);
    }

    #[test]
    fn not_held_errors() {
        let clock = RefClock::new(Arc::new(FakeClock::new(100.0)));
        let transport = Arc::new(LoopbackTransport::default());
        let a = make("a", transport, clock, Timing::fast());
        assert_eq!(a.exit_cs().unwrap_err(), RaError::NotHeld);
    }

    #[test]
    fn two_peers_no_contention() {
        let clock = RefClock::new(Arc::new(FakeClock::new(100.0)));
        let transport = Arc::new(LoopbackTransport::default());
        let a = make("a", transport.clone(), clock.clone(), Timing::fast());
        let b = make("b", transport.clone(), clock.clone(), Timing::fast());
        transport.register(a.self_id(), a.clone());
        transport.register(b.self_id(), b.clone());
        a.on_heartbeat(b.self_id().clone());
        b.on_heartbeat(a.self_id().clone());

        a.request_cs().unwrap();
        assert_eq!(a.state(), State::Held);

        let b2 = b.clone();
        let joined = Arc::new(AtomicBool::new(false));
        let joined2 = joined.clone();
        let handle = std::thread::spawn(move || {
            b2.request_cs().unwrap();
            joined2.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!joined.load(Ordering::SeqCst));

        a.exit_cs().unwrap();
        handle.join().unwrap();
        assert_eq!(b.state(), State::Held);
    }

    #[test]
    fn peer_death_during_wait_is_pruned() {
        let clock = RefClock::new(Arc::new(FakeClock::new(100.0)));
        let transport = Arc::new(LoopbackTransport::default());
        let a = make("a", transport.clone(), clock.clone(), Timing::fast());
        let b = make("b", transport.clone(), clock.clone(), Timing::fast());
        transport.register(a.self_id(), a.clone());
        transport.register(b.self_id(), b.clone());
        a.on_heartbeat(b.self_id().clone());
        a.on_heartbeat(PeerId::new("c").unwrap());
        transport.fail_calls_to(&PeerId::new("c").unwrap());

        a.request_cs().unwrap();
        assert_eq!(a.state(), State::Held);
    }
}
