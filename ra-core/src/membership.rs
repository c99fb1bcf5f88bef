//! Membership Tracker.
//!
//! Maintains the live peer set, backed by heartbeats and periodic
//! registry refreshes. Never contains `self_id`.
use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::clock::{RefClock, Timestamp};
use crate::config::Timing;
use crate::registry::Registry;
use crate::types::{PeerId, ReplyStatus};

/// One tracked remote peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub response: ReplyStatus,
    pub last_heartbeat: Timestamp,
}

pub struct Membership {
    self_id: PeerId,
    peers: BTreeMap<PeerId, PeerEntry>,
    registry: Arc<dyn Registry>,
    clock: RefClock,
    timing: Timing,
}

impl Membership {
    pub fn new(self_id: PeerId, registry: Arc<dyn Registry>, clock: RefClock, timing: Timing) -> Self {
        Self {
            self_id,
            peers: BTreeMap::new(),
            registry,
            clock,
            timing,
        }
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerEntry> {
        self.peers.get(id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &PeerEntry)> {
        self.peers.iter()
    }

    /// Snapshot of the currently known peer ids, for use when
    /// fanning out RPCs without holding the membership lock.
    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    /// A peer counts as live if it's tracked and its last heartbeat is
    /// within the liveness window.
    pub fn is_live(&self, id: &PeerId) -> bool {
        match self.peers.get(id) {
            Some(entry) => {
                self.clock.now().elapsed_since(entry.last_heartbeat)
                    <= self.timing.liveness_window.as_secs_f64()
            }
            None => false,
        }
    }

    pub fn set_response(&mut self, id: &PeerId, response: ReplyStatus) {
        if let Some(entry) = self.peers.get_mut(id) {
            entry.response = response;
        }
    }

    /// Mark every currently-known peer PENDING, in preparation for a
    /// new request round. Returns the snapshot of ids notified.
    pub fn reset_for_request(&mut self) -> Vec<PeerId> {
        for entry in self.peers.values_mut() {
            entry.response = ReplyStatus::Pending;
        }
        self.ids()
    }

    /// Update `last_heartbeat`; insert with a neutral DENY response if
    /// this is the first sighting of `id`.
    pub fn touch(&mut self, id: &PeerId) {
        if id == &self.self_id {
            return;
        }
        let now = self.clock.now();
        self.peers
            .entry(id.clone())
            .and_modify(|e| e.last_heartbeat = now)
            .or_insert(PeerEntry {
                response: ReplyStatus::Deny,
                last_heartbeat: now,
            });
    }

    /// List the registry under `peer.`, adding any unseen id and
    /// resetting `response` to PENDING for ids already known (a
    /// round-start sync). Never adds self.
    pub fn refresh_from_registry(&mut self) {
        let entries = match self.registry.list("peer.") {
            Ok(entries) => entries,
            Err(err) => {
                debug!("registry refresh failed: {}", err);
                return;
            }
        };
        let now = self.clock.now();
        for name in entries.keys() {
            let Some(raw_id) = name.strip_prefix("peer.") else {
                continue;
            };
            if raw_id == self.self_id.as_str() {
                continue;
            }
            let Ok(id) = PeerId::new(raw_id) else {
                continue;
            };
            self.peers
                .entry(id.clone())
                .and_modify(|e| e.response = ReplyStatus::Pending)
                .or_insert_with(|| {
                    debug!("discovered peer {} via registry", id);
                    PeerEntry {
                        response: ReplyStatus::Pending,
                        last_heartbeat: now,
                    }
                });
        }
    }

    /// Remove any entry whose last heartbeat is older than the
    /// liveness window, best-effort removing its registry entry too.
    pub fn prune_stale(&mut self) -> Vec<PeerId> {
        let now = self.clock.now();
        let window = self.timing.liveness_window.as_secs_f64();
        let stale: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, e)| now.elapsed_since(e.last_heartbeat) > window)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.drop_peer(id);
        }
        stale
    }

    /// Unconditional eviction, used on RPC failure or deadline expiry.
    pub fn drop_peer(&mut self, id: &PeerId) {
        if self.peers.remove(id).is_some() {
            debug!("evicting peer {}", id);
            let _ = self.registry.remove(&id.registry_name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::RegistryError;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeRegistry(StdMutex<BTreeMap<String, String>>);

    impl Registry for FakeRegistry {
        fn register(&self, name: &str, uri: &str) -> Result<(), RegistryError> {
            self.0.lock().unwrap().insert(name.to_string(), uri.to_string());
            Ok(())
        }

        fn remove(&self, name: &str) -> Result<(), RegistryError> {
            self.0.lock().unwrap().remove(name);
            Ok(())
        }

        fn list(&self, prefix: &str) -> Result<BTreeMap<String, String>, RegistryError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }

        fn locate(&self) -> String {
            "inproc://fake".into()
        }
    }

    fn fixture() -> (Membership, Arc<FakeClock>, Arc<FakeRegistry>) {
        let clock = Arc::new(FakeClock::new(1000.0));
        let registry = Arc::new(FakeRegistry::default());
        let m = Membership::new(
            PeerId::new("a").unwrap(),
            registry.clone(),
            RefClock::new(clock.clone()),
            Timing::fast(),
        );
        (m, clock, registry)
    }

    #[test]
    fn touch_inserts_unknown_peer_as_deny() {
        let (mut m, ..) = fixture();
        m.touch(&PeerId::new("b").unwrap());
        assert_eq!(m.get(&PeerId::new("b").unwrap()).unwrap().response, ReplyStatus::Deny);
    }

    #[test]
    fn touch_never_adds_self() {
        let (mut m, ..) = fixture();
        m.touch(&PeerId::new("a").unwrap());
        assert!(!m.contains(&PeerId::new("a").unwrap()));
    }

    #[test]
    fn refresh_adds_from_registry_and_skips_self() {
        let (mut m, _clock, registry) = fixture();
        registry.register("peer.a", "uri-a").unwrap();
        registry.register("peer.b", "uri-b").unwrap();
        m.refresh_from_registry();
        assert!(!m.contains(&PeerId::new("a").unwrap()));
        assert!(m.contains(&PeerId::new("b").unwrap()));
        assert_eq!(
            m.get(&PeerId::new("b").unwrap()).unwrap().response,
            ReplyStatus::Pending
        );
    }

    #[test]
    fn refresh_resets_existing_entries_to_pending() {
        let (mut m, _clock, registry) = fixture();
        m.touch(&PeerId::new("b").unwrap());
        assert_eq!(m.get(&PeerId::new("b").unwrap()).unwrap().response, ReplyStatus::Deny);
        registry.register("peer.b", "uri-b").unwrap();
        m.refresh_from_registry();
        assert_eq!(
            m.get(&PeerId::new("b").unwrap()).unwrap().response,
            ReplyStatus::Pending
        );
    }

    #[test]
    fn prune_stale_evicts_past_liveness_window() {
        let (mut m, clock, registry) = fixture();
        registry.register("peer.b", "uri-b").unwrap();
        m.touch(&PeerId::new("b").unwrap());
        clock.advance(Timing::fast().liveness_window.as_secs_f64() + 1.0);
        let pruned = m.prune_stale();
        assert_eq!(pruned, vec![PeerId::new("b").unwrap()]);
        assert!(!m.contains(&PeerId::new("b").unwrap()));
        assert!(registry.list("peer.").unwrap().is_empty());
    }

    #[test]
    fn is_live_false_for_unknown_peer() {
        let (m, ..) = fixture();
        assert!(!m.is_live(&PeerId::new("ghost").unwrap()));
    }

    #[test]
    fn drop_peer_is_unconditional() {
        let (mut m, ..) = fixture();
        m.touch(&PeerId::new("b").unwrap());
        m.drop_peer(&PeerId::new("b").unwrap());
        assert!(!m.contains(&PeerId::new("b").unwrap()));
    }
}
