//! Core value types shared across the RA components.
use std::fmt;
use std::str::FromStr;

/// A peer's self-chosen identifier. Unique across the registry
/// namespace `peer.<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PeerId(String);

#[derive(Debug, thiserror::Error)]
#[error("peer id must not be empty")]
pub struct EmptyPeerId;

impl PeerId {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyPeerId> {
        let id = id.into();
        if id.is_empty() {
            return Err(EmptyPeerId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name this peer registers under in the discovery registry.
    pub fn registry_name(&self) -> String {
        format!("peer.{}", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = EmptyPeerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The three RA states a peer can be in with respect to the critical
/// section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Released,
    Wanted,
    Held,
}

/// A peer's answer to a `REQUEST`.
///
/// Wire representation is the integer code (0 = Accept, 1 = Deny) to
/// avoid enum-serialization ambiguity; the string forms are accepted
/// on the way in for compatibility with mixed-version peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Accept,
    Deny,
}

impl Response {
    pub fn to_code(self) -> i32 {
        match self {
            Response::Accept => 0,
            Response::Deny => 1,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Response::Accept),
            1 => Some(Response::Deny),
            _ => None,
        }
    }
}

impl FromStr for Response {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCEPT" => Ok(Response::Accept),
            "DENY" => Ok(Response::Deny),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Accept => write!(f, "ACCEPT"),
            Response::Deny => write!(f, "DENY"),
        }
    }
}

/// A peer entry's reply status for the current request round.
///
/// Distinct from [`Response`]: a peer entry can be `Pending` (no wire
/// message has ever carried that state), whereas a wire [`Response`]
/// is always a definite answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Pending,
    Accept,
    Deny,
}

impl From<Response> for ReplyStatus {
    fn from(r: Response) -> Self {
        match r {
            Response::Accept => ReplyStatus::Accept,
            Response::Deny => ReplyStatus::Deny,
        }
    }
}

/// Decode a response from the wire, accepting either the canonical
/// integer code or (for compatibility) the legacy string form.
pub fn decode_response(value: &serde_json::Value) -> Option<Response> {
    if let Some(code) = value.as_i64() {
        return Response::from_code(code as i32);
    }
    value.as_str().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_id() {
        assert!(PeerId::new("").is_err());
    }

    #[test]
    fn registry_name_has_peer_prefix() {
        let id = PeerId::new("a").unwrap();
        assert_eq!(id.registry_name(), "peer.a");
    }

    #[test]
    fn response_round_trips_through_code() {
        assert_eq!(Response::from_code(0), Some(Response::Accept));
        assert_eq!(Response::from_code(1), Some(Response::Deny));
        assert_eq!(Response::from_code(2), None);
    }

    #[test]
    fn decode_response_accepts_legacy_strings() {
        let v = serde_json::json!("ACCEPT");
        assert_eq!(decode_response(&v), Some(Response::Accept));
        let v = serde_json::json!("DENY");
        assert_eq!(decode_response(&v), Some(Response::Deny));
    }

    // The tie-break rule in `RaService::on_request` falls back to
    // `self_id < sender_id` whenever two requests carry the same
    // timestamp, so `PeerId`'s `Ord` needs to be a genuine total order:
    // never both `a < b` and `b < a`, and transitive across any three
    // ids. Without that, two peers could each defer to the other on the
    // same tied request and neither would ever enter the section.
    mod tie_break_order {
        use super::*;
        use quickcheck::TestResult;
        use quickcheck_macros::quickcheck;

        fn id(s: &str) -> Option<PeerId> {
            PeerId::new(s.to_string()).ok()
        }

        #[quickcheck]
        fn antisymmetric(a: String, b: String) -> TestResult {
            let (Some(a), Some(b)) = (id(&a), id(&b)) else {
                return TestResult::discard();
            };
            TestResult::from_bool(!(a < b && b < a))
        }

        #[quickcheck]
        fn transitive(a: String, b: String, c: String) -> TestResult {
            let (Some(a), Some(b), Some(c)) = (id(&a), id(&b), id(&c)) else {
                return TestResult::discard();
            };
            TestResult::from_bool(!(a < b && b < c) || a < c)
        }
    }
}
