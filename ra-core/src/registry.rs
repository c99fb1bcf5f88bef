//! Discovery registry contract.
//!
//! A name service keyed by `peer.<id>` names, mapping each to a
//! connection URI the [`crate::transport::Transport`] implementation
//! knows how to dial. Treated as an external collaborator: `ra-core`
//! only depends on this trait.
use std::collections::BTreeMap;

use crate::error::RegistryError;

pub trait Registry: Send + Sync {
    /// Register `name -> uri`. Fails with `NameConflict` if `name` is
    /// already registered to a different uri.
    fn register(&self, name: &str, uri: &str) -> Result<(), RegistryError>;

    /// Remove a registration. Best-effort: removing an absent name is
    /// not an error.
    fn remove(&self, name: &str) -> Result<(), RegistryError>;

    /// List all registered `name -> uri` pairs whose name starts with
    /// `prefix`.
    fn list(&self, prefix: &str) -> Result<BTreeMap<String, String>, RegistryError>;

    /// Return this registry's own reachable endpoint, for display/
    /// diagnostic purposes.
    fn locate(&self) -> String;
}
