//! Opaque identifiers for sessions and recursion lineage.
//!
//! Both id kinds are 128-bit random values rendered as 32 lowercase hex
//! characters. Session ids must be unguessable because the execution plane
//! may be reachable beyond the pod boundary; recursion ids only need to be
//! unique, but sharing the representation keeps telemetry uniform.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a live sandbox session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id from the OS random source.
    pub fn generate() -> Self {
        SessionId(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an id received over the wire. No validation beyond being a
    /// string; unknown ids surface as `no_such_session` at lookup time.
    pub fn from_string(raw: String) -> Self {
        SessionId(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one reasoning invocation. Unique per level; together with
/// `parent_recursion_id` these form a tree rooted at the originating request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecursionId(String);

impl RecursionId {
    pub fn generate() -> Self {
        RecursionId(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecursionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_hex() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_id_serializes_as_bare_string() {
        let id = SessionId::from_string("abc123".into());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }
}
