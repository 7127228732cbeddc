//! App start identifiers.
//!
//! Every server start gets a fresh id. Clients remember the id of the server
//! that rendered their page and present it when they open a live channel; a
//! client holding an older id is told to reload.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counter keeping ids unique within the same nanosecond.
static START_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of one server start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartId(String);

/// How a client's presented start id relates to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartIdCheck {
    /// The client did not ask for hot reloading.
    Absent,
    /// The client asked for hot reloading with an empty id.
    Empty,
    /// The client was rendered by an earlier server start.
    Outdated,
    /// The client was rendered by this server start.
    Current,
}

impl StartId {
    /// Wrap an existing id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id for this process.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let counter = START_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}", timestamp.wrapping_add(counter)))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify the id a client presented.
    #[must_use]
    pub fn check(&self, presented: Option<&str>) -> StartIdCheck {
        match presented {
            None => StartIdCheck::Absent,
            Some("") => StartIdCheck::Empty,
            Some(id) if id == self.0 => StartIdCheck::Current,
            Some(_) => StartIdCheck::Outdated,
        }
    }
}

impl fmt::Display for StartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for StartId {
    fn default() -> Self {
        Self::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_id_check() {
        let id = StartId::new("abc");

        assert_eq!(id.check(None), StartIdCheck::Absent);
        assert_eq!(id.check(Some("")), StartIdCheck::Empty);
        assert_eq!(id.check(Some("abc")), StartIdCheck::Current);
        assert_eq!(id.check(Some("abd")), StartIdCheck::Outdated);
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(StartId::generate(), StartId::generate());
    }
}
