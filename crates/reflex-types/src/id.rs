//! Identifier types for reflex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::{uuid, Uuid};

/// Namespace UUID for deterministic UUID v5 owner identities.
const REFLEX_NAMESPACE: Uuid = uuid!("6f0e8a52-3c1d-4b7e-9a55-2f4d8c19e7b3");

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);
static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

/// Identifier for one EventBus subscription.
///
/// Allocated from a process-wide monotonic counter, so a larger id was
/// always registered later. The bus relies on this for registration
/// order inside a priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Identifier for a scheduled task.
///
/// # Example
///
/// ```
/// use reflex_types::TaskId;
///
/// let a = TaskId::next();
/// let b = TaskId::next();
/// assert!(b.as_u64() > a.as_u64());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates the next task id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TASK.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier for a compiled trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerId(pub Uuid);

impl TriggerId {
    /// Creates a new random [`TriggerId`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The unit that owns triggers, tasks and subscriptions.
///
/// An owner is typically a loaded script or a host plugin. Unloading an
/// owner removes everything registered under it.
///
/// # UUID Strategy
///
/// - [`OwnerId::named`]: UUID v5 derived from the name, stable across runs
/// - [`OwnerId::anonymous`]: UUID v4, unique per call
///
/// # Example
///
/// ```
/// use reflex_types::OwnerId;
///
/// let script = OwnerId::named("scripts/welcome.rx");
/// assert_eq!(script.name(), "scripts/welcome.rx");
/// assert_eq!(script, OwnerId::named("scripts/welcome.rx"));
///
/// let a = OwnerId::anonymous("inline");
/// let b = OwnerId::anonymous("inline");
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId {
    uuid: Uuid,
    name: String,
}

impl OwnerId {
    /// Creates an owner with a deterministic UUID derived from `name`.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            uuid: Uuid::new_v5(&REFLEX_NAMESPACE, name.as_bytes()),
            name,
        }
    }

    /// Creates an owner with a random UUID.
    #[must_use]
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// The owner reserved for host-registered items.
    #[must_use]
    pub fn host() -> Self {
        Self::named("host")
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the UUID.
    #[must_use]
    pub fn uuid(&self) -> &Uuid {
        &self.uuid
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_ids_are_monotonic() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert!(a < b);
        assert_eq!(a.to_string(), format!("sub-{}", a.as_u64()));
    }

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::next(), TaskId::next());
    }

    #[test]
    fn trigger_ids_are_random() {
        assert_ne!(TriggerId::new(), TriggerId::new());
    }

    #[test]
    fn named_owner_is_deterministic() {
        let a = OwnerId::named("script-a");
        let b = OwnerId::named("script-a");
        let c = OwnerId::named("script-b");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.uuid(), b.uuid());
    }

    #[test]
    fn anonymous_owner_is_unique() {
        let a = OwnerId::anonymous("x");
        let b = OwnerId::anonymous("x");
        assert_ne!(a, b);
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn owner_serde_roundtrip() {
        let owner = OwnerId::host();
        let json = serde_json::to_string(&owner).expect("serialize owner");
        let back: OwnerId = serde_json::from_str(&json).expect("deserialize owner");
        assert_eq!(owner, back);
    }
}
