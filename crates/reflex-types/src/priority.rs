//! Dispatch priority tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One of the fixed, ordered dispatch phases.
///
/// Tiers run in ascending order: [`Lowest`](Self::Lowest) first,
/// [`Monitor`](Self::Monitor) last. `Monitor` is meant for observers that
/// want to see the final state of an event and should not cancel it.
///
/// # Example
///
/// ```
/// use reflex_types::Priority;
///
/// let mut tiers = vec![Priority::High, Priority::Low, Priority::Normal];
/// tiers.sort();
/// assert_eq!(tiers, vec![Priority::Low, Priority::Normal, Priority::High]);
///
/// assert_eq!("highest".parse::<Priority>(), Ok(Priority::Highest));
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Runs first.
    Lowest,
    /// Runs before normal handlers.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Runs after normal handlers.
    High,
    /// Runs after high handlers.
    Highest,
    /// Runs last; observe only.
    Monitor,
}

impl Priority {
    /// All tiers in dispatch order.
    pub const ALL: [Priority; 6] = [
        Self::Lowest,
        Self::Low,
        Self::Normal,
        Self::High,
        Self::Highest,
        Self::Monitor,
    ];

    /// Returns the lowercase tier name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lowest => "lowest",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Highest => "highest",
            Self::Monitor => "monitor",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown priority name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown priority: {0}")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}
