//! Navigation epochs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the current navigation context.
///
/// Opaque to the engine apart from equality. Callers conventionally use a
/// millisecond timestamp taken at navigation time, which is also what
/// [`Epoch::now`] produces when a message arrives without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub u64);

impl Epoch {
    /// An epoch stamped with the current wall-clock time in milliseconds.
    pub fn now() -> Self {
        let ms = chrono::Utc::now().timestamp_millis();
        Epoch(u64::try_from(ms).unwrap_or_default())
    }
}

impl From<u64> for Epoch {
    fn from(v: u64) -> Self {
        Epoch(v)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_serde() {
        assert_eq!(serde_json::to_string(&Epoch(17)).unwrap(), "17");
        assert_eq!(serde_json::from_str::<Epoch>("42").unwrap(), Epoch(42));
    }

    #[test]
    fn now_is_nonzero() {
        assert!(Epoch::now().0 > 0);
    }
}
