use std::sync::atomic::{AtomicU64, Ordering};

// -------------------------------------------------------------------------------------------------------

/// Largest integer that survives a round trip through an IEEE-754 double (2^53 - 1).
/// Nonces stay below it so peers that decode json numbers as doubles see the same value.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Issues call nonces. Strictly increasing, wraps from `MAX_SAFE_INTEGER` back to 1, never 0.
///
/// One generator is owned by each nexus and shared by every instance it opens.
#[derive(Debug)]
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// the first call to `next` returns `last + 1` (or 1 if `last` is at the boundary)
    pub fn starting_after(last: u64) -> Self {
        Self {
            last: AtomicU64::new(last.min(MAX_SAFE_INTEGER)),
        }
    }

    pub fn next(&self) -> u64 {
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(Self::successor(last))
            })
            .unwrap_or_else(|last| last);
        Self::successor(previous)
    }

    fn successor(last: u64) -> u64 {
        if last >= MAX_SAFE_INTEGER {
            1
        } else {
            last + 1
        }
    }
}

impl Default for NonceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------
