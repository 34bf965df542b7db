use portable_atomic::{AtomicU8, Ordering};

/// Where a pool is in its shutdown sequence.
///
/// States only ever move forward, one step at a time:
/// `Accepting → Draining → Flushing → Done`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PoolState {
    /// The dispatcher accepts new jobs.
    Accepting = 0,
    /// The dispatcher is closed; workers finish in-flight jobs.
    Draining = 1,
    /// Every worker exited; the orderer emits what it still buffers.
    Flushing = 2,
    /// End of sequence was reached or the pool aborted. Terminal.
    Done = 3,
}

impl PoolState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Accepting,
            1 => Self::Draining,
            2 => Self::Flushing,
            _ => Self::Done,
        }
    }
}

/// Shared, monotonic pool state.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicU8::new(PoolState::Accepting as u8),
        }
    }

    pub(crate) fn current(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Walks forward to `target`, passing through every intermediate state.
    /// A no-op if the pool is already at or past `target`.
    pub(crate) fn advance(&self, target: PoolState) {
        let target = target as u8;
        let mut current = self.state.load(Ordering::Acquire);
        while current < target {
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        from = ?PoolState::from_u8(current),
                        to = ?PoolState::from_u8(current + 1),
                        "pool state transition"
                    );
                    current += 1;
                }
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_accepting() {
        assert_eq!(Lifecycle::new().current(), PoolState::Accepting);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let lifecycle = Lifecycle::new();
        lifecycle.advance(PoolState::Flushing);
        assert_eq!(lifecycle.current(), PoolState::Flushing);
        lifecycle.advance(PoolState::Draining);
        assert_eq!(lifecycle.current(), PoolState::Flushing);
        lifecycle.advance(PoolState::Done);
        lifecycle.advance(PoolState::Accepting);
        assert_eq!(lifecycle.current(), PoolState::Done);
    }

    #[test]
    fn states_are_ordered() {
        assert!(PoolState::Accepting < PoolState::Draining);
        assert!(PoolState::Draining < PoolState::Flushing);
        assert!(PoolState::Flushing < PoolState::Done);
    }
}
