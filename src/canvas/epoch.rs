// src/canvas/epoch.rs
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter; every `advance` invalidates the tokens issued before it.
#[derive(Debug, Clone, Default)]
pub struct Epoch {
    counter: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct EpochToken {
    counter: Arc<AtomicU64>,
    value: u64,
}

impl Epoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> EpochToken {
        let value = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        EpochToken {
            counter: Arc::clone(&self.counter),
            value,
        }
    }
}

impl EpochToken {
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_token_invalidates_older() {
        let epoch = Epoch::new();
        let first = epoch.advance();
        assert!(first.is_current());

        let second = epoch.advance();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.value() > first.value());
    }

    #[test]
    fn clones_share_the_counter() {
        let epoch = Epoch::new();
        let token = epoch.advance();
        epoch.clone().advance();
        assert!(!token.is_current());
    }
}
