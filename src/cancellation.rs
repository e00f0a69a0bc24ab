use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Monotonic counter used to invalidate background work.
///
/// Each call to `advance` hands out a token; the token stays current until the
/// next `advance`, after which any result produced under it is stale.
#[derive(Clone, Debug, Default)]
pub struct GenerationClock {
    current: Arc<AtomicU64>,
}

impl GenerationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> GenerationToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        GenerationToken {
            generation,
            clock: self.clone(),
        }
    }

    /// Invalidate every outstanding token without issuing a new one.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug)]
pub struct GenerationToken {
    generation: u64,
    clock: GenerationClock,
}

impl GenerationToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.clock.current() == self.generation
    }

    pub fn is_stale(&self) -> bool {
        !self.is_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_invalidates_previous_tokens() {
        let clock = GenerationClock::new();
        let first = clock.advance();
        assert!(first.is_current());
        let second = clock.advance();
        assert!(first.is_stale());
        assert!(second.is_current());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn invalidate_leaves_no_current_token() {
        let clock = GenerationClock::new();
        let token = clock.advance();
        clock.invalidate();
        assert!(token.is_stale());
    }
}
