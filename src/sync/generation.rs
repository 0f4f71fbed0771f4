use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic request counter. Every refresh takes a ticket; only the
/// response holding the newest ticket may be applied.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

/// Proof of which generation a fetch was started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, invalidating every earlier ticket.
    pub fn next(&self) -> FetchTicket {
        FetchTicket(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}
