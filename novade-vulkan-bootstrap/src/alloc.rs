use std::cell::Cell;

/// Snapshot of what a context tree has asked of its allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocStats {
    pub allocations: usize,
    pub frees: usize,
    pub bytes_in_use: usize,
    pub peak_bytes: usize,
}

/// Grants or refuses byte budgets on behalf of a [`Context`](crate::Context).
///
/// Storage itself comes from the global allocator; an implementation decides
/// whether a request may proceed and keeps the books. A refusal is surfaced
/// as [`Error::AllocationFailure`](crate::Error::AllocationFailure).
pub trait Allocator {
    /// Returns `false` to refuse the request.
    fn allocate(&self, bytes: usize) -> bool;
    fn free(&self, bytes: usize);
    fn stats(&self) -> AllocStats;
}

#[derive(Debug, Default)]
struct Ledger {
    stats: Cell<AllocStats>,
}

impl Ledger {
    fn grant(&self, bytes: usize) {
        let mut s = self.stats.get();
        s.allocations += 1;
        s.bytes_in_use += bytes;
        s.peak_bytes = s.peak_bytes.max(s.bytes_in_use);
        self.stats.set(s);
    }

    fn release(&self, bytes: usize) {
        let mut s = self.stats.get();
        s.frees += 1;
        s.bytes_in_use = s.bytes_in_use.saturating_sub(bytes);
        self.stats.set(s);
    }
}

/// Process-default allocator; never refuses.
#[derive(Debug, Default)]
pub struct SystemAllocator {
    ledger: Ledger,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&self, bytes: usize) -> bool {
        self.ledger.grant(bytes);
        true
    }

    fn free(&self, bytes: usize) {
        self.ledger.release(bytes);
    }

    fn stats(&self) -> AllocStats {
        self.ledger.stats.get()
    }
}

/// Refuses any request that would push live bytes past `limit`.
#[derive(Debug)]
pub struct LimitedAllocator {
    limit: usize,
    ledger: Ledger,
}

impl LimitedAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ledger: Ledger::default(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Allocator for LimitedAllocator {
    fn allocate(&self, bytes: usize) -> bool {
        if self.ledger.stats.get().bytes_in_use + bytes > self.limit {
            return false;
        }
        self.ledger.grant(bytes);
        true
    }

    fn free(&self, bytes: usize) {
        self.ledger.release(bytes);
    }

    fn stats(&self) -> AllocStats {
        self.ledger.stats.get()
    }
}
