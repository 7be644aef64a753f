//! Transaction id source shared by the services talking to controllers

use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out ids in `[from, to)`, wrapping back to `from`
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicU32,
    from: u32,
    to: u32,
}

impl TransactionIdGenerator {
    pub fn new(from: u16, to: u16) -> Self {
        let (from, to) = (u32::from(from), u32::from(to));
        Self {
            next: AtomicU32::new(from),
            from,
            to: to.max(from + 1),
        }
    }

    pub fn next_id(&self) -> u16 {
        let span = self.to - self.from;
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        (self.from + n.wrapping_sub(self.from) % span) as u16
    }

    /// Configured password wins over the generator
    pub fn next_or(&self, password: Option<u16>) -> u16 {
        password.unwrap_or_else(|| self.next_id())
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::new(0, 0xFFFF)
    }
}
