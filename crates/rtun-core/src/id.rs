//! Correlation ID generation.
//!
//! Each ID is a process-local monotonically increasing sequence number
//! combined with a wall-clock nanosecond timestamp, formatted as two decimal
//! integers joined by `-`. The sequence number is what makes collisions
//! impossible within a process lifetime; the timestamp is cosmetic, kept for
//! debuggability (it lets two IDs in a log be roughly ordered in time).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Generates correlation IDs unique within the lifetime of the process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    sequence: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            sequence: AtomicU64::new(0),
        }
    }

    /// Mint a fresh, pairwise-distinct correlation ID.
    pub fn next(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        format!("{nanos}-{sequence}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_non_empty_and_whitespace_free() {
        let gen = IdGenerator::new();
        for _ in 0..10 {
            let id = gen.next();
            assert!(!id.is_empty());
            assert!(!id.chars().any(char::is_whitespace));
        }
    }

    #[test]
    fn sequential_ids_are_distinct() {
        let gen = IdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert_ne!(a, b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_ids_are_pairwise_distinct() {
        let gen = Arc::new(IdGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let gen = gen.clone();
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| gen.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "duplicate correlation id generated");
            }
        }
        assert_eq!(seen.len(), 32 * 50);
    }
}
