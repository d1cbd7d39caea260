// ===============================
// src/identifier.rs
// ===============================
use chrono::Local;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

const HEX: &[u8] = b"0123456789abcdef";

/// Client order id allocator, one per gateway instance.
///
/// Ids look like `{name}-{yyyymmdd}-{random8}-{n}`. The prefix is fixed at
/// construction, so ids from another process (or another gateway in this
/// process) never share it.
#[derive(Debug)]
pub struct ClientOrderIdAllocator {
    prefix: String,
    counter: AtomicU64,
}

impl ClientOrderIdAllocator {
    pub fn new(name: &str) -> Self {
        let date = Local::now().format("%Y%m%d");
        let mut rng = rand::thread_rng();
        let random: String = (0..8)
            .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
            .collect();
        Self {
            prefix: format!("{name}-{date}-{random}-"),
            counter: AtomicU64::new(0),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.prefix, n)
    }

    pub fn matches(&self, client_id: &str) -> bool {
        client_id.starts_with(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_and_monotonic() {
        let alloc = ClientOrderIdAllocator::new("ftx");
        let a = alloc.next();
        let b = alloc.next();
        assert!(a.starts_with("ftx-"));
        assert_eq!(a, format!("{}1", alloc.prefix()));
        assert_eq!(b, format!("{}2", alloc.prefix()));
        assert!(alloc.matches(&a) && alloc.matches(&b));
    }

    #[test]
    fn prefix_shape() {
        let alloc = ClientOrderIdAllocator::new("dydx");
        let parts: Vec<&str> = alloc.prefix().split('-').collect();
        // name, date, random, trailing empty
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
        assert!(parts[3].is_empty());
    }

    #[test]
    fn foreign_ids_do_not_match() {
        let mine = ClientOrderIdAllocator::new("ftx");
        let other = ClientOrderIdAllocator::new("ftx");
        let id = other.next();
        // random component makes a collision astronomically unlikely
        assert!(!mine.matches(&id) || mine.prefix() == other.prefix());
        assert!(!mine.matches("4785304725173323"));
        assert!(!mine.matches(""));
    }
}
