//! # Circuit Breaker
//! In-memory record of sub-sources that returned a permanent error
//! (removed, renamed, 404). Bans last for the process lifetime; there is
//! no expiry. The set is shared across concurrent fetch cycles.

use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct CircuitBreaker {
    banned: RwLock<HashSet<String>>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.banned
            .read()
            .expect("circuit breaker lock poisoned")
            .contains(name)
    }

    /// Ban a sub-source for the remainder of the process. Idempotent.
    pub fn ban(&self, name: &str) {
        let mut banned = self.banned.write().expect("circuit breaker lock poisoned");
        if banned.insert(name.to_string()) {
            metrics::counter!("harvest_sub_sources_banned_total").increment(1);
            tracing::warn!(sub_source = name, "sub-source banned for process lifetime");
        }
    }

    pub fn banned_count(&self) -> usize {
        self.banned
            .read()
            .expect("circuit breaker lock poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ban_is_monotonic() {
        let cb = CircuitBreaker::new();
        assert!(!cb.is_banned("deadsub"));
        cb.ban("deadsub");
        assert!(cb.is_banned("deadsub"));
        // Re-banning changes nothing.
        cb.ban("deadsub");
        assert!(cb.is_banned("deadsub"));
        assert_eq!(cb.banned_count(), 1);
    }

    #[test]
    fn bans_are_independent_per_name() {
        let cb = CircuitBreaker::new();
        cb.ban("a");
        assert!(cb.is_banned("a"));
        assert!(!cb.is_banned("b"));
    }

    #[tokio::test]
    async fn concurrent_bans_and_reads_are_safe() {
        use std::sync::Arc;

        let cb = Arc::new(CircuitBreaker::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let cb = cb.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("sub{}", i % 4);
                cb.ban(&name);
                assert!(cb.is_banned(&name));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(cb.banned_count(), 4);
    }
}
