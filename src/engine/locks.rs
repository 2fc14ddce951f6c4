use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-challenge mutual exclusion.
///
/// Every read-decide-write sequence on a challenge (trade recording,
/// evaluation) runs under that challenge's guard. Unrelated challenges never
/// contend. Entries live only while someone holds or waits for them.
#[derive(Default)]
pub struct ChallengeLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

/// Held for the duration of one challenge operation
pub struct ChallengeGuard<'a> {
    locks: &'a DashMap<i64, Arc<Mutex<()>>>,
    challenge_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ChallengeGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table's own Arc is the last one: no holder, no waiter.
        // remove_if takes the shard write lock, so a concurrent acquire either
        // cloned the Arc already or inserts a fresh mutex afterwards.
        self.locks
            .remove_if(&self.challenge_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl ChallengeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, challenge_id: i64) -> ChallengeGuard<'_> {
        // Clone the Arc out before awaiting so no shard lock is held across .await
        let lock = self
            .locks
            .entry(challenge_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        ChallengeGuard {
            locks: &self.locks,
            challenge_id,
            guard: Some(guard),
        }
    }

    /// Challenges with a live entry (held or awaited)
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
