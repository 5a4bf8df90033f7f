//! Per-user serialization for batch runs.
//!
//! Runs for the same user never interleave; runs for different users proceed
//! concurrently.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Default)]
pub struct UserLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(user_id.to_string()).or_default().clone()
    }

    pub fn users(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub async fn run_exclusive<F, Fut, R>(&self, user_id: &str, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        f().await
    }
}

/// Run `work` for every job on the blocking pool, holding the job's user lock.
/// Results come back in input order.
pub async fn run_batch<T, R, F>(locks: &UserLocks, jobs: Vec<(String, T)>, work: F) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let total = jobs.len();
    let work = Arc::new(work);
    let mut set = JoinSet::new();

    for (idx, (user_id, job)) in jobs.into_iter().enumerate() {
        let locks = locks.clone();
        let work = Arc::clone(&work);
        set.spawn(async move {
            let out = locks
                .run_exclusive(&user_id, || async move {
                    tokio::task::spawn_blocking(move || (*work)(job)).await
                })
                .await;
            (idx, out)
        });
    }

    let mut results: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (idx, out) = joined.context("batch job panicked")?;
        results[idx] = Some(out.context("scheduling worker panicked")?);
    }
    Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn probe(locks: &UserLocks, users: &[&str]) -> usize {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();

        for user in users {
            let locks = locks.clone();
            let user = user.to_string();
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            set.spawn(async move {
                locks
                    .run_exclusive(&user, || async {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            });
        }
        while set.join_next().await.is_some() {}
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn same_user_runs_one_at_a_time() {
        let locks = UserLocks::new();
        assert_eq!(probe(&locks, &["u", "u", "u", "u"]).await, 1);
        assert_eq!(locks.users(), 1);
    }

    #[tokio::test]
    async fn different_users_run_concurrently() {
        let locks = UserLocks::new();
        assert!(probe(&locks, &["a", "b", "c", "d"]).await >= 2);
        assert_eq!(locks.users(), 4);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let locks = UserLocks::new();
        let jobs = vec![
            ("a".to_string(), 1),
            ("b".to_string(), 2),
            ("a".to_string(), 3),
            ("c".to_string(), 4),
        ];
        let out = run_batch(&locks, jobs, |n: i32| n * 10).await.unwrap();
        assert_eq!(out, vec![10, 20, 30, 40]);
    }
}
