use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

/// A locally-owned value that changes before the server confirms.
///
/// `mutate` applies a change immediately, waits for the server, and restores
/// the pre-mutation snapshot if the server call fails. Handles are cheap to
/// clone; every clone sees the same value, including while a commit is in
/// flight.
#[derive(Debug, Default)]
pub struct Optimistic<T> {
    value: Arc<Mutex<T>>,
}

impl<T> Clone for Optimistic<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T: Clone> Optimistic<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(Mutex::new(value)),
        }
    }

    /// Copy of the current, possibly unconfirmed, value.
    pub fn get(&self) -> T {
        self.lock().clone()
    }

    /// Apply a local change. Returns the snapshot to `revert` to.
    pub fn apply(&self, change: impl FnOnce(&mut T)) -> T {
        let mut value = self.lock();
        let snapshot = value.clone();
        change(&mut value);
        snapshot
    }

    pub fn revert(&self, snapshot: T) {
        *self.lock() = snapshot;
    }

    /// Overwrite local state with what the server reported.
    pub fn reconcile(&self, change: impl FnOnce(&mut T)) {
        change(&mut self.lock());
    }

    /// Apply `change`, then await `commit`. On `Err` the value goes back to
    /// exactly what it was before `change`, and the error is returned.
    pub async fn mutate<R, E, Fut>(&self, change: impl FnOnce(&mut T), commit: impl FnOnce() -> Fut) -> Result<R, E>
    where
        Fut: Future<Output = Result<R, E>>,
    {
        let snapshot = self.apply(change);
        match commit().await {
            Ok(confirmed) => Ok(confirmed),
            Err(e) => {
                self.revert(snapshot);
                Err(e)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn change_is_visible_before_commit_finishes() {
        let counter = Optimistic::new(0);
        let observer = counter.clone();

        let result: Result<(), ()> = counter
            .mutate(
                |n| *n += 1,
                || async move {
                    assert_eq!(observer.get(), 1);
                    Ok(())
                },
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(counter.get(), 1);
    }

    #[tokio::test]
    async fn failed_commit_restores_snapshot() {
        let tags = Optimistic::new(vec!["rust".to_string()]);

        let result: Result<(), &str> = tags
            .mutate(|t| t.push("async".into()), || async { Err("offline") })
            .await;

        assert_eq!(result, Err("offline"));
        assert_eq!(tags.get(), vec!["rust".to_string()]);
    }

    #[test]
    fn reconcile_overrides_local_guess() {
        let count = Optimistic::new(10);
        let snapshot = count.apply(|n| *n += 1);
        assert_eq!(snapshot, 10);

        count.reconcile(|n| *n = 42);
        assert_eq!(count.get(), 42);
    }
}
