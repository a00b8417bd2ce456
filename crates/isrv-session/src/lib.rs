// SPDX-License-Identifier: MIT OR Apache-2.0
//! Single-flight coordination for cache-miss builds.
//!
//! When two requests resolve to the same operation list fingerprint at
//! nearly the same time, only one of them should actually decode, process,
//! and encode the source; the other should wait for the first to finish and
//! then read whatever it produced (or cached). [`Coordinator`] implements
//! that election: the first caller for a key becomes the [`Role::Leader`]
//! and is responsible for calling [`Coordinator::finish`] when done; every
//! other caller for the same key becomes a [`Role::Follower`] and can
//! `.await` the leader's completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};

/// Errors returned while waiting on another caller's in-flight build.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The leader did not call [`Coordinator::finish`] within the follower's
    /// wait budget; the caller should retry by becoming a leader itself.
    #[error("timed out waiting for the in-flight build of {key} to finish")]
    Timeout {
        /// The fingerprint key that timed out.
        key: String,
    },
}

/// Which role a caller was assigned for a given key.
#[derive(Debug)]
pub enum Role {
    /// This caller is responsible for doing the work and calling
    /// [`Coordinator::finish`] afterward (success or failure).
    Leader,
    /// Another caller is already doing the work; await this handle to be
    /// woken once it calls [`Coordinator::finish`].
    Follower(Arc<Notify>),
}

#[derive(Default)]
struct CoordinatorInner {
    in_flight: HashMap<String, Arc<Notify>>,
}

/// Coordinates concurrent builds keyed by operation-list fingerprint.
///
/// Holds one [`Notify`] per key currently in flight. Bounded in size by the
/// number of concurrently-building requests, not by the total number of
/// distinct keys ever seen: entries are removed as soon as the leader calls
/// [`Coordinator::finish`].
pub struct Coordinator {
    inner: Mutex<CoordinatorInner>,
}

impl Coordinator {
    /// Construct an empty coordinator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CoordinatorInner::default()),
        }
    }

    /// Join the build for `key`, becoming [`Role::Leader`] if none is
    /// currently in flight, or [`Role::Follower`] otherwise.
    pub async fn join(&self, key: &str) -> Role {
        let mut guard = self.inner.lock().await;
        if let Some(notify) = guard.in_flight.get(key) {
            Role::Follower(notify.clone())
        } else {
            guard.in_flight.insert(key.to_string(), Arc::new(Notify::new()));
            Role::Leader
        }
    }

    /// Called by the leader once the build for `key` has completed
    /// (successfully or not), waking every follower waiting on it.
    pub async fn finish(&self, key: &str) {
        let mut guard = self.inner.lock().await;
        if let Some(notify) = guard.in_flight.remove(key) {
            notify.notify_waiters();
        }
    }

    /// Wait for a follower's leader to finish, or time out.
    pub async fn wait(notify: Arc<Notify>, key: &str, budget: Duration) -> Result<(), CoordinationError> {
        tokio::time::timeout(budget, notify.notified())
            .await
            .map_err(|_| CoordinationError::Timeout { key: key.to_string() })
    }

    /// Number of builds currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn first_caller_is_leader_second_is_follower() {
        let coordinator = Arc::new(Coordinator::new());
        let role_a = coordinator.join("fp1").await;
        assert!(matches!(role_a, Role::Leader));

        let role_b = coordinator.join("fp1").await;
        assert!(matches!(role_b, Role::Follower(_)));
    }

    #[tokio::test]
    async fn follower_wakes_when_leader_finishes() {
        let coordinator = Arc::new(Coordinator::new());
        let _leader_role = coordinator.join("fp1").await;
        let follower_role = coordinator.join("fp1").await;

        let notify = match follower_role {
            Role::Follower(n) => n,
            Role::Leader => panic!("expected follower"),
        };

        let coordinator_clone = coordinator.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator_clone.finish("fp1").await;
        });

        Coordinator::wait(notify, "fp1", Duration::from_secs(1)).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn follower_times_out_if_leader_never_finishes() {
        let coordinator = Arc::new(Coordinator::new());
        let _leader_role = coordinator.join("fp1").await;
        let follower_role = coordinator.join("fp1").await;
        let notify = match follower_role {
            Role::Follower(n) => n,
            Role::Leader => panic!("expected follower"),
        };

        let err = Coordinator::wait(notify, "fp1", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn finish_removes_key_allowing_new_leader() {
        let coordinator = Coordinator::new();
        let _ = coordinator.join("fp1").await;
        assert_eq!(coordinator.in_flight_count().await, 1);
        coordinator.finish("fp1").await;
        assert_eq!(coordinator.in_flight_count().await, 0);

        let role = coordinator.join("fp1").await;
        assert!(matches!(role, Role::Leader));
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let coordinator = Coordinator::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b", "c"] {
            if matches!(coordinator.join(key).await, Role::Leader) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
