// ── In-flight request tracker ──
//
// Collapses concurrent identical reads into one transport call. Each
// request runs on its own task so it always settles, and its map entry
// is dropped by a guard when it does, even if every caller went away.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

/// Shared handle to an in-flight request. Resolves to `None` if the
/// request task panicked.
pub type SharedRequest<T> = Shared<BoxFuture<'static, Option<T>>>;

type Entries<T> = DashMap<String, (u64, SharedRequest<T>)>;

/// Tracks requests currently in flight, keyed by request signature.
///
/// Invariant: a key is present iff a request for it is still running.
pub struct InFlight<T: Clone + Send + Sync + 'static> {
    entries: Arc<Entries<T>>,
    generation: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> Default for InFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> InFlight<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Join the request already running under `key`, or start one with
    /// `factory` and register it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> SharedRequest<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(entry) => {
                debug!(key, "joining in-flight request");
                entry.get().1.clone()
            }
            Entry::Vacant(entry) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let guard = EntryGuard {
                    entries: Arc::clone(&self.entries),
                    key: key.to_owned(),
                    generation,
                };
                let request = factory();
                let handle = tokio::spawn(async move {
                    let _guard = guard;
                    request.await
                });
                let shared = handle.map(Result::ok).boxed().shared();
                entry.insert((generation, shared.clone()));
                shared
            }
        }
    }

    /// Number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// Removes its entry when the request task finishes or unwinds. The
/// generation check keeps a finished request from evicting a newer one
/// registered under the same key.
struct EntryGuard<T: Clone + Send + Sync + 'static> {
    entries: Arc<Entries<T>>,
    key: String,
    generation: u64,
}

impl<T: Clone + Send + Sync + 'static> Drop for EntryGuard<T> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.entries
            .remove_if(&self.key, |_, (g, _)| *g == generation);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_request() {
        let tracker: InFlight<u32> = InFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<u32>();

        let first = {
            let calls = Arc::clone(&calls);
            tracker.get_or_create("GET:/x", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                rx.await.unwrap()
            })
        };
        let second = {
            let calls = Arc::clone(&calls);
            tracker.get_or_create("GET:/x", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                0
            })
        };
        assert!(tracker.contains("GET:/x"));

        tx.send(42).unwrap();
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a, Some(42));
        assert_eq!(b, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn entry_is_removed_even_without_awaiting_callers() {
        let tracker: InFlight<u32> = InFlight::new();
        drop(tracker.get_or_create("GET:/y", || async { 1 }));

        for _ in 0..100 {
            if tracker.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn settled_key_starts_a_fresh_request() {
        let tracker: InFlight<u32> = InFlight::new();
        let first = tracker.get_or_create("k", || async { 1 }).await;
        let second = tracker.get_or_create("k", || async { 2 }).await;
        assert_eq!(first, Some(1));
        assert_eq!(second, Some(2));
    }

    #[tokio::test]
    async fn panicking_request_resolves_to_none_and_cleans_up() {
        let tracker: InFlight<u32> = InFlight::new();
        let result = tracker
            .get_or_create("boom", || async {
                let exploded = true;
                assert!(!exploded, "request exploded");
                0
            })
            .await;
        assert_eq!(result, None);
        assert!(!tracker.contains("boom"));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share() {
        let tracker: InFlight<&'static str> = InFlight::new();
        let (a, b) = tokio::join!(
            tracker.get_or_create("GET:/a", || async { "a" }),
            tracker.get_or_create("GET:/b", || async { "b" }),
        );
        assert_eq!((a, b), (Some("a"), Some("b")));
    }
}
