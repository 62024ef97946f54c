// ── Store subscriptions ──
//
// Views over an `EntityStore`'s watch channel: whole snapshots, a wait for
// the store to go quiet, and a flags-only stream for spinners.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::{Flags, StoreState};

/// A subscription to one store's state.
pub struct StateStream {
    current: Arc<StoreState>,
    receiver: watch::Receiver<Arc<StoreState>>,
}

impl StateStream {
    pub(crate) fn new(receiver: watch::Receiver<Arc<StoreState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot seen last by this subscription.
    pub fn current(&self) -> &Arc<StoreState> {
        &self.current
    }

    /// The store's snapshot right now, which may be newer than `current()`.
    pub fn latest(&self) -> Arc<StoreState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once every store handle is dropped.
    pub async fn changed(&mut self) -> Option<Arc<StoreState>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Wait until a snapshot satisfies `condition`, checking the latest one
    /// first.
    pub async fn wait_for(
        &mut self,
        mut condition: impl FnMut(&StoreState) -> bool,
    ) -> Option<Arc<StoreState>> {
        let snap = self
            .receiver
            .wait_for(|state| condition(state.as_ref()))
            .await
            .ok()?
            .clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Wait until no action is waiting on the server.
    pub async fn settled(&mut self) -> Option<Arc<StoreState>> {
        self.wait_for(|state| !state.flags.is_busy()).await
    }

    /// Every snapshot, starting with the one at conversion time.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }

    /// Only the activity flags, yielded when they differ from the previous
    /// item. Item and error changes are skipped.
    pub fn into_flag_stream(self) -> FlagStream {
        FlagStream {
            inner: WatchStream::new(self.receiver),
            last: None,
        }
    }
}

pub struct StateWatchStream {
    inner: WatchStream<Arc<StoreState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<StoreState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// See [`StateStream::into_flag_stream`].
pub struct FlagStream {
    inner: WatchStream<Arc<StoreState>>,
    last: Option<Flags>,
}

impl Stream for FlagStream {
    type Item = Flags;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Flags>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(state)) => {
                    if self.last != Some(state.flags) {
                        self.last = Some(state.flags);
                        return Poll::Ready(Some(state.flags));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn busy(state: &mut Arc<StoreState>, on: bool) {
        Arc::make_mut(state).flags.is_loading = on;
    }

    #[tokio::test]
    async fn flag_stream_skips_unrelated_changes() {
        let (tx, rx) = watch::channel(Arc::new(StoreState::initial(None)));
        let mut flags = StateStream::new(rx).into_flag_stream();
        assert_eq!(flags.next().await.unwrap(), Flags::default());

        tx.send_modify(|s| Arc::make_mut(s).error = Some("x".into()));
        tx.send_modify(|s| busy(s, true));
        let next = flags.next().await.unwrap();
        assert!(next.is_loading);

        drop(tx);
        assert!(flags.next().await.is_none());
    }

    #[tokio::test]
    async fn settled_waits_for_flags_to_clear() {
        let (tx, rx) = watch::channel(Arc::new(StoreState::initial(None)));
        tx.send_modify(|s| busy(s, true));
        let mut stream = StateStream::new(rx);

        let waiter = tokio::spawn(async move { stream.settled().await });
        tokio::task::yield_now().await;
        tx.send_modify(|s| {
            busy(s, false);
            Arc::make_mut(s).error = Some("done".into());
        });

        let state = waiter.await.unwrap().unwrap();
        assert!(!state.flags.is_busy());
        assert_eq!(state.error.as_deref(), Some("done"));
    }
}
