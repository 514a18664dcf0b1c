//! Single-resume completion handles.

use crate::error::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// The resuming half of a one-shot completion.
///
/// Clones share one slot; the first [`Continuation::resume`] across all of
/// them wins. Resumption may happen on any thread when `T: Send`. If every
/// clone is dropped without resuming, the waiting [`Pending`] completes with
/// `Error::ContinuationAbandoned`.
pub struct Continuation<T> {
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    resumed: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Continuation<T> {
    /// Creates a continuation and the future that waits on it.
    pub fn channel() -> (Continuation<T>, Pending<T>) {
        let (sender, receiver) = oneshot::channel();
        let continuation = Continuation {
            shared: Arc::new(Shared {
                resumed: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
            }),
        };
        (continuation, Pending { receiver })
    }

    /// Delivers `value` to the waiter.
    ///
    /// Returns `false`, dropping `value`, if this continuation was already
    /// resumed.
    pub fn resume(&self, value: T) -> bool {
        if self.shared.resumed.swap(true, Ordering::AcqRel) {
            tracing::warn!("Continuation resumed more than once; value dropped");
            return false;
        }

        let sender = self
            .shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                if sender.send(value).is_err() {
                    tracing::debug!("Continuation resumed after its waiter was dropped");
                }
            }
            None => tracing::debug!("Continuation sender already consumed"),
        }
        true
    }

    /// Returns true once any clone has resumed.
    pub fn is_resumed(&self) -> bool {
        self.shared.resumed.load(Ordering::Acquire)
    }
}

impl<T> Clone for Continuation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Continuation")
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

/// The waiting half of a [`Continuation`].
#[derive(Debug)]
pub struct Pending<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Pending<T> {
    /// Takes the value without waiting, if the continuation has completed.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.receiver.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(Error::ContinuationAbandoned)),
        }
    }
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| Error::ContinuationAbandoned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resume_delivers_value() {
        let (continuation, pending) = Continuation::channel();
        assert!(!continuation.is_resumed());
        assert!(continuation.resume(7));
        assert!(continuation.is_resumed());
        assert_eq!(pending.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_second_resume_is_rejected() {
        let (continuation, pending) = Continuation::channel();
        let other = continuation.clone();

        assert!(continuation.resume("first"));
        assert!(!other.resume("second"));
        assert!(!continuation.resume("third"));
        assert_eq!(pending.await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_dropped_continuation_is_abandoned() {
        let (continuation, pending) = Continuation::<u32>::channel();
        let clone = continuation.clone();
        drop(continuation);
        drop(clone);

        assert!(matches!(pending.await, Err(Error::ContinuationAbandoned)));
    }

    #[test]
    fn test_try_take() {
        let (continuation, mut pending) = Continuation::channel();
        assert!(pending.try_take().is_none());

        continuation.resume(String::from("done"));
        assert_eq!(pending.try_take().unwrap().unwrap(), "done");
    }

    #[tokio::test]
    async fn test_resume_from_another_thread() {
        let (continuation, pending) = Continuation::channel();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let continuation = continuation.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    continuation.resume(i)
                })
            })
            .collect();
        drop(continuation);

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        let value = pending.await.unwrap();
        assert!((0..4).contains(&value));
    }

    #[test]
    fn test_continuation_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        fn assert_send<T: Send>() {}
        assert_send_sync::<Continuation<String>>();
        assert_send::<Pending<String>>();
    }
}
