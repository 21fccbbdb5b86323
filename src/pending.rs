//! Single-assignment result slot for asynchronous calls.
//!
//! [`channel`] returns a [`CallCompletion`] for the transport side and a
//! [`PendingCall`] for the caller. The completion is consumed when it
//! delivers, so a call completes at most once; dropping it without
//! delivering resolves the call with a transport error, so a waiter never
//! hangs on a completion that was lost.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Result, RpcError, TransportError};
use crate::value::HostValue;

type Slot = Option<Result<HostValue>>;

/// Create a connected completion/pending pair.
pub fn channel() -> (CallCompletion, PendingCall) {
    let (tx, rx) = watch::channel(None);
    (CallCompletion { tx: Some(tx) }, PendingCall { rx })
}

/// Write half: delivers the outcome of a call exactly once.
#[derive(Debug)]
pub struct CallCompletion {
    tx: Option<watch::Sender<Slot>>,
}

impl CallCompletion {
    /// Deliver the outcome.
    pub fn complete(mut self, result: Result<HostValue>) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(result));
        }
    }
}

impl Drop for CallCompletion {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!("call completion dropped without a result");
            tx.send_replace(Some(Err(TransportError::closed(
                "call was dropped before it completed",
            )
            .into())));
        }
    }
}

/// Read half: the eventual outcome of an asynchronous call.
///
/// Cloning gives another handle to the same outcome; every clone observes
/// the same result.
#[derive(Debug, Clone)]
pub struct PendingCall {
    rx: watch::Receiver<Slot>,
}

impl PendingCall {
    /// Wait for the outcome.
    pub async fn wait(&self) -> Result<HostValue> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone(),
            // Sender gone without a value cannot happen (Drop always
            // delivers), but the receiver API still reports it.
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(TransportError::closed("call completion lost").into()))
    }

    /// Wait for the outcome, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] of kind `Timeout` when the deadline
    /// passes first. The call itself keeps running.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<HostValue> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Transport(TransportError::timeout(format!(
                "no reply within {:?}",
                timeout
            )))),
        }
    }

    /// The outcome if it is already known.
    pub fn try_result(&self) -> Option<Result<HostValue>> {
        self.rx.borrow().clone()
    }

    /// Returns true once the outcome is known.
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Fault, TransportErrorKind};

    #[tokio::test]
    async fn test_complete_then_wait() {
        let (completion, pending) = channel();
        assert!(!pending.is_complete());
        assert!(pending.try_result().is_none());

        completion.complete(Ok(HostValue::Int(7)));

        assert!(pending.is_complete());
        assert_eq!(pending.wait().await.unwrap(), HostValue::Int(7));
        // Second wait sees the same value
        assert_eq!(pending.wait().await.unwrap(), HostValue::Int(7));
    }

    #[tokio::test]
    async fn test_clones_share_outcome() {
        let (completion, pending) = channel();
        let other = pending.clone();

        let waiter = tokio::spawn(async move { other.wait().await });
        completion.complete(Err(Fault::new(4, "nope").into()));

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.as_fault().unwrap().code, 4);
        assert!(pending.wait().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_completion_resolves_as_closed() {
        let (completion, pending) = channel();
        drop(completion);

        match pending.wait().await {
            Err(RpcError::Transport(e)) => assert_eq!(e.kind, TransportErrorKind::Closed),
            other => panic!("expected closed transport error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout() {
        let (_completion, pending) = channel();

        let err = pending
            .wait_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(ref e) if e.is_timeout()));
        assert!(!pending.is_complete());
    }
}
