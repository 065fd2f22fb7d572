//! Abort signal for in-flight submissions
//!
//! An [`AbortHandle`] is owned by whatever shows the form (a CLI command, a
//! view). Dropping it, or calling [`AbortHandle::abort`], fires every
//! [`AbortSignal`] cloned from it; a submission waiting on the network then
//! stops waiting and discards the eventual response.

use tokio::sync::watch;

#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Request abort. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Drop for AbortHandle {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once abort is requested; pends forever for [`AbortSignal::never`].
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_abort_fires_signal() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        assert!(!signal.is_aborted());

        handle.abort();
        assert!(signal.is_aborted());
        tokio::time::timeout(Duration::from_millis(100), signal.aborted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drop_fires_signal() {
        let handle = AbortHandle::new();
        let signal = handle.signal();
        drop(handle);
        assert!(signal.is_aborted());
        tokio::time::timeout(Duration::from_millis(100), signal.aborted())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_pends() {
        let signal = AbortSignal::never();
        assert!(!signal.is_aborted());
        let waited = tokio::time::timeout(Duration::from_secs(60), signal.aborted()).await;
        assert!(waited.is_err());
    }
}
