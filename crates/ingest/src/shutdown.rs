//! Cooperative shutdown
//!
//! A `watch` channel carrying a single flag. Loops race their blocking work
//! against [`ShutdownSignal::triggered`] inside `tokio::select!`.

use tokio::sync::watch;

/// Sender half; dropping it also counts as shutdown
#[derive(Debug)]
pub struct ShutdownTrigger(watch::Sender<bool>);

/// Receiver half, cloned into every task
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn triggered(&mut self) {
        // An Err means the trigger is gone, which is shutdown as well
        let _ = self.0.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_all_signals() {
        let (trigger, signal) = shutdown_channel();
        let mut a = signal.clone();
        let mut b = signal;
        assert!(!a.is_triggered());

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), async {
            a.triggered().await;
            b.triggered().await;
        })
        .await
        .unwrap();
        assert!(a.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_shutdown() {
        let (trigger, mut signal) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), signal.triggered())
            .await
            .unwrap();
    }
}
