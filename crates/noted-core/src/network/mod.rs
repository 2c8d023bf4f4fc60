//! Connectivity tracking.
//!
//! The monitor publishes the last sampled state on a `watch` channel and only
//! sends when the state changes, so a subscriber seeing `true` always means an
//! offline-to-online transition.

mod check;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub use check::{ConnectivityCheck, HttpHealthCheck};

pub struct NetworkMonitor {
    state: Arc<watch::Sender<bool>>,
    checker: Option<Arc<dyn ConnectivityCheck>>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    /// Monitor that samples `checker` at startup and then every `interval`.
    /// Reports offline until the first sample completes.
    pub fn polling(checker: Arc<dyn ConnectivityCheck>, interval: Duration) -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
            checker: Some(checker),
            interval,
            task: Mutex::new(None),
        }
    }

    /// Monitor fed by connectivity events from the host. Never polls.
    pub fn manual(initially_online: bool) -> (Self, ManualConnectivity) {
        let (state, _) = watch::channel(initially_online);
        let state = Arc::new(state);
        let handle = ManualConnectivity {
            state: Arc::clone(&state),
        };
        let monitor = Self {
            state,
            checker: None,
            interval: Duration::ZERO,
            task: Mutex::new(None),
        };
        (monitor, handle)
    }

    /// Last sampled connectivity state.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Sample once, then keep sampling in the background. Calling `start` on a
    /// running or push-based monitor only re-samples.
    pub async fn start(&self) {
        let Some(checker) = self.checker.clone() else {
            return;
        };
        publish(&self.state, checker.is_reachable().await);

        let Ok(mut task) = self.task.lock() else {
            tracing::warn!("Network monitor task lock poisoned; polling not started");
            return;
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let state = Arc::clone(&self.state);
        let period = self.interval.max(Duration::from_millis(10));
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                publish(&state, checker.is_reachable().await);
            }
        }));
    }

    /// Stop background sampling. The last state stays readable.
    pub fn stop(&self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }

    /// Take one sample immediately, outside the polling schedule.
    pub async fn sample_now(&self) -> bool {
        if let Some(checker) = &self.checker {
            publish(&self.state, checker.is_reachable().await);
        }
        self.is_online()
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Push handle for a [`NetworkMonitor::manual`] monitor.
#[derive(Clone)]
pub struct ManualConnectivity {
    state: Arc<watch::Sender<bool>>,
}

impl ManualConnectivity {
    /// Report a connectivity event. Returns true when the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        publish(&self.state, online)
    }
}

fn publish(state: &watch::Sender<bool>, online: bool) -> bool {
    let changed = state.send_if_modified(|current| {
        if *current == online {
            false
        } else {
            *current = online;
            true
        }
    });
    if changed {
        if online {
            tracing::info!("Network connectivity restored");
        } else {
            tracing::info!("Network connectivity lost");
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlagCheck {
        online: AtomicBool,
        samples: AtomicUsize,
    }

    #[async_trait]
    impl ConnectivityCheck for FlagCheck {
        async fn is_reachable(&self) -> bool {
            self.samples.fetch_add(1, Ordering::SeqCst);
            self.online.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_samples_immediately() {
        let checker = Arc::new(FlagCheck::default());
        checker.online.store(true, Ordering::SeqCst);
        let monitor = NetworkMonitor::polling(checker.clone(), Duration::from_secs(60));
        assert!(!monitor.is_online());

        monitor.start().await;

        assert!(monitor.is_online());
        assert_eq!(checker.samples.load(Ordering::SeqCst), 1);
        monitor.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn polling_publishes_transitions_only() {
        let checker = Arc::new(FlagCheck::default());
        let monitor = NetworkMonitor::polling(checker.clone(), Duration::from_millis(20));
        let mut changes = monitor.subscribe();
        monitor.start().await;
        assert!(!changes.has_changed().unwrap());

        checker.online.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), changes.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*changes.borrow_and_update());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(checker.samples.load(Ordering::SeqCst) > 2);
        assert!(!changes.has_changed().unwrap());
        monitor.stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_halts_sampling() {
        let checker = Arc::new(FlagCheck::default());
        let monitor = NetworkMonitor::polling(checker.clone(), Duration::from_millis(10));
        monitor.start().await;
        monitor.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let after_stop = checker.samples.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(checker.samples.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_monitor_reports_changes() {
        let (monitor, connectivity) = NetworkMonitor::manual(false);
        let mut changes = monitor.subscribe();

        assert!(!connectivity.set_online(false));
        assert!(connectivity.set_online(true));
        assert!(monitor.is_online());
        assert!(changes.has_changed().unwrap());
        assert!(*changes.borrow_and_update());

        monitor.start().await;
        assert!(monitor.is_online());
    }
}
