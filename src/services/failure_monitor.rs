//! Peer liveness for the balancer.
//!
//! The balancer stops when the process it serves is declared failed. How
//! failure is detected is up to the deployment; the dispatcher only awaits
//! [`FailureMonitor::peer_failed`].

use futures::future::{self, BoxFuture, FutureExt};
use tokio::sync::watch;
use tracing::warn;

pub trait FailureMonitor: Send + Sync {
    /// Resolves once the monitored peer is considered dead. Never resolves
    /// while the peer is healthy.
    fn peer_failed(&self) -> BoxFuture<'static, ()>;
}

/// Monitor for deployments without a peer to watch
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverFailMonitor;

impl FailureMonitor for NeverFailMonitor {
    fn peer_failed(&self) -> BoxFuture<'static, ()> {
        future::pending().boxed()
    }
}

/// Monitor driven by a [`PeerFailureSignal`]
#[derive(Debug, Clone)]
pub struct WatchFailureMonitor {
    receiver: watch::Receiver<bool>,
}

/// Handle used to declare the peer failed
#[derive(Debug)]
pub struct PeerFailureSignal {
    sender: watch::Sender<bool>,
}

impl PeerFailureSignal {
    pub fn mark_failed(&self) {
        warn!("🚨 FAILURE_MONITOR: Peer declared failed");
        self.sender.send_replace(true);
    }
}

impl WatchFailureMonitor {
    pub fn new() -> (Self, PeerFailureSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { receiver }, PeerFailureSignal { sender })
    }
}

impl FailureMonitor for WatchFailureMonitor {
    fn peer_failed(&self) -> BoxFuture<'static, ()> {
        let mut receiver = self.receiver.clone();
        async move {
            let observed = receiver.wait_for(|failed| *failed).await.is_ok();
            // A dropped signal can no longer report failure
            if !observed {
                future::pending::<()>().await;
            }
        }
        .boxed()
    }
}
