//! Connection health signal
//!
//! The request pipeline is the only producer. Owners either poll
//! [`HealthSignal::current`] or hold a [`watch::Receiver`] from
//! [`HealthSignal::subscribe`] and re-run `initialize` when the channel
//! reports [`ChannelHealth::NeedsReinitialize`].

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

/// Health of a channel as seen by its owner
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ChannelHealth {
    /// requests are completing, or too few have failed to matter
    #[default]
    Healthy,
    /// enough consecutive requests exhausted their retries that the
    /// connection should be rebuilt
    NeedsReinitialize,
}

#[derive(Debug)]
pub struct HealthSignal {
    tx: watch::Sender<ChannelHealth>,
    reinitialize_requests: AtomicU64,
}

impl HealthSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ChannelHealth::Healthy);
        Self {
            tx,
            reinitialize_requests: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelHealth> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ChannelHealth {
        *self.tx.borrow()
    }

    /// Number of times the channel asked to be reinitialized
    pub fn reinitialize_requests(&self) -> u64 {
        self.reinitialize_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn request_reinitialize(&self) {
        self.reinitialize_requests.fetch_add(1, Ordering::Relaxed);
        // send_replace works without live receivers
        self.tx.send_replace(ChannelHealth::NeedsReinitialize);
    }

    /// Back to healthy; only notifies when the state actually changes
    pub(crate) fn mark_healthy(&self) {
        self.tx.send_if_modified(|health| {
            if *health == ChannelHealth::Healthy {
                false
            } else {
                *health = ChannelHealth::Healthy;
                true
            }
        });
    }
}

impl Default for HealthSignal {
    fn default() -> Self {
        Self::new()
    }
}
