//! Coordination of credential refreshes
//!
//! At most one refresh is in flight per [`RefreshCoordinator`]. The first
//! request to hit an expired credential becomes the leader and performs the
//! refresh; requests that hit one while it runs are parked in a FIFO queue and
//! woken with the outcome once the leader settles.

use super::error::RefreshError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type Outcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<oneshot::Sender<Outcome>>,
}

/// Refresh-in-progress flag plus pending-request queue
#[derive(Default)]
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

/// What a request that received an authorization failure should do next
pub enum RefreshTicket<'a> {
    /// Perform the refresh, then settle the lease
    Lead(RefreshLease<'a>),
    /// Wait for the in-flight refresh
    Wait(oneshot::Receiver<Outcome>),
    /// A refresh already completed since the request was sent; replay with
    /// this token
    Replay(String),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how a request that was rejected while carrying `sent` proceeds.
    ///
    /// `current` reads the access token now in storage. It is consulted only
    /// when no refresh is running, to detect that one has already finished.
    pub fn begin(
        &self,
        sent: Option<&str>,
        current: impl FnOnce() -> Option<String>,
    ) -> RefreshTicket<'_> {
        let mut state = self.lock();

        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            debug!(queued = state.queue.len(), "refresh in flight, queueing request");
            return RefreshTicket::Wait(rx);
        }

        if let Some(token) = current().filter(|token| Some(token.as_str()) != sent) {
            debug!("credential already refreshed, replaying request");
            return RefreshTicket::Replay(token);
        }

        state.refreshing = true;
        RefreshTicket::Lead(RefreshLease {
            coordinator: self,
            settled: false,
        })
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests waiting on the in-flight refresh
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    fn settle(&self, outcome: &Outcome) {
        let waiters = {
            let mut state = self.lock();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };

        if !waiters.is_empty() {
            debug!(
                waiters = waiters.len(),
                success = outcome.is_ok(),
                "draining refresh queue"
            );
        }
        for waiter in waiters {
            // The receiver may have been dropped with its request.
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to perform the refresh
///
/// Dropping an unsettled lease clears the flag and rejects the queue with
/// [`RefreshError::Abandoned`], so waiters never hang on a cancelled leader.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Finish the refresh, waking every queued request in FIFO order.
    pub fn settle(mut self, outcome: &Outcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh abandoned before it settled");
            self.coordinator.settle(&Err(RefreshError::Abandoned));
        }
    }
}
