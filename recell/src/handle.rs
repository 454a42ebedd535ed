use std::sync::Arc;

use tokio::sync::watch;

use crate::{CancelToken, ComputeError};

enum HandleState<T: Clone> {
    Pending,
    Value(T),
    Failed(ComputeError),
    Superseded(ResultHandle<T>),
}

/// The eventual outcome of one computation attempt.
///
/// Settles exactly once. If the attempt is superseded before settling, the
/// handle records a forwarding link to the successor's handle instead, and
/// [`wait`](ResultHandle::wait) transparently follows the chain: an awaiter
/// that grabbed this handle before a restart still receives the final
/// result of the most recent attempt. Only when an attempt is cancelled
/// with no successor (disposal) do awaiters see a cancellation error.
pub struct ResultHandle<T: Clone> {
    tx: Arc<watch::Sender<HandleState<T>>>,
    token: CancelToken,
}

impl<T: Clone> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        ResultHandle {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T: Clone> ResultHandle<T> {
    pub fn new(token: CancelToken) -> Self {
        let (tx, _rx) = watch::channel(HandleState::Pending);
        ResultHandle {
            tx: Arc::new(tx),
            token,
        }
    }

    /// The token of the attempt this handle belongs to.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Settles the handle with a success value.
    ///
    /// Silently ignored if the owning token is already cancelled or the
    /// handle has already settled; this closes the race where the
    /// computation finishes just as cancellation occurs.
    pub fn complete(&self, value: T) {
        if self.token.is_cancelled() {
            return;
        }
        self.settle(HandleState::Value(value));
    }

    /// Settles the handle with a computation failure. Same no-op rules as
    /// [`complete`](ResultHandle::complete).
    pub fn fail(&self, error: ComputeError) {
        if self.token.is_cancelled() {
            return;
        }
        self.settle(HandleState::Failed(error));
    }

    /// Records the forwarding link to the attempt that replaced this one.
    pub(crate) fn supersede(&self, next: ResultHandle<T>) {
        self.settle(HandleState::Superseded(next));
    }

    /// Drives an unsettled handle to a cancellation failure with no
    /// successor to forward to (disposal).
    pub(crate) fn cancel(&self) {
        self.settle(HandleState::Failed(ComputeError::Cancelled));
    }

    fn settle(&self, settled: HandleState<T>) {
        self.tx.send_if_modified(|state| {
            if matches!(state, HandleState::Pending) {
                *state = settled;
                true
            } else {
                false
            }
        });
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.tx.borrow(), HandleState::Pending)
    }

    /// Awaits the attempt's outcome, following supersession links.
    ///
    /// The chain is walked iteratively, one link per loop turn, so memory
    /// use stays constant regardless of how many restarts occurred while
    /// waiting.
    pub async fn wait(&self) -> Result<T, ComputeError> {
        let mut current = self.clone();
        loop {
            let mut rx = current.tx.subscribe();
            let step = {
                let settled = match rx.wait_for(|state| !matches!(state, HandleState::Pending)).await
                {
                    Ok(settled) => settled,
                    Err(_) => return Err(ComputeError::Cancelled),
                };
                match &*settled {
                    HandleState::Value(value) => Step::Done(Ok(value.clone())),
                    HandleState::Failed(error) => Step::Done(Err(error.clone())),
                    HandleState::Superseded(next) => Step::Forward(next.clone()),
                    HandleState::Pending => continue,
                }
            };
            match step {
                Step::Done(outcome) => return outcome,
                Step::Forward(next) => current = next,
            }
        }
    }
}

enum Step<T: Clone> {
    Done(Result<T, ComputeError>),
    Forward(ResultHandle<T>),
}
