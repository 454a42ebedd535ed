use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use tracing::{trace, warn};

type CleanupFn = Box<dyn FnOnce() + Send>;

struct TokenInner {
    cancelled: bool,
    successor: Option<CancelToken>,
    cleanups: Vec<CleanupFn>,
    waiters: Vec<Waker>,
}

/// Cancellation state of a single computation attempt.
///
/// The flag is monotonic: once cancelled, a token never reverts. When an
/// attempt is superseded, its token is cancelled with a link to the
/// successor attempt's token; the link is set at most once, at the moment
/// of cancellation, and is immutable afterwards.
///
/// Cancellation is cooperative. A running computation stops doing work only
/// by polling [`is_cancelled`](CancelToken::is_cancelled), racing against
/// [`cancelled`](CancelToken::cancelled), or registering an
/// [`on_cancel`](CancelToken::on_cancel) hook that tears down an external
/// resource.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Mutex<TokenInner>>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            inner: Arc::new(Mutex::new(TokenInner {
                cancelled: false,
                successor: None,
                cleanups: Vec::new(),
                waiters: Vec::new(),
            })),
        }
    }

    /// Cancels the token, linking the attempt that superseded it (if any).
    ///
    /// Idempotent: a second call has no effect and cannot overwrite the
    /// successor. Cleanup hooks run exactly once, in registration order,
    /// after the flag and successor are recorded. A panicking hook is
    /// caught and logged; remaining hooks still run.
    pub fn cancel(&self, successor: Option<CancelToken>) {
        let (cleanups, waiters) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.cancelled {
                return;
            }
            inner.cancelled = true;
            inner.successor = successor;
            (
                std::mem::take(&mut inner.cleanups),
                std::mem::take(&mut inner.waiters),
            )
        };
        trace!(cleanups = cleanups.len(), "cancel token");
        for cleanup in cleanups {
            if catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
                warn!("cleanup hook panicked during cancellation");
            }
        }
        for waker in waiters {
            waker.wake();
        }
    }

    /// Registers a hook to run at cancellation time.
    ///
    /// If the token is already cancelled the hook runs immediately and
    /// synchronously, so resources registered after the fact are not leaked.
    pub fn on_cancel<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.cancelled {
                inner.cleanups.push(Box::new(cleanup));
                return;
            }
        }
        if catch_unwind(AssertUnwindSafe(cleanup)).is_err() {
            warn!("cleanup hook panicked during cancellation");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().unwrap().cancelled
    }

    /// The token of the attempt that superseded this one, if cancellation
    /// recorded one.
    pub fn successor(&self) -> Option<CancelToken> {
        self.inner.lock().unwrap().successor.clone()
    }

    /// Whether two tokens are the same underlying token.
    pub(crate) fn ptr_eq(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolves when the token is cancelled; immediately if it already is.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            token: self.clone(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("CancelToken")
            .field("cancelled", &inner.cancelled)
            .field("has_successor", &inner.successor.is_some())
            .finish()
    }
}

/// Future returned by [`CancelToken::cancelled`].
#[must_use = "futures do nothing unless polled"]
pub struct Cancelled {
    token: CancelToken,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.token.inner.lock().unwrap();
        if inner.cancelled {
            return Poll::Ready(());
        }
        if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            inner.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
