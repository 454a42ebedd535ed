use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use futures_signals::signal::{Mutable, MutableSignalCloned, SignalExt, SignalStream};
use tracing::{debug, trace};

use crate::{CancelToken, CellState, ComputeError, Computed, ResultHandle};

type ComputeFn<I, O> =
    Arc<dyn Fn(CancelToken, I) -> BoxFuture<'static, Result<O, ComputeError>> + Send + Sync>;

struct Attempt<O: Clone> {
    token: CancelToken,
    handle: ResultHandle<O>,
}

impl<O: Clone> Clone for Attempt<O> {
    fn clone(&self) -> Self {
        Attempt {
            token: self.token.clone(),
            handle: self.handle.clone(),
        }
    }
}

struct SlotShared<I, O: Clone> {
    compute: ComputeFn<I, O>,
    state: Mutable<CellState<O>>,
    current: Mutex<Option<Attempt<O>>>,
    last_input: Mutex<Option<I>>,
    using_initial_value: AtomicBool,
    disposed: AtomicBool,
}

/// Runs the user computation, owning the current token/handle attempt pair
/// and the observable [`CellState`].
///
/// Exactly one attempt pair is current at any instant. Starting a new
/// attempt replaces the pair synchronously, before cancelling the old one
/// and before any work for the new attempt is scheduled, so there is no
/// window with two current pairs. A superseded attempt's completion is
/// discarded: an uncancelled token is, by construction, always the current
/// attempt, and only the current attempt may settle the handle and publish
/// state.
pub struct ComputationSlot<I, O: Clone> {
    shared: Arc<SlotShared<I, O>>,
}

impl<I, O: Clone> Clone for ComputationSlot<I, O> {
    fn clone(&self) -> Self {
        ComputationSlot {
            shared: self.shared.clone(),
        }
    }
}

impl<I, O: Clone> ComputationSlot<I, O> {
    /// Snapshot of the observable state.
    pub fn state(&self) -> CellState<O> {
        self.shared.state.get_cloned()
    }

    pub fn signal(&self) -> MutableSignalCloned<CellState<O>> {
        self.shared.state.signal_cloned()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<CellState<O>>> {
        self.signal().to_stream()
    }

    /// Whether any attempt has ever been started (and the slot is not
    /// disposed).
    pub fn started(&self) -> bool {
        self.shared.current.lock().unwrap().is_some()
    }

    pub(crate) fn current_handle(&self) -> Option<ResultHandle<O>> {
        self.shared
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|attempt| attempt.handle.clone())
    }

    /// Seeds the state with a value before the first start, suppressing the
    /// first `Loading` publication. Pre-start only.
    pub(crate) fn seed_initial(&self, value: O) {
        self.shared.using_initial_value.store(true, Ordering::SeqCst);
        self.shared.state.set(CellState::Data(value));
    }

    /// Cancels the current attempt with no successor. Awaiters of its
    /// handle observe a cancellation error; the observable state keeps its
    /// pre-disposal value.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let previous = self.shared.current.lock().unwrap().take();
        if let Some(previous) = previous {
            debug!("disposing slot with an outstanding attempt");
            previous.handle.cancel();
            previous.token.cancel(None);
        }
    }
}

impl<I, O> ComputationSlot<I, O>
where
    I: Clone + Send + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut, R>(compute: F) -> Self
    where
        F: Fn(CancelToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Computed<O>,
    {
        let compute: ComputeFn<I, O> = Arc::new(move |token, input| {
            let fut = compute(token, input);
            async move {
                // A panicking computation must still settle the attempt, or
                // awaiters of its handle would hang forever.
                match AssertUnwindSafe(async move { fut.await.into_outcome() })
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(ComputeError::failed(panic_message(panic))),
                }
            }
            .boxed()
        });
        ComputationSlot {
            shared: Arc::new(SlotShared {
                compute,
                state: Mutable::new(CellState::Idle),
                current: Mutex::new(None),
                last_input: Mutex::new(None),
                using_initial_value: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Starts a new attempt, superseding any pending one.
    ///
    /// The pair replacement, the forwarding link on the old handle and the
    /// old token's cancellation all complete before this returns; the user
    /// function itself runs on a freshly spawned task, after a yield, so
    /// the caller's change propagation finishes before any state mutation.
    pub fn start(&self, input: I) {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return;
        }
        let token = CancelToken::new();
        let next = Attempt {
            handle: ResultHandle::new(token.clone()),
            token,
        };
        let previous = {
            let mut current = self.shared.current.lock().unwrap();
            *self.shared.last_input.lock().unwrap() = Some(input.clone());
            current.replace(next.clone())
        };
        if let Some(previous) = previous {
            trace!("superseding pending attempt");
            previous.handle.supersede(next.handle.clone());
            previous.token.cancel(Some(next.token.clone()));
        }

        let shared = self.shared.clone();
        tokio::spawn(async move {
            if !shared.publish_loading(&next) {
                return;
            }
            // Let the triggering notification finish propagating before the
            // user function observes anything.
            tokio::task::yield_now().await;
            if next.token.is_cancelled() {
                return;
            }
            // Cancellation stays cooperative: the future runs to natural
            // completion even when superseded; its outcome is then discarded.
            let outcome = (shared.compute)(next.token.clone(), input).await;
            shared.settle(&next, outcome);
        });
    }

    /// Re-runs the computation with the last-known input. No-op if the slot
    /// has never started.
    pub fn restart(&self) {
        let input = self.shared.last_input.lock().unwrap().clone();
        if let Some(input) = input {
            self.start(input);
        }
    }
}

impl<I, O: Clone> SlotShared<I, O> {
    /// Whether `attempt` is still the current pair. Callers must hold the
    /// `current` guard for the check to stay valid while they publish.
    fn is_current(guard: &Option<Attempt<O>>, attempt: &Attempt<O>) -> bool {
        guard
            .as_ref()
            .is_some_and(|current| current.token.ptr_eq(&attempt.token))
    }

    /// Publishes `Loading` for a freshly started attempt, unless the slot
    /// is showing a seeded initial value or is already loading. Returns
    /// false when the attempt was superseded (or the slot disposed) before
    /// it got to run.
    ///
    /// The currency check and the state write happen under the `current`
    /// lock: a stale attempt can never overwrite a successor's state.
    fn publish_loading(&self, attempt: &Attempt<O>) -> bool {
        let current = self.current.lock().unwrap();
        if !Self::is_current(&current, attempt) {
            return false;
        }
        if !self.using_initial_value.load(Ordering::SeqCst) {
            let mut state = self.state.lock_mut();
            if !state.is_loading() {
                *state = CellState::Loading;
            }
        }
        true
    }

    /// Settle order is fixed: the state publication first, the handle
    /// second, within one synchronous section under the `current` lock. A
    /// task resuming from the handle's await therefore always finds the
    /// state already matching, and a superseded attempt's late completion
    /// is discarded whole.
    fn settle(&self, attempt: &Attempt<O>, outcome: Result<O, ComputeError>) {
        self.using_initial_value.store(false, Ordering::SeqCst);
        let current = self.current.lock().unwrap();
        if !Self::is_current(&current, attempt) || attempt.token.is_cancelled() {
            return;
        }
        match outcome {
            Ok(value) => {
                self.state.set(CellState::Data(value.clone()));
                attempt.handle.complete(value);
            }
            Err(error) => {
                self.state.set(CellState::Error(error.clone()));
                attempt.handle.fail(error);
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "computation panicked".to_string()
    }
}
