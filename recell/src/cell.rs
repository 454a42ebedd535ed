use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{FutureExt, StreamExt};
use futures_signals::signal::{Mutable, MutableSignalCloned, SignalExt, SignalStream};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{CancelToken, CellState, ComputationSlot, ComputeError, Computed};

enum InputSource<I> {
    /// Reactive mode: every change of the input restarts the computation.
    Signal(Mutable<I>),
    /// Non-reactive mode: restarts happen only by explicit call.
    Fixed(I),
}

/// A cell binding an async computation to a changing input value.
///
/// At most one computation is live at a time. When the input changes (or
/// [`restart`](FutureCell::restart) is called) while a computation is still
/// pending, the pending one is cancelled cooperatively and superseded; an
/// awaiter holding [`future`](FutureCell::future) from before the restart
/// transparently receives the final result of the most recent computation.
///
/// Cells are lazy by default: nothing runs until the first
/// [`value`](FutureCell::value) or [`future`](FutureCell::future) access.
/// Must be used within a tokio runtime.
pub struct FutureCell<I, O: Clone> {
    slot: ComputationSlot<I, O>,
    source: InputSource<I>,
    started: AtomicBool,
    disposed: AtomicBool,
    auto_dispose: bool,
    teardown: CancellationToken,
}

impl<I, O> FutureCell<I, O>
where
    I: Clone + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// A reactive cell: recomputes whenever `input` changes.
    pub fn new<F, Fut, R>(input: Mutable<I>, compute: F) -> Self
    where
        F: Fn(CancelToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Computed<O>,
    {
        Self::with_source(InputSource::Signal(input), compute)
    }

    /// A non-reactive cell over a fixed input: recomputes only on
    /// [`restart`](FutureCell::restart).
    pub fn fixed<F, Fut, R>(input: I, compute: F) -> Self
    where
        F: Fn(CancelToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Computed<O>,
    {
        Self::with_source(InputSource::Fixed(input), compute)
    }

    fn with_source<F, Fut, R>(source: InputSource<I>, compute: F) -> Self
    where
        F: Fn(CancelToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Computed<O>,
    {
        FutureCell {
            slot: ComputationSlot::new(compute),
            source,
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            auto_dispose: false,
            teardown: CancellationToken::new(),
        }
    }

    /// Starts the cell immediately instead of on first access. Apply after
    /// the other configuration setters.
    pub fn eager(self) -> Self {
        self.ensure_started();
        self
    }

    /// Current state snapshot; triggers the lazy start.
    pub fn value(&self) -> CellState<O> {
        self.ensure_started();
        self.slot.state()
    }

    /// The current attempt's outcome; triggers the lazy start.
    ///
    /// The returned future follows the supersession chain: it resolves to
    /// the most recent attempt's result even across restarts that happen
    /// after it was obtained. It rejects with
    /// [`ComputeError::Cancelled`] only when the cell is disposed without a
    /// successor attempt.
    pub fn future(&self) -> impl Future<Output = Result<O, ComputeError>> + Send + 'static {
        self.ensure_started();
        let handle = self.slot.current_handle();
        async move {
            match handle {
                Some(handle) => handle.wait().await,
                None => Err(ComputeError::Cancelled),
            }
        }
    }

    /// Re-runs the computation with the last-known input. A no-op on a
    /// lazy cell that has never started.
    pub fn restart(&self) {
        self.slot.restart();
    }

    fn ensure_started(&self) {
        if self.disposed.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("starting cell");
        match &self.source {
            InputSource::Fixed(input) => self.slot.start(input.clone()),
            InputSource::Signal(input) => {
                // The signal stream yields the current value on its first
                // poll, not at creation. Taking the first item here, before
                // the watcher is spawned, means an input change landing
                // between construction and this start is either folded into
                // that first item or delivered to the watcher later; none is
                // dropped.
                let mut changes = Box::pin(input.signal_cloned().to_stream());
                let first = changes
                    .next()
                    .now_or_never()
                    .flatten()
                    .unwrap_or_else(|| input.get_cloned());
                self.slot.start(first);
                let slot = self.slot.clone();
                let teardown = self.teardown.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            biased;
                            _ = teardown.cancelled() => break,
                            next = changes.next() => match next {
                                Some(input) => slot.start(input),
                                None => break,
                            },
                        }
                    }
                });
            }
        }
    }
}

impl<I, O: Clone> FutureCell<I, O> {
    /// Seeds the state with `Data(value)` before the first attempt,
    /// suppressing the first `Loading` publication. Pre-start only.
    pub fn with_initial_value(self, value: O) -> Self {
        self.slot.seed_initial(value);
        self
    }

    /// Dispose the cell when it is dropped.
    pub fn auto_dispose(mut self) -> Self {
        self.auto_dispose = true;
        self
    }

    /// Cancels the current attempt with no successor and unsubscribes from
    /// the input. Futures obtained before disposal reject with a
    /// cancellation error; the observable state keeps its last value.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown.cancel();
        self.slot.dispose();
    }

    pub fn to_signal(&self) -> MutableSignalCloned<CellState<O>> {
        self.slot.signal()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<CellState<O>>> {
        self.slot.to_stream()
    }
}

impl<I, O: Clone> Drop for FutureCell<I, O> {
    fn drop(&mut self) {
        if self.auto_dispose {
            self.dispose();
        }
    }
}
