use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::BoxStream;
use futures::StreamExt;
use futures_signals::signal::{Mutable, MutableSignalCloned, SignalExt, SignalStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{CellState, ComputeError};

/// Republishes an externally produced push-stream as cell state.
///
/// The simpler sibling of [`FutureCell`](crate::FutureCell): a single
/// subscription is made on first access, each emission overwrites the state
/// with `Data`/`Error`, and [`future`](StreamCell::future) reflects the next
/// (or latest, if one already arrived) emission. There is no supersession
/// chain; cancellation here is subscription teardown.
pub struct StreamCell<O: Clone> {
    state: Mutable<CellState<O>>,
    latest: Arc<watch::Sender<Option<Result<O, ComputeError>>>>,
    source: Mutex<Option<BoxStream<'static, Result<O, ComputeError>>>>,
    started: AtomicBool,
    disposed: AtomicBool,
    teardown: CancellationToken,
}

impl<O> StreamCell<O>
where
    O: Clone + Send + Sync + 'static,
{
    /// Wraps a push-stream of outcomes. Nothing is polled until the first
    /// [`value`](StreamCell::value) or [`future`](StreamCell::future)
    /// access. Must be used within a tokio runtime.
    pub fn new<S, E>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = Result<O, E>> + Send + 'static,
        E: ToString,
    {
        let stream = stream
            .map(|item| item.map_err(|error| ComputeError::failed(error.to_string())))
            .boxed();
        let (latest, _rx) = watch::channel(None);
        StreamCell {
            state: Mutable::new(CellState::Idle),
            latest: Arc::new(latest),
            source: Mutex::new(Some(stream)),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            teardown: CancellationToken::new(),
        }
    }

    /// Latest published state; triggers the lazy subscription.
    pub fn value(&self) -> CellState<O> {
        self.ensure_started();
        self.state.get_cloned()
    }

    /// The next (or latest) emission; triggers the lazy subscription.
    ///
    /// If the cell is disposed, or the stream ends, before anything was
    /// emitted, the future rejects with [`ComputeError::Cancelled`] rather
    /// than hanging forever.
    pub fn future(&self) -> impl Future<Output = Result<O, ComputeError>> + Send + 'static {
        self.ensure_started();
        let mut rx = self.latest.subscribe();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(emitted) => emitted.clone().unwrap_or(Err(ComputeError::Cancelled)),
                Err(_) => Err(ComputeError::Cancelled),
            }
        }
    }

    /// Tears down the subscription. Never-emitted awaiters are settled with
    /// a cancellation error; the state keeps its pre-disposal value.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("disposing stream cell");
        self.teardown.cancel();
        settle_unemitted(&self.latest);
    }

    pub fn to_signal(&self) -> MutableSignalCloned<CellState<O>> {
        self.state.signal_cloned()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<CellState<O>>> {
        self.to_signal().to_stream()
    }

    fn ensure_started(&self) {
        if self.disposed.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(stream) = self.source.lock().unwrap().take() else {
            return;
        };
        self.state.set(CellState::Loading);
        let state = self.state.clone();
        let latest = self.latest.clone();
        let teardown = self.teardown.clone();
        tokio::spawn(async move {
            let mut stream = stream;
            loop {
                tokio::select! {
                    biased;
                    _ = teardown.cancelled() => break,
                    next = stream.next() => match next {
                        Some(outcome) => {
                            // Same publication order as the computation slot:
                            // state first, completion second, in one
                            // synchronous section.
                            state.set(outcome.clone().into());
                            latest.send_replace(Some(outcome));
                        }
                        None => {
                            settle_unemitted(&latest);
                            break;
                        }
                    },
                }
            }
        });
    }
}

fn settle_unemitted<O: Clone>(latest: &watch::Sender<Option<Result<O, ComputeError>>>) {
    latest.send_if_modified(|emitted| {
        if emitted.is_none() {
            *emitted = Some(Err(ComputeError::Cancelled));
            true
        } else {
            false
        }
    });
}

impl<O: Clone> Drop for StreamCell<O> {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}
