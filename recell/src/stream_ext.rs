use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::stream::Stream;
use pin_project::pin_project;

use crate::CellState;

/// Extension trait for streams of [`CellState`] items.
pub trait CellStreamExt<T: Clone>: Stream<Item = CellState<T>> {
    /// Passes states through until a settled one (`Data` or `Error`) has
    /// been yielded, then terminates.
    ///
    /// Useful for awaiting a cell's outcome through its state stream: a
    /// signal stream never ends on its own, so collecting it requires a
    /// termination point.
    ///
    /// ## Examples
    ///
    /// ```no_run
    /// use futures::StreamExt;
    /// use futures_signals::signal::Mutable;
    /// use recell::{CellStreamExt, FutureCell};
    ///
    /// async fn example() {
    ///     let input = Mutable::new(2);
    ///     let cell: FutureCell<i32, i32> = FutureCell::new(input, |_token, x| async move { x * 2 });
    ///     let states = cell.to_stream().until_settled().collect::<Vec<_>>();
    /// }
    /// ```
    fn until_settled(self) -> UntilSettled<Self>
    where
        Self: Sized,
    {
        UntilSettled {
            stream: self,
            done: false,
        }
    }
}

impl<T: Clone, S: ?Sized> CellStreamExt<T> for S where S: Stream<Item = CellState<T>> {}

/// A stream of cell states that ends after the first settled item.
///
/// Created by the `until_settled` method on [`CellStreamExt`].
#[pin_project(project = UntilSettledProj)]
#[derive(Debug)]
#[must_use = "Streams do nothing unless polled"]
pub struct UntilSettled<S> {
    #[pin]
    stream: S,
    done: bool,
}

impl<T, S> Stream for UntilSettled<S>
where
    T: Clone,
    S: Stream<Item = CellState<T>>,
{
    type Item = CellState<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let UntilSettledProj { stream, done } = self.project();

        if *done {
            return Poll::Ready(None);
        }

        match stream.poll_next(cx) {
            Poll::Ready(Some(state)) => {
                if state.is_settled() {
                    *done = true;
                }
                Poll::Ready(Some(state))
            }
            Poll::Ready(None) => {
                *done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
