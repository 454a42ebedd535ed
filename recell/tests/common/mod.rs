use futures::StreamExt;
use futures_core::Stream;
use recell::{CellState, CellStreamExt};
use tokio::task::JoinHandle;

/// Collects every state a cell publishes, up to and including the first
/// settled one. Spawn this before triggering the cell so the initial state
/// is captured too.
pub fn watch_states<S, T>(stream: S) -> JoinHandle<Vec<CellState<T>>>
where
    S: Stream<Item = CellState<T>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(stream.until_settled().collect::<Vec<_>>())
}
