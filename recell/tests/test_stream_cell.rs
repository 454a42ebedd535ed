mod common;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc;
    use recell::{CellState, ComputeError, StreamCell};
    use tokio::time::sleep;

    use crate::common::watch_states;

    fn channel_cell() -> (mpsc::UnboundedSender<Result<i32, String>>, StreamCell<i32>) {
        let (tx, rx) = mpsc::unbounded::<Result<i32, String>>();
        (tx, StreamCell::new(rx))
    }

    #[tokio::test]
    async fn test_emissions_republished_as_state() {
        let (tx, cell) = channel_cell();

        let next = cell.future();
        tx.unbounded_send(Ok(7)).unwrap();
        assert_eq!(next.await, Ok(7));
        assert_eq!(cell.value(), CellState::Data(7));

        // Latest emission is served immediately to new awaiters.
        assert_eq!(cell.future().await, Ok(7));

        tx.unbounded_send(Err("boom".to_string())).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            cell.value(),
            CellState::Error(ComputeError::failed("boom"))
        );
        assert_eq!(cell.future().await, Err(ComputeError::failed("boom")));
    }

    #[tokio::test]
    async fn test_state_sequence() {
        let (tx, cell) = channel_cell();

        let states = watch_states(cell.to_stream());
        sleep(Duration::from_millis(10)).await;
        let _ = cell.value();
        sleep(Duration::from_millis(10)).await;
        tx.unbounded_send(Ok(1)).unwrap();

        assert_eq!(
            states.await.unwrap(),
            vec![CellState::Idle, CellState::Loading, CellState::Data(1)]
        );
    }

    #[tokio::test]
    async fn test_dispose_without_emission_rejects_future() {
        let (_tx, cell) = channel_cell();

        let next = cell.future();
        sleep(Duration::from_millis(10)).await;
        cell.dispose();

        assert_eq!(next.await, Err(ComputeError::Cancelled));
        // State keeps its pre-disposal value.
        assert!(cell.value().is_loading());
    }

    #[tokio::test]
    async fn test_stream_end_without_emission_rejects_future() {
        let (tx, cell) = channel_cell();

        let next = cell.future();
        drop(tx);

        assert_eq!(next.await, Err(ComputeError::Cancelled));
    }

    #[tokio::test]
    async fn test_emissions_after_dispose_are_ignored() {
        let (tx, cell) = channel_cell();

        assert!(cell.value().is_loading());
        tx.unbounded_send(Ok(1)).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(cell.value(), CellState::Data(1));

        cell.dispose();
        let _ = tx.unbounded_send(Ok(2));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(cell.value(), CellState::Data(1));
    }
}
