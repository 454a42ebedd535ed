#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use futures_signals::signal::Mutable;
    use recell::{CellState, ComputeError, FutureCell};
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_dispose_while_pending_rejects_future() {
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, |_token, x| async move {
            sleep(Duration::from_millis(100)).await;
            x
        });

        let captured = cell.future();
        sleep(Duration::from_millis(10)).await;
        assert!(cell.value().is_loading());

        cell.dispose();
        assert_eq!(captured.await, Err(ComputeError::Cancelled));
        // State keeps its pre-disposal value; Cancelled never appears there.
        assert!(cell.value().is_loading());
    }

    #[tokio::test]
    async fn test_dispose_fires_cleanup_hooks() {
        let hooks = Arc::new(AtomicUsize::new(0));
        let hooks_clone = hooks.clone();
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, move |token, x| {
            let hooks = hooks_clone.clone();
            token.on_cancel(move || {
                hooks.fetch_add(1, Ordering::SeqCst);
            });
            async move {
                sleep(Duration::from_millis(100)).await;
                x
            }
        });

        let _ = cell.value();
        sleep(Duration::from_millis(10)).await;
        cell.dispose();
        assert_eq!(hooks.load(Ordering::SeqCst), 1);

        // Idempotent: hooks do not fire again.
        cell.dispose();
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_cleanup_on_natural_completion() {
        let hooks = Arc::new(AtomicUsize::new(0));
        let hooks_clone = hooks.clone();
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, move |token, x| {
            let hooks = hooks_clone.clone();
            token.on_cancel(move || {
                hooks.fetch_add(1, Ordering::SeqCst);
            });
            async move { x * 2 }
        });

        assert_eq!(cell.future().await, Ok(2));
        drop(cell);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(hooks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_dispose_on_drop() {
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, |_token, x| async move {
            sleep(Duration::from_millis(100)).await;
            x
        })
        .auto_dispose();

        let captured = cell.future();
        sleep(Duration::from_millis(10)).await;
        drop(cell);

        assert_eq!(captured.await, Err(ComputeError::Cancelled));
    }

    #[tokio::test]
    async fn test_restart_after_dispose_is_noop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, move |_token, x| {
            let runs = runs_clone.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                x
            }
        });

        assert_eq!(cell.future().await, Ok(1));
        cell.dispose();
        cell.restart();
        sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_input_changes_after_dispose_are_ignored() {
        let input = Mutable::new(1);
        let cell: FutureCell<i32, i32> =
            FutureCell::new(input.clone(), |_token, x| async move { x * 10 });

        assert_eq!(cell.future().await, Ok(10));
        cell.dispose();

        input.set(2);
        sleep(Duration::from_millis(30)).await;
        assert_eq!(cell.value(), CellState::Data(10));
    }

    #[tokio::test]
    async fn test_future_after_dispose_rejects() {
        let cell: FutureCell<i32, i32> = FutureCell::fixed(1, |_token, x| async move { x });
        assert_eq!(cell.future().await, Ok(1));

        cell.dispose();
        assert_eq!(cell.future().await, Err(ComputeError::Cancelled));
    }
}
