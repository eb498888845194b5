//! Bounded-concurrency task runner.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What happened to one scheduled task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Finished(T),
    /// The task panicked; siblings kept running.
    Panicked(String),
    /// Never started because the token was cancelled first.
    Skipped,
}

impl<T> TaskOutcome<T> {
    pub fn finished(self) -> Option<T> {
        match self {
            Self::Finished(value) => Some(value),
            _ => None,
        }
    }
}

/// Run `tasks` with at most `limit` in flight (a limit of 0 counts as 1).
///
/// Tasks start in list order; a new one starts as soon as any running one
/// finishes. `cancel` is checked before each start. Outcomes come back in
/// input order.
pub async fn run_bounded<F, T>(
    tasks: Vec<F>,
    limit: usize,
    cancel: &CancellationToken,
) -> Vec<TaskOutcome<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(1);
    let mut outcomes: Vec<TaskOutcome<T>> =
        (0..tasks.len()).map(|_| TaskOutcome::Skipped).collect();
    let mut in_flight = JoinSet::new();

    for (index, task) in tasks.into_iter().enumerate() {
        while in_flight.len() >= limit {
            collect_one(&mut in_flight, &mut outcomes).await;
        }
        if cancel.is_cancelled() {
            debug!(index, "cancelled before start, skipping remaining tasks");
            break;
        }
        in_flight.spawn(async move {
            let result = AssertUnwindSafe(task).catch_unwind().await;
            (index, result.map_err(panic_message))
        });
    }

    while !in_flight.is_empty() {
        collect_one(&mut in_flight, &mut outcomes).await;
    }
    outcomes
}

type Slot<T> = (usize, std::result::Result<T, String>);

async fn collect_one<T: Send + 'static>(
    in_flight: &mut JoinSet<Slot<T>>,
    outcomes: &mut [TaskOutcome<T>],
) {
    match in_flight.join_next().await {
        Some(Ok((index, Ok(value)))) => outcomes[index] = TaskOutcome::Finished(value),
        Some(Ok((index, Err(message)))) => {
            warn!(index, panic = %message, "scheduled task panicked");
            outcomes[index] = TaskOutcome::Panicked(message);
        }
        // Panics are caught inside the task; a join error here means the
        // runtime is shutting down.
        Some(Err(e)) => warn!(error = %e, "scheduled task aborted"),
        None => {}
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn timed_tasks(
        gauge: &Arc<Gauge>,
        durations: &[u64],
    ) -> Vec<impl Future<Output = usize> + Send + 'static> {
        durations
            .iter()
            .enumerate()
            .map(|(i, ms)| {
                let gauge = Arc::clone(gauge);
                let ms = *ms;
                async move {
                    gauge.enter();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    gauge.exit();
                    i
                }
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        for (n, limit) in [(0, 1), (1, 3), (2, 3), (5, 2), (9, 3), (4, 1), (3, 0)] {
            let gauge = Gauge::new();
            let durations: Vec<u64> = (0..n).map(|i| 10 + (i as u64 * 7) % 30).collect();
            let outcomes = run_bounded(
                timed_tasks(&gauge, &durations),
                limit,
                &CancellationToken::new(),
            )
            .await;

            assert_eq!(outcomes.len(), n);
            assert!(gauge.peak.load(Ordering::SeqCst) <= limit.max(1));
            let values: Vec<_> = outcomes.into_iter().filter_map(TaskOutcome::finished).collect();
            assert_eq!(values, (0..n).collect::<Vec<_>>(), "n={n} limit={limit}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_window_not_batches() {
        // With limit 2, the short second task frees a slot for the third
        // long before the first finishes.
        let start = tokio::time::Instant::now();
        let gauge = Gauge::new();
        run_bounded(
            timed_tasks(&gauge, &[1_000, 100, 100]),
            2,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    async fn explode() -> u32 {
        panic!("page exploded")
    }

    #[tokio::test]
    async fn panic_does_not_cancel_siblings() {
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = u32> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(explode()),
            Box::pin(async { 3 }),
        ];
        let outcomes = run_bounded(tasks, 1, &CancellationToken::new()).await;
        assert_eq!(outcomes[0], TaskOutcome::Finished(1));
        assert_eq!(outcomes[1], TaskOutcome::Panicked("page exploded".into()));
        assert_eq!(outcomes[2], TaskOutcome::Finished(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_skips_unstarted_tasks() {
        let token = CancellationToken::new();
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let token = token.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    if i == 0 {
                        token.cancel();
                    }
                    i
                }
            })
            .collect();

        let outcomes = run_bounded(tasks, 1, &token).await;
        assert_eq!(outcomes[0], TaskOutcome::Finished(0));
        assert!(outcomes[1..].iter().all(|o| *o == TaskOutcome::Skipped));
    }
}
