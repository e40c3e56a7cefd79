use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Attempts per item before its failure counts as final.
pub const RETRY_LIMIT: u32 = 10;

/// How many item failures the batch error message spells out.
const REPORTED_FAILURES: usize = 5;

/// Apply `worker` to every item with at most `concurrency` invocations in
/// flight, retrying each item up to [`RETRY_LIMIT`] times. Returns the
/// results in input order.
///
/// Completion order among items is unspecified. A retry-exhausted item does
/// not cancel its siblings: the whole batch drains first, then one error
/// summarizing every exhausted item comes back.
pub async fn run_all<T, R, F, Fut>(
    label: &'static str,
    items: Vec<T>,
    concurrency: usize,
    worker: F,
) -> anyhow::Result<Vec<R>>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    if concurrency == 0 {
        anyhow::bail!("{label} concurrency must be at least 1");
    }

    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let completed = Arc::new(AtomicUsize::new(0));
    let worker = Arc::new(worker);

    let mut tasks: JoinSet<(usize, anyhow::Result<R>)> = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let completed = Arc::clone(&completed);
        let worker = Arc::clone(&worker);

        tasks.spawn(async move {
            // The semaphore is never closed while tasks run.
            let _permit = semaphore.acquire().await.expect("acquire fetch permit");

            let result = run_with_retry(label, index, item, worker.as_ref()).await;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!("{label}: {done}/{total}");

            (index, result)
        });
    }

    let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut failures: Vec<(usize, anyhow::Error)> = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|err| anyhow::anyhow!("join {label} task: {err}"))?;
        match result {
            Ok(value) => results[index] = Some(value),
            Err(err) => failures.push((index, err)),
        }
    }

    if !failures.is_empty() {
        failures.sort_by_key(|(index, _)| *index);
        let shown = failures
            .iter()
            .take(REPORTED_FAILURES)
            .map(|(index, err)| format!("item {index}: {err:#}"))
            .collect::<Vec<_>>()
            .join("; ");
        anyhow::bail!(
            "{} of {} {label} items failed after {} attempts each: {shown}",
            failures.len(),
            total,
            RETRY_LIMIT,
        );
    }

    results
        .into_iter()
        .map(|slot| slot.ok_or_else(|| anyhow::anyhow!("{label} item produced no result")))
        .collect()
}

async fn run_with_retry<T, R, F, Fut>(
    label: &'static str,
    index: usize,
    item: T,
    worker: &F,
) -> anyhow::Result<R>
where
    T: Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let mut last_err = None;
    for attempt in 1..=RETRY_LIMIT {
        match worker(item.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(item = index, attempt, "{label} attempt failed: {err:#}");
                last_err = Some(err);
            }
        }
    }

    // RETRY_LIMIT >= 1, so last_err is set here.
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{label} item {index} never ran")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn results_come_back_in_input_order() -> anyhow::Result<()> {
        let items: Vec<usize> = (0..25).collect();
        let results = run_all("test", items, 8, |n| async move {
            // Later items finish earlier.
            tokio::time::sleep(Duration::from_millis(25 - n as u64)).await;
            Ok(n * 10)
        })
        .await?;

        assert_eq!(results, (0..25).map(|n| n * 10).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn in_flight_workers_never_exceed_concurrency() -> anyhow::Result<()> {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let worker_in_flight = Arc::clone(&in_flight);
        let worker_high_water = Arc::clone(&high_water);
        run_all("test", (0..20).collect::<Vec<usize>>(), 4, move |_| {
            let in_flight = Arc::clone(&worker_in_flight);
            let high_water = Arc::clone(&worker_high_water);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                high_water.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await?;

        assert!(high_water.load(Ordering::SeqCst) <= 4);
        Ok(())
    }

    #[tokio::test]
    async fn failing_item_is_retried_until_it_succeeds() -> anyhow::Result<()> {
        let attempts = Arc::new(Mutex::new(HashMap::<usize, u32>::new()));

        let worker_attempts = Arc::clone(&attempts);
        let results = run_all("test", vec![0usize, 1], 2, move |n| {
            let attempts = Arc::clone(&worker_attempts);
            async move {
                let attempt = {
                    let mut attempts = attempts.lock().unwrap();
                    let entry = attempts.entry(n).or_insert(0);
                    *entry += 1;
                    *entry
                };
                if n == 1 && attempt < 3 {
                    anyhow::bail!("flaky");
                }
                Ok(n)
            }
        })
        .await?;

        assert_eq!(results, [0, 1]);
        assert_eq!(attempts.lock().unwrap()[&1], 3);
        Ok(())
    }

    #[tokio::test]
    async fn exhausted_item_fails_batch_after_siblings_finish() {
        let completed_others = Arc::new(AtomicUsize::new(0));

        let worker_completed = Arc::clone(&completed_others);
        let err = run_all("test", (0..10).collect::<Vec<usize>>(), 3, move |n| {
            let completed = Arc::clone(&worker_completed);
            async move {
                if n == 4 {
                    anyhow::bail!("always down");
                }
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("1 of 10 test items failed"));
        assert!(err.to_string().contains("always down"));
        assert_eq!(completed_others.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let err = run_all("test", vec![1], 0, |n: i32| async move { Ok(n) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("concurrency must be at least 1"));
    }

    #[tokio::test]
    async fn empty_batch_completes() -> anyhow::Result<()> {
        let results: Vec<()> =
            run_all("test", Vec::<usize>::new(), 5, |_| async move { Ok(()) }).await?;
        assert!(results.is_empty());
        Ok(())
    }
}
