use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;
use tokio::sync::{mpsc, Semaphore};
use tracing::warn;

use crate::settings::Settings;

/// Request pacing: a jittered delay before each network fetch, and a longer
/// fixed pause between batches in the sequential commands.
#[derive(Debug, Clone)]
pub struct Pacer {
    delay_min: Duration,
    delay_max: Duration,
    batch_pause: Duration,
}

impl Pacer {
    pub fn new(delay_min: Duration, delay_max: Duration, batch_pause: Duration) -> Self {
        let delay_max = delay_max.max(delay_min);
        Pacer {
            delay_min,
            delay_max,
            batch_pause,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Pacer::new(
            Duration::from_millis(settings.delay_min_ms),
            Duration::from_millis(settings.delay_max_ms),
            Duration::from_secs(settings.batch_pause_secs),
        )
    }

    /// No delays at all.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Pacer::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    pub fn jitter(&self) -> Duration {
        if self.delay_max == self.delay_min {
            return self.delay_min;
        }
        let lo = self.delay_min.as_millis() as u64;
        let hi = self.delay_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    pub async fn before_request(&self) {
        let delay = self.jitter();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn between_batches(&self) {
        if !self.batch_pause.is_zero() {
            println!("Waiting {}s before next batch...", self.batch_pause.as_secs());
            tokio::time::sleep(self.batch_pause).await;
        }
    }
}

/// Run one task per item with at most `limit` in flight.
///
/// Results come back in completion order. A task that panics is dropped from
/// the output; its siblings keep running.
pub async fn run_bounded<I, F, Fut, T>(
    items: I,
    limit: usize,
    progress: &ProgressBar,
    task: F,
) -> Vec<T>
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let (tx, mut rx) = mpsc::channel::<T>(limit * 2);

    let mut spawned = 0usize;
    for item in items {
        let fut = task(item);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        spawned += 1;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let out = fut.await;
            let _ = tx.send(out).await;
        });
    }

    // rx closes once every spawned task has finished
    drop(tx);

    let mut results = Vec::with_capacity(spawned);
    while let Some(out) = rx.recv().await {
        results.push(out);
        progress.inc(1);
    }

    if results.len() < spawned {
        warn!("{} tasks ended without a result", spawned - results.len());
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = run_bounded(0..10u64, 3, &ProgressBar::hidden(), |i| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10 + (i % 3) * 5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let results = run_bounded(0..6u32, 2, &ProgressBar::hidden(), |i| async move {
            if i % 2 == 0 {
                Err(format!("task {} failed", i))
            } else {
                Ok(i)
            }
        })
        .await;

        assert_eq!(results.len(), 6);
        let mut ok: Vec<u32> = results.iter().filter_map(|r| r.clone().ok()).collect();
        ok.sort();
        assert_eq!(ok, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn panicking_task_is_isolated() {
        let results = run_bounded(0..4u32, 2, &ProgressBar::hidden(), |i| async move {
            if i == 2 {
                panic!("boom");
            }
            i
        })
        .await;
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn jitter_stays_in_range() {
        let pacer = Pacer::new(
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::ZERO,
        );
        for _ in 0..50 {
            let d = pacer.jitter();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(200));
        }
        assert_eq!(Pacer::immediate().jitter(), Duration::ZERO);
    }
}
