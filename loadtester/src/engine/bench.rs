use core::{
    num::NonZero,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use std::sync::Arc;

use tokio::{task::JoinSet, time};

use super::perform;
use crate::{
    client::{ClientPool, Transport},
    stat::Stat,
    target::Target,
};

/// Saturation benchmark.
///
/// Runs a fixed set of workers issuing requests back-to-back, without any
/// rate limit, and measures how many of them complete.
#[derive(Debug)]
pub struct Benchmark<T> {
    pool: Arc<ClientPool<T>>,
    target: Arc<Target>,
    workers: NonZero<usize>,
    stat: Arc<Stat>,
}

impl<T> Benchmark<T> {
    pub fn new(pool: Arc<ClientPool<T>>, target: Arc<Target>, workers: NonZero<usize>) -> Self {
        Self {
            pool,
            target,
            workers,
            stat: Arc::new(Stat::default()),
        }
    }

    #[inline]
    pub fn stat(&self) -> Arc<Stat> {
        self.stat.clone()
    }
}

impl<T> Benchmark<T>
where
    T: Transport + 'static,
{
    /// Runs the benchmark for the given number of seconds.
    ///
    /// Workers are signalled to stop once the time is up. Requests already in
    /// flight are let to finish and counted.
    pub async fn run(self, duration: NonZero<u64>) -> BenchReport {
        log::info!(
            "running benchmark on {} for {}s with {} workers",
            self.target,
            duration,
            self.workers
        );

        let is_running = Arc::new(AtomicBool::new(true));
        let mut workers = JoinSet::new();
        for _ in 0..self.workers.get() {
            let worker = BenchWorker {
                pool: self.pool.clone(),
                target: self.target.clone(),
                stat: self.stat.clone(),
                is_running: is_running.clone(),
            };

            workers.spawn(worker.run());
        }

        time::sleep(Duration::from_secs(duration.get())).await;
        is_running.store(false, Ordering::SeqCst);

        while let Some(rc) = workers.join_next().await {
            if let Err(err) = rc {
                log::error!("benchmark worker failed: {err}");
            }
        }

        let report = BenchReport::new(self.stat.num_responses(), self.stat.num_errors(), duration);
        log::info!(
            "benchmark finished: reached {} requests per second ({} failed requests)",
            report.rps,
            report.errors
        );

        report
    }
}

/// Unthrottled benchmark worker.
#[derive(Debug)]
struct BenchWorker<T> {
    pool: Arc<ClientPool<T>>,
    target: Arc<Target>,
    stat: Arc<Stat>,
    /// Whether this worker is still active.
    is_running: Arc<AtomicBool>,
}

impl<T> BenchWorker<T>
where
    T: Transport,
{
    async fn run(self) {
        while self.is_running.load(Ordering::Relaxed) {
            if let Err(err) = perform(&self.pool, &self.target, &self.stat).await {
                log::warn!("benchmark request failed: {err}");
            }
        }
    }
}

/// Saturation benchmark result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchReport {
    /// The number of requests completed with a response.
    pub completed: u64,
    /// The number of failed requests.
    pub errors: u64,
    /// Benchmark duration in seconds.
    pub duration: NonZero<u64>,
    /// Achieved requests per second, rounded down.
    pub rps: u64,
}

impl BenchReport {
    #[inline]
    pub fn new(completed: u64, errors: u64, duration: NonZero<u64>) -> Self {
        Self {
            completed,
            errors,
            duration,
            rps: completed / duration.get(),
        }
    }
}

#[cfg(test)]
mod test {
    use http::StatusCode;

    use super::*;
    use crate::engine::mock::{self, Behavior};

    fn secs(v: u64) -> NonZero<u64> {
        NonZero::new(v).unwrap()
    }

    fn workers(v: usize) -> NonZero<usize> {
        NonZero::new(v).unwrap()
    }

    #[test]
    fn test_report_rps_truncates() {
        assert_eq!(3, BenchReport::new(11, 0, secs(3)).rps);
        assert_eq!(0, BenchReport::new(4, 7, secs(5)).rps);
        assert_eq!(100, BenchReport::new(100, 0, secs(1)).rps);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_instant_responses() {
        let (pool, calls) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let report = Benchmark::new(pool, mock::target(), workers(4)).run(secs(1)).await;

        assert!(report.rps > 0);
        assert_eq!(0, report.errors);
        assert_eq!(report.completed, report.rps);
        assert_eq!(report.completed, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completions_never_decrease() {
        let (pool, _) = mock::pool(Behavior::Delay(Duration::from_millis(1), StatusCode::OK)).await;

        let bench = Benchmark::new(pool, mock::target(), workers(8));
        let stat = bench.stat();
        let sampler = tokio::spawn(async move {
            let mut samples = Vec::new();
            for _ in 0..20 {
                samples.push(stat.num_responses());
                time::sleep(Duration::from_millis(40)).await;
            }
            samples
        });

        let report = bench.run(secs(1)).await;
        let samples = sampler.await.unwrap();

        assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
        assert!(samples.iter().all(|&v| v <= report.completed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scales_with_workers() {
        let mut rps = Vec::new();
        for n in [2, 16] {
            let (pool, _) = mock::pool(Behavior::Delay(Duration::from_millis(10), StatusCode::OK)).await;
            let report = Benchmark::new(pool, mock::target(), workers(n)).run(secs(1)).await;
            rps.push(report.rps);
        }

        // Each worker is bound by the 10ms latency, so the rate is roughly
        // proportional to the number of workers.
        assert!(rps[0] > 0);
        assert!(rps[1] > rps[0] * 2, "{rps:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failures_are_not_completions() {
        let (pool, calls) = mock::pool(Behavior::Refuse).await;

        let report = Benchmark::new(pool, mock::target(), workers(4)).run(secs(1)).await;

        assert_eq!(0, report.completed);
        assert_eq!(0, report.rps);
        assert!(report.errors > 0);
        assert_eq!(report.errors, calls.load(Ordering::SeqCst));
    }
}
