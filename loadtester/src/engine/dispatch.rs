use core::{
    fmt::{self, Display, Formatter},
    num::NonZero,
    time::Duration,
};
use std::sync::Arc;

use tokio::{
    task::{JoinError, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};

use super::perform;
use crate::{
    client::{ClientPool, Transport},
    stat::Stat,
    target::Target,
};

/// Fixed-rate request dispatcher.
///
/// Fires one request per tick at the given rate until the run duration
/// elapses, then waits for all requests in flight. A request never blocks the
/// schedule: each tick is served by its own task, so the number of concurrent
/// requests grows when the target responds slower than the tick interval.
#[derive(Debug)]
pub struct Dispatcher<T> {
    pool: Arc<ClientPool<T>>,
    target: Arc<Target>,
    rate: NonZero<u32>,
    stat: Arc<Stat>,
}

impl<T> Dispatcher<T> {
    pub fn new(pool: Arc<ClientPool<T>>, target: Arc<Target>, rate: NonZero<u32>) -> Self {
        Self {
            pool,
            target,
            rate,
            stat: Arc::new(Stat::default()),
        }
    }

    /// Returns the interval between two consecutive ticks.
    #[inline]
    pub fn period(&self) -> Duration {
        (Duration::from_secs(1) / self.rate.get()).max(Duration::from_nanos(1))
    }

    #[inline]
    pub fn stat(&self) -> Arc<Stat> {
        self.stat.clone()
    }
}

impl<T> Dispatcher<T>
where
    T: Transport + 'static,
{
    /// Runs the test for the given duration and returns its summary once
    /// every dispatched request has finished.
    pub async fn run(self, duration: Duration) -> Report {
        log::info!(
            "starting test on {}: {} requests per second, duration {}s",
            self.target,
            self.rate,
            duration.as_secs_f64()
        );

        let now = Instant::now();
        let mut units = JoinSet::new();

        let ticks = if duration.is_zero() {
            0
        } else {
            self.schedule(duration, &mut units).await
        };

        // Draining. No more ticks, but requests in flight are let to finish.
        log::debug!("dispatched {ticks} requests, waiting for {} in flight", units.len());
        while let Some(rc) = units.join_next().await {
            Self::on_joined(rc);
        }

        log::info!("test finished");

        Report::new(self.rate, ticks, &self.stat, now.elapsed())
    }

    /// Spawns a request on each tick until the duration elapses.
    ///
    /// Returns the number of ticks fired.
    async fn schedule(&self, duration: Duration, units: &mut JoinSet<()>) -> u64 {
        let deadline = time::sleep(duration);
        tokio::pin!(deadline);

        // The first tick completes immediately, so "duration * rate" ticks fit
        // into the window.
        let mut ticker = time::interval(self.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        let mut ticks = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    units.spawn(Self::execute(self.pool.clone(), self.target.clone(), self.stat.clone()));

                    // Reap finished requests to keep the set small.
                    while let Some(rc) = units.try_join_next() {
                        Self::on_joined(rc);
                    }
                }
            }
        }

        ticks
    }

    async fn execute(pool: Arc<ClientPool<T>>, target: Arc<Target>, stat: Arc<Stat>) {
        match perform(&pool, &target, &stat).await {
            Ok(code) => log::info!("response code: {}", code.as_u16()),
            Err(err) => log::error!("request failed: {err}"),
        }
    }

    #[inline]
    fn on_joined(rc: Result<(), JoinError>) {
        if let Err(err) = rc {
            log::error!("request task failed: {err}");
        }
    }
}

/// Summary of a dispatcher run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Target rate.
    pub rate: NonZero<u32>,
    /// The number of ticks fired, i.e. requests dispatched.
    pub ticks: u64,
    /// The number of responses received, regardless of the status code.
    pub responses: u64,
    /// The number of failed requests, timeouts included.
    pub errors: u64,
    pub timeouts: u64,
    /// Responses per status class: 2xx, 3xx, 4xx, 5xx and other.
    pub by_class: [u64; 5],
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    /// Wall time from the first tick until the last request finished.
    pub elapsed: Duration,
}

impl Report {
    fn new(rate: NonZero<u32>, ticks: u64, stat: &Stat, elapsed: Duration) -> Self {
        Self {
            rate,
            ticks,
            responses: stat.num_responses(),
            errors: stat.num_errors(),
            timeouts: stat.num_timeouts(),
            by_class: stat.num_by_class(),
            p50: stat.latency(0.50),
            p90: stat.latency(0.90),
            p99: stat.latency(0.99),
            elapsed,
        }
    }

    /// Returns the number of responses per second over the whole run.
    #[inline]
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.responses as f64 / secs
        } else {
            0.0
        }
    }
}

impl Display for Report {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        let [c2xx, c3xx, c4xx, c5xx, other] = self.by_class;

        writeln!(fmt, "target rate:  {} rps", self.rate)?;
        writeln!(fmt, "dispatched:   {}", self.ticks)?;
        writeln!(
            fmt,
            "responses:    {} (2xx: {c2xx}, 3xx: {c3xx}, 4xx: {c4xx}, 5xx: {c5xx}, other: {other})",
            self.responses
        )?;
        writeln!(fmt, "errors:       {} (timeouts: {})", self.errors, self.timeouts)?;
        writeln!(
            fmt,
            "latency:      p50 {:?}, p90 {:?}, p99 {:?}",
            self.p50, self.p90, self.p99
        )?;
        write!(
            fmt,
            "throughput:   {:.1} rps over {:.3}s",
            self.throughput(),
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod test {
    use core::sync::atomic::Ordering;

    use http::StatusCode;

    use super::*;
    use crate::engine::mock::{self, Behavior};

    fn rate(v: u32) -> NonZero<u32> {
        NonZero::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_period() {
        let (pool, _) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let dispatcher = Dispatcher::new(pool.clone(), mock::target(), rate(4));
        assert_eq!(Duration::from_millis(250), dispatcher.period());

        let dispatcher = Dispatcher::new(pool, mock::target(), rate(u32::MAX));
        assert_eq!(Duration::from_nanos(1), dispatcher.period());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_succeed() {
        let (pool, calls) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let report = Dispatcher::new(pool, mock::target(), rate(5))
            .run(Duration::from_secs(2))
            .await;

        assert_eq!(10, report.ticks);
        assert_eq!(10, report.responses);
        assert_eq!(0, report.errors);
        assert_eq!([10, 0, 0, 0, 0], report.by_class);
        assert_eq!(10, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick() {
        let (pool, calls) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let report = Dispatcher::new(pool, mock::target(), rate(1))
            .run(Duration::from_secs(1))
            .await;

        assert_eq!(1, report.ticks);
        assert_eq!(1, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration() {
        let (pool, calls) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let report = Dispatcher::new(pool, mock::target(), rate(100))
            .run(Duration::ZERO)
            .await;

        assert_eq!(0, report.ticks);
        assert_eq!(0, report.responses);
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_abort() {
        let (pool, calls) = mock::pool(Behavior::Refuse).await;

        let report = Dispatcher::new(pool, mock::target(), rate(5))
            .run(Duration::from_secs(2))
            .await;

        assert_eq!(10, report.ticks);
        assert_eq!(0, report.responses);
        assert_eq!(10, report.errors);
        assert_eq!(0, report.timeouts);
        assert_eq!(10, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_observational() {
        let (pool, _) = mock::pool(Behavior::Respond(StatusCode::SERVICE_UNAVAILABLE)).await;

        let report = Dispatcher::new(pool, mock::target(), rate(10))
            .run(Duration::from_secs(3))
            .await;

        assert_eq!(30, report.ticks);
        assert_eq!(30, report.responses);
        assert_eq!(0, report.errors);
        assert_eq!([0, 0, 0, 30, 0], report.by_class);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_responses_overlap_and_drain() {
        // Each request outlives five ticks.
        let (pool, _) = mock::pool(Behavior::Delay(Duration::from_secs(1), StatusCode::OK)).await;

        let dispatcher = Dispatcher::new(pool, mock::target(), rate(5));
        let stat = dispatcher.stat();
        let report = dispatcher.run(Duration::from_secs(2)).await;

        assert_eq!(10, report.ticks);
        assert_eq!(10, report.responses);
        assert_eq!(10, stat.num_requests());
        // The last tick fires at 1.8s and its request completes a second later.
        assert!(report.elapsed >= Duration::from_millis(2800), "{:?}", report.elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_deadline() {
        let (pool, calls) = mock::pool(Behavior::Respond(StatusCode::OK)).await;

        let report = Dispatcher::new(pool, mock::target(), rate(20))
            .run(Duration::from_secs(1))
            .await;
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(20, report.ticks);
        assert_eq!(20, calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_config_same_ticks() {
        let mut ticks = Vec::new();
        for _ in 0..2 {
            let (pool, _) = mock::pool(Behavior::Delay(Duration::from_millis(30), StatusCode::OK)).await;
            let report = Dispatcher::new(pool, mock::target(), rate(50))
                .run(Duration::from_secs(2))
                .await;
            ticks.push(report.ticks);
        }

        assert_eq!(100, ticks[0]);
        assert_eq!(ticks[0], ticks[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_over_pool() {
        let calls = Arc::new(core::sync::atomic::AtomicU64::new(0));
        let addrs: Vec<String> = ["127.0.0.1", "127.0.0.2"].iter().map(|v| v.to_string()).collect();
        let pool = ClientPool::build(&addrs, mock::factory(Behavior::Respond(StatusCode::OK), calls.clone())).await;
        assert_eq!(2, pool.len());
        let pool = Arc::new(pool);

        let report = Dispatcher::new(pool.clone(), mock::target(), rate(10))
            .run(Duration::from_secs(1))
            .await;

        assert_eq!(10, report.responses);
        let hits: Vec<u64> = pool.clients().iter().map(|client| client.calls()).collect();
        assert_eq!(vec![5, 5], hits);
    }

    #[test]
    fn test_report_display() {
        let report = Report {
            rate: rate(5),
            ticks: 10,
            responses: 9,
            errors: 1,
            timeouts: 1,
            by_class: [8, 0, 1, 0, 0],
            p50: Duration::from_millis(3),
            p90: Duration::from_millis(7),
            p99: Duration::from_millis(9),
            elapsed: Duration::from_secs(2),
        };

        let s = report.to_string();
        assert!(s.contains("dispatched:   10"), "{s}");
        assert!(s.contains("2xx: 8"), "{s}");
        assert!(s.contains("timeouts: 1"), "{s}");
        assert!(s.contains("4.5 rps"), "{s}");
        assert_eq!(4.5, report.throughput());
    }
}
