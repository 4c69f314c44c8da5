use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Lock-free latency histogram with logarithmic buckets.
///
/// Bucket `i` covers `[f^i; f^(i+1))` microseconds, the first one also covers
/// everything below `f`, the last one everything above the maximum.
#[derive(Debug)]
pub struct LogHistogram {
    buckets: Vec<AtomicU64>,
    factor: f64,
}

impl Default for LogHistogram {
    fn default() -> Self {
        // Twice the client timeout, so timed out requests still land in a
        // bucket of their own.
        Self::new(1.5, Duration::from_secs(60))
    }
}

impl LogHistogram {
    pub fn new(factor: f64, max: Duration) -> Self {
        let max = max.as_micros() as f64;
        let mut buckets = Vec::new();
        let mut curr = 1.0;
        while curr < max {
            buckets.push(AtomicU64::new(0));
            curr *= factor;
        }

        Self { buckets, factor }
    }

    #[inline]
    pub fn record(&self, elapsed: Duration) {
        let us = elapsed.as_micros() as f64;
        let idx = us.log(self.factor) as usize;
        let idx = idx.min(self.buckets.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Calculates the quantile.
    ///
    /// Finds the first bucket "i" where the cumulative count "sum[i] + b[i]"
    /// reaches "q * sum[N]", then interpolates linearly inside that bucket
    /// in logarithmic coordinates by base "f":
    ///
    /// x = (q * sum[N] - (sum[i] - b[i] * i)) / b[i]
    ///
    /// The result is "f^x" converted back from logarithmic coordinates.
    ///
    /// An empty histogram yields zero.
    pub fn quantile(&self, q: f64) -> Duration {
        assert!((0.0..=1.0).contains(&q));

        let snapshot: Vec<u64> = self.buckets.iter().map(|v| v.load(Ordering::Relaxed)).collect();
        let size: u64 = snapshot.iter().sum();
        if size == 0 {
            return Duration::ZERO;
        }

        let mut sum = 0;
        for (idx, &b) in snapshot.iter().enumerate() {
            if ((sum + b) as f64) >= q * (size as f64) {
                let idx = idx as f64;
                let b = b as f64;
                let sum = sum as f64;
                let size = size as f64;
                let us = self.factor.powf((q * size - sum) / b + idx);

                // NaN for an empty leading bucket at q = 0 saturates to zero.
                return Duration::from_micros(us as u64);
            }
            sum += b;
        }

        Duration::MAX
    }
}
