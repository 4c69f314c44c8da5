use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use http::StatusCode;
use tokio::time::Instant;

use crate::{client::RequestError, histogram::LogHistogram};

/// Run statistics shared between all workers.
#[derive(Debug, Default)]
pub struct Stat {
    /// The number of requests started.
    num_requests: AtomicU64,
    /// The number of complete responses, regardless of the status code.
    num_responses: AtomicU64,
    /// The number of requests failed for whatever reason, timeouts included.
    num_errors: AtomicU64,
    num_timeouts: AtomicU64,
    num_2xx: AtomicU64,
    num_3xx: AtomicU64,
    num_4xx: AtomicU64,
    num_5xx: AtomicU64,
    /// Responses with codes outside of the 2xx-5xx range.
    num_other: AtomicU64,
    hist: LogHistogram,
}

impl Stat {
    /// Should be called right before each request.
    #[inline]
    pub fn on_request(&self) {
        self.num_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_response(&self, code: StatusCode, now: &Instant) {
        self.hist.record(now.elapsed());
        let counter = match code.as_u16() {
            200..=299 => &self.num_2xx,
            300..=399 => &self.num_3xx,
            400..=499 => &self.num_4xx,
            500..=599 => &self.num_5xx,
            _ => &self.num_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.num_responses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_error(&self, err: &RequestError, now: &Instant) {
        if let RequestError::Timeout(..) = err {
            self.hist.record(now.elapsed());
            self.num_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.num_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn num_requests(&self) -> u64 {
        self.num_requests.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn num_responses(&self) -> u64 {
        self.num_responses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn num_errors(&self) -> u64 {
        self.num_errors.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn num_timeouts(&self) -> u64 {
        self.num_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the number of responses per status class: 2xx, 3xx, 4xx, 5xx
    /// and everything else.
    #[inline]
    pub fn num_by_class(&self) -> [u64; 5] {
        [
            self.num_2xx.load(Ordering::Relaxed),
            self.num_3xx.load(Ordering::Relaxed),
            self.num_4xx.load(Ordering::Relaxed),
            self.num_5xx.load(Ordering::Relaxed),
            self.num_other.load(Ordering::Relaxed),
        ]
    }

    /// Returns the latency at the given quantile.
    #[inline]
    pub fn latency(&self, q: f64) -> Duration {
        self.hist.quantile(q)
    }
}
