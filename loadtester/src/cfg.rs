use core::{num::NonZero, time::Duration};

use thiserror::Error;

use crate::{cmd::Cmd, target::Target};

/// Benchmark workers spawned per available CPU unless given explicitly.
pub const BENCH_WORKERS_PER_CPU: usize = 10;

/// The highest dispatch rate, at which the tick interval is one nanosecond.
pub const MAX_RATE: u32 = 1_000_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--url is required")]
    MissingUrl,
    #[error("invalid url \"{0}\": {1}")]
    InvalidUrl(String, String),
    #[error("unsupported url scheme \"{0}\", only http and https are supported")]
    UnsupportedScheme(String),
    #[error("--{0} must be positive, got {1}")]
    NonPositive(&'static str, i64),
    #[error("--rps must not exceed {MAX_RATE}, got {0}")]
    RateTooHigh(i64),
    #[error("benchmark found no sustainable rate: every request failed")]
    NoSustainableRate,
}

/// Where the dispatcher rate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rate {
    /// Dispatch exactly this many requests per second.
    Fixed(NonZero<u32>),
    /// Run the saturation benchmark first and dispatch at the discovered rate.
    Benchmark {
        /// Benchmark duration in seconds.
        duration: NonZero<u64>,
        /// Number of concurrent benchmark workers.
        workers: NonZero<usize>,
    },
}

/// Validated configuration of a single run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target endpoint.
    pub target: Target,
    pub rate: Rate,
    /// Dispatcher run length.
    pub duration: Duration,
    /// Local addresses to bind outgoing connections to.
    pub local_addrs: Vec<String>,
}

impl TryFrom<Cmd> for Config {
    type Error = ConfigError;

    fn try_from(cmd: Cmd) -> Result<Self, Self::Error> {
        let Cmd {
            url,
            rps,
            duration,
            benchmark,
            bench_duration,
            bench_workers,
            local_addrs,
            verbose: _,
        } = cmd;

        let target = match url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Target::parse(url)?,
            _ => return Err(ConfigError::MissingUrl),
        };

        let rate = if benchmark {
            let workers = match bench_workers {
                Some(v) => NonZero::new(positive("bench-workers", v)? as usize)
                    .ok_or(ConfigError::NonPositive("bench-workers", v))?,
                None => default_bench_workers(),
            };

            Rate::Benchmark {
                duration: NonZero::new(positive("bench-duration", bench_duration)?)
                    .ok_or(ConfigError::NonPositive("bench-duration", bench_duration))?,
                workers,
            }
        } else {
            let v = positive("rps", rps)?;
            if v > MAX_RATE as u64 {
                return Err(ConfigError::RateTooHigh(rps));
            }
            // Bounded by MAX_RATE above.
            Rate::Fixed(NonZero::new(v as u32).ok_or(ConfigError::NonPositive("rps", rps))?)
        };

        let duration = Duration::from_secs(positive("duration", duration)?);

        let local_addrs = local_addrs
            .into_iter()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let m = Self {
            target,
            rate,
            duration,
            local_addrs,
        };

        Ok(m)
    }
}

#[inline]
fn positive(name: &'static str, v: i64) -> Result<u64, ConfigError> {
    if v > 0 {
        Ok(v as u64)
    } else {
        Err(ConfigError::NonPositive(name, v))
    }
}

/// Returns the default number of benchmark workers: a fixed multiple of the
/// available parallelism.
pub fn default_bench_workers() -> NonZero<usize> {
    let cpus = std::thread::available_parallelism().unwrap_or(NonZero::<usize>::MIN);
    cpus.saturating_mul(NonZero::new(BENCH_WORKERS_PER_CPU).unwrap_or(NonZero::<usize>::MIN))
}
