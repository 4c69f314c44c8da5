use core::num::NonZero;
use std::sync::Arc;

use anyhow::Error;

use crate::{
    cfg::{Config, ConfigError, Rate, MAX_RATE},
    client::{ClientPool, ClientSpec, HttpClient, Transport},
    engine::{Benchmark, Dispatcher, Report},
};

/// Run coordinator.
///
/// Optionally discovers the rate with the saturation benchmark, then runs the
/// fixed-rate test. Each phase builds its own client pool from the same
/// configuration.
#[derive(Debug)]
pub struct Runtime<F> {
    cfg: Config,
    factory: F,
}

impl Runtime<fn(ClientSpec) -> HttpClient> {
    pub fn new(cfg: Config) -> Self {
        Self::with_factory(cfg, HttpClient::new)
    }
}

impl<F, T> Runtime<F>
where
    F: Fn(ClientSpec) -> T,
    T: Transport + 'static,
{
    /// Constructs a runtime creating clients with the given factory.
    pub fn with_factory(cfg: Config, factory: F) -> Self {
        Self { cfg, factory }
    }

    /// Runs the whole scenario, returning after the test has finished.
    pub async fn run(self) -> Result<Report, Error> {
        let rate = match self.cfg.rate {
            Rate::Fixed(rate) => rate,
            Rate::Benchmark { duration, workers } => {
                let pool = self.build_pool().await;
                let report = Benchmark::new(pool, Arc::new(self.cfg.target.clone()), workers)
                    .run(duration)
                    .await;

                let rps = report.rps.min(MAX_RATE as u64) as u32;
                let rate = NonZero::new(rps).ok_or(ConfigError::NoSustainableRate)?;
                log::info!("maximum sustainable rate on this machine: {rate} requests per second");

                rate
            }
        };

        let pool = self.build_pool().await;
        let report = Dispatcher::new(pool, Arc::new(self.cfg.target.clone()), rate)
            .run(self.cfg.duration)
            .await;

        Ok(report)
    }

    async fn build_pool(&self) -> Arc<ClientPool<T>> {
        let pool = ClientPool::build(&self.cfg.local_addrs, &self.factory).await;
        log::debug!("using {} client(s), {} address(es) skipped", pool.len(), pool.skipped().len());

        Arc::new(pool)
    }
}
