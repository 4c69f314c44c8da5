use http::StatusCode;
use tokio::time::Instant;

pub use self::{
    bench::{BenchReport, Benchmark},
    dispatch::{Dispatcher, Report},
};
use crate::{
    client::{ClientPool, RequestError, Transport},
    stat::Stat,
    target::Target,
    Produce,
};

mod bench;
mod dispatch;
#[cfg(test)]
pub(crate) mod mock;

/// Performs a single request through the next client of the pool, recording
/// the outcome into the given stat.
#[inline]
async fn perform<T>(pool: &ClientPool<T>, target: &Target, stat: &Stat) -> Result<StatusCode, RequestError>
where
    T: Transport,
{
    let client = pool.next();
    let now = Instant::now();

    stat.on_request();
    let rc = client.get(target).await;
    match &rc {
        Ok(code) => stat.on_response(*code, &now),
        Err(err) => stat.on_error(err, &now),
    }

    rc
}
