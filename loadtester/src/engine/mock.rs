use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::{io, sync::Arc};

use http::StatusCode;

use crate::{
    client::{ClientPool, ClientSpec, RequestError, Transport},
    target::Target,
};

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Respond with the given code right away.
    Respond(StatusCode),
    /// Respond with the given code after a delay.
    Delay(Duration, StatusCode),
    /// Fail every request with "connection refused".
    Refuse,
}

/// In-memory transport.
///
/// All clients of a pool share the same call counter, each one also counts
/// its own calls.
#[derive(Debug)]
pub struct MockTransport {
    behavior: Behavior,
    calls: Arc<AtomicU64>,
    own: AtomicU64,
}

impl MockTransport {
    /// Returns the number of calls made through this client.
    pub fn calls(&self) -> u64 {
        self.own.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    async fn get(&self, _target: &Target) -> Result<StatusCode, RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.own.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Respond(code) => {
                // Mimic a network round trip, giving other tasks a chance to
                // run.
                tokio::task::yield_now().await;
                Ok(code)
            }
            Behavior::Delay(delay, code) => {
                tokio::time::sleep(delay).await;
                Ok(code)
            }
            Behavior::Refuse => {
                tokio::task::yield_now().await;
                Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
            }
        }
    }
}

/// Constructs an unbound single-client pool and its call counter.
pub async fn pool(behavior: Behavior) -> (Arc<ClientPool<MockTransport>>, Arc<AtomicU64>) {
    let calls = Arc::new(AtomicU64::new(0));
    let pool = ClientPool::build(&[], factory(behavior, calls.clone())).await;

    (Arc::new(pool), calls)
}

pub fn factory(behavior: Behavior, calls: Arc<AtomicU64>) -> impl Fn(ClientSpec) -> MockTransport {
    move |_spec| MockTransport {
        behavior,
        calls: calls.clone(),
        own: AtomicU64::new(0),
    }
}

pub fn target() -> Arc<Target> {
    Arc::new(Target::parse("http://example.test/ok").expect("valid url"))
}
