use core::{
    future::Future,
    net::{IpAddr, SocketAddr},
    time::Duration,
};
use std::io;

use http::StatusCode;
use thiserror::Error;

pub use self::http1::HttpClient;
use crate::{cfg::ConfigError, target::Target, Produce, VecProduce};

mod http1;
mod rt;

/// Every request must complete within this time, connection establishment
/// included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection establishment timeout.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to resolve \"{0}\"")]
    Resolve(String),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Http(#[from] hyper::Error),
    #[error("{0}")]
    Request(#[from] http::Error),
    #[error("TLS: {0}")]
    Tls(String),
    #[error("invalid redirect: {0}")]
    Redirect(#[from] ConfigError),
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// Single round trip to the target.
///
/// This is the seam between the engine and the wire: the engine selects a
/// client and accounts for the outcome, the client does the networking.
pub trait Transport: Send + Sync {
    /// Performs a GET request, following redirects, and returns the final
    /// status code after the body has been fully received.
    fn get(&self, target: &Target) -> impl Future<Output = Result<StatusCode, RequestError>> + Send;
}

/// Outbound client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSpec {
    /// Local address to bind outgoing sockets to.
    ///
    /// If none given, the OS chooses.
    pub bind: Option<SocketAddr>,
    /// End-to-end request timeout.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientSpec {
    #[inline]
    pub const fn new(bind: Option<SocketAddr>) -> Self {
        Self {
            bind,
            timeout: REQUEST_TIMEOUT,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Constructs a spec for an unbound client.
    #[inline]
    pub const fn unbound() -> Self {
        Self::new(None)
    }
}

/// Non-empty set of clients selected in round-robin order.
#[derive(Debug)]
pub struct ClientPool<T> {
    clients: VecProduce<T>,
    /// Local addresses failed to resolve.
    skipped: Vec<String>,
}

impl<T> ClientPool<T> {
    /// Builds a pool with one client per local address.
    ///
    /// Addresses that fail to resolve are reported and skipped. If no address
    /// remains, the pool consists of a single unbound client.
    pub async fn build<F>(local_addrs: &[String], mut factory: F) -> Self
    where
        F: FnMut(ClientSpec) -> T,
    {
        let mut clients = Vec::with_capacity(local_addrs.len());
        let mut skipped = Vec::new();

        for addr in local_addrs {
            match resolve_local(addr).await {
                Ok(bind) => {
                    log::debug!("binding client to {bind}");
                    clients.push(factory(ClientSpec::new(Some(bind))));
                }
                Err(err) => {
                    log::warn!("failed to create client for \"{addr}\": {err}");
                    skipped.push(addr.clone());
                }
            }
        }

        if clients.is_empty() {
            clients.push(factory(ClientSpec::unbound()));
        }

        Self {
            clients: VecProduce::new(clients),
            skipped,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    #[inline]
    pub fn clients(&self) -> &[T] {
        self.clients.as_slice()
    }

    /// Returns addresses that were given but failed to resolve.
    #[inline]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

impl<T> Produce for ClientPool<T> {
    type Item = T;

    #[inline]
    fn next(&self) -> &Self::Item {
        self.clients.next()
    }
}

/// Resolves a local bind address, using an ephemeral port if none given.
async fn resolve_local(addr: &str) -> Result<SocketAddr, io::Error> {
    let addr = addr.trim();

    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, 0));
    }
    if let Ok(addr) = addr.parse::<SocketAddr>() {
        return Ok(addr);
    }

    let addr = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:0")
    };

    let rc = tokio::net::lookup_host(addr.as_str())
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no addresses for \"{addr}\"")));

    rc
}
