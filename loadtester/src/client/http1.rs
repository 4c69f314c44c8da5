use core::net::SocketAddr;
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use bytes::Bytes;
use http::{
    header::{HOST, LOCATION},
    Request, StatusCode,
};
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::{self, SendRequest};
use rustls_platform_verifier::ConfigVerifierExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{lookup_host, TcpSocket, TcpStream},
};
use tokio_rustls::{
    rustls::{pki_types::ServerName, ClientConfig},
    TlsConnector,
};

use super::{rt::TokioIo, ClientSpec, RequestError, Transport};
use crate::target::{Scheme, Target};

/// Maximum number of idle keep-alive connections per client and origin.
const MAX_IDLE: usize = 32;

/// Maximum number of requests a single `get` may issue while following
/// redirects.
const MAX_REDIRECTS: usize = 10;

type Sender = SendRequest<Empty<Bytes>>;

/// HTTP/1.1 client over plain TCP or TLS, optionally bound to a local address.
///
/// Keeps finished connections alive and reuses them for the next requests to
/// the same origin, opening new ones when all of them are busy. Redirects are
/// followed.
#[derive(Debug)]
pub struct HttpClient {
    spec: ClientSpec,
    tls: OnceLock<Arc<ClientConfig>>,
    idle: Mutex<HashMap<String, Vec<Sender>>>,
}

impl HttpClient {
    /// Constructs a client verifying server certificates against the
    /// platform trust store.
    pub fn new(spec: ClientSpec) -> Self {
        Self {
            spec,
            tls: OnceLock::new(),
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Constructs a client with the given TLS configuration.
    pub fn with_tls(spec: ClientSpec, tls: Arc<ClientConfig>) -> Self {
        let m = Self::new(spec);
        let _ = m.tls.set(tls);
        m
    }

    async fn execute(&self, target: &Target) -> Result<StatusCode, RequestError> {
        let mut hop = Cow::Borrowed(target);
        for _ in 0..MAX_REDIRECTS {
            let (code, location) = self.round_trip(&hop).await?;
            match location {
                Some(location) if is_redirect(code) => {
                    log::trace!("following {code} redirect from {hop} to {location}");
                    hop = Cow::Owned(hop.join(&location)?);
                }
                _ => return Ok(code),
            }
        }

        Err(RequestError::TooManyRedirects(MAX_REDIRECTS))
    }

    /// Sends a single request, returning the status code and the redirect
    /// location, if any.
    async fn round_trip(&self, target: &Target) -> Result<(StatusCode, Option<String>), RequestError> {
        let (mut sender, reused) = match self.checkout(target).await {
            Some(sender) => (sender, true),
            None => (self.connect(target).await?, false),
        };

        let mut resp = match sender.send_request(request(target)?).await {
            Ok(resp) => resp,
            // The peer has closed an idle connection right before the request.
            Err(err) if reused && (err.is_canceled() || err.is_incomplete_message() || err.is_closed()) => {
                log::debug!("reused connection to {} failed: {err}, reconnecting", target.origin());
                sender = self.connect(target).await?;
                sender.send_request(request(target)?).await?
            }
            Err(err) => return Err(err.into()),
        };

        let code = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        while let Some(frame) = resp.frame().await {
            frame?;
        }

        self.checkin(target, sender);

        Ok((code, location))
    }

    /// Takes an idle connection to the target's origin that is still open, if
    /// any.
    async fn checkout(&self, target: &Target) -> Option<Sender> {
        loop {
            let mut sender = {
                let mut idle = self.idle.lock().unwrap_or_else(|err| err.into_inner());
                idle.get_mut(target.origin())?.pop()?
            };

            if !sender.is_closed() && sender.ready().await.is_ok() {
                return Some(sender);
            }
        }
    }

    fn checkin(&self, target: &Target, sender: Sender) {
        if sender.is_closed() {
            return;
        }

        let mut idle = self.idle.lock().unwrap_or_else(|err| err.into_inner());
        match idle.get_mut(target.origin()) {
            Some(senders) if senders.len() < MAX_IDLE => senders.push(sender),
            Some(..) => {}
            None => {
                idle.insert(target.origin().to_string(), vec![sender]);
            }
        }
    }

    async fn connect(&self, target: &Target) -> Result<Sender, RequestError> {
        let addr = self.resolve(target).await?;
        let sock = match addr {
            SocketAddr::V4(..) => TcpSocket::new_v4()?,
            SocketAddr::V6(..) => TcpSocket::new_v6()?,
        };
        if let Some(bind) = self.spec.bind {
            sock.bind(bind)?;
        }

        let stream = match tokio::time::timeout(self.spec.connect_timeout, sock.connect(addr)).await {
            Ok(stream) => stream?,
            Err(..) => return Err(RequestError::Timeout(self.spec.connect_timeout)),
        };
        stream.set_nodelay(true)?;

        match target.scheme() {
            Scheme::Http => self.handshake(stream, addr).await,
            Scheme::Https => {
                let stream = self.tls_connect(stream, target).await?;
                self.handshake(stream, addr).await
            }
        }
    }

    async fn tls_connect(
        &self,
        stream: TcpStream,
        target: &Target,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, RequestError> {
        let name = ServerName::try_from(target.host().to_string()).map_err(|err| RequestError::Tls(err.to_string()))?;
        let connector = TlsConnector::from(self.tls_config()?);

        let stream = match tokio::time::timeout(self.spec.connect_timeout, connector.connect(name, stream)).await {
            Ok(stream) => stream?,
            Err(..) => return Err(RequestError::Timeout(self.spec.connect_timeout)),
        };

        Ok(stream)
    }

    async fn handshake<S>(&self, stream: S, addr: SocketAddr) -> Result<Sender, RequestError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        let bind = self.spec.bind;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                match bind {
                    Some(bind) => log::debug!("connection {bind} -> {addr} failed: {err}"),
                    None => log::debug!("connection to {addr} failed: {err}"),
                }
            }
        });

        Ok(sender)
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>, RequestError> {
        if let Some(cfg) = self.tls.get() {
            return Ok(cfg.clone());
        }

        let mut cfg = ClientConfig::with_platform_verifier().map_err(|err| RequestError::Tls(err.to_string()))?;
        cfg.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(self.tls.get_or_init(|| Arc::new(cfg)).clone())
    }

    /// Resolves the target, preferring addresses of the bound family.
    async fn resolve(&self, target: &Target) -> Result<SocketAddr, RequestError> {
        let addrs: Vec<SocketAddr> = lookup_host((target.host(), target.port())).await?.collect();

        let addr = match self.spec.bind {
            Some(bind) => addrs.iter().find(|addr| addr.is_ipv4() == bind.is_ipv4()),
            None => None,
        };

        addr.or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| RequestError::Resolve(target.host().to_string()))
    }
}

impl Transport for HttpClient {
    async fn get(&self, target: &Target) -> Result<StatusCode, RequestError> {
        match tokio::time::timeout(self.spec.timeout, self.execute(target)).await {
            Ok(rc) => rc,
            Err(..) => Err(RequestError::Timeout(self.spec.timeout)),
        }
    }
}

/// Whether the response redirects a GET to its "Location".
#[inline]
fn is_redirect(code: StatusCode) -> bool {
    matches!(
        code,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

#[inline]
fn request(target: &Target) -> Result<Request<Empty<Bytes>>, http::Error> {
    Request::get(target.path().clone())
        .header(HOST, target.authority())
        .body(Empty::new())
}
