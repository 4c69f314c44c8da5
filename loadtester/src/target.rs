use core::fmt::{self, Display, Formatter};

use http::{uri::PathAndQuery, Uri};

use crate::cfg::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    #[inline]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Parsed HTTP or HTTPS target endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The URL as given by the user.
    uri: Uri,
    scheme: Scheme,
    /// Request URI in origin form, i.e. path and query.
    path: Uri,
    /// Value of the "Host" header.
    authority: String,
    /// Host to resolve and connect to.
    host: String,
    port: u16,
    /// Connection reuse key, "scheme://host:port".
    origin: String,
}

impl Target {
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let uri: Uri = url
            .parse()
            .map_err(|err: http::uri::InvalidUri| ConfigError::InvalidUrl(url.to_string(), err.to_string()))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(scheme) => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
            None => return Err(ConfigError::InvalidUrl(url.to_string(), "missing scheme".into())),
        };

        let authority = match uri.authority() {
            Some(authority) => authority.clone(),
            None => return Err(ConfigError::InvalidUrl(url.to_string(), "missing host".into())),
        };

        let host = authority.host();
        if host.is_empty() {
            return Err(ConfigError::InvalidUrl(url.to_string(), "missing host".into()));
        }
        let origin_host = host.to_string();
        // IPv6 literals come bracketed, but resolvers want them bare.
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        let port = authority.port_u16().unwrap_or(scheme.default_port());

        let path = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        let path = Uri::from(path);

        let m = Self {
            origin: format!("{}://{}:{}", scheme.as_str(), origin_host, port),
            uri,
            scheme,
            path,
            authority: authority.as_str().to_string(),
            host,
            port,
        };

        Ok(m)
    }

    /// Resolves a "Location" header value against this target.
    ///
    /// Accepts absolute URLs, scheme-relative ("//host/path"), absolute-path,
    /// query-only and path-relative references. Fragments are dropped.
    pub fn join(&self, location: &str) -> Result<Self, ConfigError> {
        let location = location.trim();
        let location = location.split('#').next().unwrap_or_default();

        if location.contains("://") {
            return Self::parse(location);
        }

        let scheme = self.scheme.as_str();
        let url = if let Some(rest) = location.strip_prefix("//") {
            format!("{scheme}://{rest}")
        } else if location.starts_with('/') {
            format!("{scheme}://{}{location}", self.authority)
        } else if location.starts_with('?') {
            format!("{scheme}://{}{}{location}", self.authority, self.path.path())
        } else if location.is_empty() {
            format!("{scheme}://{}{}", self.authority, self.path)
        } else {
            let base = self.path.path();
            let dir = &base[..base.rfind('/').map_or(0, |idx| idx + 1)];
            format!("{scheme}://{}{dir}{location}", self.authority)
        };

        Self::parse(&url)
    }

    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[inline]
    pub fn path(&self) -> &Uri {
        &self.path
    }

    #[inline]
    pub fn authority(&self) -> &str {
        &self.authority
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl Display for Target {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), fmt::Error> {
        Display::fmt(&self.uri, fmt)
    }
}
