use std::net::{IpAddr, SocketAddr};

#[doc = "Header carrying the reason phrase of a purge response, since proxy-wasm cannot set reason phrases."]
pub const PURGE_RESULT_HEADER: &str = "x-purge-result";

/// The parts of an inbound request a purge policy looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub method: String,
    pub scheme: String,
    pub authority: String,
    /// Path including the query string, as found in `:path`.
    pub path: String,
    pub client_ip: Option<IpAddr>,
}

impl IncomingRequest {
    pub fn new(method: &str, scheme: &str, authority: &str, path: &str) -> Self {
        IncomingRequest {
            method: method.to_string(),
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
            client_ip: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: IpAddr) -> Self {
        self.client_ip = Some(client_ip.to_canonical());
        self
    }

    /// Absolute request URI, the identity cache entries are stored under.
    pub fn uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.authority, self.path)
    }

    /// Host without port.
    pub fn host(&self) -> &str {
        if self.authority.starts_with('[') {
            return match self.authority.find(']') {
                Some(end) => &self.authority[1..end],
                None => &self.authority,
            };
        }
        match self.authority.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => &self.authority,
        }
    }

    /// Path without the query string.
    pub fn path_info(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _)) => path,
            None => &self.path,
        }
    }

    #[doc = "Parses a proxy `source.address` value, `ip:port` or a bare IP."]
    pub fn parse_client_address(address: &str) -> Option<IpAddr> {
        let address = address.trim();
        address.parse::<SocketAddr>()
            .map(|socket| socket.ip())
            .or_else(|_| address.parse::<IpAddr>())
            .ok()
            .map(|ip| ip.to_canonical())
    }
}

/// A response produced by the policy instead of letting the request through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayResponse {
    pub status: u32,
    pub reason: Option<&'static str>,
}

impl GatewayResponse {
    pub fn rejected() -> Self {
        GatewayResponse { status: 400, reason: None }
    }

    pub fn ok(reason: &'static str) -> Self {
        GatewayResponse { status: 200, reason: Some(reason) }
    }

    pub fn headers(&self) -> Vec<(&str, &str)> {
        match self.reason {
            Some(reason) => vec![(PURGE_RESULT_HEADER, reason)],
            None => Vec::new(),
        }
    }

    /// Purge responses never carry a body.
    pub fn body(&self) -> Option<&[u8]> {
        None
    }
}
