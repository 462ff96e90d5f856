use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use ipnet::{IpNet, Ipv4Net};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::core::error::ConfigError;
use crate::core::http::IncomingRequest;

/// Decides whether a request comes from a client allowed to use a privileged method.
pub trait Authorizer: Send + Sync {
    fn is_allowed(&self, request: &IncomingRequest) -> bool;
}

impl<F> Authorizer for F where F: Fn(&IncomingRequest) -> bool + Send + Sync {
    fn is_allowed(&self, request: &IncomingRequest) -> bool {
        self(request)
    }
}

/// One or many values, so `"127.0.0.1"` and `["127.0.0.1"]` deserialize alike.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Client addresses and networks allowed to issue a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAllowList {
    networks: Vec<IpNet>,
}

impl IpAllowList {
    #[doc = "Parses every entry as an IP address (single host) or a CIDR network."]
    pub fn parse<I, S>(entries: I) -> Result<Self, ConfigError> where I: IntoIterator<Item = S>, S: AsRef<str> {
        let networks = entries
            .into_iter()
            .map(|entry| parse_network(entry.as_ref()))
            .collect::<Result<Vec<IpNet>, ConfigError>>()?;

        Ok(IpAllowList { networks })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.networks.iter().any(|network| network.contains(&ip))
    }

}

impl Authorizer for IpAllowList {
    fn is_allowed(&self, request: &IncomingRequest) -> bool {
        request.client_ip.map_or(false, |ip| self.contains(ip))
    }
}

fn parse_network(entry: &str) -> Result<IpNet, ConfigError> {
    let entry = entry.trim();
    let invalid = || ConfigError::InvalidClientIp(entry.to_string());
    if entry.contains('/') {
        let network = entry.parse::<IpNet>().map_err(|_| invalid())?.trunc();

        // Clients are compared in canonical form, so mapped ranges become IPv4 ranges.
        return match network {
            IpNet::V6(v6) => match v6.network().to_ipv4_mapped() {
                Some(v4) if v6.prefix_len() >= 96 => Ipv4Net::new(v4, v6.prefix_len() - 96)
                    .map(IpNet::V4)
                    .map_err(|_| invalid()),
                Some(_) => Err(invalid()),
                None => Ok(network),
            },
            IpNet::V4(_) => Ok(network),
        };
    }

    entry
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_canonical())
        .and_then(|ip| match ip {
            IpAddr::V4(_) => IpNet::new(ip, 32).ok(),
            IpAddr::V6(_) => IpNet::new(ip, 128).ok(),
        })
        .ok_or_else(invalid)
}

/// Declarative form of a client matcher, as found in the plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcherConfig {
    /// Regular expression matched against the path, without query string.
    pub path: Option<String>,
    /// Regular expression matched case-insensitively against the host, without port.
    pub host: Option<String>,
    pub methods: Option<OneOrMany>,
    pub schemes: Option<OneOrMany>,
    pub ips: Option<OneOrMany>,
}

/// A request matcher: every configured constraint must hold for a request to match.
#[derive(Debug, Clone, Default)]
pub struct RequestMatcher {
    path: Option<Regex>,
    host: Option<Regex>,
    methods: Vec<String>,
    schemes: Vec<String>,
    ips: Option<IpAllowList>,
}

impl RequestMatcher {
    pub fn from_config(config: RequestMatcherConfig) -> Result<Self, ConfigError> {
        let path = match config.path {
            Some(pattern) => Some(Regex::new(&pattern).map_err(|err| ConfigError::InvalidPattern {
                field: "path",
                reason: err.to_string(),
            })?),
            None => None,
        };

        let host = match config.host {
            Some(pattern) => Some(RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| ConfigError::InvalidPattern {
                    field: "host",
                    reason: err.to_string(),
                })?),
            None => None,
        };

        let ips = match config.ips {
            Some(ips) => Some(IpAllowList::parse(ips.into_vec())?),
            None => None,
        };

        Ok(RequestMatcher {
            path,
            host,
            methods: config.methods.map(OneOrMany::into_vec).unwrap_or_default()
                .into_iter().map(|method| method.to_uppercase()).collect(),
            schemes: config.schemes.map(OneOrMany::into_vec).unwrap_or_default()
                .into_iter().map(|scheme| scheme.to_lowercase()).collect(),
            ips,
        })
    }

    pub fn matches(&self, request: &IncomingRequest) -> bool {
        if !self.methods.is_empty() && !self.methods.contains(&request.method.to_uppercase()) {
            return false;
        }

        if !self.schemes.is_empty() && !self.schemes.contains(&request.scheme.to_lowercase()) {
            return false;
        }

        if let Some(ips) = &self.ips {
            if !ips.is_allowed(request) {
                return false;
            }
        }

        if let Some(path) = &self.path {
            if !path.is_match(request.path_info()) {
                return false;
            }
        }

        if let Some(host) = &self.host {
            if !host.is_match(request.host()) {
                return false;
            }
        }

        true
    }
}

impl Authorizer for RequestMatcher {
    fn is_allowed(&self, request: &IncomingRequest) -> bool {
        self.matches(request)
    }
}

/// The rule a privileged request is checked against.
#[derive(Clone, Default)]
pub enum ClientAccess {
    /// No rule configured, every client is refused.
    #[default]
    Unconfigured,
    Matcher(Arc<dyn Authorizer>),
    ClientIps(IpAllowList),
}

impl ClientAccess {
    pub fn is_request_allowed(&self, request: &IncomingRequest) -> bool {
        match self {
            ClientAccess::Unconfigured => false,
            ClientAccess::Matcher(authorizer) => authorizer.is_allowed(request),
            ClientAccess::ClientIps(ips) => ips.is_allowed(request),
        }
    }
}

impl fmt::Debug for ClientAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAccess::Unconfigured => write!(f, "Unconfigured"),
            ClientAccess::Matcher(_) => write!(f, "Matcher(..)"),
            ClientAccess::ClientIps(ips) => f.debug_tuple("ClientIps").field(ips).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purge_from(ip: &str) -> IncomingRequest {
        IncomingRequest::new("PURGE", "http", "cache.local", "/foo").with_client_ip(ip.parse().unwrap())
    }

    #[test]
    fn exact_address_matches_only_itself() {
        let ips = IpAllowList::parse(&["127.0.0.1"]).unwrap();
        assert!(ips.contains("127.0.0.1".parse().unwrap()));
        assert!(!ips.contains("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn cidr_range_contains_members() {
        let ips = IpAllowList::parse(&["10.0.0.0/8", "fd00::/8"]).unwrap();
        assert!(ips.contains("10.200.3.4".parse().unwrap()));
        assert!(ips.contains("fd12::1".parse().unwrap()));
        assert!(!ips.contains("11.0.0.1".parse().unwrap()));
    }

    #[test]
    fn host_bits_in_network_are_ignored() {
        let ips = IpAllowList::parse(&["192.168.1.17/24"]).unwrap();
        assert!(ips.contains("192.168.1.200".parse().unwrap()));
    }

    #[test]
    fn mapped_client_matches_ipv4_entry() {
        let ips = IpAllowList::parse(&["127.0.0.1"]).unwrap();
        assert!(ips.contains("::ffff:127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn mapped_range_matches_ipv4_clients() {
        let ips = IpAllowList::parse(&["::ffff:10.0.0.0/104"]).unwrap();
        assert_eq!(ips, IpAllowList::parse(&["10.0.0.0/8"]).unwrap());

        assert!(ips.is_allowed(&purge_from("::ffff:10.1.2.3")));
        assert!(ips.is_allowed(&purge_from("10.1.2.3")));
        assert!(!ips.is_allowed(&purge_from("11.0.0.1")));
    }

    #[test]
    fn plain_ipv6_range_is_kept() {
        let ips = IpAllowList::parse(&["2001:db8::/32"]).unwrap();
        assert!(ips.contains("2001:db8::1".parse().unwrap()));
        assert!(!ips.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn invalid_entry_is_a_config_error() {
        assert_eq!(
            IpAllowList::parse(&["localhost"]),
            Err(ConfigError::InvalidClientIp("localhost".to_string()))
        );
        assert_eq!(
            IpAllowList::parse(&["10.0.0.0/40"]),
            Err(ConfigError::InvalidClientIp("10.0.0.0/40".to_string()))
        );
    }

    #[test]
    fn request_without_client_address_is_refused() {
        let ips = IpAllowList::parse(&["0.0.0.0/0"]).unwrap();
        let request = IncomingRequest::new("PURGE", "http", "cache.local", "/foo");
        assert!(!ips.is_allowed(&request));
    }

    #[test]
    fn matcher_requires_every_constraint() {
        let matcher = RequestMatcher::from_config(RequestMatcherConfig {
            path: Some("^/assets/".to_string()),
            host: Some("^CACHE\\.local$".to_string()),
            ips: Some(OneOrMany::One("10.0.0.0/8".to_string())),
            ..Default::default()
        }).unwrap();

        let allowed = IncomingRequest::new("PURGE", "http", "cache.local:8080", "/assets/app.js?v=2")
            .with_client_ip("10.1.1.1".parse().unwrap());
        assert!(matcher.matches(&allowed));

        let wrong_path = IncomingRequest::new("PURGE", "http", "cache.local", "/api/users")
            .with_client_ip("10.1.1.1".parse().unwrap());
        assert!(!matcher.matches(&wrong_path));

        let wrong_ip = IncomingRequest::new("PURGE", "http", "cache.local", "/assets/app.js")
            .with_client_ip("192.168.0.1".parse().unwrap());
        assert!(!matcher.matches(&wrong_ip));
    }

    #[test]
    fn matcher_methods_and_schemes_ignore_case() {
        let matcher = RequestMatcher::from_config(RequestMatcherConfig {
            methods: Some(OneOrMany::Many(vec!["purge".to_string()])),
            schemes: Some(OneOrMany::One("HTTPS".to_string())),
            ..Default::default()
        }).unwrap();

        assert!(matcher.matches(&IncomingRequest::new("PURGE", "https", "cache.local", "/")));
        assert!(!matcher.matches(&IncomingRequest::new("PURGE", "http", "cache.local", "/")));
        assert!(!matcher.matches(&IncomingRequest::new("BAN", "https", "cache.local", "/")));
    }

    #[test]
    fn empty_matcher_matches_everything() {
        let matcher = RequestMatcher::from_config(RequestMatcherConfig::default()).unwrap();
        assert!(matcher.matches(&IncomingRequest::new("PURGE", "http", "cache.local", "/")));
    }

    #[test]
    fn invalid_matcher_pattern_is_a_config_error() {
        let result = RequestMatcher::from_config(RequestMatcherConfig {
            path: Some("(".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::InvalidPattern { field: "path", .. })));
    }

    #[test]
    fn closures_are_authorizers() {
        let access = ClientAccess::Matcher(Arc::new(|request: &IncomingRequest| request.path.starts_with("/public")));
        assert!(access.is_request_allowed(&IncomingRequest::new("PURGE", "http", "cache.local", "/public/a")));
        assert!(!access.is_request_allowed(&IncomingRequest::new("PURGE", "http", "cache.local", "/private/a")));
    }

    #[test]
    fn no_rule_refuses_everyone() {
        assert!(!ClientAccess::Unconfigured.is_request_allowed(&purge_from("127.0.0.1")));
    }

    #[test]
    fn ip_rule_uses_client_address() {
        let access = ClientAccess::ClientIps(IpAllowList::parse(&["127.0.0.1"]).unwrap());
        assert!(access.is_request_allowed(&purge_from("127.0.0.1")));
        assert!(!access.is_request_allowed(&purge_from("10.0.0.5")));
    }
}
