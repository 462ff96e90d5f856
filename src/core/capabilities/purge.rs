use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::capabilities::access::{Authorizer, ClientAccess, IpAllowList, OneOrMany, RequestMatcher, RequestMatcherConfig};
use crate::core::capabilities::store::{CacheStore, StoreError};
use crate::core::error::ConfigError;
use crate::core::http::{GatewayResponse, IncomingRequest};

pub const DEFAULT_PURGE_METHOD: &str = "PURGE";

pub const REASON_PURGED: &str = "Purged";
pub const REASON_NOT_FOUND: &str = "Not found";

#[doc = "Option keys a purge gateway accepts, snake_case and kebab-case."]
pub const PURGE_OPTION_KEYS: [&str; 6] = [
    "purge_method",
    "purge-method",
    "allowed_client_matcher",
    "allowed-client-matcher",
    "allowed_client_ips",
    "allowed-client-ips",
];

lazy_static::lazy_static! {
    static ref METHOD_TOKEN: Regex = Regex::new(r"^[!#$%&'*+.^_`|~0-9A-Za-z-]+$").unwrap();
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PurgeOptionsDocument {
    #[serde(alias = "purge-method")]
    purge_method: Option<String>,

    #[serde(alias = "allowed-client-matcher")]
    allowed_client_matcher: Option<RequestMatcherConfig>,

    #[serde(alias = "allowed-client-ips")]
    allowed_client_ips: Option<OneOrMany>,
}

/// Options a [`PurgeGateway`] is built from.
#[derive(Clone, Default)]
pub struct PurgeOptions {
    purge_method: Option<String>,
    allowed_client_matcher: Option<Arc<dyn Authorizer>>,
    allowed_client_ips: Option<Vec<String>>,
}

impl PurgeOptions {

    #[doc = "Reads options from a configuration map.
    \n\rFails if the map holds keys other than the purge options, listing all of them."]
    pub fn from_map(options: Map<String, Value>) -> Result<Self, ConfigError> {
        let extra: Vec<String> = options.keys()
            .filter(|key| !PURGE_OPTION_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();

        if !extra.is_empty() {
            return Err(ConfigError::UnsupportedOptions(extra));
        }

        let document: PurgeOptionsDocument = serde_json::from_value(Value::Object(options))?;

        let allowed_client_matcher = match document.allowed_client_matcher {
            Some(matcher) => Some(Arc::new(RequestMatcher::from_config(matcher)?) as Arc<dyn Authorizer>),
            None => None,
        };

        Ok(PurgeOptions {
            purge_method: document.purge_method,
            allowed_client_matcher,
            allowed_client_ips: document.allowed_client_ips.map(OneOrMany::into_vec),
        })
    }

    #[doc = "Reads options from a JSON object."]
    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigError> {
        let options: Map<String, Value> = serde_json::from_slice(data)?;
        PurgeOptions::from_map(options)
    }

    pub fn with_purge_method(mut self, purge_method: &str) -> Self {
        self.purge_method = Some(purge_method.to_string());
        self
    }

    pub fn with_client_matcher<A: Authorizer + 'static>(mut self, matcher: A) -> Self {
        self.allowed_client_matcher = Some(Arc::new(matcher));
        self
    }

    pub fn with_client_ips<I, S>(mut self, ips: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.allowed_client_ips = Some(ips.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for PurgeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PurgeOptions")
            .field("purge_method", &self.purge_method)
            .field("allowed_client_matcher", &self.allowed_client_matcher.as_ref().map(|_| ".."))
            .field("allowed_client_ips", &self.allowed_client_ips)
            .finish()
    }
}

/// Outcome of running one request through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayDecision {
    /// The request does not use the purge method, normal handling continues.
    NotPurgeRequest,
    Unauthorized,
    Purged,
    NotFound,
}

impl GatewayDecision {
    #[doc = "The response replacing normal handling, None for pass-through."]
    pub fn response(&self) -> Option<GatewayResponse> {
        match self {
            GatewayDecision::NotPurgeRequest => None,
            GatewayDecision::Unauthorized => Some(GatewayResponse::rejected()),
            GatewayDecision::Purged => Some(GatewayResponse::ok(REASON_PURGED)),
            GatewayDecision::NotFound => Some(GatewayResponse::ok(REASON_NOT_FOUND)),
        }
    }
}

/// Authorizes purge requests and runs them against a cache store.
///
/// Holds no per-request state; one gateway serves every request of a plugin.
#[derive(Debug, Clone)]
pub struct PurgeGateway {
    purge_method: String,
    client_access: ClientAccess,
}

impl Default for PurgeGateway {
    fn default() -> Self {
        PurgeGateway {
            purge_method: DEFAULT_PURGE_METHOD.to_string(),
            client_access: ClientAccess::Unconfigured,
        }
    }
}

impl PurgeGateway {

    /// Builds a gateway, failing if both client rules are set or any option is invalid.
    pub fn new(options: PurgeOptions) -> Result<Self, ConfigError> {
        let client_access = match (options.allowed_client_matcher, options.allowed_client_ips) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingClientRules),
            (Some(matcher), None) => ClientAccess::Matcher(matcher),
            (None, Some(ips)) => ClientAccess::ClientIps(IpAllowList::parse(ips)?),
            (None, None) => ClientAccess::Unconfigured,
        };

        let purge_method = options.purge_method.unwrap_or_else(|| DEFAULT_PURGE_METHOD.to_string());
        if !METHOD_TOKEN.is_match(&purge_method) {
            return Err(ConfigError::InvalidMethod(purge_method));
        }

        Ok(PurgeGateway {
            purge_method,
            client_access,
        })
    }

    pub fn purge_method(&self) -> &str {
        &self.purge_method
    }

    pub fn client_access(&self) -> &ClientAccess {
        &self.client_access
    }

    pub fn is_purge_request(&self, request: &IncomingRequest) -> bool {
        request.method == self.purge_method
    }

    /// Decides what happens to `request`; the store is only touched for authorized purges.
    pub fn decide<S: CacheStore + ?Sized>(&self, request: &IncomingRequest, store: &S) -> Result<GatewayDecision, StoreError> {
        if !self.is_purge_request(request) {
            return Ok(GatewayDecision::NotPurgeRequest);
        }

        if !self.client_access.is_request_allowed(request) {
            return Ok(GatewayDecision::Unauthorized);
        }

        if store.purge(&request.uri())? {
            Ok(GatewayDecision::Purged)
        } else {
            Ok(GatewayDecision::NotFound)
        }
    }

    /// Pre-invalidation hook: a response preempting normal handling, or None to let it proceed.
    pub fn on_pre_invalidate<S: CacheStore + ?Sized>(&self, request: &IncomingRequest, store: &S) -> Result<Option<GatewayResponse>, StoreError> {
        self.decide(request, store).map(|decision| decision.response())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::capabilities::store::MemoryStore;

    fn options(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn purge(path: &str, ip: &str) -> IncomingRequest {
        IncomingRequest::new("PURGE", "http", "cache.local", path).with_client_ip(ip.parse().unwrap())
    }

    #[test]
    fn defaults_to_purge_method_and_denies_everyone() {
        let gateway = PurgeGateway::new(PurgeOptions::default()).unwrap();
        assert_eq!(gateway.purge_method(), "PURGE");

        let store = MemoryStore::new();
        store.store("http://cache.local/foo", b"cached").unwrap();

        assert_eq!(gateway.decide(&purge("/foo", "127.0.0.1"), &store), Ok(GatewayDecision::Unauthorized));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_options_are_all_reported() {
        let result = PurgeOptions::from_map(options(json!({
            "purge_method": "PURGE",
            "purge_client_ips": "127.0.0.1",
            "ttl": 3,
        })));

        match result {
            Err(ConfigError::UnsupportedOptions(mut keys)) => {
                keys.sort();
                assert_eq!(keys, vec!["purge_client_ips".to_string(), "ttl".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn both_client_rules_conflict() {
        let options = PurgeOptions::from_map(options(json!({
            "allowed_client_matcher": { "path": "^/" },
            "allowed_client_ips": ["127.0.0.1"],
        }))).unwrap();

        assert_eq!(PurgeGateway::new(options).unwrap_err(), ConfigError::ConflictingClientRules);
    }

    #[test]
    fn programmatic_rules_conflict_too() {
        let options = PurgeOptions::default()
            .with_client_matcher(|_: &IncomingRequest| true)
            .with_client_ips(["127.0.0.1"]);

        assert_eq!(PurgeGateway::new(options).unwrap_err(), ConfigError::ConflictingClientRules);
    }

    #[test]
    fn kebab_case_keys_are_accepted() {
        let options = PurgeOptions::from_map(options(json!({
            "purge-method": "BAN",
            "allowed-client-ips": "10.0.0.0/8",
        }))).unwrap();
        let gateway = PurgeGateway::new(options).unwrap();

        assert_eq!(gateway.purge_method(), "BAN");
        assert!(matches!(gateway.client_access(), ClientAccess::ClientIps(_)));
    }

    #[test]
    fn invalid_method_is_rejected() {
        let options = PurgeOptions::default().with_purge_method("PURGE NOW");
        assert_eq!(
            PurgeGateway::new(options).unwrap_err(),
            ConfigError::InvalidMethod("PURGE NOW".to_string())
        );
    }

    #[test]
    fn invalid_ip_is_rejected_at_construction() {
        let options = PurgeOptions::default().with_client_ips(["127.0.0.1", "nope"]);
        assert_eq!(
            PurgeGateway::new(options).unwrap_err(),
            ConfigError::InvalidClientIp("nope".to_string())
        );
    }

    #[test]
    fn malformed_option_value_is_a_config_error() {
        let result = PurgeOptions::from_map(options(json!({ "purge_method": 5 })));
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn other_methods_pass_through_without_touching_the_store() {
        let gateway = PurgeGateway::new(PurgeOptions::default().with_client_ips(["127.0.0.1"])).unwrap();
        let store = MemoryStore::new();
        store.store("http://cache.local/foo", b"cached").unwrap();

        let get = IncomingRequest::new("GET", "http", "cache.local", "/foo").with_client_ip("127.0.0.1".parse().unwrap());

        assert_eq!(gateway.on_pre_invalidate(&get, &store), Ok(None));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn method_comparison_is_case_sensitive() {
        let gateway = PurgeGateway::new(PurgeOptions::default().with_client_ips(["127.0.0.1"])).unwrap();
        let lower = IncomingRequest::new("purge", "http", "cache.local", "/foo").with_client_ip("127.0.0.1".parse().unwrap());

        assert_eq!(gateway.decide(&lower, &MemoryStore::new()), Ok(GatewayDecision::NotPurgeRequest));
    }

    #[test]
    fn authorized_purge_reports_purged_then_not_found() {
        let gateway = PurgeGateway::new(PurgeOptions::default().with_client_ips(["127.0.0.1"])).unwrap();
        let store = MemoryStore::new();
        store.store("http://cache.local/foo", b"cached").unwrap();

        assert_eq!(
            gateway.on_pre_invalidate(&purge("/foo", "127.0.0.1"), &store),
            Ok(Some(GatewayResponse::ok("Purged")))
        );
        assert_eq!(
            gateway.on_pre_invalidate(&purge("/foo", "127.0.0.1"), &store),
            Ok(Some(GatewayResponse::ok("Not found")))
        );
    }

    #[test]
    fn matcher_authorizes_by_request() {
        let options = PurgeOptions::from_map(options(json!({
            "allowed_client_matcher": { "path": "^/assets/", "ips": "10.0.0.0/8" },
        }))).unwrap();
        let gateway = PurgeGateway::new(options).unwrap();
        let store = MemoryStore::new();

        assert_eq!(gateway.decide(&purge("/assets/app.js", "10.0.0.5"), &store), Ok(GatewayDecision::NotFound));
        assert_eq!(gateway.decide(&purge("/api/users", "10.0.0.5"), &store), Ok(GatewayDecision::Unauthorized));
    }

    #[test]
    fn unauthorized_response_is_400_without_reason() {
        assert_eq!(GatewayDecision::Unauthorized.response(), Some(GatewayResponse { status: 400, reason: None }));
        assert_eq!(GatewayDecision::NotPurgeRequest.response(), None);
    }
}
