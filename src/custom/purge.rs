use std::sync::Arc;

use proxy_wasm::traits::*;
use proxy_wasm::types::*;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::capabilities::purge::{GatewayDecision, PurgeGateway, PurgeOptions};
use crate::core::capabilities::store::{SharedDataStore, StoreError};
use crate::core::error::{ConfigError, HttpError};
use crate::core::expansion::ExpandedHttpContext;
use crate::core::http::{GatewayResponse, IncomingRequest};
use crate::core::logger::{resolve_log_level, Logger};
use crate::POLICY_ID;

pub const DEFAULT_CACHE_KEY_PREFIX: &str = "http-cache:";

/// Configuration for the cache purge policy.
/// Keys other than the policy-level ones below are purge options.
#[derive(Default, Clone, Deserialize)]
pub struct PurgePolicyConfig {

    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    #[serde(alias = "cache-key-prefix")]
    pub cache_key_prefix: Option<String>,

    #[serde(flatten)]
    pub purge_options: Map<String, Value>,
}

/// A validated policy configuration, shared by every HTTP context.
#[derive(Clone)]
pub struct PurgePolicy {
    pub gateway: Arc<PurgeGateway>,
    pub log_level: LogLevel,
    pub cache_key_prefix: String,
}

impl Default for PurgePolicy {
    fn default() -> Self {
        PurgePolicy {
            gateway: Arc::new(PurgeGateway::default()),
            log_level: resolve_log_level(None),
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
        }
    }
}

impl PurgePolicy {
    pub fn from_config(config: PurgePolicyConfig) -> Result<Self, ConfigError> {
        let gateway = PurgeGateway::new(PurgeOptions::from_map(config.purge_options)?)?;

        Ok(PurgePolicy {
            gateway: Arc::new(gateway),
            log_level: resolve_log_level(config.log_level.as_deref()),
            cache_key_prefix: config.cache_key_prefix.unwrap_or_else(|| DEFAULT_CACHE_KEY_PREFIX.to_string()),
        })
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, ConfigError> {
        let config: PurgePolicyConfig = serde_json::from_slice(data)?;
        PurgePolicy::from_config(config)
    }
}

/// Per-request context running the purge gateway ahead of the cache.
pub struct PurgeHttpContext {
    policy: PurgePolicy,
    store: SharedDataStore,
    logger: Logger,
}

impl PurgeHttpContext {
    pub fn new(policy: PurgePolicy) -> Self {
        let store = SharedDataStore::new(&policy.cache_key_prefix);
        let logger = Logger::new(POLICY_ID.to_string(), policy.log_level);

        PurgeHttpContext {
            policy,
            store,
            logger,
        }
    }

    fn log_decision(&self, decision: GatewayDecision, request: &IncomingRequest) {
        match decision {
            GatewayDecision::NotPurgeRequest => self.logger.log_trace(&format!("{} {} is not a purge request.", request.method, request.path)),
            GatewayDecision::Unauthorized => self.logger.log_warn(&format!("Refused purge of {} from client {}.", request.uri(), describe_client(request))),
            GatewayDecision::Purged => self.logger.log_info(&format!("Purged {}.", request.uri())),
            GatewayDecision::NotFound => self.logger.log_info(&format!("Nothing cached for {}.", request.uri())),
        }
    }
}

/// What the HTTP context does with a gateway outcome.
#[derive(Debug)]
pub enum GatewayReply {
    Forward,
    Respond(GatewayResponse),
    Fail(HttpError),
}

impl GatewayReply {
    pub fn from_outcome(outcome: Result<GatewayDecision, StoreError>) -> Self {
        match outcome {
            Ok(decision) => match decision.response() {
                Some(response) => GatewayReply::Respond(response),
                None => GatewayReply::Forward,
            },
            Err(store_error) => GatewayReply::Fail(store_error.into()),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            GatewayReply::Forward => Action::Continue,
            GatewayReply::Respond(_) | GatewayReply::Fail(_) => Action::Pause,
        }
    }
}

fn describe_client(request: &IncomingRequest) -> String {
    match request.client_ip {
        Some(ip) => ip.to_string(),
        None => "<unknown>".to_string(),
    }
}

impl Context for PurgeHttpContext {}

impl HttpContext for PurgeHttpContext {
    fn on_http_request_headers(&mut self, _num_headers: usize, _end_of_stream: bool) -> Action {
        let request = match self.read_incoming_request() {
            Some(request) => request,
            None => {
                self.logger.log_debug("Request without :method, letting it through.");
                return Action::Continue;
            }
        };

        let outcome = self.policy.gateway.decide(&request, &self.store);
        match &outcome {
            Ok(decision) => self.log_decision(*decision, &request),
            Err(store_error) => self.logger.log_error(&format!("Purge of {} failed: {}", request.uri(), store_error)),
        }

        let reply = GatewayReply::from_outcome(outcome);
        let action = reply.action();
        match reply {
            GatewayReply::Respond(response) => self.send_gateway_response(&response),
            GatewayReply::Fail(http_error) => self.send_http_error(http_error),
            GatewayReply::Forward => {},
        }
        action
    }
}

impl ExpandedHttpContext for PurgeHttpContext {}
