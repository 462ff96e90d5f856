#[doc = "Base functionality for Custom Rust Proxy-Wasm development."]
pub mod core;
#[doc = "Custom functionality for Custom Rust Proxy-Wasm development."]
pub mod custom;

use crate::core::error::ConfigError;
use crate::core::root::HttpRootContext;

use proxy_wasm::traits::*;
use proxy_wasm::types::*;
use crate::custom::purge::*;

pub const POLICY_ID: &str = "http-cache-purge-policy";

proxy_wasm::main! {{
    proxy_wasm::set_log_level(LogLevel::Trace);
    proxy_wasm::set_root_context(create_root_context);
}}

fn create_root_context(_: u32) -> Box<dyn RootContext> {
    Box::new(HttpRootContext::<PurgePolicy>::new(
        PurgePolicy::default(),
        serialize_policy_config,
        create_http_context
    ))
}

fn serialize_policy_config(data: &[u8]) -> Result<PurgePolicy, ConfigError> {
    PurgePolicy::from_slice(data)
}

fn create_http_context(policy : PurgePolicy) -> Box<dyn HttpContext> {
    Box::new(PurgeHttpContext::new(policy))
}
