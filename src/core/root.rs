use log::{error, info};
use proxy_wasm::traits::*;
use proxy_wasm::types::*;

use super::error::ConfigError;

/// Root context shared by every HTTP context of a plugin.
///
/// Parses the plugin configuration once per `on_configure` and hands a clone of
/// the result to each HTTP context it creates.
pub struct HttpRootContext<T: Clone> {
    pub policy_config: T,
    pub serialize: fn(&[u8]) -> Result<T, ConfigError>,
    pub create_http_context: fn(T) -> Box<dyn HttpContext>,
}

impl<T: Clone> HttpRootContext<T> {
    pub fn new(
        policy_config : T,
        serialize : fn(&[u8]) -> Result<T, ConfigError>,
        create_http_context : fn(T) -> Box<dyn HttpContext>
    ) -> Self {
        HttpRootContext {
            policy_config,
            serialize,
            create_http_context,
        }
    }

    #[doc = "Replaces the current configuration, keeping it when `data` is rejected."]
    pub fn configure(&mut self, data: &[u8]) -> Result<(), ConfigError> {
        self.policy_config = (self.serialize)(data)?;
        Ok(())
    }
}

impl<T: Clone> Context for HttpRootContext<T> {}

impl<T: Clone> RootContext for HttpRootContext<T> {

    fn create_http_context(&self, _: u32) -> Option<Box<dyn HttpContext>> {
        Some((self.create_http_context)(self.policy_config.clone()))
    }

    fn get_type(&self) -> Option<ContextType> {
        Some(ContextType::HttpContext)
    }

    fn on_configure(&mut self, _: usize) -> bool {
        let config_bytes = match self.get_plugin_configuration() {
            Some(config_bytes) => config_bytes,
            None => return true,
        };

        match self.configure(config_bytes.as_slice()) {
            Ok(()) => {
                info!("[{}] Plugin configuration loaded.", crate::POLICY_ID);
                true
            },
            Err(err) => {
                error!("[{}] Rejecting plugin configuration: {}", crate::POLICY_ID, err);
                false
            }
        }
    }
}
