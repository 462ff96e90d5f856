#[doc = "Capabilities a policy context can be composed from."]
pub mod capabilities;
#[doc = "Policy configuration and runtime errors."]
pub mod error;
#[doc = "Helpers every policy HTTP context gets."]
pub mod expansion;
#[doc = "Request and response views independent of the host."]
pub mod http;
pub mod logger;
pub mod root;
