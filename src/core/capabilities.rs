#[doc = "The access module decides which clients may issue privileged requests."]
pub mod access;
#[doc = "The purge module authorizes purge requests and runs them against a cache store."]
pub mod purge;
#[doc = "The store module holds the cache stores a purge runs against."]
pub mod store;
