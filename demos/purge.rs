use http_cache_purge_policy::core::capabilities::purge::{PurgeGateway, PurgeOptions};
use http_cache_purge_policy::core::capabilities::store::{CacheStore, MemoryStore};
use http_cache_purge_policy::core::http::IncomingRequest;

fn main() {
    let options = match PurgeOptions::from_slice(br#"{ "purge_method": "PURGE", "allowed_client_ips": "127.0.0.1" }"#) {
        Ok(options) => options,
        Err(config_error) => {
            println!("{}", config_error);
            return;
        }
    };

    let gateway = match PurgeGateway::new(options) {
        Ok(gateway) => gateway,
        Err(config_error) => {
            println!("{}", config_error);
            return;
        }
    };

    let store = MemoryStore::new();
    if let Err(store_error) = store.store("http://cache.local/foo", b"cached response") {
        println!("{}", store_error);
        return;
    }

    let requests = vec![
        ("PURGE", "127.0.0.1"),
        ("PURGE", "127.0.0.1"),
        ("PURGE", "10.0.0.5"),
        ("GET", "127.0.0.1"),
    ];

    for (method, client) in requests {
        let mut request = IncomingRequest::new(method, "http", "cache.local", "/foo");
        request.client_ip = IncomingRequest::parse_client_address(client);

        match gateway.decide(&request, &store) {
            Ok(decision) => println!("{} {} from {} -> {:?} {:?}", method, request.uri(), client, decision, decision.response()),
            Err(store_error) => println!("{} {} from {} -> {}", method, request.uri(), client, store_error),
        }
    }
}
