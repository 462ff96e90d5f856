use chrono::Utc;
use proxy_wasm::traits::HttpContext;

use super::error::{HttpError, HttpErrorBody};
use super::http::{GatewayResponse, IncomingRequest};

pub trait ExpandedHttpContext: HttpContext {

    #[doc = "Sends a JSON problem body for `http_error`."]
    fn send_http_error(&self, http_error : HttpError) {
        let timestamp: String = Utc::now().to_rfc3339();
        let error: HttpErrorBody = HttpErrorBody::with_message(
            http_error.status,
            timestamp,
            http_error.error_message
        );

        self.send_http_response(
            error.status,
            vec![("content-type", "application/json")],
            Some(error.to_json().as_bytes())
        );
    }

    #[doc = "Sends a response produced by a policy decision."]
    fn send_gateway_response(&self, response : &GatewayResponse) {
        self.send_http_response(
            response.status,
            response.headers(),
            response.body()
        );
    }

    #[doc = "Builds the request view from pseudo-headers and the downstream connection.
    \n\rReturns None when the method is missing, which no policy can act on."]
    fn read_incoming_request(&self) -> Option<IncomingRequest> {
        let method = self.get_http_request_header(":method")?;
        let scheme = self.get_http_request_header(":scheme").unwrap_or_else(|| "http".to_string());
        let authority = self.get_http_request_header(":authority").unwrap_or_default();
        let path = self.get_http_request_header(":path").unwrap_or_else(|| "/".to_string());

        let mut request = IncomingRequest::new(&method, &scheme, &authority, &path);
        request.client_ip = self.get_property(vec!["source", "address"])
            .and_then(|address| String::from_utf8(address).ok())
            .and_then(|address| IncomingRequest::parse_client_address(&address));

        Some(request)
    }
}
