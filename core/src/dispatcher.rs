//! The request dispatcher: every API call goes through here.
//!
//! # Design
//! `Dispatcher` splits each exchange into `build_request` (target resolution,
//! form encoding, bearer header), the transport round-trip, and
//! `parse_response` (status classification, JSON decoding). It holds only an
//! immutable `Config` and a transport, so one dispatcher can serve concurrent
//! calls without locking.
//!
//! Classification looks at the status line and the `WWW-Authenticate`
//! challenge only. Response fields are never inspected: a 200 carrying
//! `"error": "not_enough_funds"` is returned to the caller as-is.

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, ErrorKind, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, FORM_CONTENT_TYPE};
use crate::params::Params;
use crate::token::AccessToken;
use crate::transport::{Transport, UreqTransport};

#[derive(Debug, Clone)]
pub struct Dispatcher<T = UreqTransport> {
    config: Config,
    transport: T,
}

impl Dispatcher<UreqTransport> {
    /// Dispatcher over a `ureq` transport using the config's timeout.
    pub fn new(config: Config) -> Self {
        let transport = UreqTransport::from_config(&config);
        Self { config, transport }
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn with_transport(config: Config, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve `target` to an absolute URL. Absolute `http(s)` URLs pass
    /// through; anything else is treated as a path under the base URL.
    pub fn resolve_url(&self, target: &str) -> Result<String, TransportError> {
        if let Ok(url) = Url::parse(target) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url.into());
            }
        }
        let path = target.strip_prefix('/').unwrap_or(target);
        let joined = format!("{}/{}", self.config.base_url(), path);
        match Url::parse(&joined) {
            Ok(url) => Ok(url.into()),
            Err(source) => Err(TransportError::InvalidUrl { url: joined, source }),
        }
    }

    /// Build a form-encoded POST for `target`.
    pub fn build_request(
        &self,
        target: &str,
        params: &Params,
        token: Option<&AccessToken>,
    ) -> Result<HttpRequest, ApiError> {
        self.build_request_with_method(HttpMethod::Post, target, params, token)
    }

    /// GET requests carry `params` in the query string; POST requests carry
    /// them as a form body.
    pub fn build_request_with_method(
        &self,
        method: HttpMethod,
        target: &str,
        params: &Params,
        token: Option<&AccessToken>,
    ) -> Result<HttpRequest, ApiError> {
        let mut url = self.resolve_url(target)?;
        let mut headers = Vec::new();

        let body = match method {
            HttpMethod::Post => {
                headers.push(("content-type".to_string(), FORM_CONTENT_TYPE.to_string()));
                Some(params.encode())
            }
            HttpMethod::Get => {
                if !params.is_empty() {
                    let separator = if url.contains('?') { '&' } else { '?' };
                    url = format!("{url}{separator}{}", params.encode());
                }
                None
            }
        };

        if let Some(token) = token {
            headers.push(("authorization".to_string(), token.bearer()));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Classify a response. Protocol failures become `ApiError`; every other
    /// status yields the decoded body. An empty body decodes to `Value::Null`.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Value, ApiError> {
        if let Some(kind) = classify(&response) {
            let body = serde_json::from_str(&response.body).ok();
            return Err(kind.into_error(response.status, body));
        }
        decode_body(&response.body)
    }

    /// Perform one POST exchange against `target`.
    pub fn send(
        &self,
        target: &str,
        params: &Params,
        token: Option<&AccessToken>,
    ) -> Result<Value, ApiError> {
        self.send_with_method(HttpMethod::Post, target, params, token)
    }

    pub fn send_with_method(
        &self,
        method: HttpMethod,
        target: &str,
        params: &Params,
        token: Option<&AccessToken>,
    ) -> Result<Value, ApiError> {
        let request = self.build_request_with_method(method, target, params, token)?;
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            authenticated = token.is_some(),
            params = params.len(),
            "dispatching wallet request"
        );

        let response = self.transport.execute(&request)?;
        debug!(status = response.status, url = %request.url, "wallet response received");

        self.parse_response(response)
    }
}

/// Map a response to a protocol error kind, in priority order:
/// 400 or an `invalid_request` bearer challenge, 401, 403, then any 5xx.
pub fn classify(response: &HttpResponse) -> Option<ErrorKind> {
    let status = response.status;
    let challenge = response.header("www-authenticate").and_then(bearer_error);

    if status == 400 || ((400..500).contains(&status) && challenge == Some("invalid_request")) {
        Some(ErrorKind::Format)
    } else if status == 401 {
        Some(ErrorKind::Token)
    } else if status == 403 {
        Some(ErrorKind::Scope)
    } else if status >= 500 {
        Some(ErrorKind::Server)
    } else {
        None
    }
}

/// Extract the `error` parameter of a `Bearer` challenge
/// (`Bearer error="invalid_token", error_description="..."`).
fn bearer_error(challenge: &str) -> Option<&str> {
    let challenge = challenge.trim_start();
    let scheme = challenge.get(..6)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    challenge[6..].split(',').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        (key.trim() == "error").then(|| value.trim().trim_matches('"'))
    })
}

fn decode_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| TransportError::MalformedBody(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::StubTransport;
    use serde_json::json;

    const BASE_URL: &str = "https://wallet.test";

    fn dispatcher(stub: StubTransport) -> Dispatcher<StubTransport> {
        Dispatcher::with_transport(Config::new(BASE_URL), stub)
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn relative_target_is_prefixed_with_base_url() {
        let d = dispatcher(StubTransport::new());
        assert_eq!(
            d.resolve_url("/api/account-info").unwrap(),
            "https://wallet.test/api/account-info"
        );
        assert_eq!(
            d.resolve_url("api/account-info").unwrap(),
            "https://wallet.test/api/account-info"
        );
    }

    #[test]
    fn absolute_target_is_kept() {
        let d = dispatcher(StubTransport::new());
        assert_eq!(
            d.resolve_url("https://other.test/oauth/token").unwrap(),
            "https://other.test/oauth/token"
        );
    }

    #[test]
    fn unparsable_base_is_a_transport_error() {
        let d = Dispatcher::with_transport(Config::new("not a url"), StubTransport::new());
        let err = d.build_request("/api/account-info", &Params::new(), None).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn post_request_is_form_encoded() {
        let d = dispatcher(StubTransport::new());
        let params = Params::new().with("operation_id", "op1");
        let req = d.build_request("/api/operation-details", &params, None).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "https://wallet.test/api/operation-details");
        assert_eq!(req.header("Content-Type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(req.body.as_deref(), Some("operation_id=op1"));
        assert!(req.header("authorization").is_none());
    }

    #[test]
    fn token_becomes_bearer_header() {
        let d = dispatcher(StubTransport::new());
        let token = AccessToken::new("secret");
        let req = d
            .build_request("/api/account-info", &Params::new(), Some(&token))
            .unwrap();
        assert_eq!(req.header("Authorization"), Some("Bearer secret"));
        assert_eq!(req.body.as_deref(), Some(""));
    }

    #[test]
    fn get_request_carries_query() {
        let d = dispatcher(StubTransport::new());
        let params = Params::new().with("records", 5).with("type", "deposition payment");
        let req = d
            .build_request_with_method(HttpMethod::Get, "/api/operation-history", &params, None)
            .unwrap();
        assert_eq!(
            req.url,
            "https://wallet.test/api/operation-history?records=5&type=deposition+payment"
        );
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn get_without_params_has_no_query() {
        let d = dispatcher(StubTransport::new());
        let req = d
            .build_request_with_method(HttpMethod::Get, "/api/account-info", &Params::new(), None)
            .unwrap();
        assert_eq!(req.url, "https://wallet.test/api/account-info");
    }

    #[test]
    fn status_table() {
        let cases = [
            (400, Some(ErrorKind::Format)),
            (401, Some(ErrorKind::Token)),
            (403, Some(ErrorKind::Scope)),
            (500, Some(ErrorKind::Server)),
            (502, Some(ErrorKind::Server)),
            (503, Some(ErrorKind::Server)),
            (200, None),
            (201, None),
            (404, None),
            (409, None),
            (429, None),
        ];
        for (status, expected) in cases {
            assert_eq!(classify(&response(status, "")), expected, "status {status}");
        }
    }

    #[test]
    fn invalid_request_challenge_is_format_error() {
        let mut resp = response(401, "");
        resp.headers.push((
            "WWW-Authenticate".to_string(),
            "Bearer error=\"invalid_request\"".to_string(),
        ));
        assert_eq!(classify(&resp), Some(ErrorKind::Format));
    }

    #[test]
    fn invalid_token_challenge_stays_token_error() {
        let mut resp = response(401, "");
        resp.headers.push((
            "www-authenticate".to_string(),
            "Bearer error=\"invalid_token\", error_description=\"expired\"".to_string(),
        ));
        assert_eq!(classify(&resp), Some(ErrorKind::Token));
    }

    #[test]
    fn challenge_on_success_is_ignored() {
        let mut resp = response(200, "{}");
        resp.headers.push((
            "www-authenticate".to_string(),
            "Bearer error=\"invalid_request\"".to_string(),
        ));
        assert_eq!(classify(&resp), None);
    }

    #[test]
    fn bearer_error_parsing() {
        assert_eq!(
            bearer_error("Bearer error=\"insufficient_scope\""),
            Some("insufficient_scope")
        );
        assert_eq!(
            bearer_error("bearer realm=\"x\", error=invalid_token"),
            Some("invalid_token")
        );
        assert_eq!(bearer_error("Basic realm=\"x\""), None);
        assert_eq!(bearer_error("Bearer error_description=\"x\""), None);
        assert_eq!(bearer_error("Bear"), None);
    }

    #[test]
    fn business_error_is_returned_not_raised() {
        let d = dispatcher(StubTransport::new());
        let value = d
            .parse_response(response(200, r#"{"error":"illegal_param_operation_id"}"#))
            .unwrap();
        assert_eq!(value, json!({"error": "illegal_param_operation_id"}));
    }

    #[test]
    fn unclassified_4xx_body_is_returned() {
        let d = dispatcher(StubTransport::new());
        let value = d.parse_response(response(404, r#"{"error":"not_found"}"#)).unwrap();
        assert_eq!(value["error"], "not_found");
    }

    #[test]
    fn classified_error_keeps_json_body() {
        let d = dispatcher(StubTransport::new());
        let err = d
            .parse_response(response(403, r#"{"error":"insufficient_scope"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::Scope { status: 403, .. }));
        assert_eq!(err.body(), Some(&json!({"error": "insufficient_scope"})));
    }

    #[test]
    fn classified_error_with_non_json_body() {
        let d = dispatcher(StubTransport::new());
        let err = d.parse_response(response(502, "<html>Bad Gateway</html>")).unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 502, body: None }));
    }

    #[test]
    fn empty_body_decodes_to_null() {
        let d = dispatcher(StubTransport::new());
        assert_eq!(d.parse_response(response(200, "")).unwrap(), Value::Null);
        assert_eq!(
            d.parse_response(response(200, "  \n")).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn malformed_success_body_is_a_transport_error() {
        let d = dispatcher(StubTransport::new());
        let err = d.parse_response(response(200, "not json")).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::MalformedBody(_))
        ));
        assert!(err.kind().is_none());
    }

    #[test]
    fn send_runs_one_exchange() {
        let d = dispatcher(StubTransport::new().respond(200, r#"{"account":"4100"}"#));
        let token = AccessToken::new("t");
        let value = d.send("/api/account-info", &Params::new(), Some(&token)).unwrap();
        assert_eq!(value["account"], "4100");

        let requests = d.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://wallet.test/api/account-info");
        assert_eq!(requests[0].header("authorization"), Some("Bearer t"));
    }

    #[test]
    fn send_raises_token_error_on_401() {
        let d = dispatcher(StubTransport::new().respond(401, ""));
        let err = d.send("/api/account-info", &Params::new(), None).unwrap_err();
        assert!(matches!(err, ApiError::Token { status: 401, body: None }));
    }

    #[test]
    fn transport_failure_propagates() {
        let d = dispatcher(StubTransport::new());
        let err = d.send("/api/account-info", &Params::new(), None).unwrap_err();
        assert!(matches!(
            err,
            ApiError::Transport(TransportError::Http(ureq::Error::Io(_)))
        ));
        assert_eq!(d.transport().calls(), 1);
    }
}
