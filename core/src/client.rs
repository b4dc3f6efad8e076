//! The wallet API surface bound to one access token.
//!
//! # Design
//! `WalletClient` is either unauthenticated (built with `new`) or
//! authenticated (built with `authenticated`); the token never changes after
//! construction. Each endpoint method only picks a fixed path, assembles its
//! parameters, and forwards to the dispatcher. Responses come back untouched
//! and business failures stay inside them for the caller to inspect.
//!
//! Calling an authenticated endpoint without a token fails with
//! `ApiError::MissingToken` before a request is even built.

use serde_json::Value;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::ApiError;
use crate::oauth;
use crate::options::TokenRequest;
use crate::params::Params;
use crate::token::AccessToken;
use crate::transport::{Transport, UreqTransport};

#[derive(Debug, Clone)]
pub struct WalletClient<T = UreqTransport> {
    dispatcher: Dispatcher<T>,
    token: Option<AccessToken>,
}

impl WalletClient<UreqTransport> {
    /// Client without a token; only the OAuth operations are usable.
    pub fn new(config: Config) -> Self {
        Self::from_dispatcher(Dispatcher::new(config), None)
    }

    pub fn authenticated(config: Config, token: impl Into<AccessToken>) -> Self {
        Self::from_dispatcher(Dispatcher::new(config), Some(token.into()))
    }
}

impl<T: Transport> WalletClient<T> {
    pub fn from_dispatcher(dispatcher: Dispatcher<T>, token: Option<AccessToken>) -> Self {
        Self { dispatcher, token }
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.usable_token().is_some()
    }

    /// An empty token counts as no token.
    fn usable_token(&self) -> Option<&AccessToken> {
        self.token.as_ref().filter(|token| !token.is_empty())
    }

    /// Send with the held token, or fail locally if there is none.
    pub fn send_authenticated(&self, target: &str, params: &Params) -> Result<Value, ApiError> {
        let token = self.usable_token().ok_or(ApiError::MissingToken)?;
        self.dispatcher.send(target, params, Some(token))
    }

    /// Wallet number, balance, currency and account status.
    pub fn account_info(&self) -> Result<Value, ApiError> {
        self.send_authenticated("/api/account-info", &Params::new())
    }

    /// Issue an auxiliary token limited to `scopes`, a subset of the held
    /// token's permissions.
    pub fn aux_token<S: AsRef<str>>(&self, scopes: &[S]) -> Result<Value, ApiError> {
        let params = Params::new().with("scope", oauth::join_scopes(scopes));
        self.send_authenticated("/api/token-aux", &params)
    }

    /// Paged operation history. Accepts `OperationHistoryOptions` or raw
    /// `Params`.
    pub fn operation_history(&self, filters: impl Into<Params>) -> Result<Value, ApiError> {
        self.send_authenticated("/api/operation-history", &filters.into())
    }

    pub fn operation_details(&self, operation_id: &str) -> Result<Value, ApiError> {
        let params = Params::new().with("operation_id", operation_id);
        self.send_authenticated("/api/operation-details", &params)
    }

    /// Create a payment request. Accepts `P2pPaymentOptions`,
    /// `ShopPaymentOptions` or raw `Params`.
    ///
    /// A refusal such as `{"status":"refused","error":"not_enough_funds"}`
    /// is a normal return value.
    pub fn request_payment(&self, payment: impl Into<Params>) -> Result<Value, ApiError> {
        self.send_authenticated("/api/request-payment", &payment.into())
    }

    /// Confirm a payment created by [`request_payment`](Self::request_payment).
    pub fn process_payment(&self, payment: impl Into<Params>) -> Result<Value, ApiError> {
        self.send_authenticated("/api/process-payment", &payment.into())
    }

    /// Accept a protected or deferred incoming transfer. `protection_code`
    /// is only sent when given.
    pub fn incoming_transfer_accept(
        &self,
        operation_id: &str,
        protection_code: Option<&str>,
    ) -> Result<Value, ApiError> {
        let params = Params::new()
            .with("operation_id", operation_id)
            .with_opt("protection_code", protection_code);
        self.send_authenticated("/api/incoming-transfer-accept", &params)
    }

    pub fn incoming_transfer_reject(&self, operation_id: &str) -> Result<Value, ApiError> {
        let params = Params::new().with("operation_id", operation_id);
        self.send_authenticated("/api/incoming-transfer-reject", &params)
    }

    pub fn authorize_url<S: AsRef<str>>(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[S],
    ) -> String {
        oauth::authorize_url(self.dispatcher.config(), client_id, redirect_uri, scopes)
    }

    /// Unauthenticated; works on a client without a token.
    pub fn exchange_code(&self, request: &TokenRequest) -> Result<Value, ApiError> {
        oauth::exchange_code(&self.dispatcher, request)
    }

    /// Revoke `token`, which need not be the held one. The held token is
    /// never sent by this call.
    pub fn revoke_token(&self, token: &AccessToken, revoke_all: bool) -> Result<Value, ApiError> {
        oauth::revoke_token(&self.dispatcher, token, revoke_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{
        OperationHistoryOptions, OperationType, P2pPaymentOptions, ProcessPaymentOptions,
    };
    use crate::transport::testing::StubTransport;
    use serde_json::json;

    const BASE_URL: &str = "https://wallet.test";

    fn authenticated(stub: StubTransport) -> WalletClient<StubTransport> {
        let dispatcher = Dispatcher::with_transport(Config::new(BASE_URL), stub);
        WalletClient::from_dispatcher(dispatcher, Some(AccessToken::new("held-token")))
    }

    fn anonymous() -> WalletClient<StubTransport> {
        let dispatcher = Dispatcher::with_transport(Config::new(BASE_URL), StubTransport::new());
        WalletClient::from_dispatcher(dispatcher, None)
    }

    fn only_request(client: &WalletClient<StubTransport>) -> crate::http::HttpRequest {
        let requests = client.dispatcher().transport().requests();
        assert_eq!(requests.len(), 1);
        requests.into_iter().next().unwrap()
    }

    #[test]
    fn every_authenticated_operation_requires_a_token() {
        let client = anonymous();
        let results = [
            client.account_info(),
            client.aux_token(&["account-info"]),
            client.operation_history(Params::new()),
            client.operation_details("1"),
            client.request_payment(P2pPaymentOptions::new("4100")),
            client.process_payment(ProcessPaymentOptions::new("req")),
            client.incoming_transfer_accept("1", Some("code")),
            client.incoming_transfer_reject("1"),
            client.send_authenticated("/api/anything", &Params::new()),
        ];
        for result in results {
            assert!(matches!(result, Err(ApiError::MissingToken)));
        }
        assert_eq!(client.dispatcher().transport().calls(), 0);
        assert!(!client.is_authenticated());
    }

    #[test]
    fn empty_token_is_treated_as_missing() {
        let dispatcher = Dispatcher::with_transport(
            Config::new(BASE_URL),
            StubTransport::new().respond(200, "{}"),
        );
        let client = WalletClient::from_dispatcher(dispatcher, Some(AccessToken::new("")));

        assert!(!client.is_authenticated());
        assert!(matches!(client.account_info(), Err(ApiError::MissingToken)));
        assert!(matches!(
            client.incoming_transfer_accept("op1", None),
            Err(ApiError::MissingToken)
        ));
        assert_eq!(client.dispatcher().transport().calls(), 0);
    }

    #[test]
    fn account_info_posts_with_bearer() {
        let client = authenticated(StubTransport::new().respond(
            200,
            r#"{"account":"4100175017397","balance":"1000.00","currency":"643"}"#,
        ));
        let info = client.account_info().unwrap();
        assert_eq!(info["currency"], "643");

        let req = only_request(&client);
        assert_eq!(req.url, "https://wallet.test/api/account-info");
        assert_eq!(req.header("authorization"), Some("Bearer held-token"));
        assert_eq!(req.body.as_deref(), Some(""));
    }

    #[test]
    fn aux_token_joins_scopes() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"aux_token":"aux"}"#));
        client.aux_token(&["account-info", "operation-history"]).unwrap();
        let req = only_request(&client);
        assert_eq!(req.url, "https://wallet.test/api/token-aux");
        assert_eq!(
            req.body.as_deref(),
            Some("scope=account-info+operation-history")
        );
    }

    #[test]
    fn operation_history_with_typed_filters() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"operations":[]}"#));
        let filters = OperationHistoryOptions {
            types: vec![OperationType::Deposition],
            records: Some(1),
            ..Default::default()
        };
        let history = client.operation_history(filters).unwrap();
        assert_eq!(history["operations"], json!([]));
        assert_eq!(
            only_request(&client).body.as_deref(),
            Some("type=deposition&records=1")
        );
    }

    #[test]
    fn operation_details_business_error_is_returned() {
        let client = authenticated(
            StubTransport::new().respond(200, r#"{"error":"illegal_param_operation_id"}"#),
        );
        let details = client.operation_details("12345").unwrap();
        assert_eq!(details, json!({"error": "illegal_param_operation_id"}));
        assert_eq!(
            only_request(&client).body.as_deref(),
            Some("operation_id=12345")
        );
    }

    #[test]
    fn refused_payment_is_returned() {
        let client = authenticated(
            StubTransport::new().respond(200, r#"{"status":"refused","error":"not_enough_funds"}"#),
        );
        let payment = P2pPaymentOptions {
            amount_due: Some("0.02".to_string()),
            test_payment: Some(true),
            test_result: Some("success".to_string()),
            ..P2pPaymentOptions::new("410000000000000")
        };
        let response = client.request_payment(payment).unwrap();
        assert_eq!(response["status"], "refused");
        assert_eq!(response["error"], "not_enough_funds");
        assert_eq!(
            only_request(&client).url,
            "https://wallet.test/api/request-payment"
        );
    }

    #[test]
    fn process_payment_forwards_request_id() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"status":"success"}"#));
        let params = Params::new()
            .with("request_id", "req-1")
            .with("test_payment", "true")
            .with("test_result", "success");
        client.process_payment(params).unwrap();
        assert_eq!(
            only_request(&client).body.as_deref(),
            Some("request_id=req-1&test_payment=true&test_result=success")
        );
    }

    #[test]
    fn transfer_accept_without_code_omits_key() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"status":"success"}"#));
        client.incoming_transfer_accept("op1", None).unwrap();
        let req = only_request(&client);
        assert_eq!(req.url, "https://wallet.test/api/incoming-transfer-accept");
        assert_eq!(req.body.as_deref(), Some("operation_id=op1"));
    }

    #[test]
    fn transfer_accept_with_code() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"status":"success"}"#));
        client.incoming_transfer_accept("op1", Some("0123")).unwrap();
        assert_eq!(
            only_request(&client).body.as_deref(),
            Some("operation_id=op1&protection_code=0123")
        );
    }

    #[test]
    fn transfer_reject() {
        let client = authenticated(StubTransport::new().respond(200, r#"{"status":"success"}"#));
        client.incoming_transfer_reject("op2").unwrap();
        let req = only_request(&client);
        assert_eq!(req.url, "https://wallet.test/api/incoming-transfer-reject");
        assert_eq!(req.body.as_deref(), Some("operation_id=op2"));
    }

    #[test]
    fn protocol_errors_surface_by_status() {
        let cases = [
            (400, "format"),
            (401, "token"),
            (403, "scope"),
            (500, "server"),
            (503, "server"),
        ];
        for (status, kind) in cases {
            let client = authenticated(StubTransport::new().respond(status, ""));
            let err = client.account_info().unwrap_err();
            assert_eq!(err.kind().map(|k| k.to_string()).as_deref(), Some(kind));
            assert_eq!(err.status(), Some(status));
        }
    }

    #[test]
    fn revoke_ignores_held_token() {
        let client = authenticated(StubTransport::new().respond(200, ""));
        client.revoke_token(&AccessToken::new("other"), true).unwrap();
        let req = only_request(&client);
        assert_eq!(req.header("authorization"), Some("Bearer other"));
        assert_eq!(req.body.as_deref(), Some("revoke-all=true"));
    }

    #[test]
    fn oauth_operations_work_without_token() {
        let dispatcher = Dispatcher::with_transport(
            Config::new(BASE_URL),
            StubTransport::new().respond(200, r#"{"access_token":"new"}"#),
        );
        let client = WalletClient::from_dispatcher(dispatcher, None);
        let url = client.authorize_url("id", "http://localhost", &["account-info"]);
        assert!(url.starts_with(
            "https://wallet.test/oauth/authorize?client_id=id"
        ));

        let request = TokenRequest {
            client_id: "id".to_string(),
            code: "code".to_string(),
            redirect_uri: "http://localhost".to_string(),
            client_secret: None,
        };
        let response = client.exchange_code(&request).unwrap();
        assert_eq!(response["access_token"], "new");
        assert!(only_request(&client).header("authorization").is_none());
    }
}
