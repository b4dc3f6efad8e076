//! OAuth token lifecycle: authorization URL, code exchange, revocation.
//!
//! None of these use a client's held token. The authorization URL is pure
//! string building; exchange is unauthenticated; revocation authenticates
//! with the token being revoked.

use serde_json::Value;
use url::form_urlencoded;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::ApiError;
use crate::options::TokenRequest;
use crate::params::Params;
use crate::token::AccessToken;
use crate::transport::Transport;

pub(crate) const TOKEN_PATH: &str = "/oauth/token";
pub(crate) const AUTHORIZE_PATH: &str = "/oauth/authorize";
pub(crate) const REVOKE_PATH: &str = "/api/revoke";

/// Space-join permission names into a single `scope` value.
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(|scope| scope.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL to send the user's browser to for granting `scopes`.
///
/// Deterministic: the same arguments always produce the same string.
pub fn authorize_url<S: AsRef<str>>(
    config: &Config,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[S],
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &join_scopes(scopes))
        .finish();
    format!("{}{AUTHORIZE_PATH}?{query}", config.base_url())
}

/// Exchange a temporary authorization code for an access token.
///
/// The service answers OAuth failures (`unauthorized_client`,
/// `invalid_grant`) inside a 200 body; those come back as values.
pub fn exchange_code<T: Transport>(
    dispatcher: &Dispatcher<T>,
    request: &TokenRequest,
) -> Result<Value, ApiError> {
    let url = format!("{}{TOKEN_PATH}", dispatcher.config().base_url());
    dispatcher.send(&url, &Params::from(request), None)
}

/// Revoke `token`. With `revoke_all`, every token issued to the same
/// application for this user is revoked as well.
pub fn revoke_token<T: Transport>(
    dispatcher: &Dispatcher<T>,
    token: &AccessToken,
    revoke_all: bool,
) -> Result<Value, ApiError> {
    let params = Params::new().with("revoke-all", revoke_all);
    dispatcher.send(REVOKE_PATH, &params, Some(token))
}
