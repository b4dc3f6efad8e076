//! Bearer credentials.

use std::fmt;

use serde_json::Value;

/// Opaque OAuth access token.
///
/// `Debug` never prints the secret, so a token can sit inside structs that
/// end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for the `Authorization` header.
    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// Pull a token out of a code-exchange (`access_token`) or auxiliary-token
/// (`aux_token`) response. Returns `None` when the response carries an
/// `error` instead, or the field is empty.
pub fn access_token_from(response: &Value) -> Option<AccessToken> {
    ["access_token", "aux_token"]
        .iter()
        .filter_map(|field| response.get(field).and_then(Value::as_str))
        .find(|token| !token.is_empty())
        .map(AccessToken::new)
}
