//! Typed request options for the endpoints that take open-ended parameters.
//!
//! Each struct lists the keys its endpoint recognises. Converting into
//! [`Params`] emits required keys first, then every optional key that is set;
//! unset options never appear in the request body. Callers with needs beyond
//! these fields can always pass a hand-built `Params` instead.

use serde::{Deserialize, Serialize};

use crate::params::{ParamValue, Params};

/// Operation categories accepted by the history `type` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Incoming funds.
    Deposition,
    /// Outgoing funds.
    Payment,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Deposition => "deposition",
            OperationType::Payment => "payment",
        }
    }
}

/// Filters for `operation-history`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationHistoryOptions {
    /// Sent space-separated as `type`; empty means all types.
    #[serde(rename = "type", skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<OperationType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// RFC 3339 lower bound, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// RFC 3339 upper bound, exclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub till: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_record: Option<String>,
    /// Page size, 1 to 100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<bool>,
}

impl From<OperationHistoryOptions> for Params {
    fn from(options: OperationHistoryOptions) -> Self {
        let types = (!options.types.is_empty()).then(|| {
            options
                .types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });
        Params::new()
            .with_opt("type", types)
            .with_opt("label", options.label)
            .with_opt("from", options.from)
            .with_opt("till", options.till)
            .with_opt("start_record", options.start_record)
            .with_opt("records", options.records)
            .with_opt("details", options.details)
    }
}

/// A person-to-person transfer for `request-payment` (`pattern_id=p2p`).
///
/// Set exactly one of `amount` (charged to the payer) or `amount_due`
/// (received by the payee). Amounts are decimal strings such as `"0.02"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pPaymentOptions {
    /// Recipient wallet number, phone or email.
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<String>,
    /// Shown in the payer's history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Shown to the recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_period: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_payment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<String>,
}

impl P2pPaymentOptions {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }
}

impl From<P2pPaymentOptions> for Params {
    fn from(options: P2pPaymentOptions) -> Self {
        Params::new()
            .with("pattern_id", "p2p")
            .with("to", options.to)
            .with_opt("amount", options.amount)
            .with_opt("amount_due", options.amount_due)
            .with_opt("comment", options.comment)
            .with_opt("message", options.message)
            .with_opt("label", options.label)
            .with_opt("expire_period", options.expire_period)
            .with_opt("test_payment", options.test_payment)
            .with_opt("test_result", options.test_result)
    }
}

/// A payment to a merchant pattern for `request-payment`. Merchant fields
/// vary per pattern and are carried in `fields`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShopPaymentOptions {
    pub pattern_id: String,
    pub fields: Params,
    pub test_payment: Option<bool>,
    pub test_result: Option<String>,
}

impl ShopPaymentOptions {
    pub fn new(pattern_id: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.fields.insert(key, value);
        self
    }
}

impl From<ShopPaymentOptions> for Params {
    fn from(options: ShopPaymentOptions) -> Self {
        let mut params = Params::new().with("pattern_id", options.pattern_id);
        for (key, value) in options.fields.iter() {
            params.insert(key, value.clone());
        }
        params
            .with_opt("test_payment", options.test_payment)
            .with_opt("test_result", options.test_result)
    }
}

/// Confirmation of a previously requested payment for `process-payment`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessPaymentOptions {
    /// `request_id` returned by `request-payment`.
    pub request_id: String,
    /// `wallet` or a linked card id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_source: Option<String>,
    /// Card security code, when paying from a linked card.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_auth_success_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_auth_fail_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_payment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<String>,
}

impl ProcessPaymentOptions {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }
}

impl From<ProcessPaymentOptions> for Params {
    fn from(options: ProcessPaymentOptions) -> Self {
        Params::new()
            .with("request_id", options.request_id)
            .with_opt("money_source", options.money_source)
            .with_opt("csc", options.csc)
            .with_opt("ext_auth_success_uri", options.ext_auth_success_uri)
            .with_opt("ext_auth_fail_uri", options.ext_auth_fail_uri)
            .with_opt("test_payment", options.test_payment)
            .with_opt("test_card", options.test_card)
            .with_opt("test_result", options.test_result)
    }
}

/// Authorization-code exchange for `oauth/token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub client_id: String,
    /// Temporary code from the authorization redirect.
    pub code: String,
    /// Must match the `redirect_uri` of the authorize call exactly.
    pub redirect_uri: String,
    /// Only for applications registered with authenticity checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl From<&TokenRequest> for Params {
    fn from(request: &TokenRequest) -> Self {
        Params::new()
            .with("code", &request.code)
            .with("client_id", &request.client_id)
            .with("grant_type", "authorization_code")
            .with("redirect_uri", &request.redirect_uri)
            .with_opt("client_secret", request.client_secret.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_defaults_send_nothing() {
        let params = Params::from(OperationHistoryOptions::default());
        assert!(params.is_empty());
    }

    #[test]
    fn history_joins_types() {
        let params = Params::from(OperationHistoryOptions {
            types: vec![OperationType::Deposition, OperationType::Payment],
            records: Some(1),
            ..Default::default()
        });
        assert_eq!(params.encode(), "type=deposition+payment&records=1");
    }

    #[test]
    fn p2p_payment_starts_with_pattern() {
        let params = Params::from(P2pPaymentOptions {
            amount_due: Some("0.02".to_string()),
            comment: Some("test payment comment".to_string()),
            test_payment: Some(true),
            test_result: Some("success".to_string()),
            ..P2pPaymentOptions::new("410000000000000")
        });
        assert_eq!(
            params.encode(),
            "pattern_id=p2p&to=410000000000000&amount_due=0.02&comment=test+payment+comment\
             &test_payment=true&test_result=success"
        );
        assert!(!params.contains_key("amount"));
        assert!(!params.contains_key("message"));
    }

    #[test]
    fn shop_payment_forwards_fields() {
        let params = Params::from(
            ShopPaymentOptions::new("337")
                .field("sum", "10.00")
                .field("PROPERTY1", "9211234567"),
        );
        assert_eq!(
            params.encode(),
            "pattern_id=337&sum=10.00&PROPERTY1=9211234567"
        );
    }

    #[test]
    fn process_payment_minimal() {
        let params = Params::from(ProcessPaymentOptions::new("req-1"));
        assert_eq!(params.encode(), "request_id=req-1");
    }

    #[test]
    fn token_request_omits_missing_secret() {
        let request = TokenRequest {
            client_id: "client".to_string(),
            code: "CODE".to_string(),
            redirect_uri: "http://localhost".to_string(),
            client_secret: None,
        };
        let params = Params::from(&request);
        assert_eq!(
            params.encode(),
            "code=CODE&client_id=client&grant_type=authorization_code\
             &redirect_uri=http%3A%2F%2Flocalhost"
        );
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: OperationHistoryOptions =
            serde_json::from_str(r#"{"type":["deposition"],"records":3}"#).unwrap();
        assert_eq!(options.types, vec![OperationType::Deposition]);
        assert_eq!(options.records, Some(3));
        assert!(options.label.is_none());
    }
}
