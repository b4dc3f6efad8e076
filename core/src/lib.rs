//! Blocking client for an OAuth2-authorized wallet payment API.
//!
//! # Overview
//! Every call funnels through [`Dispatcher`]: it resolves the target against
//! the configured base URL, form-encodes the parameters, attaches the bearer
//! token, runs the exchange on a [`Transport`], and classifies the result.
//! [`WalletClient`] is the endpoint surface on top of it.
//!
//! # Design
//! - Protocol failures (HTTP 400/401/403/5xx) become typed [`ApiError`]s.
//!   Business failures arrive as ordinary JSON values with an `error` field.
//! - No retries, caching or rate limiting; timeouts belong to the transport.
//! - `Config` is passed in explicitly, never read from a global.
//! - The transport is a trait so tests can count and inspect requests.
//!
//! ```no_run
//! use wallet_core::{Config, WalletClient};
//!
//! let client = WalletClient::authenticated(Config::default(), "410011234.TOKEN");
//! let info = client.account_info()?;
//! println!("balance: {}", info["balance"]);
//! # Ok::<(), wallet_core::ApiError>(())
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod oauth;
pub mod options;
pub mod params;
pub mod token;
pub mod transport;

pub use client::WalletClient;
pub use config::{Config, ConfigError};
pub use dispatcher::{classify, Dispatcher};
pub use error::{ApiError, ErrorKind, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use options::{
    OperationHistoryOptions, OperationType, P2pPaymentOptions, ProcessPaymentOptions,
    ShopPaymentOptions, TokenRequest,
};
pub use params::{ParamValue, Params, ParamsError};
pub use token::{access_token_from, AccessToken};
pub use transport::{Transport, UreqTransport};
