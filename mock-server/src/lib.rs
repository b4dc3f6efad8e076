use std::{collections::HashMap, str::FromStr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const ACCOUNT: &str = "4100100000000";
pub const FULL_ACCESS_TOKEN: &str = "4100100000000.full-access";
pub const ACCOUNT_INFO_TOKEN: &str = "4100100000000.account-info";
pub const CLIENT_ID: &str = "test-client";
pub const CLIENT_SECRET: &str = "test-secret";
pub const REDIRECT_URI: &str = "http://localhost:8000/callback";
pub const AUTHORIZATION_CODE: &str = "valid-code";
pub const COMPLETED_OPERATION_ID: &str = "1000000001";
pub const PROTECTED_TRANSFER_ID: &str = "1000000002";
pub const DEFERRED_TRANSFER_ID: &str = "1000000003";
pub const PROTECTION_CODE: &str = "1234";
pub const INITIAL_BALANCE: &str = "1000.00";

pub const ALL_SCOPES: &[&str] = &[
    "account-info",
    "operation-history",
    "operation-details",
    "incoming-transfers",
    "payment-p2p",
    "payment-shop",
];

const DEFAULT_PAGE_SIZE: usize = 30;
const PROTECTION_CODE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
struct Grant {
    scopes: Vec<String>,
    revoked: bool,
}

#[derive(Debug, Clone)]
struct OAuthClient {
    secret: Option<String>,
}

#[derive(Debug, Clone)]
struct AuthorizationGrant {
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

#[derive(Debug, Clone)]
struct PendingPayment {
    to: String,
    amount: Decimal,
    label: Option<String>,
    test: bool,
}

#[derive(Debug, Clone)]
struct IncomingTransfer {
    amount: Decimal,
    protection_code: Option<String>,
    attempts_left: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub operation_id: String,
    pub status: String,
    pub title: String,
    /// `in` or `out`.
    pub direction: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(serialize_with = "decimal_as_string")]
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Operation {
    /// History filter category.
    fn category(&self) -> &'static str {
        if self.direction == "in" {
            "deposition"
        } else {
            "payment"
        }
    }
}

fn decimal_as_string<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Everything the mock wallet remembers between requests.
#[derive(Debug)]
pub struct WalletState {
    pub balance: Decimal,
    /// When set, every endpoint answers 503.
    pub maintenance: bool,
    tokens: HashMap<String, Grant>,
    clients: HashMap<String, OAuthClient>,
    codes: HashMap<String, AuthorizationGrant>,
    operations: Vec<Operation>,
    pending: HashMap<String, PendingPayment>,
    transfers: HashMap<String, IncomingTransfer>,
    next_operation_id: u64,
}

impl WalletState {
    /// A wallet with two tokens, one OAuth client, one completed deposit and
    /// two incoming transfers awaiting acceptance (one protected by
    /// `PROTECTION_CODE`, one deferred).
    pub fn seeded() -> Self {
        let mut state = WalletState {
            balance: Decimal::new(100_000, 2),
            maintenance: false,
            tokens: HashMap::new(),
            clients: HashMap::new(),
            codes: HashMap::new(),
            operations: Vec::new(),
            pending: HashMap::new(),
            transfers: HashMap::new(),
            next_operation_id: 1_000_000_004,
        };

        state.grant(FULL_ACCESS_TOKEN, ALL_SCOPES);
        state.grant(ACCOUNT_INFO_TOKEN, &["account-info"]);
        state.clients.insert(
            CLIENT_ID.to_string(),
            OAuthClient {
                secret: Some(CLIENT_SECRET.to_string()),
            },
        );
        state.codes.insert(
            AUTHORIZATION_CODE.to_string(),
            AuthorizationGrant {
                client_id: CLIENT_ID.to_string(),
                redirect_uri: REDIRECT_URI.to_string(),
                scopes: vec!["account-info".to_string(), "operation-history".to_string()],
            },
        );

        state.operations.push(Operation {
            operation_id: COMPLETED_OPERATION_ID.to_string(),
            status: "success".to_string(),
            title: "Wallet top-up".to_string(),
            direction: "in".to_string(),
            kind: "deposition".to_string(),
            amount: Decimal::new(50_000, 2),
            label: Some("top-up".to_string()),
        });
        for (id, amount, code) in [
            (PROTECTED_TRANSFER_ID, Decimal::new(15_000, 2), Some(PROTECTION_CODE)),
            (DEFERRED_TRANSFER_ID, Decimal::new(7_500, 2), None),
        ] {
            let kind = if code.is_some() {
                "incoming-transfer-protected"
            } else {
                "incoming-transfer"
            };
            state.operations.push(Operation {
                operation_id: id.to_string(),
                status: "in_progress".to_string(),
                title: "Transfer from 410019999999999".to_string(),
                direction: "in".to_string(),
                kind: kind.to_string(),
                amount,
                label: None,
            });
            state.transfers.insert(
                id.to_string(),
                IncomingTransfer {
                    amount,
                    protection_code: code.map(str::to_string),
                    attempts_left: PROTECTION_CODE_ATTEMPTS,
                },
            );
        }
        state
    }

    fn grant(&mut self, token: &str, scopes: &[&str]) {
        self.tokens.insert(
            token.to_string(),
            Grant {
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                revoked: false,
            },
        );
    }

    fn issue_token(&mut self, scopes: Vec<String>) -> String {
        let token = format!("{ACCOUNT}.{}", Uuid::new_v4().simple());
        self.tokens.insert(
            token.clone(),
            Grant {
                scopes,
                revoked: false,
            },
        );
        token
    }

    /// True if `token` was issued and has not been revoked.
    pub fn token_active(&self, token: &str) -> bool {
        self.tokens.get(token).is_some_and(|grant| !grant.revoked)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn operation(&self, operation_id: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.operation_id == operation_id)
    }

    fn next_operation_id(&mut self) -> String {
        let id = self.next_operation_id;
        self.next_operation_id += 1;
        id.to_string()
    }

    fn set_operation_status(&mut self, operation_id: &str, status: &str) {
        if let Some(op) = self.operations.iter_mut().find(|op| op.operation_id == operation_id) {
            op.status = status.to_string();
        }
    }
}

impl Default for WalletState {
    fn default() -> Self {
        Self::seeded()
    }
}

pub type Db = Arc<RwLock<WalletState>>;

type Reply = Result<Response, Response>;

pub fn app() -> Router {
    app_with_state(Arc::new(RwLock::new(WalletState::seeded())))
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/api/account-info", post(account_info).get(account_info))
        .route("/api/token-aux", post(token_aux))
        .route("/api/operation-history", post(operation_history))
        .route("/api/operation-details", post(operation_details))
        .route("/api/request-payment", post(request_payment))
        .route("/api/process-payment", post(process_payment))
        .route("/api/incoming-transfer-accept", post(incoming_transfer_accept))
        .route("/api/incoming-transfer-reject", post(incoming_transfer_reject))
        .route("/api/revoke", post(revoke))
        .route("/oauth/token", post(oauth_token))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, Arc::new(RwLock::new(WalletState::seeded()))).await
}

pub async fn serve(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

fn form(body: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(body).into_owned().collect()
}

fn reply(value: Value) -> Reply {
    Ok(Json(value).into_response())
}

fn refused(error: &str) -> Value {
    json!({"status": "refused", "error": error})
}

fn is_test(form: &HashMap<String, String>) -> bool {
    form.get("test_payment").map(String::as_str) == Some("true")
}

/// Requested outcome of a test payment other than `success`.
fn test_failure(form: &HashMap<String, String>) -> Option<&str> {
    form.get("test_result")
        .map(String::as_str)
        .filter(|result| is_test(form) && *result != "success")
}

fn challenge(status: StatusCode, error: &str) -> Response {
    let value = format!("Bearer error=\"{error}\"");
    (status, [(header::WWW_AUTHENTICATE, value)]).into_response()
}

/// Resolve the bearer token: 400 when the header is missing or malformed,
/// 401 when the token is unknown or revoked.
fn authenticate(state: &WalletState, headers: &HeaderMap) -> Result<String, Response> {
    if state.maintenance {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        return Err(challenge(StatusCode::BAD_REQUEST, "invalid_request"));
    };
    if state.token_active(token) {
        Ok(token.to_string())
    } else {
        Err(challenge(StatusCode::UNAUTHORIZED, "invalid_token"))
    }
}

/// `authenticate`, then 403 unless the token carries `scope`.
fn authorize(state: &WalletState, headers: &HeaderMap, scope: &str) -> Result<String, Response> {
    let token = authenticate(state, headers)?;
    let allowed = state
        .tokens
        .get(&token)
        .is_some_and(|grant| grant.scopes.iter().any(|s| s == scope));
    if allowed {
        Ok(token)
    } else {
        Err(challenge(StatusCode::FORBIDDEN, "insufficient_scope"))
    }
}

async fn account_info(State(db): State<Db>, headers: HeaderMap) -> Reply {
    let state = db.read().await;
    authorize(&state, &headers, "account-info")?;
    reply(json!({
        "account": ACCOUNT,
        "balance": state.balance.to_string(),
        "currency": "643",
        "account_status": "named",
        "account_type": "personal",
    }))
}

async fn token_aux(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    let token = authenticate(&state, &headers)?;
    let form = form(&body);
    let requested: Vec<String> = form
        .get("scope")
        .map(|scope| scope.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let permitted = !requested.is_empty()
        && state
            .tokens
            .get(&token)
            .is_some_and(|grant| requested.iter().all(|s| grant.scopes.contains(s)));
    if !permitted {
        return reply(json!({"error": "invalid_scope"}));
    }
    let aux_token = state.issue_token(requested);
    reply(json!({"aux_token": aux_token}))
}

async fn operation_history(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let state = db.read().await;
    authorize(&state, &headers, "operation-history")?;
    let form = form(&body);

    let records = match form.get("records").map(|v| v.parse::<usize>()) {
        None => DEFAULT_PAGE_SIZE,
        Some(Ok(n)) if (1..=100).contains(&n) => n,
        Some(_) => return reply(json!({"error": "illegal_param_records"})),
    };
    let start = match form.get("start_record").map(|v| v.parse::<usize>()) {
        None => 0,
        Some(Ok(n)) => n,
        Some(Err(_)) => return reply(json!({"error": "illegal_param_start_record"})),
    };
    let types: Vec<&str> = form
        .get("type")
        .map(|t| t.split_whitespace().collect())
        .unwrap_or_default();
    if types.iter().any(|t| !matches!(*t, "deposition" | "payment")) {
        return reply(json!({"error": "illegal_param_type"}));
    }
    let label = form.get("label");

    let matching: Vec<&Operation> = state
        .operations
        .iter()
        .rev()
        .filter(|op| types.is_empty() || types.contains(&op.category()))
        .filter(|op| label.map_or(true, |l| op.label.as_ref() == Some(l)))
        .collect();
    let page: Vec<&Operation> = matching.iter().skip(start).take(records).copied().collect();

    let mut response = json!({"operations": page});
    if start + records < matching.len() {
        response["next_record"] = json!((start + records).to_string());
    }
    reply(response)
}

async fn operation_details(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let state = db.read().await;
    authorize(&state, &headers, "operation-details")?;
    let form = form(&body);
    match form.get("operation_id").and_then(|id| state.operation(id)) {
        Some(op) => reply(json!(op)),
        None => reply(json!({"error": "illegal_param_operation_id"})),
    }
}

async fn request_payment(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    let form = form(&body);
    let p2p = form.get("pattern_id").map(String::as_str) == Some("p2p");
    authorize(&state, &headers, if p2p { "payment-p2p" } else { "payment-shop" })?;
    if !p2p {
        return reply(refused("illegal_param_pattern_id"));
    }

    let Some(to) = form.get("to").filter(|to| !to.is_empty()).cloned() else {
        return reply(refused("illegal_param_to"));
    };
    let amount = form
        .get("amount")
        .or_else(|| form.get("amount_due"))
        .and_then(|amount| Decimal::from_str(amount).ok())
        .filter(|amount| *amount > Decimal::ZERO);
    let Some(amount) = amount else {
        return reply(refused("illegal_param_amount"));
    };
    if let Some(failure) = test_failure(&form) {
        return reply(refused(failure));
    }
    if amount > state.balance {
        return reply(refused("not_enough_funds"));
    }

    let request_id = Uuid::new_v4().to_string();
    state.pending.insert(
        request_id.clone(),
        PendingPayment {
            to,
            amount,
            label: form.get("label").cloned(),
            test: is_test(&form),
        },
    );
    reply(json!({
        "status": "success",
        "request_id": request_id,
        "contract_amount": amount.to_string(),
        "balance": state.balance.to_string(),
        "money_source": {"wallet": {"allowed": true}},
    }))
}

async fn process_payment(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    authorize(&state, &headers, "payment-p2p")?;
    let form = form(&body);

    let request_id = form.get("request_id").cloned().unwrap_or_default();
    let Some(pending) = state.pending.get(&request_id).cloned() else {
        return reply(refused("contract_not_found"));
    };
    if form.get("money_source").is_some_and(|source| source != "wallet") {
        return reply(refused("money_source_not_available"));
    }
    if let Some(failure) = test_failure(&form) {
        return reply(refused(failure));
    }
    if pending.amount > state.balance {
        return reply(refused("not_enough_funds"));
    }

    state.pending.remove(&request_id);
    if pending.test || is_test(&form) {
        return reply(json!({
            "status": "success",
            "payment_id": format!("test-{request_id}"),
            "balance": state.balance.to_string(),
            "payee": pending.to,
            "credit_amount": pending.amount.to_string(),
        }));
    }

    state.balance -= pending.amount;
    let payment_id = state.next_operation_id();
    state.operations.push(Operation {
        operation_id: payment_id.clone(),
        status: "success".to_string(),
        title: format!("Transfer to {}", pending.to),
        direction: "out".to_string(),
        kind: "outgoing-transfer".to_string(),
        amount: pending.amount,
        label: pending.label,
    });
    reply(json!({
        "status": "success",
        "payment_id": payment_id,
        "balance": state.balance.to_string(),
        "payee": pending.to,
        "credit_amount": pending.amount.to_string(),
    }))
}

async fn incoming_transfer_accept(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    authorize(&state, &headers, "incoming-transfers")?;
    let form = form(&body);

    let operation_id = form.get("operation_id").cloned().unwrap_or_default();
    let Some(transfer) = state.transfers.get_mut(&operation_id) else {
        return reply(refused("illegal_param_operation_id"));
    };
    if let Some(expected) = transfer.protection_code.clone() {
        if form.get("protection_code") != Some(&expected) {
            transfer.attempts_left = transfer.attempts_left.saturating_sub(1);
            let attempts = transfer.attempts_left;
            if attempts == 0 {
                state.transfers.remove(&operation_id);
                state.set_operation_status(&operation_id, "refused");
            }
            return reply(json!({
                "status": "refused",
                "error": "illegal_param_protection_code",
                "protection_code_attempts_available": attempts,
            }));
        }
    }

    let amount = transfer.amount;
    state.transfers.remove(&operation_id);
    state.balance += amount;
    state.set_operation_status(&operation_id, "success");
    reply(json!({"status": "success"}))
}

async fn incoming_transfer_reject(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    authorize(&state, &headers, "incoming-transfers")?;
    let form = form(&body);

    let operation_id = form.get("operation_id").cloned().unwrap_or_default();
    if state.transfers.remove(&operation_id).is_none() {
        return reply(refused("illegal_param_operation_id"));
    }
    state.set_operation_status(&operation_id, "refused");
    reply(json!({"status": "success"}))
}

/// Answers 200 with an empty body, like the real service.
async fn revoke(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Reply {
    let mut state = db.write().await;
    let token = authenticate(&state, &headers)?;
    let form = form(&body);

    if form.get("revoke-all").map(String::as_str) == Some("true") {
        for grant in state.tokens.values_mut() {
            grant.revoked = true;
        }
    } else if let Some(grant) = state.tokens.get_mut(&token) {
        grant.revoked = true;
    }
    Ok(StatusCode::OK.into_response())
}

async fn oauth_token(State(db): State<Db>, body: Bytes) -> Reply {
    let mut state = db.write().await;
    if state.maintenance {
        return Err(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }
    let form = form(&body);

    let client_id = form.get("client_id").cloned().unwrap_or_default();
    let client_ok = state.clients.get(&client_id).is_some_and(|client| {
        client.secret.is_none() || client.secret.as_ref() == form.get("client_secret")
    });
    if !client_ok {
        return reply(json!({"error": "unauthorized_client"}));
    }
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return reply(json!({"error": "unsupported_grant_type"}));
    }

    let code = form.get("code").cloned().unwrap_or_default();
    let redeemable = state.codes.get(&code).is_some_and(|grant| {
        grant.client_id == client_id && form.get("redirect_uri") == Some(&grant.redirect_uri)
    });
    let grant = match state.codes.remove(&code) {
        Some(grant) if redeemable => grant,
        _ => return reply(json!({"error": "invalid_grant"})),
    };
    let access_token = state.issue_token(grant.scopes);
    reply(json!({"access_token": access_token}))
}
