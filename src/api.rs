// HTTP API (axum) over the bank service
//
// Every response body is an `Outcome`: `{ success, message, data? }`.
// The caller identity comes from the `x-user-id` header, which the
// authenticating proxy in front of this service is expected to set.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::bank::Bank;
use crate::entities::{Account, AccountProfile, AccountType, Address, Gender};
use crate::error::BankError;
use crate::outcome::Outcome;
use crate::report::DateRange;

/// Header carrying the authenticated user id
pub const USER_HEADER: &str = "x-user-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    bank: Arc<Mutex<Bank>>,
}

impl AppState {
    pub fn new(bank: Bank) -> Self {
        Self {
            bank: Arc::new(Mutex::new(bank)),
        }
    }

    fn bank(&self) -> MutexGuard<'_, Bank> {
        self.bank.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Envelope helpers
// ============================================================================

fn status_for(error: &BankError) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body: Outcome<()> = Outcome {
        success: false,
        message: message.into(),
        data: None,
    };
    (status, Json(body)).into_response()
}

fn respond<T: Serialize>(result: crate::error::Result<T>, message: impl Into<String>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(Outcome::ok(message, data))).into_response(),
        Err(e) => {
            if !e.is_rejection() {
                tracing::error!(error = %e, "request failed");
            }
            (status_for(&e), Json(Outcome::<()>::failure(&e))).into_response()
        }
    }
}

fn respond_receipt(result: crate::error::Result<crate::bank::Receipt>) -> Response {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };
    (status, Json(Outcome::from(result))).into_response()
}

// ============================================================================
// Extractors
// ============================================================================

/// Authenticated owner id from `x-user-id`
pub struct Owner(pub i64);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(Owner)
            .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

/// `Json` whose rejection is an `Outcome` like every other response
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(failure(StatusCode::BAD_REQUEST, rejection.body_text())),
        }
    }
}

// ============================================================================
// Request / response bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub to_account_no: i64,
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub owner_id: i64,
    pub account_type: AccountType,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub street_address: String,
    pub city: String,
    pub postal_code: i64,
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct BankruptRequest {
    pub bankrupt: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub account: Account,
    pub address: Option<Address>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> Response {
    (StatusCode::OK, Json(Outcome::ok("OK", crate::VERSION))).into_response()
}

/// POST /api/accounts
async fn open_account(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OpenAccountRequest>,
) -> Response {
    let profile = AccountProfile {
        account_type: req.account_type,
        gender: req.gender,
        birth_date: req.birth_date,
    };
    let address = Address {
        owner_id: req.owner_id,
        street_address: req.street_address,
        city: req.city,
        postal_code: req.postal_code,
        country: req.country,
    };

    let result = state.bank().open_account(req.owner_id, &profile, &address);
    let message = match &result {
        Ok(account) => format!("Account {} opened", account.account_no),
        Err(_) => String::new(),
    };
    respond(result, message)
}

/// GET /api/account
async fn get_account(State(state): State<AppState>, Owner(owner_id): Owner) -> Response {
    let bank = state.bank();
    let result = bank.account_for_owner(owner_id).and_then(|account| {
        let address = bank.address(owner_id)?;
        Ok(AccountView { account, address })
    });
    respond(result, "OK")
}

/// POST /api/account/deposit
async fn deposit(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(req): ApiJson<AmountRequest>,
) -> Response {
    let mut bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.deposit(account.account_no, req.amount));
    respond_receipt(result)
}

/// POST /api/account/withdraw
async fn withdraw(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(req): ApiJson<AmountRequest>,
) -> Response {
    let mut bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.withdraw(account.account_no, req.amount));
    respond_receipt(result)
}

/// POST /api/account/loans
async fn request_loan(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(req): ApiJson<AmountRequest>,
) -> Response {
    let mut bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.request_loan(account.account_no, req.amount));
    respond_receipt(result)
}

/// GET /api/account/loans
async fn list_loans(State(state): State<AppState>, Owner(owner_id): Owner) -> Response {
    let bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.loans(account.account_no));
    respond(result, "OK")
}

/// POST /api/account/loans/:loan_id/pay
async fn pay_loan(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Path(loan_id): Path<i64>,
) -> Response {
    let mut bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.pay_loan(account.account_no, loan_id));
    respond_receipt(result)
}

/// POST /api/account/transfer
async fn transfer(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    ApiJson(req): ApiJson<TransferRequest>,
) -> Response {
    let mut bank = state.bank();
    let result = bank
        .account_for_owner(owner_id)
        .and_then(|account| bank.transfer(account.account_no, req.to_account_no, req.amount));
    respond_receipt(result)
}

/// GET /api/account/report?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD
async fn report(
    State(state): State<AppState>,
    Owner(owner_id): Owner,
    Query(query): Query<ReportQuery>,
) -> Response {
    let bank = state.bank();
    let result = DateRange::parse(query.start_date.as_deref(), query.end_date.as_deref())
        .and_then(|range| {
            let account = bank.account_for_owner(owner_id)?;
            bank.report(account.account_no, range)
        });
    respond(result, "OK")
}

/// POST /api/loans/:loan_id/approve
async fn approve_loan(State(state): State<AppState>, Path(loan_id): Path<i64>) -> Response {
    respond_receipt(state.bank().approve_loan(loan_id))
}

/// GET /api/bank/bankrupt
async fn get_bankrupt(State(state): State<AppState>) -> Response {
    respond(state.bank().is_bankrupt(), "OK")
}

/// PUT /api/bank/bankrupt
async fn set_bankrupt(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<BankruptRequest>,
) -> Response {
    let result = state.bank().set_bankrupt(req.bankrupt).map(|_| req.bankrupt);
    let message = if req.bankrupt {
        "Bank marked as bankrupt"
    } else {
        "Bank is operating normally"
    };
    respond(result, message)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(open_account))
        .route("/account", get(get_account))
        .route("/account/deposit", post(deposit))
        .route("/account/withdraw", post(withdraw))
        .route("/account/loans", get(list_loans).post(request_loan))
        .route("/account/loans/:loan_id/pay", post(pay_loan))
        .route("/account/transfer", post(transfer))
        .route("/account/report", get(report))
        .route("/loans/:loan_id/approve", post(approve_loan))
        .route("/bank/bankrupt", get(get_bankrupt).put(set_bankrupt))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
