use axum::Json;
use axum::extract::Extension;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use tracing::Instrument;
use tracing::info_span;
use uuid::Uuid;

use txn_engine::ReverseRequest;
use txn_engine::SingleLegRequest;
use txn_engine::TransferRequest;

use crate::auth::Principal;
use crate::dto::IsReversedResponse;
use crate::dto::PageQuery;
use crate::dto::PageResponse;
use crate::dto::ReversePayload;
use crate::dto::SearchQuery;
use crate::dto::SingleLegPayload;
use crate::dto::StatsQuery;
use crate::dto::TransactionResponse;
use crate::dto::TransferPayload;
use crate::dto::transaction_page_response;
use crate::error::ApiError;
use crate::health::HealthReport;
use crate::AppState;

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub async fn deposit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SingleLegPayload>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let span = info_span!("deposit", account_id = %payload.account_id);
    let result = state
        .engine
        .process_deposit(SingleLegRequest {
            account_id: payload.account_id,
            amount: payload.amount,
            currency: payload.currency,
            description: payload.description,
            reference: payload.reference,
            created_by: principal.user_id,
            user_token: Some(principal.token),
            correlation_id: correlation_id(),
        })
        .instrument(span)
        .await?;
    Ok(Json(result.into()))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<SingleLegPayload>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let span = info_span!("withdraw", account_id = %payload.account_id);
    let result = state
        .engine
        .process_withdrawal(SingleLegRequest {
            account_id: payload.account_id,
            amount: payload.amount,
            currency: payload.currency,
            description: payload.description,
            reference: payload.reference,
            created_by: principal.user_id,
            user_token: Some(principal.token),
            correlation_id: correlation_id(),
        })
        .instrument(span)
        .await?;
    Ok(Json(result.into()))
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<TransferPayload>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let span = info_span!("transfer", from = %payload.from_account_id, to = %payload.to_account_id);
    let result = state
        .engine
        .process_transfer(TransferRequest {
            from_account_id: payload.from_account_id,
            to_account_id: payload.to_account_id,
            amount: payload.amount,
            currency: payload.currency,
            description: payload.description,
            reference: payload.reference,
            created_by: principal.user_id,
            user_token: Some(principal.token),
            correlation_id: correlation_id(),
        })
        .instrument(span)
        .await?;
    Ok(Json(result.into()))
}

pub async fn reverse(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReversePayload>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let span = info_span!("reverse", original_id = %id);
    let result = state
        .engine
        .reverse_transaction(ReverseRequest {
            original_id: id,
            reason: payload.reason,
            reversed_by: principal.user_id,
            user_token: Some(principal.token),
            correlation_id: correlation_id(),
        })
        .instrument(span)
        .await?;
    Ok(Json(result.into()))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let row = state
        .engine
        .ledger()
        .find_by_id(id)
        .await?
        .ok_or(txn_engine::EngineError::TransactionNotFound(id))?;
    Ok(Json(row.into()))
}

pub async fn transactions_by_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = query.into_page_request()?;
    let result = state.engine.ledger().page_by_account(&account_id, page).await?;
    Ok(Json(transaction_page_response(result)))
}

pub async fn transactions_for_current_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let page = query.into_page_request()?;
    let result = state.engine.ledger().page_by_user(&principal.user_id, page).await?;
    Ok(Json(transaction_page_response(result)))
}

pub async fn search_transactions(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<TransactionResponse>>, ApiError> {
    let (filter, page) = query.into_filter_and_page()?;
    let result = state.engine.ledger().search(filter, page).await?;
    Ok(Json(transaction_page_response(result)))
}

pub async fn account_stats(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<txn_ledger::AccountStats>, ApiError> {
    let (start, end) = query.into_range();
    let stats = state.engine.ledger().account_stats(&account_id, start, end).await?;
    Ok(Json(stats))
}

pub async fn reversals(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    let rows = state.engine.ledger().find_reversal_pairs(id).await?;
    Ok(Json(rows.into_iter().map(TransactionResponse::from).collect()))
}

pub async fn is_reversed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<IsReversedResponse>, ApiError> {
    let is_reversed = state.engine.ledger().is_reversed(id).await?;
    Ok(Json(IsReversedResponse { is_reversed }))
}

pub async fn limits(
    State(state): State<AppState>,
) -> Result<Json<Vec<txn_limits::TransactionLimit>>, ApiError> {
    let rows = state
        .limits_store
        .list()
        .await
        .map_err(|err| ApiError::Engine(err.into()))?;
    Ok(Json(rows))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.check().await)
}

pub async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .engine
        .metrics()
        .render()
        .map_err(|err| ApiError::Engine(txn_engine::EngineError::Internal(err)))
}
