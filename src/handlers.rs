use crate::errors::BalanceResult;
use crate::giftcards::GiftCardService;
use crate::ledger::LedgerRepository;
use crate::models::*;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::net::SocketAddr;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerRepository,
    pub gift_cards: GiftCardService,
}

/// Create a new account
pub async fn create_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateAccountRequest>,
) -> BalanceResult<Json<ApiResponse<AccountResponse>>> {
    tracing::info!(email = %payload.email, "Creating account");

    let account = state
        .ledger
        .create_account(&payload.email, &payload.name)
        .await?;

    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

/// Get account by ID
pub async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> BalanceResult<Json<ApiResponse<AccountResponse>>> {
    tracing::debug!(account_id = %account_id, "Fetching account");

    let account = state.ledger.get_account(&account_id).await?;

    Ok(Json(ApiResponse::success(AccountResponse::from(account))))
}

/// Get the current balance of an account
pub async fn get_balance(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> BalanceResult<Json<ApiResponse<BalanceResponse>>> {
    tracing::debug!(account_id = %account_id, "Fetching balance");

    let account = state.ledger.get_account(&account_id).await?;

    Ok(Json(ApiResponse::success(BalanceResponse {
        account_id: account.id,
        balance: account.balance,
        last_updated: account.last_balance_update,
    })))
}

/// Get the transaction history of an account, newest first
pub async fn get_transaction_history(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> BalanceResult<Json<ApiResponse<Vec<TransactionResponse>>>> {
    tracing::debug!(account_id = %account_id, "Fetching transaction history");

    let transactions = state.ledger.get_history(&account_id).await?;

    let response: Vec<TransactionResponse> = transactions
        .into_iter()
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ApiResponse::success(response)))
}

/// Add funds to an account balance
pub async fn add_funds(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(payload): Json<AddFundsRequest>,
) -> BalanceResult<Json<ApiResponse<TransactionResponse>>> {
    tracing::info!(
        account_id = %account_id,
        amount = %payload.amount,
        "Adding funds"
    );

    let transaction = state
        .ledger
        .credit(
            &account_id,
            payload.amount,
            "Balance top-up",
            TransactionType::Credit,
            None,
            None,
        )
        .await?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(
        transaction,
    ))))
}

/// Admin adjustment of an account balance (signed amount)
pub async fn adjust_balance(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(payload): Json<AdjustBalanceRequest>,
) -> BalanceResult<Json<ApiResponse<TransactionResponse>>> {
    tracing::info!(
        account_id = %account_id,
        amount = %payload.amount,
        admin_id = %payload.admin_id,
        "Adjusting balance"
    );

    let transaction = state
        .ledger
        .admin_adjust(
            &account_id,
            payload.amount,
            &payload.description,
            &payload.admin_id,
        )
        .await?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(
        transaction,
    ))))
}

/// Purchase a gift card
pub async fn purchase_gift_card(
    State(state): State<AppState>,
    Json(payload): Json<PurchaseGiftCardRequest>,
) -> BalanceResult<Json<ApiResponse<GiftCardResponse>>> {
    tracing::info!(
        card_type = %payload.card_type,
        amount = %payload.amount,
        recipient_email = %payload.recipient_email,
        "Purchasing gift card"
    );

    let card = state.gift_cards.issue(&payload).await?;

    Ok(Json(ApiResponse::success(GiftCardResponse::from(card))))
}

/// Redeem a gift card onto an account balance
///
/// The caller's address is recorded with the attempt for abuse tracking.
pub async fn redeem_gift_card(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RedeemGiftCardRequest>,
) -> BalanceResult<Json<ApiResponse<TransactionResponse>>> {
    tracing::info!(account_id = %payload.account_id, "Redeeming gift card");

    let source_ip = addr.ip().to_string();
    let transaction = state
        .gift_cards
        .redeem(&payload.code, &payload.account_id, &source_ip)
        .await?;

    Ok(Json(ApiResponse::success(TransactionResponse::from(
        transaction,
    ))))
}

/// Staff lookup of a gift card by verification token
pub async fn verify_gift_card(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> BalanceResult<Json<ApiResponse<GiftCardResponse>>> {
    let card = state.gift_cards.verify_for_admin(&token).await?;

    Ok(Json(ApiResponse::success(GiftCardResponse::from(card))))
}

/// Mark a SERVICE gift card as used
pub async fn mark_service_card_used(
    State(state): State<AppState>,
    Path(gift_card_id): Path<String>,
    Json(payload): Json<MarkServiceCardUsedRequest>,
) -> BalanceResult<Json<ApiResponse<GiftCardResponse>>> {
    let card = state
        .gift_cards
        .mark_service_card_used(&gift_card_id, &payload.admin_id)
        .await?;

    Ok(Json(ApiResponse::success(GiftCardResponse::from(card))))
}

/// Expire all overdue gift cards now
pub async fn expire_gift_cards(
    State(state): State<AppState>,
) -> BalanceResult<Json<ApiResponse<SweepResponse>>> {
    let expired_count = state.gift_cards.sweep_expired(Utc::now()).await?;

    Ok(Json(ApiResponse::success(SweepResponse { expired_count })))
}

/// Gift cards purchased by an email address
pub async fn purchased_gift_cards(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> BalanceResult<Json<ApiResponse<Vec<GiftCardResponse>>>> {
    let cards = state.gift_cards.purchased_by(&email).await?;

    let response: Vec<GiftCardResponse> =
        cards.into_iter().map(GiftCardResponse::from).collect();

    Ok(Json(ApiResponse::success(response)))
}

/// Gift cards received by an email address
pub async fn received_gift_cards(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> BalanceResult<Json<ApiResponse<Vec<GiftCardResponse>>>> {
    let cards = state.gift_cards.received_by(&email).await?;

    let response: Vec<GiftCardResponse> =
        cards.into_iter().map(GiftCardResponse::from).collect();

    Ok(Json(ApiResponse::success(response)))
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
