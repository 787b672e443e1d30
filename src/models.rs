use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Customer account with its stored balance.
///
/// Key design decisions:
/// - `balance` is Decimal (never f64!) - prevents floating point errors
/// - `balance` is only ever written by the ledger engine; it always equals
///   the running sum of the account's COMPLETED transactions
/// - `version` is bumped on every balance write
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub balance: Decimal,
    pub version: i64,
    pub last_balance_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Balance transaction record - immutable audit trail
///
/// The sign of a movement is carried by `transaction_type`; `amount` is
/// always strictly positive and `balance_after - balance_before == ±amount`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BalanceTransaction {
    pub id: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub order_id: Option<String>, // For correlating orders and gift cards
    pub admin_id: Option<String>, // Set when an administrator made the adjustment
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Transaction type - what kind of balance movement happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[serde(rename = "CREDIT")]
    Credit, // Adding money to the balance

    #[serde(rename = "DEBIT")]
    Debit, // Paying from the balance

    #[serde(rename = "REFUND")]
    Refund, // Order refund credited back

    #[serde(rename = "GIFT_CARD_PURCHASE")]
    GiftCardPurchase, // Externally-paid purchase, recorded for the audit trail

    #[serde(rename = "GIFT_CARD_REDEEM")]
    GiftCardRedeem, // Gift card credited onto the balance
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Credit => write!(f, "CREDIT"),
            TransactionType::Debit => write!(f, "DEBIT"),
            TransactionType::Refund => write!(f, "REFUND"),
            TransactionType::GiftCardPurchase => write!(f, "GIFT_CARD_PURCHASE"),
            TransactionType::GiftCardRedeem => write!(f, "GIFT_CARD_REDEEM"),
        }
    }
}

/// Transaction status - did it work or not?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[serde(rename = "PENDING")]
    Pending,

    #[serde(rename = "COMPLETED")]
    Completed,

    #[serde(rename = "FAILED")]
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Gift card - stored-value (BALANCE) or service voucher (SERVICE)
///
/// The redemption code is never persisted; only its salted one-way hash.
/// `verification_token` is a separate secret for staff lookups.
/// `is_locked` is orthogonal to `status`: a locked card stays ACTIVE but
/// refuses redemption until manually resolved.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GiftCard {
    pub id: String,
    pub code_hash: String,
    pub verification_token: String,
    pub card_type: GiftCardType,
    pub amount: Decimal,
    pub status: GiftCardStatus,
    pub purchaser_email: String,
    pub purchaser_name: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub message: Option<String>,
    pub expiration_date: DateTime<Utc>,
    pub redemption_attempts: i32,
    pub verification_attempts: i32,
    pub is_locked: bool,
    pub locked_reason: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_redemption_attempt: Option<DateTime<Utc>>,
    pub last_redemption_ip: Option<String>,
    pub last_verification_attempt: Option<DateTime<Utc>>,
    pub payment_reference: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Gift card type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GiftCardType {
    #[serde(rename = "BALANCE")]
    Balance, // Carries a monetary amount redeemable onto an account balance

    #[serde(rename = "SERVICE")]
    Service, // Voucher for a treatment, marked used in person by staff
}

impl std::fmt::Display for GiftCardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GiftCardType::Balance => write!(f, "BALANCE"),
            GiftCardType::Service => write!(f, "SERVICE"),
        }
    }
}

/// Gift card lifecycle status
///
/// ACTIVE -> REDEEMED and ACTIVE -> EXPIRED are the only transitions;
/// both end states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GiftCardStatus {
    #[serde(rename = "ACTIVE")]
    Active,

    #[serde(rename = "REDEEMED")]
    Redeemed,

    #[serde(rename = "EXPIRED")]
    Expired,
}

impl std::fmt::Display for GiftCardStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GiftCardStatus::Active => write!(f, "ACTIVE"),
            GiftCardStatus::Redeemed => write!(f, "REDEEMED"),
            GiftCardStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

// === API Request/Response Models ===

/// Request to create a new account
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub name: String,
}

/// Request to add funds to a balance
#[derive(Debug, Deserialize)]
pub struct AddFundsRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Admin balance adjustment; `amount` is signed - positive credits,
/// negative debits
#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub description: String,
    pub admin_id: String,
}

/// Request to purchase a gift card
#[derive(Debug, Deserialize)]
pub struct PurchaseGiftCardRequest {
    pub purchaser_email: String,
    pub purchaser_name: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub message: Option<String>,
    pub card_type: GiftCardType,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub payment_reference: Option<String>,
}

/// Request to redeem a gift card onto an account balance
#[derive(Debug, Deserialize)]
pub struct RedeemGiftCardRequest {
    pub code: String,
    pub account_id: String,
}

/// Request to mark a SERVICE gift card as used
#[derive(Debug, Deserialize)]
pub struct MarkServiceCardUsedRequest {
    pub admin_id: String,
}

/// Generic API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Response for account operations
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub balance: Decimal,
    pub last_balance_update: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            balance: account.balance,
            last_balance_update: account.last_balance_update,
            created_at: account.created_at,
        }
    }
}

/// Response for balance reads
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: Decimal,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Response for transaction operations
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub transaction_id: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
    pub status: TransactionStatus,
    pub order_id: Option<String>,
    pub admin_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<BalanceTransaction> for TransactionResponse {
    fn from(txn: BalanceTransaction) -> Self {
        Self {
            transaction_id: txn.id,
            account_id: txn.account_id,
            transaction_type: txn.transaction_type,
            amount: txn.amount,
            balance_before: txn.balance_before,
            balance_after: txn.balance_after,
            description: txn.description,
            status: txn.status,
            order_id: txn.order_id,
            admin_id: txn.admin_id,
            created_at: txn.created_at,
            completed_at: txn.completed_at,
        }
    }
}

/// Gift card view with the secrets stripped
///
/// The code hash and verification token never leave the service through
/// the API; raw codes travel only inside notification events.
#[derive(Debug, Serialize)]
pub struct GiftCardResponse {
    pub id: String,
    pub card_type: GiftCardType,
    pub amount: Decimal,
    pub status: GiftCardStatus,
    pub purchaser_email: String,
    pub purchaser_name: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub message: Option<String>,
    pub expiration_date: DateTime<Utc>,
    pub redemption_attempts: i32,
    pub verification_attempts: i32,
    pub is_locked: bool,
    pub locked_reason: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<GiftCard> for GiftCardResponse {
    fn from(card: GiftCard) -> Self {
        Self {
            id: card.id,
            card_type: card.card_type,
            amount: card.amount,
            status: card.status,
            purchaser_email: card.purchaser_email,
            purchaser_name: card.purchaser_name,
            recipient_email: card.recipient_email,
            recipient_name: card.recipient_name,
            message: card.message,
            expiration_date: card.expiration_date,
            redemption_attempts: card.redemption_attempts,
            verification_attempts: card.verification_attempts,
            is_locked: card.is_locked,
            locked_reason: card.locked_reason,
            redeemed_at: card.redeemed_at,
            redeemed_by_account_id: card.redeemed_by_account_id,
            created_at: card.created_at,
        }
    }
}

/// Response for the expiry sweep
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired_count: u64,
}
