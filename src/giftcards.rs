use crate::codes;
use crate::errors::{BalanceError, BalanceResult};
use crate::ledger::LedgerRepository;
use crate::models::{
    BalanceTransaction, GiftCard, GiftCardStatus, GiftCardType, PurchaseGiftCardRequest,
    TransactionType,
};
use crate::notifications::Notifier;
use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// A card locks after the redemption attempt that pushes the counter past
/// this threshold, even when that attempt carried the correct code.
const MAX_REDEMPTION_ATTEMPTS: i32 = 5;
/// Staff verification lookups lock the card past this threshold.
const MAX_VERIFICATION_ATTEMPTS: i32 = 10;
const EXPIRATION_MONTHS: u32 = 6;

/// Database surface for gift cards
///
/// All SQL lives here; lifecycle rules live in [`GiftCardService`].
#[derive(Clone)]
pub struct GiftCardRepository {
    pool: PgPool,
}

const GIFT_CARD_COLUMNS: &str = r#"id, code_hash, verification_token, card_type, amount, status,
       purchaser_email, purchaser_name, recipient_email, recipient_name, message,
       expiration_date, redemption_attempts, verification_attempts, is_locked,
       locked_reason, locked_at, last_redemption_attempt, last_redemption_ip,
       last_verification_attempt, payment_reference, redeemed_at, redeemed_by_account_id,
       created_at"#;

impl GiftCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, card: &GiftCard) -> BalanceResult<GiftCard> {
        let inserted = sqlx::query_as::<_, GiftCard>(&format!(
            r#"
            INSERT INTO gift_cards
                (id, code_hash, verification_token, card_type, amount, status,
                 purchaser_email, purchaser_name, recipient_email, recipient_name, message,
                 expiration_date, redemption_attempts, verification_attempts, is_locked,
                 payment_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, 0, FALSE, $13, $14)
            RETURNING {GIFT_CARD_COLUMNS}
            "#
        ))
        .bind(&card.id)
        .bind(&card.code_hash)
        .bind(&card.verification_token)
        .bind(card.card_type.to_string())
        .bind(card.amount)
        .bind(card.status.to_string())
        .bind(&card.purchaser_email)
        .bind(&card.purchaser_name)
        .bind(&card.recipient_email)
        .bind(&card.recipient_name)
        .bind(&card.message)
        .bind(card.expiration_date)
        .bind(&card.payment_reference)
        .bind(card.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(inserted)
    }

    pub async fn find_by_id(&self, gift_card_id: &str) -> BalanceResult<Option<GiftCard>> {
        let card = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE id = $1"
        ))
        .bind(gift_card_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(card)
    }

    /// Every stored card
    ///
    /// The redemption code cannot be indexed (only its salted hash is
    /// stored), so redemption scans this set and verifies the code against
    /// each hash. Redeemed, expired and locked cards stay in the scan so a
    /// matching code can report its real state instead of degrading to an
    /// invalid-code failure.
    pub async fn find_all(&self) -> BalanceResult<Vec<GiftCard>> {
        let cards = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    /// ACTIVE cards whose expiration date has passed
    pub async fn find_expired_active(
        &self,
        before: DateTime<Utc>,
    ) -> BalanceResult<Vec<GiftCard>> {
        let cards = sqlx::query_as::<_, GiftCard>(&format!(
            r#"
            SELECT {GIFT_CARD_COLUMNS}
            FROM gift_cards
            WHERE status = 'ACTIVE' AND expiration_date < $1
            "#
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    pub async fn find_by_purchaser_email(&self, email: &str) -> BalanceResult<Vec<GiftCard>> {
        let cards = sqlx::query_as::<_, GiftCard>(&format!(
            r#"
            SELECT {GIFT_CARD_COLUMNS}
            FROM gift_cards
            WHERE purchaser_email = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    pub async fn find_by_recipient_email(&self, email: &str) -> BalanceResult<Vec<GiftCard>> {
        let cards = sqlx::query_as::<_, GiftCard>(&format!(
            r#"
            SELECT {GIFT_CARD_COLUMNS}
            FROM gift_cards
            WHERE recipient_email = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(cards)
    }

    /// Lock a gift card row for update within a transaction
    ///
    /// Serializes concurrent redemption attempts on the same card: the
    /// second caller blocks here and then observes whatever state the
    /// first one committed.
    pub async fn lock_by_id_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        gift_card_id: &str,
    ) -> BalanceResult<GiftCard> {
        let card = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE id = $1 FOR UPDATE"
        ))
        .bind(gift_card_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| BalanceError::NotFound(format!("gift card {}", gift_card_id)))?;

        Ok(card)
    }

    /// Lock a gift card row by verification token within a transaction
    pub async fn lock_by_verification_token_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: &str,
    ) -> BalanceResult<Option<GiftCard>> {
        let card = sqlx::query_as::<_, GiftCard>(&format!(
            "SELECT {GIFT_CARD_COLUMNS} FROM gift_cards WHERE verification_token = $1 FOR UPDATE"
        ))
        .bind(token)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(card)
    }

    /// Write back the mutable lifecycle fields of a card
    pub async fn update_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        card: &GiftCard,
    ) -> BalanceResult<()> {
        sqlx::query(
            r#"
            UPDATE gift_cards
            SET status = $1,
                redemption_attempts = $2,
                verification_attempts = $3,
                is_locked = $4,
                locked_reason = $5,
                locked_at = $6,
                last_redemption_attempt = $7,
                last_redemption_ip = $8,
                last_verification_attempt = $9,
                redeemed_at = $10,
                redeemed_by_account_id = $11
            WHERE id = $12
            "#,
        )
        .bind(card.status.to_string())
        .bind(card.redemption_attempts)
        .bind(card.verification_attempts)
        .bind(card.is_locked)
        .bind(&card.locked_reason)
        .bind(card.locked_at)
        .bind(card.last_redemption_attempt)
        .bind(&card.last_redemption_ip)
        .bind(card.last_verification_attempt)
        .bind(card.redeemed_at)
        .bind(&card.redeemed_by_account_id)
        .bind(&card.id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

/// The gift card engine.
///
/// Owns the gift card lifecycle (issue, redeem, verify, mark-used,
/// expire); balance movements go through the ledger engine, never
/// directly. Redemption composes the card state change and the balance
/// credit in a single database transaction, so a card can be redeemed at
/// most once even under concurrent attempts.
#[derive(Clone)]
pub struct GiftCardService {
    pool: PgPool,
    cards: GiftCardRepository,
    ledger: LedgerRepository,
    notifier: Arc<Notifier>,
}

impl GiftCardService {
    pub fn new(
        pool: PgPool,
        cards: GiftCardRepository,
        ledger: LedgerRepository,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            pool,
            cards,
            ledger,
            notifier,
        }
    }

    /// Issue a new gift card
    ///
    /// Returns the stored card; the raw redemption code leaves the service
    /// only inside the purchase/received notifications.
    pub async fn issue(&self, request: &PurchaseGiftCardRequest) -> BalanceResult<GiftCard> {
        if request.amount <= Decimal::ZERO {
            return Err(BalanceError::InvalidArgument(
                "Gift card amount must be positive".to_string(),
            ));
        }

        let raw_code = codes::generate_code();
        let now = Utc::now();

        let card = GiftCard {
            id: Uuid::new_v4().to_string(),
            code_hash: codes::hash_code(&raw_code),
            verification_token: codes::generate_verification_token(),
            card_type: request.card_type,
            amount: request.amount,
            status: GiftCardStatus::Active,
            purchaser_email: request.purchaser_email.clone(),
            purchaser_name: request.purchaser_name.clone(),
            recipient_email: request.recipient_email.clone(),
            recipient_name: request.recipient_name.clone(),
            message: request.message.clone(),
            expiration_date: now + Months::new(EXPIRATION_MONTHS),
            redemption_attempts: 0,
            verification_attempts: 0,
            is_locked: false,
            locked_reason: None,
            locked_at: None,
            last_redemption_attempt: None,
            last_redemption_ip: None,
            last_verification_attempt: None,
            payment_reference: request.payment_reference.clone(),
            redeemed_at: None,
            redeemed_by_account_id: None,
            created_at: now,
        };

        let card = self.cards.insert(&card).await?;

        // The purchase itself was settled externally; the audit record is
        // best-effort and must not fail the card creation.
        if let Err(e) = self.record_purchase_transaction(&card).await {
            tracing::warn!(
                gift_card_id = %card.id,
                error = %e,
                "Failed to record gift card purchase transaction"
            );
        }

        self.notifier.notify_purchase(&card, &raw_code).await;
        self.notifier.notify_received(&card, &raw_code).await;

        tracing::info!(
            gift_card_id = %card.id,
            card_type = %card.card_type,
            recipient_email = %card.recipient_email,
            "Gift card created"
        );

        Ok(card)
    }

    /// Redeem a BALANCE gift card onto an account
    ///
    /// The supplied code is verified against every stored card's hash (the
    /// code cannot be looked up directly). A failed attempt past that
    /// lookup still commits its side effects - attempt counters, the lazy
    /// EXPIRED transition, lockout - before the error is returned.
    pub async fn redeem(
        &self,
        code: &str,
        account_id: &str,
        source_ip: &str,
    ) -> BalanceResult<BalanceTransaction> {
        let all_cards = self.cards.find_all().await?;
        let Some(matched) = all_cards
            .into_iter()
            .find(|card| codes::verify_code(code, &card.code_hash))
        else {
            tracing::warn!(source_ip = %source_ip, "Gift card redemption failed - invalid code");
            return Err(BalanceError::InvalidCode);
        };

        // Resolve the redeemer up front; an unknown account should not
        // consume one of the card's redemption attempts.
        let account = self.ledger.get_account(account_id).await?;

        let mut tx = self.pool.begin().await?;
        let mut card = self.cards.lock_by_id_in_tx(&mut tx, &matched.id).await?;
        let now = Utc::now();

        // Re-check under the row lock; a concurrent redeemer may have won.
        if card.status != GiftCardStatus::Active {
            return Err(BalanceError::InvalidState(card.status.to_string()));
        }

        if card.is_locked {
            return Err(BalanceError::Locked);
        }

        if card.expiration_date < now {
            card.status = GiftCardStatus::Expired;
            self.cards.update_in_tx(&mut tx, &card).await?;
            tx.commit().await?;
            return Err(BalanceError::Expired);
        }

        card.redemption_attempts += 1;
        card.last_redemption_attempt = Some(now);
        card.last_redemption_ip = Some(source_ip.to_string());

        if card.redemption_attempts > MAX_REDEMPTION_ATTEMPTS {
            card.is_locked = true;
            card.locked_at = Some(now);
            card.locked_reason = Some("Too many redemption attempts".to_string());
            self.cards.update_in_tx(&mut tx, &card).await?;
            tx.commit().await?;

            tracing::warn!(
                gift_card_id = %card.id,
                source_ip = %source_ip,
                "Gift card locked after too many redemption attempts"
            );
            return Err(BalanceError::Locked);
        }

        if card.card_type != GiftCardType::Balance {
            self.cards.update_in_tx(&mut tx, &card).await?;
            tx.commit().await?;
            return Err(BalanceError::WrongType(
                "service gift cards cannot be redeemed for balance".to_string(),
            ));
        }

        card.status = GiftCardStatus::Redeemed;
        card.redeemed_at = Some(now);
        card.redeemed_by_account_id = Some(account_id.to_string());
        self.cards.update_in_tx(&mut tx, &card).await?;

        let description = format!("Gift card redemption - {}", &card.id[..8]);
        let transaction = self
            .ledger
            .credit_in_tx(
                &mut tx,
                account_id,
                card.amount,
                &description,
                TransactionType::GiftCardRedeem,
                Some(&card.id),
                None,
            )
            .await?;
        tx.commit().await?;

        self.notifier.notify_redeemed(&account.email, &card).await;
        self.notifier.notify_redeemed_to_purchaser(&card).await;

        tracing::info!(
            gift_card_id = %card.id,
            account_id = %account_id,
            amount = %card.amount,
            "Gift card redeemed"
        );

        Ok(transaction)
    }

    /// Staff lookup of a card by its verification token
    ///
    /// Counts as a verification attempt; past the threshold the card is
    /// locked, though the (locked) card is still returned to the caller.
    pub async fn verify_for_admin(&self, token: &str) -> BalanceResult<GiftCard> {
        let mut tx = self.pool.begin().await?;
        let mut card = self
            .cards
            .lock_by_verification_token_in_tx(&mut tx, token)
            .await?
            .ok_or_else(|| BalanceError::NotFound("gift card verification token".to_string()))?;

        let now = Utc::now();
        card.verification_attempts += 1;
        card.last_verification_attempt = Some(now);

        if card.verification_attempts > MAX_VERIFICATION_ATTEMPTS {
            card.is_locked = true;
            card.locked_at = Some(now);
            card.locked_reason = Some("Too many verification attempts".to_string());

            tracing::warn!(
                gift_card_id = %card.id,
                "Gift card locked after too many verification attempts"
            );
        }

        self.cards.update_in_tx(&mut tx, &card).await?;
        tx.commit().await?;

        Ok(card)
    }

    /// Mark a SERVICE gift card as used in person
    ///
    /// No ledger interaction: service cards carry no monetary balance
    /// entry.
    pub async fn mark_service_card_used(
        &self,
        gift_card_id: &str,
        admin_id: &str,
    ) -> BalanceResult<GiftCard> {
        let mut tx = self.pool.begin().await?;
        let mut card = self.cards.lock_by_id_in_tx(&mut tx, gift_card_id).await?;

        if card.card_type != GiftCardType::Service {
            return Err(BalanceError::WrongType(
                "only service gift cards can be marked as used".to_string(),
            ));
        }

        if card.status != GiftCardStatus::Active {
            return Err(BalanceError::InvalidState(card.status.to_string()));
        }

        card.status = GiftCardStatus::Redeemed;
        card.redeemed_at = Some(Utc::now());
        card.redeemed_by_account_id = Some(admin_id.to_string());
        self.cards.update_in_tx(&mut tx, &card).await?;
        tx.commit().await?;

        self.notifier.notify_service_used(&card).await;

        tracing::info!(
            gift_card_id = %gift_card_id,
            admin_id = %admin_id,
            "Service gift card marked as used"
        );

        Ok(card)
    }

    /// Expire every ACTIVE card whose expiration date lies before `now`
    ///
    /// Idempotent: cards already EXPIRED (including ones a concurrent
    /// redemption attempt just expired) are left untouched.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> BalanceResult<u64> {
        let candidates = self.cards.find_expired_active(now).await?;
        let mut expired_count = 0u64;

        for candidate in candidates {
            let mut tx = self.pool.begin().await?;
            let mut card = self.cards.lock_by_id_in_tx(&mut tx, &candidate.id).await?;

            // May have been redeemed or expired since the scan
            if card.status != GiftCardStatus::Active {
                continue;
            }

            card.status = GiftCardStatus::Expired;
            self.cards.update_in_tx(&mut tx, &card).await?;
            tx.commit().await?;

            self.notifier.notify_expired(&card).await;
            expired_count += 1;
        }

        tracing::info!(expired_count, "Gift card expiry sweep finished");

        Ok(expired_count)
    }

    /// Cards bought by this email, newest first
    pub async fn purchased_by(&self, email: &str) -> BalanceResult<Vec<GiftCard>> {
        self.cards.find_by_purchaser_email(email).await
    }

    /// Cards received by this email, newest first
    pub async fn received_by(&self, email: &str) -> BalanceResult<Vec<GiftCard>> {
        self.cards.find_by_recipient_email(email).await
    }

    async fn record_purchase_transaction(&self, card: &GiftCard) -> BalanceResult<()> {
        if let Some(account) = self
            .ledger
            .find_account_by_email(&card.purchaser_email)
            .await?
        {
            self.ledger
                .record_gift_card_purchase(&account, card.amount, &card.id)
                .await?;
        }

        Ok(())
    }
}
