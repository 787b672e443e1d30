use crate::errors::{BalanceError, BalanceResult};
use crate::models::{Account, BalanceTransaction, TransactionStatus, TransactionType};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// The balance ledger engine.
///
/// Exclusively owns mutation of `accounts.balance` and creation of
/// `balance_transactions` rows; everything else (gift cards, handlers)
/// goes through it. Every credit/debit runs inside a database transaction
/// with the account row locked (`SELECT ... FOR UPDATE`), so the
/// balance_before/balance_after snapshot can never race a concurrent
/// update on the same account.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new account with a zero balance
    pub async fn create_account(&self, email: &str, name: &str) -> BalanceResult<Account> {
        let account_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, name, balance, version, created_at, updated_at)
            VALUES ($1, $2, $3, 0, 0, $4, $4)
            RETURNING id, email, name, balance, version, last_balance_update, created_at, updated_at
            "#,
        )
        .bind(&account_id)
        .bind(email)
        .bind(name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    /// Find an account by ID
    pub async fn get_account(&self, account_id: &str) -> BalanceResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, name, balance, version, last_balance_update, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BalanceError::NotFound(format!("account {}", account_id)))?;

        Ok(account)
    }

    /// Find an account by email; absence is not an error here
    pub async fn find_account_by_email(&self, email: &str) -> BalanceResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, name, balance, version, last_balance_update, created_at, updated_at
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Current balance for an account
    pub async fn get_balance(&self, account_id: &str) -> BalanceResult<Decimal> {
        let account = self.get_account(account_id).await?;
        Ok(account.balance)
    }

    /// Transaction history for an account, newest first
    pub async fn get_history(&self, account_id: &str) -> BalanceResult<Vec<BalanceTransaction>> {
        let transactions = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            SELECT id, account_id, transaction_type, amount, balance_before, balance_after,
                   description, status, order_id, admin_id, created_at, completed_at
            FROM balance_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    /// Whether the account's balance falls short of `required`
    pub async fn has_insufficient_balance(
        &self,
        account_id: &str,
        required: Decimal,
    ) -> BalanceResult<bool> {
        let balance = self.get_balance(account_id).await?;
        Ok(balance < required)
    }

    /// Credit an account - add money to its balance
    ///
    /// Persists the new balance and a COMPLETED transaction atomically and
    /// returns the transaction.
    pub async fn credit(
        &self,
        account_id: &str,
        amount: Decimal,
        description: &str,
        transaction_type: TransactionType,
        reference_id: Option<&str>,
        admin_id: Option<&str>,
    ) -> BalanceResult<BalanceTransaction> {
        let mut tx = self.pool.begin().await?;
        let transaction = self
            .credit_in_tx(
                &mut tx,
                account_id,
                amount,
                description,
                transaction_type,
                reference_id,
                admin_id,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            transaction_type = %transaction.transaction_type,
            "Balance credited"
        );

        Ok(transaction)
    }

    /// Debit an account - pay from its balance
    ///
    /// Fails with InsufficientFunds (leaving the balance untouched) when
    /// the current balance is below `amount`.
    pub async fn debit(
        &self,
        account_id: &str,
        amount: Decimal,
        description: &str,
        transaction_type: TransactionType,
        reference_id: Option<&str>,
        admin_id: Option<&str>,
    ) -> BalanceResult<BalanceTransaction> {
        let mut tx = self.pool.begin().await?;
        let transaction = self
            .debit_in_tx(
                &mut tx,
                account_id,
                amount,
                description,
                transaction_type,
                reference_id,
                admin_id,
            )
            .await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account_id,
            amount = %amount,
            transaction_type = %transaction.transaction_type,
            "Balance debited"
        );

        Ok(transaction)
    }

    /// Credit back a refunded order
    pub async fn refund_to_balance(
        &self,
        account_id: &str,
        amount: Decimal,
        description: &str,
        order_id: &str,
    ) -> BalanceResult<BalanceTransaction> {
        self.credit(
            account_id,
            amount,
            description,
            TransactionType::Refund,
            Some(order_id),
            None,
        )
        .await
    }

    /// Pay for an order from the account balance
    pub async fn process_balance_payment(
        &self,
        account_id: &str,
        amount: Decimal,
        description: &str,
        order_id: &str,
    ) -> BalanceResult<BalanceTransaction> {
        self.debit(
            account_id,
            amount,
            description,
            TransactionType::Debit,
            Some(order_id),
            None,
        )
        .await
    }

    /// Signed admin adjustment: positive credits, negative debits
    ///
    /// The admin id is written together with the transaction row in a
    /// single insert, keeping the adjustment attributable without a
    /// second write.
    pub async fn admin_adjust(
        &self,
        account_id: &str,
        amount: Decimal,
        description: &str,
        admin_id: &str,
    ) -> BalanceResult<BalanceTransaction> {
        if amount > Decimal::ZERO {
            self.credit(
                account_id,
                amount,
                description,
                TransactionType::Credit,
                None,
                Some(admin_id),
            )
            .await
        } else {
            self.debit(
                account_id,
                amount.abs(),
                description,
                TransactionType::Debit,
                None,
                Some(admin_id),
            )
            .await
        }
    }

    /// Record an externally-paid gift card purchase in the audit trail
    ///
    /// The purchase was settled by the payment provider, so the balance is
    /// not touched; balance_before is back-computed so the record keeps the
    /// balance_after - balance_before == amount shape of every other row.
    pub async fn record_gift_card_purchase(
        &self,
        account: &Account,
        amount: Decimal,
        gift_card_id: &str,
    ) -> BalanceResult<BalanceTransaction> {
        if amount <= Decimal::ZERO {
            return Err(BalanceError::InvalidArgument(
                "Purchase amount must be positive".to_string(),
            ));
        }

        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let description = format!("Gift card purchase - {}", &gift_card_id[..8]);

        let transaction = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            INSERT INTO balance_transactions
                (id, account_id, transaction_type, amount, balance_before, balance_after,
                 description, status, order_id, admin_id, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, $10)
            RETURNING id, account_id, transaction_type, amount, balance_before, balance_after,
                      description, status, order_id, admin_id, created_at, completed_at
            "#,
        )
        .bind(&transaction_id)
        .bind(&account.id)
        .bind(TransactionType::GiftCardPurchase.to_string())
        .bind(amount)
        .bind(account.balance - amount)
        .bind(account.balance)
        .bind(&description)
        .bind(TransactionStatus::Completed.to_string())
        .bind(gift_card_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(transaction)
    }

    // === Helper methods for working within transactions ===
    //
    // Gift card redemption composes the card state change and the balance
    // credit inside one database transaction, so the write path is exposed
    // at the transaction level too.

    /// Credit within an existing database transaction
    pub async fn credit_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        amount: Decimal,
        description: &str,
        transaction_type: TransactionType,
        reference_id: Option<&str>,
        admin_id: Option<&str>,
    ) -> BalanceResult<BalanceTransaction> {
        validate_movement(amount, description)?;

        let account = self.lock_account_in_tx(tx, account_id).await?;
        let balance_before = account.balance;
        let balance_after = balance_before + amount;

        self.write_balance_in_tx(tx, &account, balance_after).await?;
        self.insert_transaction_in_tx(
            tx,
            account_id,
            transaction_type,
            amount,
            balance_before,
            balance_after,
            description,
            reference_id,
            admin_id,
        )
        .await
    }

    /// Debit within an existing database transaction
    pub async fn debit_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        amount: Decimal,
        description: &str,
        transaction_type: TransactionType,
        reference_id: Option<&str>,
        admin_id: Option<&str>,
    ) -> BalanceResult<BalanceTransaction> {
        validate_movement(amount, description)?;

        let account = self.lock_account_in_tx(tx, account_id).await?;
        let balance_before = account.balance;

        if balance_before < amount {
            return Err(BalanceError::InsufficientFunds {
                required: amount,
                available: balance_before,
            });
        }

        let balance_after = balance_before - amount;

        self.write_balance_in_tx(tx, &account, balance_after).await?;
        self.insert_transaction_in_tx(
            tx,
            account_id,
            transaction_type,
            amount,
            balance_before,
            balance_after,
            description,
            reference_id,
            admin_id,
        )
        .await
    }

    /// Lock an account row for update (prevents concurrent modifications)
    async fn lock_account_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
    ) -> BalanceResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, email, name, balance, version, last_balance_update, created_at, updated_at
            FROM accounts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| BalanceError::NotFound(format!("account {}", account_id)))?;

        Ok(account)
    }

    async fn write_balance_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account: &Account,
        new_balance: Decimal,
    ) -> BalanceResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $1, version = version + 1, last_balance_update = $2, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(new_balance)
        .bind(now)
        .bind(&account.id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Create a transaction record within an existing database transaction
    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account_id: &str,
        transaction_type: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        description: &str,
        reference_id: Option<&str>,
        admin_id: Option<&str>,
    ) -> BalanceResult<BalanceTransaction> {
        let transaction_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let transaction = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            INSERT INTO balance_transactions
                (id, account_id, transaction_type, amount, balance_before, balance_after,
                 description, status, order_id, admin_id, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING id, account_id, transaction_type, amount, balance_before, balance_after,
                      description, status, order_id, admin_id, created_at, completed_at
            "#,
        )
        .bind(&transaction_id)
        .bind(account_id)
        .bind(transaction_type.to_string())
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(description)
        .bind(TransactionStatus::Completed.to_string())
        .bind(reference_id)
        .bind(admin_id)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        Ok(transaction)
    }
}

fn validate_movement(amount: Decimal, description: &str) -> BalanceResult<()> {
    if amount <= Decimal::ZERO {
        return Err(BalanceError::InvalidArgument(
            "Amount must be positive".to_string(),
        ));
    }
    if description.trim().is_empty() {
        return Err(BalanceError::InvalidArgument(
            "Description is required".to_string(),
        ));
    }
    Ok(())
}
