// src/db/payments_repo.rs

use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::payments::{Callback, PaymentProvider, Transaction, TransactionStatus},
};

const PROVIDER_COLUMNS: &str =
    "id, name, provider_code, api_key, api_secret, callback_url, is_active, created_at";
const TRANSACTION_COLUMNS: &str = "id, user_id, provider_id, amount, currency, status, reference, \
     provider_reference, description, saving_id, created_at, updated_at";
const CALLBACK_COLUMNS: &str = "id, transaction_id, provider_id, payload, received_at, processed";

#[derive(Debug)]
pub struct ProviderWrite<'a> {
    pub name: Option<&'a str>,
    pub provider_code: Option<&'a str>,
    pub api_key: Option<&'a str>,
    pub api_secret: Option<&'a str>,
    pub callback_url: Option<&'a str>,
    pub is_active: Option<bool>,
}

#[derive(Debug)]
pub struct NewTransaction<'a> {
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub amount: Decimal,
    pub currency: &'a str,
    pub status: TransactionStatus,
    pub reference: &'a str,
    pub provider_reference: Option<&'a str>,
    pub description: Option<&'a str>,
    pub saving_id: Option<Uuid>,
}

fn provider_conflict(constraint: &str) -> String {
    match constraint {
        "payment_providers_provider_code_key" => "A provider with this code already exists.".into(),
        _ => "A provider with this name already exists.".into(),
    }
}

#[derive(Clone)]
pub struct PaymentsRepository {
    pool: PgPool,
}

impl PaymentsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  PROVIDERS
    // =========================================================================

    pub async fn list_providers(&self) -> Result<Vec<PaymentProvider>, AppError> {
        let providers = sqlx::query_as::<_, PaymentProvider>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM payment_providers ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(providers)
    }

    pub async fn find_provider(&self, id: Uuid) -> Result<Option<PaymentProvider>, AppError> {
        let provider = sqlx::query_as::<_, PaymentProvider>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM payment_providers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(provider)
    }

    /// Provider used for internally generated transactions (saving mirrors).
    pub async fn first_active_provider(&self) -> Result<Option<PaymentProvider>, AppError> {
        let provider = sqlx::query_as::<_, PaymentProvider>(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM payment_providers WHERE is_active ORDER BY created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(provider)
    }

    pub async fn create_provider(&self, data: &ProviderWrite<'_>) -> Result<PaymentProvider, AppError> {
        sqlx::query_as::<_, PaymentProvider>(&format!(
            r#"
            INSERT INTO payment_providers (
                name, provider_code, api_key, api_secret, callback_url, is_active
            )
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, true))
            RETURNING {PROVIDER_COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.provider_code)
        .bind(data.api_key)
        .bind(data.api_secret)
        .bind(data.callback_url)
        .bind(data.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, provider_conflict))
    }

    pub async fn update_provider(
        &self,
        id: Uuid,
        data: &ProviderWrite<'_>,
    ) -> Result<Option<PaymentProvider>, AppError> {
        sqlx::query_as::<_, PaymentProvider>(&format!(
            r#"
            UPDATE payment_providers SET
                name = COALESCE($2, name),
                provider_code = COALESCE($3, provider_code),
                api_key = COALESCE($4, api_key),
                api_secret = COALESCE($5, api_secret),
                callback_url = COALESCE($6, callback_url),
                is_active = COALESCE($7, is_active)
            WHERE id = $1
            RETURNING {PROVIDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.provider_code)
        .bind(data.api_key)
        .bind(data.api_secret)
        .bind(data.callback_url)
        .bind(data.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, provider_conflict))
    }

    pub async fn delete_provider(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM payment_providers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    AppError::Conflict("Provider still has transactions.".into())
                }
                _ => e.into(),
            })?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  TRANSACTIONS
    // =========================================================================

    pub async fn create_transaction(&self, data: &NewTransaction<'_>) -> Result<Transaction, AppError> {
        sqlx::query_as::<_, Transaction>(&format!(
            r#"
            INSERT INTO transactions (
                user_id, provider_id, amount, currency, status,
                reference, provider_reference, description, saving_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(data.user_id)
        .bind(data.provider_id)
        .bind(data.amount)
        .bind(data.currency)
        .bind(data.status)
        .bind(data.reference)
        .bind(data.provider_reference)
        .bind(data.description)
        .bind(data.saving_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, |_| format!("A transaction with reference '{}' already exists.", data.reference))
        })
    }

    pub async fn list_transactions(&self, owner: Option<Uuid>) -> Result<Vec<Transaction>, AppError> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    pub async fn find_transaction(&self, id: Uuid) -> Result<Option<Transaction>, AppError> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    pub async fn lock_transaction<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Transaction>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(transaction)
    }

    pub async fn update_transaction_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            UPDATE transactions SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(executor)
        .await?;

        Ok(transaction)
    }

    // =========================================================================
    //  CALLBACKS
    // =========================================================================

    pub async fn create_callback(
        &self,
        transaction_id: Uuid,
        provider_id: Uuid,
        payload: &Value,
    ) -> Result<Callback, AppError> {
        let callback = sqlx::query_as::<_, Callback>(&format!(
            r#"
            INSERT INTO callbacks (transaction_id, provider_id, payload)
            VALUES ($1, $2, $3)
            RETURNING {CALLBACK_COLUMNS}
            "#
        ))
        .bind(transaction_id)
        .bind(provider_id)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound("Transaction or provider")
            }
            _ => e.into(),
        })?;

        Ok(callback)
    }

    pub async fn list_callbacks(&self) -> Result<Vec<Callback>, AppError> {
        let callbacks = sqlx::query_as::<_, Callback>(&format!(
            "SELECT {CALLBACK_COLUMNS} FROM callbacks ORDER BY received_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(callbacks)
    }

    pub async fn find_callback(&self, id: Uuid) -> Result<Option<Callback>, AppError> {
        let callback = sqlx::query_as::<_, Callback>(&format!(
            "SELECT {CALLBACK_COLUMNS} FROM callbacks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(callback)
    }

    pub async fn mark_callback_processed(&self, id: Uuid) -> Result<Option<Callback>, AppError> {
        let callback = sqlx::query_as::<_, Callback>(&format!(
            "UPDATE callbacks SET processed = true WHERE id = $1 RETURNING {CALLBACK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(callback)
    }
}
