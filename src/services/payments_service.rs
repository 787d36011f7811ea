// src/services/payments_service.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        money::{self, FieldErrors},
    },
    db::{
        payments_repo::{NewTransaction, ProviderWrite},
        PaymentsRepository,
    },
    middleware::policy::{Capability, Policy},
    models::{
        auth::User,
        payments::{Callback, PaymentProvider, Transaction, TransactionStatus},
    },
    services::events::{LedgerEvent, LedgerEventSink},
};

pub const DEFAULT_CURRENCY: &str = "KES";

// What a member supplies when opening a transaction
pub struct TransactionRequest<'a> {
    pub provider_id: Uuid,
    pub amount: Decimal,
    pub currency: Option<&'a str>,
    pub reference: Option<&'a str>,
    pub provider_reference: Option<&'a str>,
    pub description: Option<&'a str>,
}

#[derive(Clone)]
pub struct PaymentsService {
    repo: PaymentsRepository,
    pool: PgPool,
}

impl PaymentsService {
    pub fn new(repo: PaymentsRepository, pool: PgPool) -> Self {
        Self { repo, pool }
    }

    // =========================================================================
    //  PROVIDERS
    // =========================================================================

    pub async fn list_providers(&self) -> Result<Vec<PaymentProvider>, AppError> {
        self.repo.list_providers().await
    }

    pub async fn get_provider(&self, id: Uuid) -> Result<PaymentProvider, AppError> {
        self.repo
            .find_provider(id)
            .await?
            .ok_or(AppError::NotFound("Payment provider"))
    }

    pub async fn create_provider(&self, data: &ProviderWrite<'_>) -> Result<PaymentProvider, AppError> {
        let provider = self.repo.create_provider(data).await?;
        tracing::info!(provider_id = %provider.id, "Payment provider {} registered", provider.provider_code);
        Ok(provider)
    }

    pub async fn update_provider(&self, id: Uuid, data: &ProviderWrite<'_>) -> Result<PaymentProvider, AppError> {
        self.repo
            .update_provider(id, data)
            .await?
            .ok_or(AppError::NotFound("Payment provider"))
    }

    pub async fn delete_provider(&self, id: Uuid) -> Result<(), AppError> {
        if !self.repo.delete_provider(id).await? {
            return Err(AppError::NotFound("Payment provider"));
        }
        Ok(())
    }

    // =========================================================================
    //  TRANSACTIONS
    // =========================================================================

    pub async fn create_transaction(
        &self,
        actor: &User,
        request: &TransactionRequest<'_>,
    ) -> Result<Transaction, AppError> {
        let mut errors = FieldErrors::new();
        errors.positive("amount", request.amount, money::AMOUNT);
        errors.finish()?;

        self.get_provider(request.provider_id).await?;

        let generated = Uuid::new_v4().to_string();
        let reference = request.reference.unwrap_or(&generated);

        let transaction = self
            .repo
            .create_transaction(&NewTransaction {
                user_id: actor.id,
                provider_id: request.provider_id,
                amount: request.amount,
                currency: request.currency.unwrap_or(DEFAULT_CURRENCY),
                status: TransactionStatus::Pending,
                reference,
                provider_reference: request.provider_reference,
                description: request.description,
                saving_id: None,
            })
            .await?;

        tracing::info!(transaction_id = %transaction.id, user_id = %actor.id, "💳 Transaction {} opened", transaction.reference);
        Ok(transaction)
    }

    pub async fn list_transactions(&self, actor: &User) -> Result<Vec<Transaction>, AppError> {
        self.repo.list_transactions(Policy::scope(actor).owner()).await
    }

    pub async fn get_transaction(&self, id: Uuid, actor: &User) -> Result<Transaction, AppError> {
        self.repo
            .find_transaction(id)
            .await?
            .filter(|t| Policy::scope(actor).permits(t.user_id))
            .ok_or(AppError::NotFound("Transaction"))
    }

    /// Admin settlement of a pending transaction (`success` or `failed`).
    pub async fn settle_transaction(
        &self,
        id: Uuid,
        to: TransactionStatus,
        actor: &User,
    ) -> Result<Transaction, AppError> {
        Policy::check(actor, &Capability::PaymentSettle)?;

        let mut tx = self.pool.begin().await?;

        let transaction = self
            .repo
            .lock_transaction(&mut *tx, id)
            .await?
            .ok_or(AppError::NotFound("Transaction"))?;

        let next = transaction.status.settle(to)?;
        let transaction = self.repo.update_transaction_status(&mut *tx, id, next).await?;

        tx.commit().await?;

        tracing::info!(transaction_id = %id, actor_id = %actor.id, status = ?next, "Transaction settled");
        Ok(transaction)
    }

    // =========================================================================
    //  CALLBACKS
    // =========================================================================

    pub async fn receive_callback(
        &self,
        transaction_id: Uuid,
        provider_id: Uuid,
        payload: &Value,
    ) -> Result<Callback, AppError> {
        let callback = self.repo.create_callback(transaction_id, provider_id, payload).await?;
        tracing::info!(callback_id = %callback.id, %transaction_id, "📨 Provider callback received");
        Ok(callback)
    }

    pub async fn list_callbacks(&self) -> Result<Vec<Callback>, AppError> {
        self.repo.list_callbacks().await
    }

    pub async fn get_callback(&self, id: Uuid) -> Result<Callback, AppError> {
        self.repo.find_callback(id).await?.ok_or(AppError::NotFound("Callback"))
    }

    pub async fn mark_callback_processed(&self, id: Uuid) -> Result<Callback, AppError> {
        self.repo
            .mark_callback_processed(id)
            .await?
            .ok_or(AppError::NotFound("Callback"))
    }

    // =========================================================================
    //  SAVING MIRROR
    // =========================================================================

    /// Records a successful transaction for a committed saving.
    async fn mirror_saving(
        &self,
        saving_id: Uuid,
        member_id: Uuid,
        amount: Decimal,
        description: &str,
    ) -> Result<Transaction, AppError> {
        let provider = self
            .repo
            .first_active_provider()
            .await?
            .ok_or(AppError::NotFound("Active payment provider"))?;

        let reference = Uuid::new_v4().to_string();

        self.repo
            .create_transaction(&NewTransaction {
                user_id: member_id,
                provider_id: provider.id,
                amount,
                currency: DEFAULT_CURRENCY,
                status: TransactionStatus::Success,
                reference: &reference,
                provider_reference: None,
                description: Some(description),
                saving_id: Some(saving_id),
            })
            .await
    }
}

#[async_trait]
impl LedgerEventSink for PaymentsService {
    async fn handle(&self, event: &LedgerEvent) -> Result<(), AppError> {
        match event {
            LedgerEvent::SavingRecorded {
                saving_id,
                member_id,
                amount,
                transaction_type,
            } => {
                let description = saving_description(transaction_type.as_str());
                let transaction = self
                    .mirror_saving(*saving_id, *member_id, *amount, &description)
                    .await?;

                tracing::info!(
                    %saving_id,
                    transaction_id = %transaction.id,
                    "Saving mirrored as a successful transaction"
                );
            }
        }
        Ok(())
    }
}

fn saving_description(kind: &str) -> String {
    format!("{kind} saving")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::SavingType;

    #[test]
    fn saving_descriptions() {
        assert_eq!(saving_description(SavingType::Deposit.as_str()), "deposit saving");
        assert_eq!(saving_description(SavingType::Withdrawal.as_str()), "withdrawal saving");
    }
}
