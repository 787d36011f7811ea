// src/models/payments.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transaction_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Settlement by an admin: only pending transactions move to a final status.
    pub fn settle(self, to: TransactionStatus) -> Result<TransactionStatus, AppError> {
        match self {
            TransactionStatus::Pending => Ok(to),
            _ => Err(AppError::InvalidState("Transaction is not pending.".into())),
        }
    }
}

// M-Pesa, Airtel Money, a bank...
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PaymentProvider {
    pub id: Uuid,
    #[schema(example = "M-Pesa")]
    pub name: String,
    #[schema(example = "MPESA")]
    pub provider_code: String,

    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub api_secret: Option<String>,

    pub callback_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_id: Uuid,
    pub amount: Decimal,
    #[schema(example = "KES")]
    pub currency: String,
    pub status: TransactionStatus,
    pub reference: String,
    pub provider_reference: Option<String>,
    pub description: Option<String>,
    // Set when the transaction mirrors a saving record
    pub saving_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Raw payload as posted by the provider
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Callback {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub provider_id: Uuid,
    #[schema(value_type = Object)]
    pub payload: Value,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_transactions_settle() {
        assert_eq!(
            TransactionStatus::Pending.settle(TransactionStatus::Success).unwrap(),
            TransactionStatus::Success
        );
        assert_eq!(
            TransactionStatus::Pending.settle(TransactionStatus::Failed).unwrap(),
            TransactionStatus::Failed
        );
        for from in [TransactionStatus::Success, TransactionStatus::Failed, TransactionStatus::Cancelled] {
            assert!(matches!(
                from.settle(TransactionStatus::Success),
                Err(AppError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn provider_secrets_are_not_serialized() {
        let provider = PaymentProvider {
            id: Uuid::new_v4(),
            name: "M-Pesa".into(),
            provider_code: "MPESA".into(),
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            callback_url: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&provider).unwrap();
        assert!(json.get("api_key").is_none());
        assert!(json.get("api_secret").is_none());
        assert_eq!(json["provider_code"], "MPESA");
    }
}
