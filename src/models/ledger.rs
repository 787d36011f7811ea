// src/models/ledger.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// --- Enums (mapped to Postgres types) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "service_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Savings,
    Loan,
    Insurance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "saving_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SavingType {
    Deposit,
    Withdrawal,
}

impl SavingType {
    pub fn as_str(self) -> &'static str {
        match self {
            SavingType::Deposit => "deposit",
            SavingType::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanDecision {
    Approve,
    Reject,
    MarkPaid,
}

impl LoanDecision {
    /// Only pending loans are decided; only approved loans are settled.
    pub fn apply(self, from: LoanStatus) -> Result<LoanStatus, AppError> {
        match (self, from) {
            (LoanDecision::Approve, LoanStatus::Pending) => Ok(LoanStatus::Approved),
            (LoanDecision::Reject, LoanStatus::Pending) => Ok(LoanStatus::Rejected),
            (LoanDecision::MarkPaid, LoanStatus::Approved) => Ok(LoanStatus::Paid),
            (LoanDecision::MarkPaid, _) => {
                Err(AppError::InvalidState("Only approved loans can be marked as paid.".into()))
            }
            _ => Err(AppError::InvalidState("Loan is not pending.".into())),
        }
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceOffering {
    pub id: Uuid,
    pub organization_id: Uuid,
    #[schema(example = "Boda Boda Loan")]
    pub name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Immutable once written
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SavingRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub service_id: Uuid,
    #[schema(example = "500.00")]
    pub amount: Decimal,
    pub transaction_type: SavingType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub service_id: Uuid,
    #[schema(example = "5000.00")]
    pub amount: Decimal,
    // Annual, in percent
    #[schema(example = "10.00")]
    pub interest_rate: Decimal,
    pub duration_months: i32,
    pub status: LoanStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LoanRecord {
    /// Simple annual interest pro-rated by the loan duration.
    pub fn total_payable(&self) -> Decimal {
        total_payable(self.amount, self.interest_rate, self.duration_months)
    }
}

pub fn total_payable(amount: Decimal, interest_rate: Decimal, duration_months: i32) -> Decimal {
    let interest = amount * interest_rate / Decimal::ONE_HUNDRED * Decimal::from(duration_months)
        / Decimal::from(12);
    let mut total = (amount + interest).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(2);
    total
}

// What the API serves: the stored row plus the derived amount
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanView {
    #[serde(flatten)]
    pub loan: LoanRecord,
    #[schema(example = "5500.00")]
    pub total_payable: Decimal,
}

impl From<LoanRecord> for LoanView {
    fn from(loan: LoanRecord) -> Self {
        let total_payable = loan.total_payable();
        Self { loan, total_payable }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InsuranceRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub service_id: Uuid,
    #[schema(example = "POL-2024-0001")]
    pub policy_number: String,
    pub coverage_amount: Decimal,
    pub premium: Decimal,
    #[schema(value_type = String, format = Date, example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2024-12-31")]
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl InsuranceRecord {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InsuranceView {
    #[serde(flatten)]
    pub policy: InsuranceRecord,
    pub is_expired: bool,
}

impl InsuranceView {
    pub fn at(policy: InsuranceRecord, today: NaiveDate) -> Self {
        let is_expired = policy.is_expired(today);
        Self { policy, is_expired }
    }

    pub fn now(policy: InsuranceRecord) -> Self {
        Self::at(policy, Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn loan(status: LoanStatus) -> LoanRecord {
        LoanRecord {
            id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            amount: dec("5000"),
            interest_rate: dec("10"),
            duration_months: 12,
            status,
            decided_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn total_payable_for_a_year() {
        assert_eq!(total_payable(dec("5000"), dec("10"), 12), dec("5500.00"));
    }

    #[test]
    fn total_payable_is_prorated() {
        assert_eq!(total_payable(dec("5000"), dec("10"), 6), dec("5250.00"));
        assert_eq!(total_payable(dec("1000"), dec("12.5"), 3), dec("1031.25"));
    }

    #[test]
    fn total_payable_rounds_to_cents() {
        // 100 * 10% * 1/12 = 0.8333...
        assert_eq!(total_payable(dec("100"), dec("10"), 1), dec("100.83"));
    }

    #[test]
    fn loan_view_recomputes_on_serialization() {
        let json = serde_json::to_value(LoanView::from(loan(LoanStatus::Pending))).unwrap();
        assert_eq!(json["total_payable"], "5500.00");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn only_pending_loans_are_decided() {
        assert_eq!(LoanDecision::Approve.apply(LoanStatus::Pending).unwrap(), LoanStatus::Approved);
        assert_eq!(LoanDecision::Reject.apply(LoanStatus::Pending).unwrap(), LoanStatus::Rejected);

        for from in [LoanStatus::Approved, LoanStatus::Rejected, LoanStatus::Paid] {
            assert!(matches!(LoanDecision::Approve.apply(from), Err(AppError::InvalidState(_))));
            assert!(matches!(LoanDecision::Reject.apply(from), Err(AppError::InvalidState(_))));
        }
    }

    #[test]
    fn approving_twice_fails() {
        let mut record = loan(LoanStatus::Pending);
        record.status = LoanDecision::Approve.apply(record.status).unwrap();
        assert!(matches!(
            LoanDecision::Approve.apply(record.status),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn only_approved_loans_are_paid() {
        assert_eq!(LoanDecision::MarkPaid.apply(LoanStatus::Approved).unwrap(), LoanStatus::Paid);
        assert!(LoanDecision::MarkPaid.apply(LoanStatus::Pending).is_err());
        assert!(LoanDecision::MarkPaid.apply(LoanStatus::Paid).is_err());
    }

    #[test]
    fn insurance_expiry_is_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let mut policy = InsuranceRecord {
            id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            policy_number: "POL-1".into(),
            coverage_amount: dec("100000"),
            premium: dec("1500"),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 14).unwrap(),
            created_at: Utc::now(),
        };
        assert!(policy.is_expired(today));

        policy.end_date = today;
        assert!(!policy.is_expired(today));

        policy.end_date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let view = serde_json::to_value(InsuranceView::at(policy, today)).unwrap();
        assert_eq!(view["is_expired"], false);
        assert_eq!(view["end_date"], "2025-01-01");
    }
}
