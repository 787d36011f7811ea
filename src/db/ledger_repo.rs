// src/db/ledger_repo.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::ledger::{
        InsuranceRecord, LoanRecord, LoanStatus, SavingRecord, SavingType, ServiceCategory,
        ServiceOffering,
    },
};

const SERVICE_COLUMNS: &str = "id, organization_id, name, category, description, created_at, updated_at";
const SAVING_COLUMNS: &str = "id, member_id, service_id, amount, transaction_type, created_at";
const LOAN_COLUMNS: &str =
    "id, member_id, service_id, amount, interest_rate, duration_months, status, decided_at, created_at";
const INSURANCE_COLUMNS: &str = "id, member_id, service_id, policy_number, coverage_amount, premium, \
     start_date, end_date, created_at";

#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  SERVICE OFFERINGS
    // =========================================================================

    pub async fn list_services(&self, organization_id: Option<Uuid>) -> Result<Vec<ServiceOffering>, AppError> {
        let services = sqlx::query_as::<_, ServiceOffering>(&format!(
            r#"
            SELECT {SERVICE_COLUMNS}
            FROM service_offerings
            WHERE ($1::uuid IS NULL OR organization_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(services)
    }

    pub async fn find_service(&self, id: Uuid) -> Result<Option<ServiceOffering>, AppError> {
        let service = sqlx::query_as::<_, ServiceOffering>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM service_offerings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(service)
    }

    pub async fn create_service(
        &self,
        organization_id: Uuid,
        name: &str,
        category: ServiceCategory,
        description: Option<&str>,
    ) -> Result<ServiceOffering, AppError> {
        sqlx::query_as::<_, ServiceOffering>(&format!(
            r#"
            INSERT INTO service_offerings (organization_id, name, category, description)
            VALUES ($1, $2, $3, $4)
            RETURNING {SERVICE_COLUMNS}
            "#
        ))
        .bind(organization_id)
        .bind(name)
        .bind(category)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, |_| format!("A service named '{}' already exists.", name)))
    }

    pub async fn update_service(
        &self,
        id: Uuid,
        name: Option<&str>,
        category: Option<ServiceCategory>,
        description: Option<&str>,
    ) -> Result<Option<ServiceOffering>, AppError> {
        sqlx::query_as::<_, ServiceOffering>(&format!(
            r#"
            UPDATE service_offerings SET
                name = COALESCE($2, name),
                category = COALESCE($3, category),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SERVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(category)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, |_| "A service with this name already exists.".into()))
    }

    pub async fn delete_service(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM service_offerings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    AppError::Conflict("Service still has ledger records.".into())
                }
                _ => e.into(),
            })?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    //  SAVINGS
    // =========================================================================

    pub async fn create_saving(
        &self,
        member_id: Uuid,
        service_id: Uuid,
        amount: Decimal,
        transaction_type: SavingType,
    ) -> Result<SavingRecord, AppError> {
        let saving = sqlx::query_as::<_, SavingRecord>(&format!(
            r#"
            INSERT INTO savings (member_id, service_id, amount, transaction_type)
            VALUES ($1, $2, $3, $4)
            RETURNING {SAVING_COLUMNS}
            "#
        ))
        .bind(member_id)
        .bind(service_id)
        .bind(amount)
        .bind(transaction_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(saving)
    }

    pub async fn list_savings(&self, owner: Option<Uuid>) -> Result<Vec<SavingRecord>, AppError> {
        let savings = sqlx::query_as::<_, SavingRecord>(&format!(
            r#"
            SELECT {SAVING_COLUMNS}
            FROM savings
            WHERE ($1::uuid IS NULL OR member_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(savings)
    }

    pub async fn find_saving(&self, id: Uuid) -> Result<Option<SavingRecord>, AppError> {
        let saving = sqlx::query_as::<_, SavingRecord>(&format!(
            "SELECT {SAVING_COLUMNS} FROM savings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(saving)
    }

    // =========================================================================
    //  LOANS
    // =========================================================================

    pub async fn create_loan(
        &self,
        member_id: Uuid,
        service_id: Uuid,
        amount: Decimal,
        interest_rate: Decimal,
        duration_months: i32,
    ) -> Result<LoanRecord, AppError> {
        let loan = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            INSERT INTO loans (member_id, service_id, amount, interest_rate, duration_months, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(member_id)
        .bind(service_id)
        .bind(amount)
        .bind(interest_rate)
        .bind(duration_months)
        .fetch_one(&self.pool)
        .await?;

        Ok(loan)
    }

    pub async fn list_loans(&self, owner: Option<Uuid>) -> Result<Vec<LoanRecord>, AppError> {
        let loans = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE ($1::uuid IS NULL OR member_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(loans)
    }

    pub async fn find_loan(&self, id: Uuid) -> Result<Option<LoanRecord>, AppError> {
        let loan = sqlx::query_as::<_, LoanRecord>(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(loan)
    }

    pub async fn lock_loan<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<LoanRecord>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loan = sqlx::query_as::<_, LoanRecord>(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(loan)
    }

    pub async fn update_loan_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: LoanStatus,
    ) -> Result<LoanRecord, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let loan = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            UPDATE loans
            SET status = $2, decided_at = COALESCE(decided_at, NOW())
            WHERE id = $1
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(executor)
        .await?;

        Ok(loan)
    }

    // =========================================================================
    //  INSURANCE
    // =========================================================================

    pub async fn create_insurance(
        &self,
        member_id: Uuid,
        service_id: Uuid,
        policy_number: &str,
        coverage_amount: Decimal,
        premium: Decimal,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<InsuranceRecord, AppError> {
        sqlx::query_as::<_, InsuranceRecord>(&format!(
            r#"
            INSERT INTO insurances (
                member_id, service_id, policy_number,
                coverage_amount, premium, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {INSURANCE_COLUMNS}
            "#
        ))
        .bind(member_id)
        .bind(service_id)
        .bind(policy_number)
        .bind(coverage_amount)
        .bind(premium)
        .bind(start_date)
        .bind(end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_unique_violation(e, |_| {
                format!("An insurance policy with number '{}' already exists.", policy_number)
            })
        })
    }

    pub async fn list_insurances(&self, owner: Option<Uuid>) -> Result<Vec<InsuranceRecord>, AppError> {
        let policies = sqlx::query_as::<_, InsuranceRecord>(&format!(
            r#"
            SELECT {INSURANCE_COLUMNS}
            FROM insurances
            WHERE ($1::uuid IS NULL OR member_id = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(policies)
    }

    pub async fn find_insurance(&self, id: Uuid) -> Result<Option<InsuranceRecord>, AppError> {
        let policy = sqlx::query_as::<_, InsuranceRecord>(&format!(
            "SELECT {INSURANCE_COLUMNS} FROM insurances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }
}
