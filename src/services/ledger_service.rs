// src/services/ledger_service.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        money::{self, FieldErrors},
    },
    db::{LedgerRepository, MembershipRepository},
    middleware::policy::{Capability, Policy},
    models::{
        auth::User,
        ledger::{
            InsuranceView, LoanDecision, LoanView, SavingRecord, SavingType, ServiceCategory,
            ServiceOffering,
        },
    },
    services::events::{EventPublisher, LedgerEvent},
};

// Insurance fields, grouped to keep the create signature readable
pub struct NewInsurance<'a> {
    pub service_id: Uuid,
    pub policy_number: &'a str,
    pub coverage_amount: Decimal,
    pub premium: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Clone)]
pub struct LedgerService {
    repo: LedgerRepository,
    membership_repo: MembershipRepository,
    publisher: EventPublisher,
    pool: PgPool,
}

impl LedgerService {
    pub fn new(
        repo: LedgerRepository,
        membership_repo: MembershipRepository,
        publisher: EventPublisher,
        pool: PgPool,
    ) -> Self {
        Self { repo, membership_repo, publisher, pool }
    }

    // =========================================================================
    //  SERVICE OFFERINGS
    // =========================================================================

    pub async fn list_services(&self, organization_id: Option<Uuid>) -> Result<Vec<ServiceOffering>, AppError> {
        self.repo.list_services(organization_id).await
    }

    pub async fn get_service(&self, id: Uuid) -> Result<ServiceOffering, AppError> {
        self.repo.find_service(id).await?.ok_or(AppError::NotFound("Service"))
    }

    pub async fn create_service(
        &self,
        organization_id: Uuid,
        name: &str,
        category: ServiceCategory,
        description: Option<&str>,
    ) -> Result<ServiceOffering, AppError> {
        let service = self
            .repo
            .create_service(organization_id, name, category, description)
            .await
            .map_err(|e| match e {
                AppError::DatabaseError(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                    AppError::NotFound("Sacco")
                }
                other => other,
            })?;

        tracing::info!(service_id = %service.id, ?category, "Service {} created", service.name);
        Ok(service)
    }

    pub async fn update_service(
        &self,
        id: Uuid,
        name: Option<&str>,
        category: Option<ServiceCategory>,
        description: Option<&str>,
    ) -> Result<ServiceOffering, AppError> {
        self.repo
            .update_service(id, name, category, description)
            .await?
            .ok_or(AppError::NotFound("Service"))
    }

    pub async fn delete_service(&self, id: Uuid) -> Result<(), AppError> {
        if !self.repo.delete_service(id).await? {
            return Err(AppError::NotFound("Service"));
        }
        Ok(())
    }

    /// Members transact only against saccos that approved them.
    async fn ensure_can_transact(&self, actor: &User, service_id: Uuid) -> Result<ServiceOffering, AppError> {
        let service = self.get_service(service_id).await?;

        if Policy::is_admin(actor) {
            return Ok(service);
        }

        if !self
            .membership_repo
            .is_approved_member(actor.id, service.organization_id)
            .await?
        {
            return Err(AppError::Forbidden(
                "You need an approved membership in this sacco to use its services.".into(),
            ));
        }

        Ok(service)
    }

    // =========================================================================
    //  SAVINGS
    // =========================================================================

    pub async fn create_saving(
        &self,
        actor: &User,
        service_id: Uuid,
        amount: Decimal,
        transaction_type: SavingType,
    ) -> Result<SavingRecord, AppError> {
        let mut errors = FieldErrors::new();
        errors.positive("amount", amount, money::AMOUNT);
        errors.finish()?;

        self.ensure_can_transact(actor, service_id).await?;

        let saving = self
            .repo
            .create_saving(actor.id, service_id, amount, transaction_type)
            .await?;

        tracing::info!(
            saving_id = %saving.id,
            member_id = %actor.id,
            %amount,
            kind = transaction_type.as_str(),
            "💰 Saving recorded"
        );

        // Committed; the payments side follows asynchronously
        self.publisher.publish(LedgerEvent::from(&saving));

        Ok(saving)
    }

    pub async fn list_savings(&self, actor: &User) -> Result<Vec<SavingRecord>, AppError> {
        self.repo.list_savings(Policy::scope(actor).owner()).await
    }

    pub async fn get_saving(&self, id: Uuid, actor: &User) -> Result<SavingRecord, AppError> {
        self.repo
            .find_saving(id)
            .await?
            .filter(|s| Policy::scope(actor).permits(s.member_id))
            .ok_or(AppError::NotFound("Saving"))
    }

    // =========================================================================
    //  LOANS
    // =========================================================================

    pub async fn create_loan(
        &self,
        actor: &User,
        service_id: Uuid,
        amount: Decimal,
        interest_rate: Decimal,
        duration_months: i32,
    ) -> Result<LoanView, AppError> {
        let mut errors = FieldErrors::new();
        errors.positive("amount", amount, money::AMOUNT);
        errors.non_negative("interest_rate", interest_rate, money::RATE);
        if duration_months < 1 {
            errors.add("duration_months", "must be at least 1");
        }
        errors.finish()?;

        self.ensure_can_transact(actor, service_id).await?;

        let loan = self
            .repo
            .create_loan(actor.id, service_id, amount, interest_rate, duration_months)
            .await?;

        tracing::info!(loan_id = %loan.id, member_id = %actor.id, %amount, "Loan requested");
        Ok(LoanView::from(loan))
    }

    pub async fn decide_loan(
        &self,
        loan_id: Uuid,
        decision: LoanDecision,
        actor: &User,
    ) -> Result<LoanView, AppError> {
        Policy::check(actor, &Capability::LoanDecide)?;

        let mut tx = self.pool.begin().await?;

        let loan = self
            .repo
            .lock_loan(&mut *tx, loan_id)
            .await?
            .ok_or(AppError::NotFound("Loan"))?;

        let next = decision.apply(loan.status)?;
        let loan = self.repo.update_loan_status(&mut *tx, loan.id, next).await?;

        tx.commit().await?;

        tracing::info!(%loan_id, actor_id = %actor.id, status = ?loan.status, "Loan decided");
        Ok(LoanView::from(loan))
    }

    pub async fn list_loans(&self, actor: &User) -> Result<Vec<LoanView>, AppError> {
        let loans = self.repo.list_loans(Policy::scope(actor).owner()).await?;
        Ok(loans.into_iter().map(LoanView::from).collect())
    }

    pub async fn get_loan(&self, id: Uuid, actor: &User) -> Result<LoanView, AppError> {
        self.repo
            .find_loan(id)
            .await?
            .filter(|l| Policy::scope(actor).permits(l.member_id))
            .map(LoanView::from)
            .ok_or(AppError::NotFound("Loan"))
    }

    // =========================================================================
    //  INSURANCE
    // =========================================================================

    pub async fn create_insurance(&self, actor: &User, data: &NewInsurance<'_>) -> Result<InsuranceView, AppError> {
        let mut errors = FieldErrors::new();
        if data.end_date < data.start_date {
            errors.add("end_date", "must not be before start_date");
        }
        errors.positive("coverage_amount", data.coverage_amount, money::AMOUNT);
        errors.positive("premium", data.premium, money::PREMIUM);
        errors.finish()?;

        self.ensure_can_transact(actor, data.service_id).await?;

        let policy = self
            .repo
            .create_insurance(
                actor.id,
                data.service_id,
                data.policy_number,
                data.coverage_amount,
                data.premium,
                data.start_date,
                data.end_date,
            )
            .await?;

        tracing::info!(insurance_id = %policy.id, member_id = %actor.id, "Insurance policy {} created", policy.policy_number);
        Ok(InsuranceView::now(policy))
    }

    pub async fn list_insurances(&self, actor: &User) -> Result<Vec<InsuranceView>, AppError> {
        let policies = self.repo.list_insurances(Policy::scope(actor).owner()).await?;
        Ok(policies.into_iter().map(InsuranceView::now).collect())
    }

    pub async fn get_insurance(&self, id: Uuid, actor: &User) -> Result<InsuranceView, AppError> {
        self.repo
            .find_insurance(id)
            .await?
            .filter(|p| Policy::scope(actor).permits(p.member_id))
            .map(InsuranceView::now)
            .ok_or(AppError::NotFound("Insurance policy"))
    }
}

// Run with: DATABASE_URL=postgres://... cargo test -- --ignored
#[cfg(test)]
mod workflow {
    use super::*;
    use crate::{
        models::payments::TransactionStatus,
        services::{events::LedgerEventSink, fixtures},
    };

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn saving_stands_when_the_payments_side_fails(pool: PgPool) {
        let mut services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        let product = fixtures::savings_product(&services, sacco.id).await;
        let member = fixtures::approved_member(&services, &pool, &admin, sacco.id).await;

        let saving = services
            .ledger
            .create_saving(&member, product.id, dec("500.00"), SavingType::Deposit)
            .await
            .unwrap();

        // no active provider yet, so mirroring fails
        let event = services.events.recv().await.unwrap();
        assert!(matches!(
            services.payments.handle(&event).await,
            Err(AppError::NotFound(_))
        ));

        let kept = services.ledger.get_saving(saving.id, &member).await.unwrap();
        assert_eq!(kept.amount, dec("500.00"));
        assert!(services.payments.list_transactions(&member).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn each_saving_gets_one_successful_transaction(pool: PgPool) {
        let mut services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        let product = fixtures::savings_product(&services, sacco.id).await;
        fixtures::active_provider(&services).await;

        for amount in ["500.00", "2000.00"] {
            let member = fixtures::approved_member(&services, &pool, &admin, sacco.id).await;
            let saving = services
                .ledger
                .create_saving(&member, product.id, dec(amount), SavingType::Deposit)
                .await
                .unwrap();

            let event = services.events.recv().await.unwrap();
            services.payments.handle(&event).await.unwrap();

            let transactions = services.payments.list_transactions(&member).await.unwrap();
            assert_eq!(transactions.len(), 1);
            assert_eq!(transactions[0].saving_id, Some(saving.id));
            assert_eq!(transactions[0].amount, dec(amount));
            assert_eq!(transactions[0].status, TransactionStatus::Success);
        }
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn unstorable_amounts_are_field_errors(pool: PgPool) {
        let services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        let product = fixtures::savings_product(&services, sacco.id).await;

        for raw in ["0.004", "10.005", "10000000000"] {
            let result = services
                .ledger
                .create_saving(&admin, product.id, dec(raw), SavingType::Deposit)
                .await;
            assert!(matches!(result, Err(AppError::InvalidFields(_))), "{raw}: {result:?}");
        }

        let result = services.ledger.create_loan(&admin, product.id, dec("5000"), dec("1000"), 12).await;
        match result {
            Err(AppError::InvalidFields(fields)) => assert!(fields.contains_key("interest_rate")),
            other => panic!("unexpected {other:?}"),
        }

        let loan = services
            .ledger
            .create_loan(&admin, product.id, dec("5000"), dec("999.99"), 12)
            .await
            .unwrap();
        assert_eq!(loan.loan.interest_rate, dec("999.99"));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn members_need_an_approved_membership(pool: PgPool) {
        let services = fixtures::services(&pool);
        let outsider = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        let product = fixtures::savings_product(&services, sacco.id).await;

        let result = services
            .ledger
            .create_saving(&outsider, product.id, dec("500.00"), SavingType::Deposit)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
