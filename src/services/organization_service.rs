// src/services/organization_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{organization_repo::OrganizationWrite, OrganizationRepository},
    middleware::policy::Policy,
    models::{
        auth::User,
        membership::{FieldDefinition, FieldType},
        organization::{ManagementRecord, ManagementStatus, Organization},
    },
};

#[derive(Clone)]
pub struct OrganizationService {
    repo: OrganizationRepository,
    pool: PgPool,
}

impl OrganizationService {
    pub fn new(repo: OrganizationRepository, pool: PgPool) -> Self {
        Self { repo, pool }
    }

    pub async fn list(&self) -> Result<Vec<Organization>, AppError> {
        self.repo.list().await
    }

    pub async fn get(&self, id: Uuid) -> Result<Organization, AppError> {
        self.repo
            .find_by_id(&self.pool, id)
            .await?
            .ok_or(AppError::NotFound("Sacco"))
    }

    pub async fn create(&self, data: &OrganizationWrite<'_>) -> Result<Organization, AppError> {
        let organization = self.repo.create(data).await?;
        tracing::info!(organization_id = %organization.id, "🏦 Sacco {} registered", organization.name);
        Ok(organization)
    }

    pub async fn update(&self, id: Uuid, data: &OrganizationWrite<'_>) -> Result<Organization, AppError> {
        self.repo
            .update(id, data)
            .await?
            .ok_or(AppError::NotFound("Sacco"))
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        if !self.repo.delete(id).await? {
            return Err(AppError::NotFound("Sacco"));
        }
        tracing::info!(organization_id = %id, "Sacco deleted");
        Ok(())
    }

    // =========================================================================
    //  MANAGEMENT
    // =========================================================================

    /// Appends an audit row and applies its effect on `verified`, atomically.
    pub async fn record_management(
        &self,
        organization_id: Uuid,
        status: ManagementStatus,
        actor: &User,
    ) -> Result<ManagementRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        if self.repo.find_by_id(&mut *tx, organization_id).await?.is_none() {
            return Err(AppError::NotFound("Sacco"));
        }

        let record = self
            .repo
            .append_management_record(&mut *tx, organization_id, status, actor.id)
            .await?;

        if let Some(verified) = status.verified_flag() {
            self.repo.set_verified(&mut *tx, organization_id, verified).await?;
        }

        tx.commit().await?;

        tracing::info!(%organization_id, ?status, "Management status recorded");
        Ok(record)
    }

    /// `set_status` on an existing record: the trail is append-only, so this
    /// writes a new record for the same organization.
    pub async fn set_management_status(
        &self,
        record_id: Uuid,
        status: ManagementStatus,
        actor: &User,
    ) -> Result<ManagementRecord, AppError> {
        let current = self
            .repo
            .find_management_record(record_id, None)
            .await?
            .ok_or(AppError::NotFound("Management record"))?;

        self.record_management(current.organization_id, status, actor).await
    }

    pub async fn list_management(&self, actor: &User) -> Result<Vec<ManagementRecord>, AppError> {
        let visible_to = Policy::scope(actor).owner();
        self.repo.list_management_records(visible_to).await
    }

    pub async fn get_management(&self, id: Uuid, actor: &User) -> Result<ManagementRecord, AppError> {
        self.repo
            .find_management_record(id, Policy::scope(actor).owner())
            .await?
            .ok_or(AppError::NotFound("Management record"))
    }

    // =========================================================================
    //  FIELD DEFINITIONS
    // =========================================================================

    pub async fn list_field_definitions(&self, organization_id: Uuid) -> Result<Vec<FieldDefinition>, AppError> {
        // Unknown sacco is a 404, not an empty form
        self.get(organization_id).await?;
        self.repo.list_field_definitions(&self.pool, organization_id).await
    }

    pub async fn create_field_definition(
        &self,
        organization_id: Uuid,
        key: &str,
        label: &str,
        field_type: FieldType,
        required: bool,
        display_order: i32,
    ) -> Result<FieldDefinition, AppError> {
        self.get(organization_id).await?;
        self.repo
            .create_field_definition(organization_id, key, label, field_type, required, display_order)
            .await
    }

    pub async fn update_field_definition(
        &self,
        organization_id: Uuid,
        field_id: Uuid,
        label: Option<&str>,
        field_type: Option<FieldType>,
        required: Option<bool>,
        display_order: Option<i32>,
    ) -> Result<FieldDefinition, AppError> {
        self.repo
            .update_field_definition(organization_id, field_id, label, field_type, required, display_order)
            .await?
            .ok_or(AppError::NotFound("Field definition"))
    }

    pub async fn delete_field_definition(&self, organization_id: Uuid, field_id: Uuid) -> Result<(), AppError> {
        if !self.repo.delete_field_definition(organization_id, field_id).await? {
            return Err(AppError::NotFound("Field definition"));
        }
        Ok(())
    }
}

// Run with: DATABASE_URL=postgres://... cargo test -- --ignored
#[cfg(test)]
mod workflow {
    use super::*;
    use crate::services::fixtures;

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn management_records_follow_membership_visibility(pool: PgPool) {
        let services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let outsider = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        let member = fixtures::approved_member(&services, &pool, &admin, sacco.id).await;

        let record = services
            .organizations
            .record_management(sacco.id, ManagementStatus::Verified, &admin)
            .await
            .unwrap();
        assert!(services.organizations.get(sacco.id).await.unwrap().verified);

        for viewer in [&admin, &member] {
            let found = services.organizations.get_management(record.id, viewer).await.unwrap();
            assert_eq!(found.organization_id, sacco.id);
        }
        assert!(matches!(
            services.organizations.get_management(record.id, &outsider).await,
            Err(AppError::NotFound(_))
        ));
        assert!(services.organizations.list_management(&outsider).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn set_status_appends_instead_of_rewriting(pool: PgPool) {
        let services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;

        let first = services
            .organizations
            .record_management(sacco.id, ManagementStatus::Verified, &admin)
            .await
            .unwrap();
        let second = services
            .organizations
            .set_management_status(first.id, ManagementStatus::Removed, &admin)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(services.organizations.list_management(&admin).await.unwrap().len(), 2);
        assert!(!services.organizations.get(sacco.id).await.unwrap().verified);
    }
}
