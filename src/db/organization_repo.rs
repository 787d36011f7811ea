// src/db/organization_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::{
        membership::{FieldDefinition, FieldType},
        organization::{ManagementRecord, ManagementStatus, Organization},
    },
};

const ORGANIZATION_COLUMNS: &str = "id, name, registration_number, website, address, phone_number, \
     email, description, logo, verified, created_at, updated_at";

const FIELD_COLUMNS: &str =
    "id, organization_id, key, label, field_type, required, display_order, created_at";

const MANAGEMENT_COLUMNS: &str = "mr.id, mr.organization_id, mr.status, mr.recorded_by, mr.created_at";

// `$1` is the viewer; NULL sees every record.
const MANAGEMENT_VISIBLE: &str = "$1::uuid IS NULL OR EXISTS ( \
     SELECT 1 FROM memberships m \
     WHERE m.organization_id = mr.organization_id AND m.user_id = $1 AND m.status = 'approved')";

/// Column values accepted when writing an organization.
#[derive(Debug, Default)]
pub struct OrganizationWrite<'a> {
    pub name: Option<&'a str>,
    pub registration_number: Option<&'a str>,
    pub website: Option<&'a str>,
    pub address: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub email: Option<&'a str>,
    pub description: Option<&'a str>,
    pub logo: Option<&'a str>,
}

fn organization_conflict(constraint: &str) -> String {
    match constraint {
        "organizations_name_key" => "A sacco with this name already exists.".into(),
        "organizations_registration_number_key" => {
            "A sacco with this registration number already exists.".into()
        }
        "organizations_email_key" => "A sacco with this email already exists.".into(),
        _ => "Sacco already exists.".into(),
    }
}

#[derive(Clone)]
pub struct OrganizationRepository {
    pool: PgPool,
}

impl OrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  ORGANIZATIONS
    // =========================================================================

    pub async fn list(&self) -> Result<Vec<Organization>, AppError> {
        let organizations = sqlx::query_as::<_, Organization>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(organizations)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Organization>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let organization = sqlx::query_as::<_, Organization>(&format!(
            "SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(organization)
    }

    pub async fn create(&self, data: &OrganizationWrite<'_>) -> Result<Organization, AppError> {
        sqlx::query_as::<_, Organization>(&format!(
            r#"
            INSERT INTO organizations (
                name, registration_number, website, address,
                phone_number, email, description, logo
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        ))
        .bind(data.name)
        .bind(data.registration_number)
        .bind(data.website)
        .bind(data.address)
        .bind(data.phone_number)
        .bind(data.email)
        .bind(data.description)
        .bind(data.logo)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, organization_conflict))
    }

    // Only the provided columns change; `verified` is never touched here
    pub async fn update(
        &self,
        id: Uuid,
        data: &OrganizationWrite<'_>,
    ) -> Result<Option<Organization>, AppError> {
        sqlx::query_as::<_, Organization>(&format!(
            r#"
            UPDATE organizations SET
                name = COALESCE($2, name),
                registration_number = COALESCE($3, registration_number),
                website = COALESCE($4, website),
                address = COALESCE($5, address),
                phone_number = COALESCE($6, phone_number),
                email = COALESCE($7, email),
                description = COALESCE($8, description),
                logo = COALESCE($9, logo),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ORGANIZATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(data.name)
        .bind(data.registration_number)
        .bind(data.website)
        .bind(data.address)
        .bind(data.phone_number)
        .bind(data.email)
        .bind(data.description)
        .bind(data.logo)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, organization_conflict))
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_verified<'e, E>(&self, executor: E, id: Uuid, verified: bool) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE organizations SET verified = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(verified)
            .execute(executor)
            .await?;

        Ok(())
    }

    // =========================================================================
    //  MANAGEMENT (audit trail, insert only)
    // =========================================================================

    pub async fn append_management_record<'e, E>(
        &self,
        executor: E,
        organization_id: Uuid,
        status: ManagementStatus,
        recorded_by: Uuid,
    ) -> Result<ManagementRecord, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let record = sqlx::query_as::<_, ManagementRecord>(
            r#"
            INSERT INTO organization_management (organization_id, status, recorded_by)
            VALUES ($1, $2, $3)
            RETURNING id, organization_id, status, recorded_by, created_at
            "#,
        )
        .bind(organization_id)
        .bind(status)
        .bind(recorded_by)
        .fetch_one(executor)
        .await?;

        Ok(record)
    }

    /// `visible_to = None` lists everything; otherwise only records of organizations
    /// where that user holds an approved membership.
    pub async fn list_management_records(
        &self,
        visible_to: Option<Uuid>,
    ) -> Result<Vec<ManagementRecord>, AppError> {
        let sql = format!(
            "SELECT {MANAGEMENT_COLUMNS} FROM organization_management mr \
             WHERE {MANAGEMENT_VISIBLE} ORDER BY mr.created_at DESC"
        );

        let records = sqlx::query_as::<_, ManagementRecord>(&sql)
            .bind(visible_to)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Same visibility rule as `list_management_records`.
    pub async fn find_management_record(
        &self,
        id: Uuid,
        visible_to: Option<Uuid>,
    ) -> Result<Option<ManagementRecord>, AppError> {
        let sql = format!(
            "SELECT {MANAGEMENT_COLUMNS} FROM organization_management mr \
             WHERE mr.id = $2 AND ({MANAGEMENT_VISIBLE})"
        );

        let record = sqlx::query_as::<_, ManagementRecord>(&sql)
            .bind(visible_to)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    // =========================================================================
    //  FIELD DEFINITIONS (the registration form)
    // =========================================================================

    pub async fn list_field_definitions<'e, E>(
        &self,
        executor: E,
        organization_id: Uuid,
    ) -> Result<Vec<FieldDefinition>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let fields = sqlx::query_as::<_, FieldDefinition>(&format!(
            r#"
            SELECT {FIELD_COLUMNS}
            FROM field_definitions
            WHERE organization_id = $1
            ORDER BY display_order ASC, key ASC
            "#
        ))
        .bind(organization_id)
        .fetch_all(executor)
        .await?;

        Ok(fields)
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
        sqlx::query_as::<_, FieldDefinition>(&format!(
            r#"
            INSERT INTO field_definitions (
                organization_id, key, label, field_type, required, display_order
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {FIELD_COLUMNS}
            "#
        ))
        .bind(organization_id)
        .bind(key)
        .bind(label)
        .bind(field_type)
        .bind(required)
        .bind(display_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, |_| format!("The key '{}' already exists.", key)))
    }

    // The key is immutable, so it is not part of the update
    pub async fn update_field_definition(
        &self,
        organization_id: Uuid,
        field_id: Uuid,
        label: Option<&str>,
        field_type: Option<FieldType>,
        required: Option<bool>,
        display_order: Option<i32>,
    ) -> Result<Option<FieldDefinition>, AppError> {
        let field = sqlx::query_as::<_, FieldDefinition>(&format!(
            r#"
            UPDATE field_definitions SET
                label = COALESCE($3, label),
                field_type = COALESCE($4, field_type),
                required = COALESCE($5, required),
                display_order = COALESCE($6, display_order)
            WHERE id = $2 AND organization_id = $1
            RETURNING {FIELD_COLUMNS}
            "#
        ))
        .bind(organization_id)
        .bind(field_id)
        .bind(label)
        .bind(field_type)
        .bind(required)
        .bind(display_order)
        .fetch_optional(&self.pool)
        .await?;

        Ok(field)
    }

    pub async fn delete_field_definition(&self, organization_id: Uuid, field_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM field_definitions WHERE id = $2 AND organization_id = $1")
            .bind(organization_id)
            .bind(field_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
