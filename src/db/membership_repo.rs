// src/db/membership_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::membership::{FieldValue, Membership, MembershipStatus},
};

const MEMBERSHIP_COLUMNS: &str =
    "id, user_id, organization_id, status, is_active, date_joined, updated_at";

#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn exists_for<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM memberships
                WHERE user_id = $1 AND organization_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// True when the user may transact against the organization's services.
    pub async fn is_approved_member(&self, user_id: Uuid, organization_id: Uuid) -> Result<bool, AppError> {
        let approved: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM memberships
                WHERE user_id = $1
                  AND organization_id = $2
                  AND status = 'approved'
                  AND is_active = true
            )
            "#,
        )
        .bind(user_id)
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(approved)
    }

    pub async fn create<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Membership, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Membership>(&format!(
            r#"
            INSERT INTO memberships (user_id, organization_id, status, is_active)
            VALUES ($1, $2, 'pending', true)
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(organization_id)
        .fetch_one(executor)
        .await
        // Two concurrent join requests: the loser lands here
        .map_err(|e| map_unique_violation(e, |_| "You already joined this sacco.".into()))
    }

    pub async fn insert_field_value<'e, E>(
        &self,
        executor: E,
        membership_id: Uuid,
        field_definition_id: Uuid,
        value: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO membership_field_values (membership_id, field_definition_id, value)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(membership_id)
        .bind(field_definition_id)
        .bind(value)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Reads the row under `FOR UPDATE` so concurrent transitions serialize.
    pub async fn lock_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Membership>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let membership = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(membership)
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: MembershipStatus,
        is_active: bool,
    ) -> Result<Membership, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let membership = sqlx::query_as::<_, Membership>(&format!(
            r#"
            UPDATE memberships
            SET status = $2, is_active = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .bind(is_active)
        .fetch_one(executor)
        .await?;

        Ok(membership)
    }

    /// `owner = None` lists every membership.
    pub async fn list(
        &self,
        owner: Option<Uuid>,
        organization_id: Option<Uuid>,
        status: Option<MembershipStatus>,
    ) -> Result<Vec<Membership>, AppError> {
        let memberships = sqlx::query_as::<_, Membership>(&format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS}
            FROM memberships
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::uuid IS NULL OR organization_id = $2)
              AND ($3::membership_status IS NULL OR status = $3)
            ORDER BY date_joined DESC
            "#
        ))
        .bind(owner)
        .bind(organization_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    pub async fn list_field_values<'e, E>(
        &self,
        executor: E,
        membership_id: Uuid,
    ) -> Result<Vec<FieldValue>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let values = sqlx::query_as::<_, FieldValue>(
            r#"
            SELECT v.field_definition_id, d.key, d.label, v.value
            FROM membership_field_values v
            JOIN field_definitions d ON d.id = v.field_definition_id
            WHERE v.membership_id = $1
            ORDER BY d.display_order ASC, d.key ASC
            "#,
        )
        .bind(membership_id)
        .fetch_all(executor)
        .await?;

        Ok(values)
    }
}
