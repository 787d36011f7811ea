// src/db/user_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::{map_unique_violation, AppError},
    models::auth::{Profile, User},
};

const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, is_active, is_staff, created_at, updated_at";

// Everything that touches 'users', 'profiles' and 'revoked_tokens'
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn create_user<'e, E>(
        &self,
        executor: E,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        is_staff: bool,
    ) -> Result<User, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, is_staff)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(is_staff)
        .fetch_one(executor)
        .await
        .map_err(|e| map_unique_violation(e, |_| "A user with this email already exists.".into()))
    }

    // =========================================================================
    //  REFRESH TOKEN BLACKLIST
    // =========================================================================

    pub async fn revoke_token(
        &self,
        jti: Uuid,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn is_token_revoked(&self, jti: Uuid) -> Result<bool, AppError> {
        let revoked: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM revoked_tokens WHERE jti = $1)")
                .bind(jti)
                .fetch_one(&self.pool)
                .await?;

        Ok(revoked)
    }

    // =========================================================================
    //  PROFILES
    // =========================================================================

    pub async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT user_id, phone_number, profile_picture, bio, created_at, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    /// Creates the profile on first write, otherwise patches the provided fields.
    pub async fn upsert_profile(
        &self,
        user_id: Uuid,
        phone_number: Option<&str>,
        profile_picture: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Profile, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (user_id, phone_number, profile_picture, bio)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                phone_number = COALESCE(EXCLUDED.phone_number, profiles.phone_number),
                profile_picture = COALESCE(EXCLUDED.profile_picture, profiles.profile_picture),
                bio = COALESCE(EXCLUDED.bio, profiles.bio),
                updated_at = NOW()
            RETURNING user_id, phone_number, profile_picture, bio, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(phone_number)
        .bind(profile_picture)
        .bind(bio)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }
}
