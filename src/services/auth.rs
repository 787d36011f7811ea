// src/services/auth.rs

use bcrypt::{hash, verify};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{AccessToken, Claims, Profile, TokenPair, TokenType, User},
};

// Signs and verifies the JWTs. Holds no state besides the secret and lifetimes.
#[derive(Clone)]
pub struct TokenKeys {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: String, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self { secret, access_ttl, refresh_ttl }
    }

    pub fn issue(&self, user_id: Uuid, token_type: TokenType) -> Result<String, AppError> {
        let now = Utc::now();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: user_id,
            exp: (now + ttl).timestamp().max(0) as usize,
            iat: now.timestamp() as usize,
            jti: Uuid::new_v4(),
            token_type,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )?)
    }

    /// Verifies signature and expiry, and that the token is of the expected kind.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;

        if token_data.claims.token_type != expected {
            return Err(AppError::InvalidToken);
        }

        Ok(token_data.claims)
    }
}

#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    keys: TokenKeys,
    pool: PgPool,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, keys: TokenKeys, pool: PgPool) -> Self {
        Self { user_repo, keys, pool }
    }

    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User, AppError> {
        let password_hash = hash_password(password).await?;

        let user = self
            .user_repo
            .create_user(&self.pool, email, &password_hash, first_name, last_name, false)
            .await?;

        tracing::info!(user_id = %user.id, "👤 User registered");
        Ok(user)
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self
            .user_repo
            .find_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // bcrypt is CPU bound, keep it off the async workers
        let is_password_valid =
            tokio::task::spawn_blocking(move || verify(&password_clone, &password_hash_clone))
                .await
                .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))??;

        if !is_password_valid || !user.is_active {
            return Err(AppError::InvalidCredentials);
        }

        Ok(TokenPair {
            access: self.keys.issue(user.id, TokenType::Access)?,
            refresh: self.keys.issue(user.id, TokenType::Refresh)?,
        })
    }

    /// Resolves an access token into the acting user.
    pub async fn current_actor(&self, token: &str) -> Result<User, AppError> {
        let claims = self.keys.verify(token, TokenType::Access)?;

        let user = self
            .user_repo
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        if !user.is_active {
            return Err(AppError::InvalidToken);
        }

        Ok(user)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken, AppError> {
        let claims = self.keys.verify(refresh_token, TokenType::Refresh)?;

        if self.user_repo.is_token_revoked(claims.jti).await? {
            return Err(AppError::InvalidToken);
        }

        let user = self
            .user_repo
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AppError::InvalidToken)?;

        Ok(AccessToken {
            access: self.keys.issue(user.id, TokenType::Access)?,
        })
    }

    /// Blacklists the refresh token so it can no longer mint access tokens.
    pub async fn logout(&self, user: &User, refresh_token: &str) -> Result<(), AppError> {
        let claims = self.keys.verify(refresh_token, TokenType::Refresh)?;

        if claims.sub != user.id {
            return Err(AppError::InvalidToken);
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp as i64, 0).unwrap_or_else(Utc::now);
        self.user_repo.revoke_token(claims.jti, user.id, expires_at).await?;

        tracing::info!(user_id = %user.id, "🔒 Refresh token revoked");
        Ok(())
    }

    /// The user's profile, created empty on first access.
    pub async fn profile(&self, user: &User) -> Result<Profile, AppError> {
        match self.user_repo.find_profile(user.id).await? {
            Some(profile) => Ok(profile),
            None => self.user_repo.upsert_profile(user.id, None, None, None).await,
        }
    }

    pub async fn update_profile(
        &self,
        user: &User,
        phone_number: Option<&str>,
        profile_picture: Option<&str>,
        bio: Option<&str>,
    ) -> Result<Profile, AppError> {
        self.user_repo
            .upsert_profile(user.id, phone_number, profile_picture, bio)
            .await
    }

    /// Creates the configured superuser once; later boots leave it alone.
    pub async fn ensure_superuser(&self, email: &str, password: &str) -> Result<(), AppError> {
        if self.user_repo.find_by_email(email).await?.is_some() {
            tracing::info!("Superuser already exists.");
            return Ok(());
        }

        let password_hash = hash_password(password).await?;
        self.user_repo
            .create_user(&self.pool, email, &password_hash, "", "", true)
            .await?;

        tracing::info!("✅ Superuser {} created", email);
        Ok(())
    }
}

async fn hash_password(password: &str) -> Result<String, AppError> {
    let password_clone = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || hash(&password_clone, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))??;

    Ok(hashed)
}
