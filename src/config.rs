// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{LedgerRepository, MembershipRepository, OrganizationRepository, PaymentsRepository, UserRepository},
    services::{
        auth::{AuthService, TokenKeys},
        events::{spawn_consumer, EventPublisher},
        ledger_service::LedgerService,
        membership_service::MembershipService,
        organization_service::OrganizationService,
        payments_service::PaymentsService,
    },
};

// Settings read once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub max_connections: u32,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    // Bootstrap superuser, both or neither
    pub admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        let number = |key: &str, default: i64| -> anyhow::Result<i64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .with_context(|| format!("{key} must be a positive integer, got '{raw}'")),
                None => Ok(default),
            }
        };

        // Tokens expire at `now + ttl`, which has to stay a valid timestamp.
        let ttl = |key: &str, default: i64, unit: fn(i64) -> Option<chrono::Duration>| -> anyhow::Result<chrono::Duration> {
            let amount = number(key, default)?;
            unit(amount)
                .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
                .with_context(|| format!("{key} is too large, got '{amount}'"))
        };

        let admin = match (lookup("ADMIN_EMAIL"), lookup("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            (None, None) => None,
            _ => return Err(anyhow!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together")),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            max_connections: u32::try_from(number("DATABASE_MAX_CONNECTIONS", 5)?)
                .context("DATABASE_MAX_CONNECTIONS is too large")?,
            access_token_ttl: ttl("ACCESS_TOKEN_TTL_MINUTES", 60, chrono::Duration::try_minutes)?,
            refresh_token_ttl: ttl("REFRESH_TOKEN_TTL_DAYS", 7, chrono::Duration::try_days)?,
            admin,
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: AuthService,
    pub organization_service: OrganizationService,
    pub membership_service: MembershipService,
    pub ledger_service: LedgerService,
    pub payments_service: PaymentsService,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let db_pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
            .context("Failed to connect to the database")?;

        tracing::info!("✅ Database connection established");

        Ok(Self::from_pool(db_pool, config))
    }

    // --- Dependency graph ---
    fn from_pool(db_pool: PgPool, config: &Config) -> Self {
        let user_repo = UserRepository::new(db_pool.clone());
        let organization_repo = OrganizationRepository::new(db_pool.clone());
        let membership_repo = MembershipRepository::new(db_pool.clone());
        let ledger_repo = LedgerRepository::new(db_pool.clone());
        let payments_repo = PaymentsRepository::new(db_pool.clone());

        let keys = TokenKeys::new(
            config.jwt_secret.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        );

        let auth_service = AuthService::new(user_repo, keys, db_pool.clone());
        let organization_service = OrganizationService::new(organization_repo.clone(), db_pool.clone());
        let membership_service =
            MembershipService::new(membership_repo.clone(), organization_repo, db_pool.clone());
        let payments_service = PaymentsService::new(payments_repo, db_pool.clone());

        // Savings flow to the payments ledger in the background
        let (publisher, events) = EventPublisher::channel();
        spawn_consumer(events, Arc::new(payments_service.clone()));

        let ledger_service = LedgerService::new(ledger_repo, membership_repo, publisher, db_pool.clone());

        Self {
            db_pool,
            auth_service,
            organization_service,
            membership_service,
            ledger_service,
            payments_service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/sacco"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(60));
        assert_eq!(config.refresh_token_ttl, chrono::Duration::days(7));
        assert!(config.admin.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("DATABASE_MAX_CONNECTIONS", "20"),
            ("ACCESS_TOKEN_TTL_MINUTES", "15"),
            ("ADMIN_EMAIL", "admin@example.com"),
            ("ADMIN_PASSWORD", "StrongPass123"),
        ]);

        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.access_token_ttl, chrono::Duration::minutes(15));
        assert_eq!(
            config.admin,
            Some(("admin@example.com".to_string(), "StrongPass123".to_string()))
        );
    }

    #[test]
    fn secrets_are_required() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));

        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "s")])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let mut vars = BASE.to_vec();
        vars.push(("REFRESH_TOKEN_TTL_DAYS", "soon"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());

        let mut vars = BASE.to_vec();
        vars.push(("DATABASE_MAX_CONNECTIONS", "0"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn oversized_token_lifetimes_are_rejected() {
        for (key, raw) in [
            ("ACCESS_TOKEN_TTL_MINUTES", "9223372036854775807"),
            ("REFRESH_TOKEN_TTL_DAYS", "9223372036854775807"),
            // fits in a Duration, but not once added to the current time
            ("REFRESH_TOKEN_TTL_DAYS", "100000000000"),
        ] {
            let mut vars = BASE.to_vec();
            vars.push((key, raw));
            let err = Config::from_lookup(lookup(&vars)).unwrap_err();
            assert!(err.to_string().contains(key), "{key}={raw}: {err}");
        }

        let mut vars = BASE.to_vec();
        vars.push(("REFRESH_TOKEN_TTL_DAYS", "365"));
        assert_eq!(
            Config::from_lookup(lookup(&vars)).unwrap().refresh_token_ttl,
            chrono::Duration::days(365)
        );
    }

    #[test]
    fn half_configured_admin_is_an_error() {
        let mut vars = BASE.to_vec();
        vars.push(("ADMIN_EMAIL", "admin@example.com"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
