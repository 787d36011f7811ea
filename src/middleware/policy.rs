// src/middleware/policy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::{common::error::AppError, models::auth::User};

/// What an operation requires from the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Authenticated,
    OrganizationManage,
    FieldDefinitionManage,
    ManagementAudit,
    MembershipDecide,
    ServiceManage,
    LoanDecide,
    PaymentSettle,
    ProviderManage,
    CallbackManage,
    // The record's own user, or an admin
    SelfOrAdmin { owner: Uuid },
}

impl Capability {
    pub fn slug(&self) -> &'static str {
        match self {
            Capability::Authenticated => "session.authenticated",
            Capability::OrganizationManage => "organization.manage",
            Capability::FieldDefinitionManage => "organization.fields.manage",
            Capability::ManagementAudit => "organization.management",
            Capability::MembershipDecide => "membership.decide",
            Capability::ServiceManage => "service.manage",
            Capability::LoanDecide => "loan.decide",
            Capability::PaymentSettle => "payment.settle",
            Capability::ProviderManage => "payment.provider.manage",
            Capability::CallbackManage => "payment.callback.manage",
            Capability::SelfOrAdmin { .. } => "record.self-or-admin",
        }
    }
}

/// Which rows of a per-member table an actor may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScope {
    All,
    Owner(Uuid),
}

impl RecordScope {
    /// Filter value for repository queries (`None` = no filter).
    pub fn owner(self) -> Option<Uuid> {
        match self {
            RecordScope::All => None,
            RecordScope::Owner(id) => Some(id),
        }
    }

    pub fn permits(self, owner: Uuid) -> bool {
        match self {
            RecordScope::All => true,
            RecordScope::Owner(id) => id == owner,
        }
    }
}

/// The single place that reads role flags.
pub struct Policy;

impl Policy {
    pub fn is_admin(user: &User) -> bool {
        user.is_active && user.is_staff
    }

    pub fn check(user: &User, capability: &Capability) -> Result<(), AppError> {
        if !user.is_active {
            return Err(AppError::Forbidden("This account is inactive.".into()));
        }

        let allowed = match capability {
            Capability::Authenticated => true,
            Capability::SelfOrAdmin { owner } => *owner == user.id || Self::is_admin(user),
            _ => Self::is_admin(user),
        };

        if allowed {
            Ok(())
        } else {
            tracing::debug!(user_id = %user.id, capability = capability.slug(), "capability denied");
            Err(AppError::Forbidden(format!(
                "You do not have the '{}' capability required for this action.",
                capability.slug()
            )))
        }
    }

    pub fn scope(user: &User) -> RecordScope {
        if Self::is_admin(user) {
            RecordScope::All
        } else {
            RecordScope::Owner(user.id)
        }
    }
}

// ---
// Capabilities checked before the handler runs
// ---

pub trait CapabilityDef: Send + Sync + 'static {
    fn capability() -> Capability;
}

/// Extractor: resolves the actor and enforces `T` once per request.
pub struct Require<T>(pub User, pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for Require<T>
where
    T: CapabilityDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<User>()
            .cloned()
            .ok_or(AppError::Unauthenticated)?;

        Policy::check(&user, &T::capability())?;

        Ok(Require(user, PhantomData))
    }
}

pub mod caps {
    use super::{Capability, CapabilityDef};

    macro_rules! capability {
        ($($name:ident),* $(,)?) => {
            $(
                pub struct $name;
                impl CapabilityDef for $name {
                    fn capability() -> Capability { Capability::$name }
                }
            )*
        };
    }

    // Decisions taken on a looked-up record (membership, loan, transaction)
    // are checked in their services instead.
    capability!(
        OrganizationManage,
        FieldDefinitionManage,
        ManagementAudit,
        ServiceManage,
        ProviderManage,
        CallbackManage,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(is_staff: bool) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            password_hash: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            is_staff,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_capabilities_need_staff() {
        let member = user(false);
        let admin = user(true);

        for cap in [
            Capability::OrganizationManage,
            Capability::MembershipDecide,
            Capability::LoanDecide,
            Capability::PaymentSettle,
        ] {
            assert!(matches!(Policy::check(&member, &cap), Err(AppError::Forbidden(_))));
            assert!(Policy::check(&admin, &cap).is_ok());
        }
    }

    #[test]
    fn self_or_admin() {
        let owner = user(false);
        let stranger = user(false);
        let admin = user(true);
        let cap = Capability::SelfOrAdmin { owner: owner.id };

        assert!(Policy::check(&owner, &cap).is_ok());
        assert!(Policy::check(&admin, &cap).is_ok());
        assert!(matches!(Policy::check(&stranger, &cap), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn inactive_accounts_are_refused() {
        let mut admin = user(true);
        admin.is_active = false;
        assert!(Policy::check(&admin, &Capability::Authenticated).is_err());
        assert!(!Policy::is_admin(&admin));
    }

    #[test]
    fn scope_follows_role() {
        let member = user(false);
        let admin = user(true);

        assert_eq!(Policy::scope(&admin), RecordScope::All);
        assert_eq!(Policy::scope(&member), RecordScope::Owner(member.id));
        assert_eq!(Policy::scope(&member).owner(), Some(member.id));
        assert!(Policy::scope(&member).permits(member.id));
        assert!(!Policy::scope(&member).permits(admin.id));
        assert!(Policy::scope(&admin).permits(member.id));
    }

    #[tokio::test]
    async fn require_rejects_anonymous_then_checks_role() {
        let request = axum::http::Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let err = Require::<caps::ServiceManage>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthenticated));

        parts.extensions.insert(user(false));
        let err = Require::<caps::ServiceManage>::from_request_parts(&mut parts, &())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));

        let admin = user(true);
        parts.extensions.insert(admin.clone());
        let Require(actor, _) = Require::<caps::ServiceManage>::from_request_parts(&mut parts, &())
            .await
            .ok()
            .unwrap();
        assert_eq!(actor.id, admin.id);
    }
}
