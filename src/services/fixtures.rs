// src/services/fixtures.rs

// Rows and wiring shared by the database-backed service tests.

use std::collections::BTreeMap;

use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    db::{
        organization_repo::OrganizationWrite, payments_repo::ProviderWrite, LedgerRepository,
        MembershipRepository, OrganizationRepository, PaymentsRepository, UserRepository,
    },
    models::{
        auth::User,
        ledger::{ServiceCategory, ServiceOffering},
        membership::{FieldType, MembershipAction},
        organization::Organization,
    },
    services::{
        events::{EventPublisher, LedgerEvent},
        ledger_service::LedgerService,
        membership_service::MembershipService,
        organization_service::OrganizationService,
        payments_service::PaymentsService,
    },
};

pub struct Services {
    pub organizations: OrganizationService,
    pub memberships: MembershipService,
    pub ledger: LedgerService,
    pub payments: PaymentsService,
    // Published ledger events, drained by hand instead of by a consumer task
    pub events: mpsc::UnboundedReceiver<LedgerEvent>,
}

pub fn services(pool: &PgPool) -> Services {
    let (publisher, events) = EventPublisher::channel();

    Services {
        organizations: OrganizationService::new(OrganizationRepository::new(pool.clone()), pool.clone()),
        memberships: MembershipService::new(
            MembershipRepository::new(pool.clone()),
            OrganizationRepository::new(pool.clone()),
            pool.clone(),
        ),
        ledger: LedgerService::new(
            LedgerRepository::new(pool.clone()),
            MembershipRepository::new(pool.clone()),
            publisher,
            pool.clone(),
        ),
        payments: PaymentsService::new(PaymentsRepository::new(pool.clone()), pool.clone()),
        events,
    }
}

pub async fn user(pool: &PgPool, is_staff: bool) -> User {
    let email = format!("{}@example.com", Uuid::new_v4());
    UserRepository::new(pool.clone())
        .create_user(pool, &email, "not-a-real-hash", "Test", "User", is_staff)
        .await
        .unwrap()
}

pub async fn sacco(services: &Services, name: &str) -> Organization {
    let suffix = Uuid::new_v4().simple().to_string();
    let registration_number = format!("SAC-{}", &suffix[..8]);
    let email = format!("info-{suffix}@sacco.co.ke");

    services
        .organizations
        .create(&OrganizationWrite {
            name: Some(name),
            registration_number: Some(&registration_number),
            email: Some(&email),
            ..Default::default()
        })
        .await
        .unwrap()
}

pub async fn required_text_field(services: &Services, organization_id: Uuid, key: &str) {
    services
        .organizations
        .create_field_definition(organization_id, key, key, FieldType::Text, true, 0)
        .await
        .unwrap();
}

pub async fn savings_product(services: &Services, organization_id: Uuid) -> ServiceOffering {
    services
        .ledger
        .create_service(organization_id, "Jijenge Savings", ServiceCategory::Savings, None)
        .await
        .unwrap()
}

pub async fn active_provider(services: &Services) {
    services
        .payments
        .create_provider(&ProviderWrite {
            name: Some("M-Pesa"),
            provider_code: Some("MPESA"),
            api_key: None,
            api_secret: None,
            callback_url: None,
            is_active: Some(true),
        })
        .await
        .unwrap();
}

/// Joins `organization_id` and has `admin` approve the request.
pub async fn approved_member(services: &Services, pool: &PgPool, admin: &User, organization_id: Uuid) -> User {
    let member = user(pool, false).await;
    let detail = services
        .memberships
        .request_join(&member, organization_id, &BTreeMap::new())
        .await
        .unwrap();
    services
        .memberships
        .transition(detail.membership.id, MembershipAction::Approve, admin)
        .await
        .unwrap();
    member
}

pub fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
