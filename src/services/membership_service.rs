// src/services/membership_service.rs

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;
use validator::ValidateEmail;

use crate::{
    common::error::{AppError, FIELD_REQUIRED, FIELD_UNKNOWN},
    db::{MembershipRepository, OrganizationRepository},
    middleware::policy::{Capability, Policy},
    models::{
        auth::User,
        membership::{FieldDefinition, FieldType, Membership, MembershipAction, MembershipDetail, MembershipStatus},
    },
};

#[derive(Clone)]
pub struct MembershipService {
    repo: MembershipRepository,
    organization_repo: OrganizationRepository,
    pool: PgPool,
}

impl MembershipService {
    pub fn new(repo: MembershipRepository, organization_repo: OrganizationRepository, pool: PgPool) -> Self {
        Self { repo, organization_repo, pool }
    }

    /// Creates a pending membership together with its form answers.
    pub async fn request_join(
        &self,
        actor: &User,
        organization_id: Uuid,
        submitted: &BTreeMap<String, String>,
    ) -> Result<MembershipDetail, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. The sacco must exist
        if self
            .organization_repo
            .find_by_id(&mut *tx, organization_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("Sacco"));
        }

        // 2. One membership per (user, sacco), whatever its status
        if self.repo.exists_for(&mut *tx, actor.id, organization_id).await? {
            return Err(AppError::Conflict("You already joined this sacco.".into()));
        }

        // 3. Check the answers against the sacco's form
        let definitions = self
            .organization_repo
            .list_field_definitions(&mut *tx, organization_id)
            .await?;
        validate_submission(&definitions, submitted)?;

        // 4. Persist membership + values
        let membership = self.repo.create(&mut *tx, actor.id, organization_id).await?;

        for definition in &definitions {
            if let Some(value) = submitted.get(&definition.key) {
                self.repo
                    .insert_field_value(&mut *tx, membership.id, definition.id, value)
                    .await?;
            }
        }

        let fields = self.repo.list_field_values(&mut *tx, membership.id).await?;

        tx.commit().await?;

        tracing::info!(
            membership_id = %membership.id,
            user_id = %actor.id,
            %organization_id,
            "📝 Join request submitted"
        );

        Ok(MembershipDetail { membership, fields })
    }

    pub async fn transition(
        &self,
        membership_id: Uuid,
        action: MembershipAction,
        actor: &User,
    ) -> Result<Membership, AppError> {
        // Approve/Reject are admin decisions, refused before any lookup
        if matches!(action, MembershipAction::Approve | MembershipAction::Reject) {
            Policy::check(actor, &Capability::MembershipDecide)?;
        }

        let mut tx = self.pool.begin().await?;

        let mut membership = self
            .repo
            .lock_by_id(&mut *tx, membership_id)
            .await?
            .ok_or(AppError::NotFound("Membership"))?;

        if action == MembershipAction::Leave {
            Policy::check(actor, &Capability::SelfOrAdmin { owner: membership.user_id })?;
        }

        let from = membership.status;
        membership.transition(action)?;

        let membership = self
            .repo
            .update_status(&mut *tx, membership.id, membership.status, membership.is_active)
            .await?;

        tx.commit().await?;

        tracing::info!(
            %membership_id,
            actor_id = %actor.id,
            from = from.as_str(),
            to = membership.status.as_str(),
            "Membership {}",
            action.verb()
        );

        Ok(membership)
    }

    pub async fn list(
        &self,
        actor: &User,
        organization_id: Option<Uuid>,
        status: Option<MembershipStatus>,
    ) -> Result<Vec<Membership>, AppError> {
        let owner = Policy::scope(actor).owner();
        self.repo.list(owner, organization_id, status).await
    }

    pub async fn retrieve(&self, membership_id: Uuid, actor: &User) -> Result<MembershipDetail, AppError> {
        let membership = self
            .repo
            .find_by_id(membership_id)
            .await?
            // Someone else's membership looks exactly like a missing one
            .filter(|m| Policy::scope(actor).permits(m.user_id))
            .ok_or(AppError::NotFound("Membership"))?;

        let fields = self.repo.list_field_values(&self.pool, membership.id).await?;

        Ok(MembershipDetail { membership, fields })
    }
}

/// Checks submitted answers against the organization's form. Every problem is
/// collected, keyed by field, before failing.
pub fn validate_submission(
    definitions: &[FieldDefinition],
    submitted: &BTreeMap<String, String>,
) -> Result<(), AppError> {
    let mut errors = BTreeMap::new();

    for definition in definitions {
        let value = submitted.get(&definition.key).map(|v| v.trim()).unwrap_or("");

        if value.is_empty() {
            if definition.required {
                errors.insert(definition.key.clone(), FIELD_REQUIRED.to_string());
            }
            continue;
        }

        if let Err(message) = check_type(definition.field_type, value) {
            errors.insert(definition.key.clone(), message.to_string());
        }
    }

    for key in submitted.keys() {
        if !definitions.iter().any(|d| &d.key == key) {
            errors.insert(key.clone(), FIELD_UNKNOWN.to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::FieldValidation(errors))
    }
}

fn check_type(field_type: FieldType, value: &str) -> Result<(), &'static str> {
    match field_type {
        FieldType::Number => Decimal::from_str(value)
            .map(|_| ())
            .map_err(|_| "must be a number"),
        FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| "must be a date (YYYY-MM-DD)"),
        FieldType::Email => {
            if value.validate_email() {
                Ok(())
            } else {
                Err("must be a valid email address")
            }
        }
        // opaque references
        FieldType::Text | FieldType::File => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn definition(key: &str, field_type: FieldType, required: bool) -> FieldDefinition {
        FieldDefinition {
            id: Uuid::new_v4(),
            organization_id: Uuid::nil(),
            key: key.into(),
            label: key.to_uppercase(),
            field_type,
            required,
            display_order: 0,
            created_at: Utc::now(),
        }
    }

    fn submission(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn field_errors(result: Result<(), AppError>) -> BTreeMap<String, String> {
        match result {
            Err(AppError::FieldValidation(fields)) => fields,
            other => panic!("expected field validation error, got {other:?}"),
        }
    }

    #[test]
    fn complete_submission_passes() {
        let defs = vec![
            definition("national_id", FieldType::Text, true),
            definition("nickname", FieldType::Text, false),
        ];
        assert!(validate_submission(&defs, &submission(&[("national_id", "12345")])).is_ok());
    }

    #[test]
    fn missing_required_field() {
        let defs = vec![definition("national_id", FieldType::Text, true)];
        let errors = field_errors(validate_submission(&defs, &submission(&[])));
        assert_eq!(errors["national_id"], FIELD_REQUIRED);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn whitespace_counts_as_missing() {
        let defs = vec![definition("national_id", FieldType::Text, true)];
        let errors = field_errors(validate_submission(&defs, &submission(&[("national_id", "   ")])));
        assert_eq!(errors["national_id"], FIELD_REQUIRED);
    }

    #[test]
    fn unknown_key_is_reported() {
        let defs = vec![definition("national_id", FieldType::Text, true)];
        let errors = field_errors(validate_submission(
            &defs,
            &submission(&[("national_id", "12345"), ("favourite_colour", "blue")]),
        ));
        assert_eq!(errors["favourite_colour"], FIELD_UNKNOWN);
        assert!(!errors.contains_key("national_id"));
    }

    #[test]
    fn every_problem_is_collected() {
        let defs = vec![
            definition("national_id", FieldType::Text, true),
            definition("born_on", FieldType::Date, true),
        ];
        let errors = field_errors(validate_submission(&defs, &submission(&[("extra", "x")])));
        assert_eq!(errors.len(), 3);
        assert_eq!(errors["national_id"], FIELD_REQUIRED);
        assert_eq!(errors["born_on"], FIELD_REQUIRED);
        assert_eq!(errors["extra"], FIELD_UNKNOWN);
    }

    #[test]
    fn no_definitions_accepts_empty_submission() {
        assert!(validate_submission(&[], &submission(&[])).is_ok());
        let errors = field_errors(validate_submission(&[], &submission(&[("anything", "1")])));
        assert_eq!(errors["anything"], FIELD_UNKNOWN);
    }

    #[test]
    fn typed_values_are_checked() {
        let defs = vec![
            definition("income", FieldType::Number, false),
            definition("born_on", FieldType::Date, false),
            definition("contact", FieldType::Email, false),
            definition("id_scan", FieldType::File, false),
        ];

        let ok = submission(&[
            ("income", "25000.50"),
            ("born_on", "1990-04-12"),
            ("contact", "jane@example.com"),
            ("id_scan", "uploads/ids/jane.png"),
        ]);
        assert!(validate_submission(&defs, &ok).is_ok());

        let bad = submission(&[
            ("income", "a lot"),
            ("born_on", "12/04/1990"),
            ("contact", "not-an-email"),
        ]);
        let errors = field_errors(validate_submission(&defs, &bad));
        assert_eq!(errors.len(), 3);
        assert!(errors.contains_key("income"));
        assert!(errors.contains_key("born_on"));
        assert!(errors.contains_key("contact"));
    }

    #[test]
    fn blank_optional_field_skips_type_check() {
        let defs = vec![definition("income", FieldType::Number, false)];
        assert!(validate_submission(&defs, &submission(&[("income", "")])).is_ok());
    }
}

// Run with: DATABASE_URL=postgres://... cargo test -- --ignored
#[cfg(test)]
mod workflow {
    use super::*;
    use crate::services::fixtures::{self, answers};

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn test_sacco_join_approve_leave(pool: PgPool) {
        let services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let member = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        fixtures::required_text_field(&services, sacco.id, "national_id").await;

        // the required key is named when missing
        match services.memberships.request_join(&member, sacco.id, &answers(&[])).await {
            Err(AppError::FieldValidation(fields)) => assert_eq!(fields["national_id"], FIELD_REQUIRED),
            other => panic!("unexpected {other:?}"),
        }

        let detail = services
            .memberships
            .request_join(&member, sacco.id, &answers(&[("national_id", "12345")]))
            .await
            .unwrap();
        assert_eq!(detail.membership.status, MembershipStatus::Pending);
        assert_eq!(detail.fields.len(), 1);
        assert_eq!(detail.fields[0].value, "12345");

        let id = detail.membership.id;

        let approved = services.memberships.transition(id, MembershipAction::Approve, &admin).await.unwrap();
        assert_eq!(approved.status, MembershipStatus::Approved);
        assert!(approved.is_active);

        let left = services.memberships.transition(id, MembershipAction::Leave, &member).await.unwrap();
        assert_eq!(left.status, MembershipStatus::Left);
        assert!(!left.is_active);
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn second_join_request_is_a_conflict(pool: PgPool) {
        let services = fixtures::services(&pool);
        let member = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;

        services.memberships.request_join(&member, sacco.id, &answers(&[])).await.unwrap();

        let err = services
            .memberships
            .request_join(&member, sacco.id, &answers(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let rows = services.memberships.list(&member, Some(sacco.id), None).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn failed_answer_insert_leaves_no_membership(pool: PgPool) {
        let services = fixtures::services(&pool);
        let member = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;
        fixtures::required_text_field(&services, sacco.id, "national_id").await;

        // passes validation, but Postgres refuses NUL bytes in TEXT
        let result = services
            .memberships
            .request_join(&member, sacco.id, &answers(&[("national_id", "123\u{0}45")]))
            .await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));

        let rows = services.memberships.list(&member, Some(sacco.id), None).await.unwrap();
        assert!(rows.is_empty());

        // and the user is free to try again
        services
            .memberships
            .request_join(&member, sacco.id, &answers(&[("national_id", "12345")]))
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn strangers_cannot_leave_for_a_member(pool: PgPool) {
        let services = fixtures::services(&pool);
        let member = fixtures::user(&pool, false).await;
        let stranger = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;

        let detail = services.memberships.request_join(&member, sacco.id, &answers(&[])).await.unwrap();
        let id = detail.membership.id;

        let err = services
            .memberships
            .transition(id, MembershipAction::Leave, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = services
            .memberships
            .transition(id, MembershipAction::Approve, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let unchanged = services.memberships.retrieve(id, &member).await.unwrap();
        assert_eq!(unchanged.membership.status, MembershipStatus::Pending);

        // outside the stranger's scope altogether
        assert!(matches!(
            services.memberships.retrieve(id, &stranger).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[sqlx::test]
    #[ignore = "needs DATABASE_URL pointing at a Postgres server"]
    async fn rejected_member_can_still_leave(pool: PgPool) {
        let services = fixtures::services(&pool);
        let admin = fixtures::user(&pool, true).await;
        let member = fixtures::user(&pool, false).await;
        let sacco = fixtures::sacco(&services, "TestSacco").await;

        let detail = services.memberships.request_join(&member, sacco.id, &answers(&[])).await.unwrap();
        let id = detail.membership.id;

        services.memberships.transition(id, MembershipAction::Reject, &admin).await.unwrap();
        let left = services.memberships.transition(id, MembershipAction::Leave, &member).await.unwrap();
        assert_eq!(left.status, MembershipStatus::Left);
    }
}
