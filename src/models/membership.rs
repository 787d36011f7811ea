// src/models/membership.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// --- ENUMS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "field_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Email,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
    Rejected,
    Left,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Approved => "approved",
            MembershipStatus::Rejected => "rejected",
            MembershipStatus::Left => "left",
        }
    }
}

/// Lifecycle actions an actor can apply to an existing membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipAction {
    Approve,
    Reject,
    Leave,
}

impl MembershipAction {
    /// Resulting `(status, is_active)` when applied to `from`.
    ///
    /// `pending -> {approved, rejected}`. `Leave` ends any membership, whatever its
    /// status. Re-applying the action that produced the current state is a no-op.
    /// Everything else is rejected.
    pub fn apply(self, from: MembershipStatus) -> Result<(MembershipStatus, bool), AppError> {
        use MembershipStatus::*;

        match (self, from) {
            (MembershipAction::Approve, Pending | Approved) => Ok((Approved, true)),
            (MembershipAction::Reject, Pending | Rejected) => Ok((Rejected, false)),
            (MembershipAction::Leave, _) => Ok((Left, false)),
            (action, from) => Err(AppError::InvalidState(format!(
                "Cannot {} a membership that is {}.",
                action.verb(),
                from.as_str()
            ))),
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            MembershipAction::Approve => "approve",
            MembershipAction::Reject => "reject",
            MembershipAction::Leave => "leave",
        }
    }
}

// --- DEFINITIONS (the per-organization form) ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FieldDefinition {
    pub id: Uuid,
    pub organization_id: Uuid,

    #[schema(example = "national_id")]
    pub key: String, // immutable once created
    #[schema(example = "National ID")]
    pub label: String,

    pub field_type: FieldType,
    pub required: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

// --- MEMBERSHIP ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub status: MembershipStatus,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    /// Moves the membership through its lifecycle in place.
    pub fn transition(&mut self, action: MembershipAction) -> Result<(), AppError> {
        let (status, is_active) = action.apply(self.status)?;
        self.status = status;
        self.is_active = is_active;
        Ok(())
    }
}

// One answer of the dynamic form, joined with its definition for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FieldValue {
    pub field_definition_id: Uuid,
    #[schema(example = "national_id")]
    pub key: String,
    pub label: String,
    #[schema(example = "12345")]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MembershipDetail {
    #[serde(flatten)]
    pub membership: Membership,
    pub fields: Vec<FieldValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use MembershipAction::*;
    use MembershipStatus::*;

    fn pending() -> Membership {
        let now = Utc::now();
        Membership {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            status: Pending,
            is_active: true,
            date_joined: now,
            updated_at: now,
        }
    }

    #[test]
    fn approve_then_leave() {
        let mut m = pending();

        m.transition(Approve).unwrap();
        assert_eq!(m.status, Approved);
        assert!(m.is_active);

        m.transition(Leave).unwrap();
        assert_eq!(m.status, Left);
        assert!(!m.is_active);
    }

    #[test]
    fn reapproval_is_idempotent() {
        let mut m = pending();
        m.transition(Approve).unwrap();
        m.transition(Approve).unwrap();
        assert_eq!(m.status, Approved);
        assert!(m.is_active);
    }

    #[test]
    fn reject_deactivates() {
        let mut m = pending();
        m.transition(Reject).unwrap();
        assert_eq!(m.status, Rejected);
        assert!(!m.is_active);
    }

    #[test]
    fn rejected_cannot_be_approved() {
        let mut m = pending();
        m.transition(Reject).unwrap();

        let err = m.transition(Approve).unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(m.status, Rejected);
        assert!(!m.is_active);
    }

    #[test]
    fn rejected_can_still_leave() {
        let mut m = pending();
        m.transition(Reject).unwrap();

        m.transition(Leave).unwrap();
        assert_eq!(m.status, Left);
        assert!(!m.is_active);
    }

    #[test]
    fn leave_succeeds_from_every_status() {
        for from in [Pending, Approved, Rejected, Left] {
            assert_eq!(Leave.apply(from).unwrap(), (Left, false), "{from:?}");
        }
    }

    #[test]
    fn left_is_terminal() {
        for action in [Approve, Reject] {
            let mut m = pending();
            m.transition(Approve).unwrap();
            m.transition(Leave).unwrap();

            assert!(matches!(m.transition(action), Err(AppError::InvalidState(_))));
            assert_eq!(m.status, Left);
        }

        // leaving twice changes nothing
        let mut m = pending();
        m.transition(Leave).unwrap();
        m.transition(Leave).unwrap();
        assert_eq!(m.status, Left);
    }

    #[test]
    fn approved_cannot_be_rejected() {
        let mut m = pending();
        m.transition(Approve).unwrap();
        assert!(matches!(m.transition(Reject), Err(AppError::InvalidState(_))));
        assert_eq!(m.status, Approved);
    }

    #[test]
    fn nothing_returns_to_pending() {
        for from in [Pending, Approved, Rejected, Left] {
            for action in [Approve, Reject, Leave] {
                if let Ok((to, _)) = action.apply(from) {
                    assert_ne!(to, Pending);
                }
            }
        }
    }

    #[test]
    fn detail_flattens_membership() {
        let detail = MembershipDetail {
            membership: pending(),
            fields: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json["fields"].as_array().unwrap().is_empty());
    }
}
