// src/models/organization.rs

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// ---
// 1. Organization (the "Sacco", our tenant)
// ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Organization {
    pub id: Uuid,
    #[schema(example = "TestSacco")]
    pub name: String,
    #[schema(example = "SAC12345")]
    pub registration_number: String,
    pub website: Option<String>,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    #[schema(example = "info@testsacco.co.ke")]
    pub email: String,
    pub description: Option<String>,
    // Reference to an image stored elsewhere
    pub logo: Option<String>,
    // Only changes through a management record
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---
// 2. Management (append-only verification audit)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "management_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ManagementStatus {
    Verified,
    Updated,
    Removed,
}

impl ManagementStatus {
    /// What the organization's `verified` flag becomes once this status is recorded.
    /// `None` leaves the flag untouched.
    pub fn verified_flag(self) -> Option<bool> {
        match self {
            ManagementStatus::Verified => Some(true),
            ManagementStatus::Removed => Some(false),
            ManagementStatus::Updated => None,
        }
    }
}

impl FromStr for ManagementStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(ManagementStatus::Verified),
            "updated" => Ok(ManagementStatus::Updated),
            "removed" => Ok(ManagementStatus::Removed),
            other => Err(AppError::InvalidFields(BTreeMap::from([(
                "status".to_string(),
                format!("\"{other}\" is not a valid choice."),
            )]))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ManagementRecord {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub status: ManagementStatus,
    pub recorded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
