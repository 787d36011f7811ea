// src/handlers/organizations.rs

use axum::{extract::State, response::IntoResponse};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::{
        error::AppError,
        extract::{Json, Path},
        response::{deleted, ApiResponse},
    },
    config::AppState,
    db::organization_repo::OrganizationWrite,
    middleware::{
        auth::AuthenticatedUser,
        policy::{caps, Require},
    },
    models::{
        membership::{FieldDefinition, FieldType},
        organization::{ManagementRecord, ManagementStatus, Organization},
    },
};

// =============================================================================
//  AREA 1: ORGANIZATIONS (SACCOS)
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrganizationPayload {
    #[validate(length(min = 2, max = 100, message = "Name must have between 2 and 100 characters."))]
    #[schema(example = "TestSacco")]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Registration number must have between 1 and 50 characters."))]
    #[schema(example = "SAC12345")]
    pub registration_number: String,
    #[validate(email(message = "Enter a valid email address."))]
    #[schema(example = "info@testsacco.co.ke")]
    pub email: String,
    #[validate(url(message = "Enter a valid URL."))]
    pub website: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub address: Option<String>,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub phone_number: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

impl CreateOrganizationPayload {
    fn as_write(&self) -> OrganizationWrite<'_> {
        OrganizationWrite {
            name: Some(&self.name),
            registration_number: Some(&self.registration_number),
            website: self.website.as_deref(),
            address: self.address.as_deref(),
            phone_number: self.phone_number.as_deref(),
            email: Some(&self.email),
            description: self.description.as_deref(),
            logo: self.logo.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrganizationPayload {
    #[validate(length(min = 2, max = 100, message = "Name must have between 2 and 100 characters."))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Registration number must have between 1 and 50 characters."))]
    pub registration_number: Option<String>,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub website: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub address: Option<String>,
    #[validate(length(max = 20, message = "Ensure this field has no more than 20 characters."))]
    pub phone_number: Option<String>,
    pub description: Option<String>,
    pub logo: Option<String>,
}

impl UpdateOrganizationPayload {
    fn as_write(&self) -> OrganizationWrite<'_> {
        OrganizationWrite {
            name: self.name.as_deref(),
            registration_number: self.registration_number.as_deref(),
            website: self.website.as_deref(),
            address: self.address.as_deref(),
            phone_number: self.phone_number.as_deref(),
            email: self.email.as_deref(),
            description: self.description.as_deref(),
            logo: self.logo.as_deref(),
        }
    }
}

// GET /api/organizations
#[utoipa::path(
    get,
    path = "/api/organizations",
    tag = "Organizations",
    responses((status = 200, description = "All saccos", body = Vec<Organization>))
)]
pub async fn list_organizations(State(app_state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let organizations = app_state.organization_service.list().await?;
    Ok(ApiResponse::ok("Saccos retrieved.", organizations))
}

// GET /api/organizations/{id}
#[utoipa::path(
    get,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Sacco id")),
    responses(
        (status = 200, description = "The sacco", body = Organization),
        (status = 404, description = "Unknown sacco")
    )
)]
pub async fn get_organization(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let organization = app_state.organization_service.get(id).await?;
    Ok(ApiResponse::ok("Sacco retrieved.", organization))
}

// POST /api/organizations
#[utoipa::path(
    post,
    path = "/api/organizations",
    tag = "Organizations",
    request_body = CreateOrganizationPayload,
    responses(
        (status = 201, description = "Sacco created", body = Organization),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name, registration number or email taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_organization(
    State(app_state): State<AppState>,
    _admin: Require<caps::OrganizationManage>,
    Json(payload): Json<CreateOrganizationPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let organization = app_state.organization_service.create(&payload.as_write()).await?;

    Ok(ApiResponse::created("Sacco created successfully.", organization))
}

// PUT /api/organizations/{id}
#[utoipa::path(
    put,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Sacco id")),
    request_body = UpdateOrganizationPayload,
    responses(
        (status = 200, description = "Sacco updated", body = Organization),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown sacco"),
        (status = 409, description = "Name, registration number or email taken")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_organization(
    State(app_state): State<AppState>,
    _admin: Require<caps::OrganizationManage>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrganizationPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let organization = app_state.organization_service.update(id, &payload.as_write()).await?;

    Ok(ApiResponse::ok("Sacco updated successfully.", organization))
}

// DELETE /api/organizations/{id}
#[utoipa::path(
    delete,
    path = "/api/organizations/{id}",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Sacco id")),
    responses(
        (status = 204, description = "Sacco deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown sacco")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_organization(
    State(app_state): State<AppState>,
    _admin: Require<caps::OrganizationManage>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.organization_service.delete(id).await?;
    Ok(deleted())
}

// =============================================================================
//  AREA 2: MEMBERSHIP FORM (FIELD DEFINITIONS)
// =============================================================================

fn validate_field_key(key: &str) -> Result<(), ValidationError> {
    let valid = key.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("field_key");
        err.message = Some("Use lowercase letters, digits and underscores, starting with a letter.".into());
        Err(err)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateFieldDefinitionPayload {
    #[validate(
        length(min = 1, max = 100, message = "Key must have between 1 and 100 characters."),
        custom(function = "validate_field_key")
    )]
    #[schema(example = "national_id")]
    pub key: String,
    #[validate(length(min = 1, max = 255, message = "This field is required."))]
    #[schema(example = "National ID")]
    pub label: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateFieldDefinitionPayload {
    #[validate(length(min = 1, max = 255, message = "This field may not be blank."))]
    pub label: Option<String>,
    pub field_type: Option<FieldType>,
    pub required: Option<bool>,
    pub display_order: Option<i32>,
}

// GET /api/organizations/{id}/fields
#[utoipa::path(
    get,
    path = "/api/organizations/{id}/fields",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Sacco id")),
    responses(
        (status = 200, description = "The sacco's membership form, in display order", body = Vec<FieldDefinition>),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown sacco")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_field_definitions(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let fields = app_state.organization_service.list_field_definitions(id).await?;
    Ok(ApiResponse::ok("Membership fields retrieved.", fields))
}

// POST /api/organizations/{id}/fields
#[utoipa::path(
    post,
    path = "/api/organizations/{id}/fields",
    tag = "Organizations",
    params(("id" = Uuid, Path, description = "Sacco id")),
    request_body = CreateFieldDefinitionPayload,
    responses(
        (status = 201, description = "Field added to the form", body = FieldDefinition),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown sacco"),
        (status = 409, description = "Key already defined")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_field_definition(
    State(app_state): State<AppState>,
    _admin: Require<caps::FieldDefinitionManage>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateFieldDefinitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let field = app_state
        .organization_service
        .create_field_definition(
            id,
            &payload.key,
            &payload.label,
            payload.field_type,
            payload.required,
            payload.display_order,
        )
        .await?;

    Ok(ApiResponse::created("Membership field created.", field))
}

// PUT /api/organizations/{id}/fields/{field_id}
#[utoipa::path(
    put,
    path = "/api/organizations/{id}/fields/{field_id}",
    tag = "Organizations",
    params(
        ("id" = Uuid, Path, description = "Sacco id"),
        ("field_id" = Uuid, Path, description = "Field definition id")
    ),
    request_body = UpdateFieldDefinitionPayload,
    responses(
        (status = 200, description = "Field updated", body = FieldDefinition),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown field")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_field_definition(
    State(app_state): State<AppState>,
    _admin: Require<caps::FieldDefinitionManage>,
    Path((id, field_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateFieldDefinitionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let field = app_state
        .organization_service
        .update_field_definition(
            id,
            field_id,
            payload.label.as_deref(),
            payload.field_type,
            payload.required,
            payload.display_order,
        )
        .await?;

    Ok(ApiResponse::ok("Membership field updated.", field))
}

// DELETE /api/organizations/{id}/fields/{field_id}
#[utoipa::path(
    delete,
    path = "/api/organizations/{id}/fields/{field_id}",
    tag = "Organizations",
    params(
        ("id" = Uuid, Path, description = "Sacco id"),
        ("field_id" = Uuid, Path, description = "Field definition id")
    ),
    responses(
        (status = 204, description = "Field removed"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown field")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_field_definition(
    State(app_state): State<AppState>,
    _admin: Require<caps::FieldDefinitionManage>,
    Path((id, field_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    app_state.organization_service.delete_field_definition(id, field_id).await?;
    Ok(deleted())
}

// =============================================================================
//  AREA 3: MANAGEMENT (VERIFICATION AUDIT)
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateManagementPayload {
    pub organization_id: Uuid,
    #[schema(example = "verified")]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetManagementStatusPayload {
    #[schema(example = "removed")]
    pub status: String,
}

// GET /api/management
#[utoipa::path(
    get,
    path = "/api/management",
    tag = "Management",
    responses(
        (status = 200, description = "Visible management records", body = Vec<ManagementRecord>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_management(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let records = app_state.organization_service.list_management(&user).await?;
    Ok(ApiResponse::ok("Management records retrieved.", records))
}

// GET /api/management/{id}
#[utoipa::path(
    get,
    path = "/api/management/{id}",
    tag = "Management",
    params(("id" = Uuid, Path, description = "Management record id")),
    responses(
        (status = 200, description = "The record", body = ManagementRecord),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_management(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = app_state.organization_service.get_management(id, &user).await?;
    Ok(ApiResponse::ok("Management record retrieved.", record))
}

// POST /api/management
#[utoipa::path(
    post,
    path = "/api/management",
    tag = "Management",
    request_body = CreateManagementPayload,
    responses(
        (status = 201, description = "Status recorded", body = ManagementRecord),
        (status = 400, description = "Invalid status"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown sacco")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_management(
    State(app_state): State<AppState>,
    Require(admin, _): Require<caps::ManagementAudit>,
    Json(payload): Json<CreateManagementPayload>,
) -> Result<impl IntoResponse, AppError> {
    let status: ManagementStatus = payload.status.parse()?;

    let record = app_state
        .organization_service
        .record_management(payload.organization_id, status, &admin)
        .await?;

    Ok(ApiResponse::created("Management status recorded.", record))
}

// POST /api/management/{id}/set_status
#[utoipa::path(
    post,
    path = "/api/management/{id}/set_status",
    tag = "Management",
    params(("id" = Uuid, Path, description = "Management record id")),
    request_body = SetManagementStatusPayload,
    responses(
        (status = 201, description = "New record appended", body = ManagementRecord),
        (status = 400, description = "Invalid status"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown record")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_management_status(
    State(app_state): State<AppState>,
    Require(admin, _): Require<caps::ManagementAudit>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetManagementStatusPayload>,
) -> Result<impl IntoResponse, AppError> {
    let status: ManagementStatus = payload.status.parse()?;

    let record = app_state
        .organization_service
        .set_management_status(id, status, &admin)
        .await?;

    Ok(ApiResponse::created(format!("Status set to {}.", payload.status), record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys_are_snake_case_identifiers() {
        assert!(validate_field_key("national_id").is_ok());
        assert!(validate_field_key("kin2_phone").is_ok());
        assert!(validate_field_key("National ID").is_err());
        assert!(validate_field_key("2nd_name").is_err());
        assert!(validate_field_key("").is_err());
    }

    #[test]
    fn organization_payload_requires_valid_email() {
        let payload: CreateOrganizationPayload = serde_json::from_value(serde_json::json!({
            "name": "TestSacco",
            "registration_number": "SAC12345",
            "email": "not-an-email"
        }))
        .unwrap();

        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
    }

    #[test]
    fn organization_payload_fits_its_columns() {
        let payload = |name: String, registration_number: String| -> CreateOrganizationPayload {
            serde_json::from_value(serde_json::json!({
                "name": name,
                "registration_number": registration_number,
                "email": "info@testsacco.co.ke"
            }))
            .unwrap()
        };

        assert!(payload("a".repeat(100), "r".repeat(50)).validate().is_ok());

        let errors = payload("a".repeat(101), "r".repeat(51)).validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("registration_number"));
    }
}
