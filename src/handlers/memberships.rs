// src/handlers/memberships.rs

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        extract::{Json, Path},
        response::ApiResponse,
    },
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::{
        auth::User,
        membership::{Membership, MembershipAction, MembershipDetail, MembershipStatus},
    },
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequestPayload {
    pub organization_id: Uuid,
    // key -> answer, checked against the sacco's form
    #[serde(default)]
    #[schema(example = json!({"national_id": "12345"}))]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MembershipFilter {
    pub organization_id: Option<Uuid>,
    pub status: Option<MembershipStatus>,
}

// POST /api/memberships
#[utoipa::path(
    post,
    path = "/api/memberships",
    tag = "Memberships",
    request_body = JoinRequestPayload,
    responses(
        (status = 201, description = "Join request submitted", body = MembershipDetail),
        (status = 400, description = "Form answers rejected, errors keyed by field"),
        (status = 404, description = "Unknown sacco"),
        (status = 409, description = "Already a member")
    ),
    security(("api_jwt" = []))
)]
pub async fn request_join(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<JoinRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state
        .membership_service
        .request_join(&user, payload.organization_id, &payload.fields)
        .await?;

    Ok(ApiResponse::created("Join request submitted successfully.", detail))
}

// GET /api/memberships
#[utoipa::path(
    get,
    path = "/api/memberships",
    tag = "Memberships",
    params(MembershipFilter),
    responses(
        (status = 200, description = "Own memberships, or all for admins", body = Vec<Membership>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_memberships(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(filter): Query<MembershipFilter>,
) -> Result<impl IntoResponse, AppError> {
    let memberships = app_state
        .membership_service
        .list(&user, filter.organization_id, filter.status)
        .await?;

    Ok(ApiResponse::ok("Memberships retrieved.", memberships))
}

// GET /api/memberships/{id}
#[utoipa::path(
    get,
    path = "/api/memberships/{id}",
    tag = "Memberships",
    params(("id" = Uuid, Path, description = "Membership id")),
    responses(
        (status = 200, description = "Membership with its form answers", body = MembershipDetail),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_membership(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let detail = app_state.membership_service.retrieve(id, &user).await?;
    Ok(ApiResponse::ok("Membership retrieved.", detail))
}

async fn apply_action(
    app_state: &AppState,
    user: &User,
    id: Uuid,
    action: MembershipAction,
    message: &str,
) -> Result<ApiResponse<Membership>, AppError> {
    let membership = app_state.membership_service.transition(id, action, user).await?;
    Ok(ApiResponse::ok(message, membership))
}

// POST /api/memberships/{id}/approve
#[utoipa::path(
    post,
    path = "/api/memberships/{id}/approve",
    tag = "Memberships",
    params(("id" = Uuid, Path, description = "Membership id")),
    responses(
        (status = 200, description = "Membership approved", body = Membership),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown membership"),
        (status = 422, description = "Membership already rejected or left")
    ),
    security(("api_jwt" = []))
)]
pub async fn approve_membership(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    apply_action(&app_state, &user, id, MembershipAction::Approve, "Membership approved.").await
}

// POST /api/memberships/{id}/reject
#[utoipa::path(
    post,
    path = "/api/memberships/{id}/reject",
    tag = "Memberships",
    params(("id" = Uuid, Path, description = "Membership id")),
    responses(
        (status = 200, description = "Membership rejected", body = Membership),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown membership"),
        (status = 422, description = "Membership already approved or left")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject_membership(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    apply_action(&app_state, &user, id, MembershipAction::Reject, "Membership rejected.").await
}

// POST /api/memberships/{id}/leave
#[utoipa::path(
    post,
    path = "/api/memberships/{id}/leave",
    tag = "Memberships",
    params(("id" = Uuid, Path, description = "Membership id")),
    responses(
        (status = 200, description = "Left the sacco", body = Membership),
        (status = 403, description = "Not your membership"),
        (status = 404, description = "Unknown membership")
    ),
    security(("api_jwt" = []))
)]
pub async fn leave_membership(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    apply_action(&app_state, &user, id, MembershipAction::Leave, "You have left the sacco.").await
}
