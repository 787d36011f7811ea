// src/handlers/auth.rs

use axum::{extract::State, response::IntoResponse};
use validator::Validate;

use crate::{
    common::{error::AppError, extract::Json, response::ApiResponse},
    config::AppState,
    middleware::auth::AuthenticatedUser,
    models::auth::{
        AccessToken, LoginUserPayload, Profile, RefreshTokenPayload, RegisterUserPayload,
        TokenPair, UpdateProfilePayload, User,
    },
};

// POST /api/auth/register
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterUserPayload,
    responses(
        (status = 201, description = "User registered", body = User),
        (status = 400, description = "Invalid data"),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let user = app_state
        .auth_service
        .register_user(&payload.email, &payload.password, &payload.first_name, &payload.last_name)
        .await?;

    Ok(ApiResponse::created("User registered successfully.", user))
}

// POST /api/auth/login
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginUserPayload,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPair),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(app_state): State<AppState>,
    Json(payload): Json<LoginUserPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let tokens = app_state
        .auth_service
        .login_user(&payload.email, &payload.password)
        .await?;

    Ok(ApiResponse::ok("Login successful.", tokens))
}

// POST /api/auth/refresh
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "Auth",
    request_body = RefreshTokenPayload,
    responses(
        (status = 200, description = "New access token", body = AccessToken),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    )
)]
pub async fn refresh(
    State(app_state): State<AppState>,
    Json(payload): Json<RefreshTokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let token = app_state.auth_service.refresh(&payload.refresh).await?;

    Ok(ApiResponse::ok("Token refreshed.", token))
}

// POST /api/auth/logout
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "Auth",
    request_body = RefreshTokenPayload,
    responses(
        (status = 200, description = "Refresh token revoked"),
        (status = 401, description = "Not authenticated or token invalid")
    ),
    security(("api_jwt" = []))
)]
pub async fn logout(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<RefreshTokenPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    app_state.auth_service.logout(&user, &payload.refresh).await?;

    Ok(ApiResponse::message("Logged out successfully."))
}

// GET /api/users/me
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_me(AuthenticatedUser(user): AuthenticatedUser) -> impl IntoResponse {
    ApiResponse::ok("Current user.", user)
}

// GET /api/users/me/profile
#[utoipa::path(
    get,
    path = "/api/users/me/profile",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user's profile", body = Profile),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_profile(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = app_state.auth_service.profile(&user).await?;
    Ok(ApiResponse::ok("Profile retrieved.", profile))
}

// PUT /api/users/me/profile
#[utoipa::path(
    put,
    path = "/api/users/me/profile",
    tag = "Auth",
    request_body = UpdateProfilePayload,
    responses(
        (status = 200, description = "Profile updated", body = Profile),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_profile(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<UpdateProfilePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let profile = app_state
        .auth_service
        .update_profile(
            &user,
            payload.phone_number.as_deref(),
            payload.profile_picture.as_deref(),
            payload.bio.as_deref(),
        )
        .await?;

    Ok(ApiResponse::ok("Profile updated.", profile))
}
