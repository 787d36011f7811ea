// src/handlers/payments.rs

use axum::{extract::State, response::IntoResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        extract::{Json, Path},
        response::{deleted, ApiResponse},
    },
    config::AppState,
    db::payments_repo::ProviderWrite,
    middleware::{
        auth::AuthenticatedUser,
        policy::{caps, Require},
    },
    models::payments::{Callback, PaymentProvider, Transaction, TransactionStatus},
    services::payments_service::TransactionRequest,
};

// =============================================================================
//  AREA 1: PROVIDERS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProviderPayload {
    #[validate(length(min = 1, max = 100, message = "This field is required."))]
    #[schema(example = "M-Pesa")]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "This field is required."))]
    #[schema(example = "MPESA")]
    pub provider_code: String,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub api_key: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub api_secret: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub callback_url: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProviderPayload {
    #[validate(length(min = 1, max = 100, message = "This field may not be blank."))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "This field may not be blank."))]
    pub provider_code: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub api_key: Option<String>,
    #[validate(length(max = 255, message = "Ensure this field has no more than 255 characters."))]
    pub api_secret: Option<String>,
    #[validate(url(message = "Enter a valid URL."))]
    pub callback_url: Option<String>,
    pub is_active: Option<bool>,
}

impl CreateProviderPayload {
    fn as_write(&self) -> ProviderWrite<'_> {
        ProviderWrite {
            name: Some(&self.name),
            provider_code: Some(&self.provider_code),
            api_key: self.api_key.as_deref(),
            api_secret: self.api_secret.as_deref(),
            callback_url: self.callback_url.as_deref(),
            is_active: self.is_active,
        }
    }
}

impl UpdateProviderPayload {
    fn as_write(&self) -> ProviderWrite<'_> {
        ProviderWrite {
            name: self.name.as_deref(),
            provider_code: self.provider_code.as_deref(),
            api_key: self.api_key.as_deref(),
            api_secret: self.api_secret.as_deref(),
            callback_url: self.callback_url.as_deref(),
            is_active: self.is_active,
        }
    }
}

// GET /api/payments/providers
#[utoipa::path(
    get,
    path = "/api/payments/providers",
    tag = "Payments",
    responses(
        (status = 200, description = "Payment providers (secrets omitted)", body = Vec<PaymentProvider>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_providers(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let providers = app_state.payments_service.list_providers().await?;
    Ok(ApiResponse::ok("Payment providers retrieved.", providers))
}

// GET /api/payments/providers/{id}
#[utoipa::path(
    get,
    path = "/api/payments/providers/{id}",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 200, description = "The provider", body = PaymentProvider),
        (status = 404, description = "Unknown provider")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_provider(
    State(app_state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let provider = app_state.payments_service.get_provider(id).await?;
    Ok(ApiResponse::ok("Payment provider retrieved.", provider))
}

// POST /api/payments/providers
#[utoipa::path(
    post,
    path = "/api/payments/providers",
    tag = "Payments",
    request_body = CreateProviderPayload,
    responses(
        (status = 201, description = "Provider registered", body = PaymentProvider),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name or code already used")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_provider(
    State(app_state): State<AppState>,
    _admin: Require<caps::ProviderManage>,
    Json(payload): Json<CreateProviderPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let provider = app_state.payments_service.create_provider(&payload.as_write()).await?;

    Ok(ApiResponse::created("Payment provider created.", provider))
}

// PUT /api/payments/providers/{id}
#[utoipa::path(
    put,
    path = "/api/payments/providers/{id}",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Provider id")),
    request_body = UpdateProviderPayload,
    responses(
        (status = 200, description = "Provider updated", body = PaymentProvider),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown provider")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_provider(
    State(app_state): State<AppState>,
    _admin: Require<caps::ProviderManage>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProviderPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let provider = app_state
        .payments_service
        .update_provider(id, &payload.as_write())
        .await?;

    Ok(ApiResponse::ok("Payment provider updated.", provider))
}

// DELETE /api/payments/providers/{id}
#[utoipa::path(
    delete,
    path = "/api/payments/providers/{id}",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Provider id")),
    responses(
        (status = 204, description = "Provider deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown provider"),
        (status = 409, description = "Provider still has transactions")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_provider(
    State(app_state): State<AppState>,
    _admin: Require<caps::ProviderManage>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.payments_service.delete_provider(id).await?;
    Ok(deleted())
}

// =============================================================================
//  AREA 2: TRANSACTIONS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionPayload {
    pub provider_id: Uuid,
    #[schema(value_type = String, example = "1500.00")]
    pub amount: Decimal,
    #[validate(length(min = 3, max = 10, message = "Currency must have between 3 and 10 characters."))]
    #[schema(example = "KES")]
    pub currency: Option<String>,
    // Generated when omitted
    #[validate(length(min = 1, max = 100, message = "This field may not be blank."))]
    pub reference: Option<String>,
    #[validate(length(max = 100, message = "Ensure this field has no more than 100 characters."))]
    pub provider_reference: Option<String>,
    pub description: Option<String>,
}

// GET /api/payments/transactions
#[utoipa::path(
    get,
    path = "/api/payments/transactions",
    tag = "Payments",
    responses(
        (status = 200, description = "Own transactions, or all for admins", body = Vec<Transaction>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_transactions(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let transactions = app_state.payments_service.list_transactions(&user).await?;
    Ok(ApiResponse::ok("Transactions retrieved.", transactions))
}

// GET /api/payments/transactions/{id}
#[utoipa::path(
    get,
    path = "/api/payments/transactions/{id}",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "The transaction", body = Transaction),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_transaction(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = app_state.payments_service.get_transaction(id, &user).await?;
    Ok(ApiResponse::ok("Transaction retrieved.", transaction))
}

// POST /api/payments/transactions
#[utoipa::path(
    post,
    path = "/api/payments/transactions",
    tag = "Payments",
    request_body = CreateTransactionPayload,
    responses(
        (status = 201, description = "Transaction opened as pending", body = Transaction),
        (status = 400, description = "Invalid data"),
        (status = 404, description = "Unknown provider"),
        (status = 409, description = "Reference already used")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_transaction(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<CreateTransactionPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let transaction = app_state
        .payments_service
        .create_transaction(
            &user,
            &TransactionRequest {
                provider_id: payload.provider_id,
                amount: payload.amount,
                currency: payload.currency.as_deref(),
                reference: payload.reference.as_deref(),
                provider_reference: payload.provider_reference.as_deref(),
                description: payload.description.as_deref(),
            },
        )
        .await?;

    Ok(ApiResponse::created("Transaction created.", transaction))
}

// POST /api/payments/transactions/{id}/mark_success
#[utoipa::path(
    post,
    path = "/api/payments/transactions/{id}/mark_success",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction succeeded", body = Transaction),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown transaction"),
        (status = 422, description = "Transaction is not pending")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_transaction_success(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = app_state
        .payments_service
        .settle_transaction(id, TransactionStatus::Success, &user)
        .await?;

    Ok(ApiResponse::ok("Transaction marked as successful.", transaction))
}

// POST /api/payments/transactions/{id}/mark_failed
#[utoipa::path(
    post,
    path = "/api/payments/transactions/{id}/mark_failed",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction failed", body = Transaction),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown transaction"),
        (status = 422, description = "Transaction is not pending")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_transaction_failed(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = app_state
        .payments_service
        .settle_transaction(id, TransactionStatus::Failed, &user)
        .await?;

    Ok(ApiResponse::ok("Transaction marked as failed.", transaction))
}

// =============================================================================
//  AREA 3: CALLBACKS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackPayload {
    pub transaction_id: Uuid,
    pub provider_id: Uuid,
    // Stored as received
    #[schema(value_type = Object)]
    pub payload: Value,
}

// POST /api/payments/callbacks
#[utoipa::path(
    post,
    path = "/api/payments/callbacks",
    tag = "Payments",
    request_body = CallbackPayload,
    responses(
        (status = 201, description = "Callback stored", body = Callback),
        (status = 404, description = "Unknown transaction or provider")
    )
)]
pub async fn receive_callback(
    State(app_state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> Result<impl IntoResponse, AppError> {
    let callback = app_state
        .payments_service
        .receive_callback(payload.transaction_id, payload.provider_id, &payload.payload)
        .await?;

    Ok(ApiResponse::created("Callback received.", callback))
}

// GET /api/payments/callbacks
#[utoipa::path(
    get,
    path = "/api/payments/callbacks",
    tag = "Payments",
    responses(
        (status = 200, description = "Received callbacks", body = Vec<Callback>),
        (status = 403, description = "Admins only")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_callbacks(
    State(app_state): State<AppState>,
    _admin: Require<caps::CallbackManage>,
) -> Result<impl IntoResponse, AppError> {
    let callbacks = app_state.payments_service.list_callbacks().await?;
    Ok(ApiResponse::ok("Callbacks retrieved.", callbacks))
}

// GET /api/payments/callbacks/{id}
#[utoipa::path(
    get,
    path = "/api/payments/callbacks/{id}",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Callback id")),
    responses(
        (status = 200, description = "The callback", body = Callback),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown callback")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_callback(
    State(app_state): State<AppState>,
    _admin: Require<caps::CallbackManage>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let callback = app_state.payments_service.get_callback(id).await?;
    Ok(ApiResponse::ok("Callback retrieved.", callback))
}

// POST /api/payments/callbacks/{id}/mark_processed
#[utoipa::path(
    post,
    path = "/api/payments/callbacks/{id}/mark_processed",
    tag = "Payments",
    params(("id" = Uuid, Path, description = "Callback id")),
    responses(
        (status = 200, description = "Callback marked as processed", body = Callback),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown callback")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_callback_processed(
    State(app_state): State<AppState>,
    _admin: Require<caps::CallbackManage>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let callback = app_state.payments_service.mark_callback_processed(id).await?;
    Ok(ApiResponse::ok("Callback marked as processed.", callback))
}
