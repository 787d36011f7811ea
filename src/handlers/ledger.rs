// src/handlers/ledger.rs

use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        extract::{Json, Path},
        response::{deleted, ApiResponse},
    },
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        policy::{caps, Require},
    },
    models::{
        auth::User,
        ledger::{
            InsuranceView, LoanDecision, LoanView, SavingRecord, SavingType, ServiceCategory,
            ServiceOffering,
        },
    },
    services::ledger_service::NewInsurance,
};

// =============================================================================
//  AREA 1: SERVICE OFFERINGS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateServicePayload {
    pub organization_id: Uuid,
    #[validate(length(min = 2, max = 100, message = "Name must have between 2 and 100 characters."))]
    #[schema(example = "Jijenge Savings")]
    pub name: String,
    pub category: ServiceCategory,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateServicePayload {
    #[validate(length(min = 2, max = 100, message = "Name must have between 2 and 100 characters."))]
    pub name: Option<String>,
    pub category: Option<ServiceCategory>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServiceFilter {
    pub organization_id: Option<Uuid>,
}

// GET /api/services
#[utoipa::path(
    get,
    path = "/api/services",
    tag = "Services",
    params(ServiceFilter),
    responses((status = 200, description = "Service offerings", body = Vec<ServiceOffering>))
)]
pub async fn list_services(
    State(app_state): State<AppState>,
    Query(filter): Query<ServiceFilter>,
) -> Result<impl IntoResponse, AppError> {
    let services = app_state.ledger_service.list_services(filter.organization_id).await?;
    Ok(ApiResponse::ok("Services retrieved.", services))
}

// GET /api/services/{id}
#[utoipa::path(
    get,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = Uuid, Path, description = "Service id")),
    responses(
        (status = 200, description = "The service", body = ServiceOffering),
        (status = 404, description = "Unknown service")
    )
)]
pub async fn get_service(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let service = app_state.ledger_service.get_service(id).await?;
    Ok(ApiResponse::ok("Service retrieved.", service))
}

// POST /api/services
#[utoipa::path(
    post,
    path = "/api/services",
    tag = "Services",
    request_body = CreateServicePayload,
    responses(
        (status = 201, description = "Service created", body = ServiceOffering),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown sacco"),
        (status = 409, description = "Name already used in this sacco")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_service(
    State(app_state): State<AppState>,
    _admin: Require<caps::ServiceManage>,
    Json(payload): Json<CreateServicePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let service = app_state
        .ledger_service
        .create_service(
            payload.organization_id,
            &payload.name,
            payload.category,
            payload.description.as_deref(),
        )
        .await?;

    Ok(ApiResponse::created("Service created successfully.", service))
}

// PUT /api/services/{id}
#[utoipa::path(
    put,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = Uuid, Path, description = "Service id")),
    request_body = UpdateServicePayload,
    responses(
        (status = 200, description = "Service updated", body = ServiceOffering),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown service")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_service(
    State(app_state): State<AppState>,
    _admin: Require<caps::ServiceManage>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateServicePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let service = app_state
        .ledger_service
        .update_service(id, payload.name.as_deref(), payload.category, payload.description.as_deref())
        .await?;

    Ok(ApiResponse::ok("Service updated successfully.", service))
}

// DELETE /api/services/{id}
#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    tag = "Services",
    params(("id" = Uuid, Path, description = "Service id")),
    responses(
        (status = 204, description = "Service deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown service"),
        (status = 409, description = "Service still has ledger records")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_service(
    State(app_state): State<AppState>,
    _admin: Require<caps::ServiceManage>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    app_state.ledger_service.delete_service(id).await?;
    Ok(deleted())
}

// =============================================================================
//  AREA 2: SAVINGS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSavingPayload {
    pub service_id: Uuid,
    #[schema(value_type = String, example = "500.00")]
    pub amount: Decimal,
    pub transaction_type: SavingType,
}

// GET /api/savings
#[utoipa::path(
    get,
    path = "/api/savings",
    tag = "Savings",
    responses(
        (status = 200, description = "Own savings, or all for admins", body = Vec<SavingRecord>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_savings(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let savings = app_state.ledger_service.list_savings(&user).await?;
    Ok(ApiResponse::ok("Savings retrieved.", savings))
}

// GET /api/savings/{id}
#[utoipa::path(
    get,
    path = "/api/savings/{id}",
    tag = "Savings",
    params(("id" = Uuid, Path, description = "Saving id")),
    responses(
        (status = 200, description = "The saving", body = SavingRecord),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_saving(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let saving = app_state.ledger_service.get_saving(id, &user).await?;
    Ok(ApiResponse::ok("Saving retrieved.", saving))
}

// POST /api/savings
#[utoipa::path(
    post,
    path = "/api/savings",
    tag = "Savings",
    request_body = CreateSavingPayload,
    responses(
        (status = 201, description = "Saving recorded", body = SavingRecord),
        (status = 400, description = "Amount must be positive"),
        (status = 403, description = "No approved membership in the service's sacco"),
        (status = 404, description = "Unknown service")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_saving(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<CreateSavingPayload>,
) -> Result<impl IntoResponse, AppError> {
    let saving = app_state
        .ledger_service
        .create_saving(&user, payload.service_id, payload.amount, payload.transaction_type)
        .await?;

    Ok(ApiResponse::created("Saving recorded successfully.", saving))
}

// =============================================================================
//  AREA 3: LOANS
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLoanPayload {
    pub service_id: Uuid,
    #[schema(value_type = String, example = "5000.00")]
    pub amount: Decimal,
    // Annual, in percent
    #[schema(value_type = String, example = "10.00")]
    pub interest_rate: Decimal,
    #[schema(example = 12)]
    pub duration_months: i32,
}

// GET /api/loans
#[utoipa::path(
    get,
    path = "/api/loans",
    tag = "Loans",
    responses(
        (status = 200, description = "Own loans, or all for admins", body = Vec<LoanView>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_loans(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let loans = app_state.ledger_service.list_loans(&user).await?;
    Ok(ApiResponse::ok("Loans retrieved.", loans))
}

// GET /api/loans/{id}
#[utoipa::path(
    get,
    path = "/api/loans/{id}",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 200, description = "The loan with its total payable", body = LoanView),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_loan(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let loan = app_state.ledger_service.get_loan(id, &user).await?;
    Ok(ApiResponse::ok("Loan retrieved.", loan))
}

// POST /api/loans
#[utoipa::path(
    post,
    path = "/api/loans",
    tag = "Loans",
    request_body = CreateLoanPayload,
    responses(
        (status = 201, description = "Loan requested, pending approval", body = LoanView),
        (status = 400, description = "Invalid amount, rate or duration"),
        (status = 403, description = "No approved membership in the service's sacco"),
        (status = 404, description = "Unknown service")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_loan(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<CreateLoanPayload>,
) -> Result<impl IntoResponse, AppError> {
    let loan = app_state
        .ledger_service
        .create_loan(
            &user,
            payload.service_id,
            payload.amount,
            payload.interest_rate,
            payload.duration_months,
        )
        .await?;

    Ok(ApiResponse::created("Loan application submitted.", loan))
}

async fn decide(
    app_state: &AppState,
    user: &User,
    id: Uuid,
    decision: LoanDecision,
    message: &str,
) -> Result<ApiResponse<LoanView>, AppError> {
    let loan = app_state.ledger_service.decide_loan(id, decision, user).await?;
    Ok(ApiResponse::ok(message, loan))
}

// POST /api/loans/{id}/approve
#[utoipa::path(
    post,
    path = "/api/loans/{id}/approve",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 200, description = "Loan approved", body = LoanView),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown loan"),
        (status = 422, description = "Loan is not pending")
    ),
    security(("api_jwt" = []))
)]
pub async fn approve_loan(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    decide(&app_state, &user, id, LoanDecision::Approve, "Loan approved.").await
}

// POST /api/loans/{id}/reject
#[utoipa::path(
    post,
    path = "/api/loans/{id}/reject",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 200, description = "Loan rejected", body = LoanView),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown loan"),
        (status = 422, description = "Loan is not pending")
    ),
    security(("api_jwt" = []))
)]
pub async fn reject_loan(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    decide(&app_state, &user, id, LoanDecision::Reject, "Loan rejected.").await
}

// POST /api/loans/{id}/mark_paid
#[utoipa::path(
    post,
    path = "/api/loans/{id}/mark_paid",
    tag = "Loans",
    params(("id" = Uuid, Path, description = "Loan id")),
    responses(
        (status = 200, description = "Loan settled", body = LoanView),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Unknown loan"),
        (status = 422, description = "Loan is not approved")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_loan_paid(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    decide(&app_state, &user, id, LoanDecision::MarkPaid, "Loan marked as paid.").await
}

// =============================================================================
//  AREA 4: INSURANCE
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInsurancePayload {
    pub service_id: Uuid,
    #[validate(length(min = 1, max = 50, message = "Policy number must have between 1 and 50 characters."))]
    #[schema(example = "POL-2024-001")]
    pub policy_number: String,
    #[schema(value_type = String, example = "100000.00")]
    pub coverage_amount: Decimal,
    #[schema(value_type = String, example = "1500.00")]
    pub premium: Decimal,
    #[schema(example = "2024-01-01")]
    pub start_date: NaiveDate,
    #[schema(example = "2024-12-31")]
    pub end_date: NaiveDate,
}

// GET /api/insurances
#[utoipa::path(
    get,
    path = "/api/insurances",
    tag = "Insurance",
    responses(
        (status = 200, description = "Own policies, or all for admins", body = Vec<InsuranceView>),
        (status = 401, description = "Not authenticated")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_insurances(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, AppError> {
    let policies = app_state.ledger_service.list_insurances(&user).await?;
    Ok(ApiResponse::ok("Insurance policies retrieved.", policies))
}

// GET /api/insurances/{id}
#[utoipa::path(
    get,
    path = "/api/insurances/{id}",
    tag = "Insurance",
    params(("id" = Uuid, Path, description = "Insurance policy id")),
    responses(
        (status = 200, description = "The policy and whether it expired", body = InsuranceView),
        (status = 404, description = "Unknown or not visible")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_insurance(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let policy = app_state.ledger_service.get_insurance(id, &user).await?;
    Ok(ApiResponse::ok("Insurance policy retrieved.", policy))
}

// POST /api/insurances
#[utoipa::path(
    post,
    path = "/api/insurances",
    tag = "Insurance",
    request_body = CreateInsurancePayload,
    responses(
        (status = 201, description = "Policy created", body = InsuranceView),
        (status = 400, description = "Invalid dates or amounts"),
        (status = 403, description = "No approved membership in the service's sacco"),
        (status = 404, description = "Unknown service"),
        (status = 409, description = "Policy number already used")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_insurance(
    State(app_state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(payload): Json<CreateInsurancePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate().map_err(AppError::ValidationError)?;

    let policy = app_state
        .ledger_service
        .create_insurance(
            &user,
            &NewInsurance {
                service_id: payload.service_id,
                policy_number: &payload.policy_number,
                coverage_amount: payload.coverage_amount,
                premium: payload.premium,
                start_date: payload.start_date,
                end_date: payload.end_date,
            },
        )
        .await?;

    Ok(ApiResponse::created("Insurance policy created.", policy))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names_fit_their_column() {
        let payload = |name: String| -> CreateServicePayload {
            serde_json::from_value(serde_json::json!({
                "organization_id": Uuid::new_v4(),
                "name": name,
                "category": "savings"
            }))
            .unwrap()
        };

        assert!(payload("s".repeat(100)).validate().is_ok());
        assert!(payload("s".repeat(101)).validate().unwrap_err().field_errors().contains_key("name"));
    }

    #[test]
    fn policy_numbers_fit_their_column() {
        let payload = |policy_number: String| -> CreateInsurancePayload {
            serde_json::from_value(serde_json::json!({
                "service_id": Uuid::new_v4(),
                "policy_number": policy_number,
                "coverage_amount": "100000.00",
                "premium": "1500.00",
                "start_date": "2024-01-01",
                "end_date": "2025-01-01"
            }))
            .unwrap()
        };

        assert!(payload("P".repeat(50)).validate().is_ok());
        assert!(payload("P".repeat(51)).validate().is_err());
    }
}
