// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,

        // --- Users ---
        handlers::auth::get_me,
        handlers::auth::get_profile,
        handlers::auth::update_profile,

        // --- Organizations ---
        handlers::organizations::list_organizations,
        handlers::organizations::get_organization,
        handlers::organizations::create_organization,
        handlers::organizations::update_organization,
        handlers::organizations::delete_organization,
        handlers::organizations::list_field_definitions,
        handlers::organizations::create_field_definition,
        handlers::organizations::update_field_definition,
        handlers::organizations::delete_field_definition,

        // --- Management ---
        handlers::organizations::list_management,
        handlers::organizations::get_management,
        handlers::organizations::create_management,
        handlers::organizations::set_management_status,

        // --- Memberships ---
        handlers::memberships::request_join,
        handlers::memberships::list_memberships,
        handlers::memberships::get_membership,
        handlers::memberships::approve_membership,
        handlers::memberships::reject_membership,
        handlers::memberships::leave_membership,

        // --- Services ---
        handlers::ledger::list_services,
        handlers::ledger::get_service,
        handlers::ledger::create_service,
        handlers::ledger::update_service,
        handlers::ledger::delete_service,

        // --- Savings / Loans / Insurance ---
        handlers::ledger::list_savings,
        handlers::ledger::get_saving,
        handlers::ledger::create_saving,
        handlers::ledger::list_loans,
        handlers::ledger::get_loan,
        handlers::ledger::create_loan,
        handlers::ledger::approve_loan,
        handlers::ledger::reject_loan,
        handlers::ledger::mark_loan_paid,
        handlers::ledger::list_insurances,
        handlers::ledger::get_insurance,
        handlers::ledger::create_insurance,

        // --- Payments ---
        handlers::payments::list_providers,
        handlers::payments::get_provider,
        handlers::payments::create_provider,
        handlers::payments::update_provider,
        handlers::payments::delete_provider,
        handlers::payments::list_transactions,
        handlers::payments::get_transaction,
        handlers::payments::create_transaction,
        handlers::payments::mark_transaction_success,
        handlers::payments::mark_transaction_failed,
        handlers::payments::receive_callback,
        handlers::payments::list_callbacks,
        handlers::payments::get_callback,
        handlers::payments::mark_callback_processed,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::User,
            models::auth::Profile,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::RefreshTokenPayload,
            models::auth::UpdateProfilePayload,
            models::auth::TokenPair,
            models::auth::AccessToken,

            // --- Organizations ---
            models::organization::Organization,
            models::organization::ManagementStatus,
            models::organization::ManagementRecord,
            handlers::organizations::CreateOrganizationPayload,
            handlers::organizations::UpdateOrganizationPayload,
            handlers::organizations::CreateFieldDefinitionPayload,
            handlers::organizations::UpdateFieldDefinitionPayload,
            handlers::organizations::CreateManagementPayload,
            handlers::organizations::SetManagementStatusPayload,

            // --- Memberships ---
            models::membership::FieldType,
            models::membership::FieldDefinition,
            models::membership::MembershipStatus,
            models::membership::Membership,
            models::membership::FieldValue,
            models::membership::MembershipDetail,
            handlers::memberships::JoinRequestPayload,

            // --- Ledger ---
            models::ledger::ServiceCategory,
            models::ledger::SavingType,
            models::ledger::LoanStatus,
            models::ledger::ServiceOffering,
            models::ledger::SavingRecord,
            models::ledger::LoanRecord,
            models::ledger::LoanView,
            models::ledger::InsuranceRecord,
            models::ledger::InsuranceView,
            handlers::ledger::CreateServicePayload,
            handlers::ledger::UpdateServicePayload,
            handlers::ledger::CreateSavingPayload,
            handlers::ledger::CreateLoanPayload,
            handlers::ledger::CreateInsurancePayload,

            // --- Payments ---
            models::payments::TransactionStatus,
            models::payments::PaymentProvider,
            models::payments::Transaction,
            models::payments::Callback,
            handlers::payments::CreateProviderPayload,
            handlers::payments::UpdateProviderPayload,
            handlers::payments::CreateTransactionPayload,
            handlers::payments::CallbackPayload,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, tokens and the current user"),
        (name = "Organizations", description = "Saccos and their membership forms"),
        (name = "Management", description = "Sacco verification audit trail"),
        (name = "Memberships", description = "Join requests and membership lifecycle"),
        (name = "Services", description = "Service offerings of each sacco"),
        (name = "Savings", description = "Deposits and withdrawals"),
        (name = "Loans", description = "Loan applications and decisions"),
        (name = "Insurance", description = "Insurance policies"),
        (name = "Payments", description = "Providers, transactions and provider callbacks")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
