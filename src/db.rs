pub mod user_repo;
pub use user_repo::UserRepository;
pub mod organization_repo;
pub use organization_repo::OrganizationRepository;
pub mod membership_repo;
pub use membership_repo::MembershipRepository;
pub mod ledger_repo;
pub use ledger_repo::LedgerRepository;
pub mod payments_repo;
pub use payments_repo::PaymentsRepository;
