pub mod auth;
pub mod ledger;
pub mod membership;
pub mod organization;
pub mod payments;
