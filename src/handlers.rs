pub mod auth;
pub mod ledger;
pub mod memberships;
pub mod organizations;
pub mod payments;
