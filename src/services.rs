pub mod auth;
pub mod events;
pub mod ledger_service;
pub mod membership_service;
pub mod organization_service;
pub mod payments_service;

#[cfg(test)]
mod fixtures;
