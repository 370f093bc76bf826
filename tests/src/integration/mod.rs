//! Cross crate flows.

pub mod broker_auth;
pub mod v1_exchange;
pub mod v2_exchange;
