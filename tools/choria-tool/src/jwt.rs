//! Unverified JWT viewing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use choria_security::tokens::{self, Purpose, StandardClaims};
use serde_json::Value;

/// What a token says about itself.
#[derive(Debug)]
pub struct TokenView {
    /// Token purpose
    pub purpose: Purpose,
    /// Expiry, if set
    pub expires: Option<DateTime<Utc>>,
    /// Whether the expiry has passed
    pub expired: bool,
    /// All claims
    pub claims: Value,
}

/// Decode `token` without verifying it.
pub fn view_token(token: &str) -> Result<TokenView> {
    let token = token.trim();

    let claims: Value = tokens::parse_unverified(token).context("could not parse token")?;
    let standard: StandardClaims = tokens::parse_unverified(token).context("could not parse token")?;

    Ok(TokenView {
        purpose: tokens::token_purpose(token),
        expires: standard.expires_at(),
        expired: standard.is_expired(),
        claims,
    })
}
