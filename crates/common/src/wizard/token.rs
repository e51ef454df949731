//! Wizard session token
//!
//! A session exists while the token file exists. Requests prove membership
//! by echoing the token back; there is no expiry.

use super::WizardStore;
use crate::error::UnauthorizedReason;
use crate::{Error, Result};
use tracing::debug;

/// 16 random bytes, hex encoded.
pub fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Start a session: mint a token and persist it, replacing any previous one.
pub async fn issue(store: &dyn WizardStore) -> Result<String> {
    let token = generate_token();
    store.write_token(&token).await?;
    debug!("Issued wizard token");
    Ok(token)
}

/// Compare a supplied token with the stored one.
pub async fn verify(store: &dyn WizardStore, supplied: Option<&str>) -> Result<()> {
    let expected = store
        .read_token()
        .await?
        .ok_or(Error::Unauthorized(UnauthorizedReason::NoSession))?;

    match supplied {
        Some(s) if !s.is_empty() && constant_time_eq(s, &expected) => Ok(()),
        _ => Err(Error::Unauthorized(UnauthorizedReason::InvalidToken)),
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
