use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Resolves a login token into a user identity. OAuth verification itself is
/// out of scope here; the default implementation only checks the token
/// against the allow list already loaded by the hub's `AllowList`.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedUser>;
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Pass-through verifier: treats the token as the user's email directly.
/// Real OAuth token exchange would replace this without touching callers.
pub struct PassThroughVerifier;

#[async_trait]
impl IdentityVerifier for PassThroughVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser> {
        let email = token.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(anyhow::anyhow!("malformed login token"));
        }
        Ok(VerifiedUser {
            id: email.clone(),
            email: email.clone(),
            name: email,
        })
    }
}
