use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use aid_core::{Error, Result};

/// Verified caller identity, as produced by the external identity provider.
#[derive(Debug, Clone)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

/// Boundary seam for bearer-credential verification. The web layer never
/// parses credentials itself; it trusts whatever identity this yields.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Development verifier accepting `uid:email` tokens verbatim. Stands in
/// for the real provider in local runs and tests; do not deploy.
pub struct DevTokenVerifier;

#[async_trait]
impl IdentityVerifier for DevTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let (uid, email) = token
            .split_once(':')
            .ok_or_else(|| Error::Unauthorized("Invalid token".to_string()))?;
        if uid.is_empty() {
            return Err(Error::Unauthorized("Invalid token".to_string()));
        }
        Ok(Identity {
            uid: uid.to_string(),
            email: email.to_string(),
            email_verified: true,
        })
    }
}

/// Extract and verify the bearer token from the request headers.
pub async fn authenticate(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<Identity> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("Missing or invalid token format".to_string()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthorized("Missing or invalid token format".to_string()))?;
    verifier.verify(token).await
}
