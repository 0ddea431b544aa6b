//! Token verification and permission lookup seams.
//!
//! The admission core treats both as external collaborators: the verifier
//! turns a raw bearer token into a [`Principal`] or fails, and the
//! permission lookup enriches a principal with its permission set. Neither
//! is consulted for authentication decisions beyond that.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::InvalidTokenError;

/// The authenticated identity decoded from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject identifier (JWT `sub` claim in the bundled verifier).
    pub subject: String,
    /// Permission strings, order-irrelevant.
    pub permissions: HashSet<String>,
}

/// Verifies a raw token string and decodes its principal.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, raw: &str) -> Result<Principal, InvalidTokenError>;
}

/// Asynchronous permission lookup for a subject.
///
/// The lookup may suspend (network, database); cancellation of the owning
/// request simply abandons the call.
#[async_trait]
pub trait PermissionLookup: Send + Sync {
    async fn permissions_for(&self, subject: &str) -> HashSet<String>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// Bundled HMAC-SHA256 JWT verifier.
///
/// Shares a symmetric secret with the token issuer. Only HS256 is accepted;
/// restricting to a single algorithm prevents algorithm-confusion attacks.
pub struct HmacJwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl HmacJwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `sub` is the only claim this core consumes.
        validation.set_required_spec_claims(&["sub", "exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenVerifier for HmacJwtVerifier {
    fn verify(&self, raw: &str) -> Result<Principal, InvalidTokenError> {
        let data = jsonwebtoken::decode::<Claims>(raw, &self.key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => InvalidTokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => InvalidTokenError::BadSignature,
                _ => InvalidTokenError::Malformed(e.to_string()),
            },
        )?;

        Ok(Principal {
            subject: data.claims.sub,
            permissions: HashSet::new(),
        })
    }
}

/// In-memory permission table, loaded from config. Suitable for tests and
/// single-node deployments; production deployments substitute their own
/// [`PermissionLookup`] implementation.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    table: HashMap<String, HashSet<String>>,
}

impl StaticPermissions {
    pub fn new(table: HashMap<String, Vec<String>>) -> Self {
        Self {
            table: table
                .into_iter()
                .map(|(subject, perms)| (subject, perms.into_iter().collect()))
                .collect(),
        }
    }
}

#[async_trait]
impl PermissionLookup for StaticPermissions {
    async fn permissions_for(&self, subject: &str) -> HashSet<String> {
        self.table.get(subject).cloned().unwrap_or_default()
    }
}

/// Enrich a verified principal with its permissions.
pub async fn enrich_principal(
    lookup: &Arc<dyn PermissionLookup>,
    mut principal: Principal,
) -> Principal {
    principal.permissions = lookup.permissions_for(&principal.subject).await;
    principal
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: u64,
    }

    fn mint(secret: &str, sub: &str, exp: u64) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> u64 {
        4_102_444_800 // 2100-01-01
    }

    #[test]
    fn verifies_valid_token() {
        let verifier = HmacJwtVerifier::new("test-secret");
        let token = mint("test-secret", "alice", far_future());

        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.subject, "alice");
    }

    #[test]
    fn rejects_wrong_secret() {
        let verifier = HmacJwtVerifier::new("test-secret");
        let token = mint("other-secret", "alice", far_future());

        assert!(matches!(
            verifier.verify(&token),
            Err(InvalidTokenError::BadSignature)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let verifier = HmacJwtVerifier::new("test-secret");
        let token = mint("test-secret", "alice", 1_000_000);

        assert!(matches!(
            verifier.verify(&token),
            Err(InvalidTokenError::Expired)
        ));
    }

    #[test]
    fn rejects_garbage() {
        let verifier = HmacJwtVerifier::new("test-secret");
        assert!(matches!(
            verifier.verify("not-a-jwt"),
            Err(InvalidTokenError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn static_permissions_lookup() {
        let mut table = HashMap::new();
        table.insert("alice".to_string(), vec!["read".to_string(), "write".to_string()]);
        let lookup = StaticPermissions::new(table);

        let perms = lookup.permissions_for("alice").await;
        assert!(perms.contains("read"));
        assert!(perms.contains("write"));
        assert!(lookup.permissions_for("bob").await.is_empty());
    }
}
