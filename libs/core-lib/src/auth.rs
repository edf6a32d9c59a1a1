//! Bearer-token validation shared by both services. Token issuance lives in
//! the auth service; here we only verify and extract the principal.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::CoreError;
use crate::events::UserRef;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    /// Organization memberships at issue time.
    #[serde(default)]
    pub orgs: Vec<String>,
    pub exp: usize,
}

/// Principal extracted from a valid token.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organizations: HashSet<Uuid>,
}

impl AuthenticatedUser {
    /// Display reference for event payloads.
    pub fn user_ref(&self) -> UserRef {
        UserRef {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

/// Verify an HS256 token and extract the principal. Organization ids that do
/// not parse are dropped rather than failing the whole token.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<AuthenticatedUser, CoreError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| CoreError::Unauthorized(format!("Invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|e| CoreError::Unauthorized(format!("Invalid subject: {}", e)))?;
    let organizations = data
        .claims
        .orgs
        .iter()
        .filter_map(|o| Uuid::parse_str(o).ok())
        .collect();

    Ok(AuthenticatedUser {
        user_id,
        username: data.claims.preferred_username,
        first_name: data.claims.given_name,
        last_name: data.claims.family_name,
        organizations,
    })
}

/// Identity fields baked into an issued token.
#[derive(Debug, Clone, Default)]
pub struct TokenIdentity<'a> {
    pub username: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Mint a token. Used by tests and local tooling; production tokens come
/// from the auth service.
pub fn issue_token(
    user_id: Uuid,
    identity: TokenIdentity<'_>,
    orgs: &[Uuid],
    secret: &[u8],
    ttl_seconds: u64,
) -> Result<String, CoreError> {
    let exp = chrono::Utc::now().timestamp() as usize + ttl_seconds as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        preferred_username: identity.username.map(|s| s.to_string()),
        given_name: identity.first_name.map(|s| s.to_string()),
        family_name: identity.last_name.map(|s| s.to_string()),
        orgs: orgs.iter().map(|o| o.to_string()).collect(),
        exp,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| CoreError::Internal(format!("Failed to sign token: {}", e)))
}

/// Pull the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    #[test]
    fn round_trip() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let identity = TokenIdentity {
            username: Some("ann"),
            first_name: Some("Ann"),
            last_name: Some("Lee"),
        };
        let token = issue_token(user, identity, &[org], SECRET, 60).unwrap();
        let principal = verify_token(&token, SECRET).unwrap();
        assert_eq!(principal.user_id, user);
        assert_eq!(principal.username.as_deref(), Some("ann"));
        assert!(principal.organizations.contains(&org));
        assert_eq!(principal.user_ref().display_name(), "Ann Lee");
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue_token(Uuid::new_v4(), TokenIdentity::default(), &[], SECRET, 60).unwrap();
        let err = verify_token(&token, b"other-secret").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
    }

    #[test]
    fn rejects_expired_token() {
        // jsonwebtoken's default leeway is 60s; go well past it.
        let exp = chrono::Utc::now().timestamp() as usize - 600;
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            preferred_username: None,
            given_name: None,
            family_name: None,
            orgs: vec![],
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        assert!(verify_token(&token, SECRET).is_err());
    }

    #[test]
    fn bad_org_ids_are_dropped_not_fatal() {
        let exp = chrono::Utc::now().timestamp() as usize + 60;
        let good = Uuid::new_v4();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            preferred_username: None,
            given_name: None,
            family_name: None,
            orgs: vec![good.to_string(), "not-a-uuid".into()],
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();
        let principal = verify_token(&token, SECRET).unwrap();
        assert_eq!(principal.organizations.len(), 1);
        assert!(principal.organizations.contains(&good));
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }
}
