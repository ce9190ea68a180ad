//! Caller identity from bearer credentials.
//!
//! Only verification and tenant extraction live here; issuing credentials to
//! people is the job of the surrounding system.

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::core::prelude::*;
use crate::domain::prelude::TenantId;

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user, device or service calling.
    pub sub: String,
    pub tenant_id: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// The verified caller. Every pipeline operation receives the tenant from
/// here explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject: String,
    pub tenant_id: TenantId,
}

/// Sign an HS256 token for `subject` in `tenant_id`.
pub fn issue_token(subject: &str, tenant_id: &TenantId, config: &AuthConfig) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        tenant_id: tenant_id.to_string(),
        iss: config.jwt_issuer.clone(),
        iat: now,
        exp: now + i64::try_from(config.token_lifetime_secs).unwrap_or(i64::MAX / 2),
    };

    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|e| Error::Config(format!("signing token: {e}")))
}

/// Verify signature, expiry and issuer, and extract the caller.
pub fn verify_token(token: &str, config: &AuthConfig) -> Result<CallerIdentity> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.jwt_issuer]);
    validation.set_required_spec_claims(&["sub", "exp", "iss"]);

    let claims = jsonwebtoken::decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                Error::Unauthorized("token has expired".to_string())
            }
            _ => Error::Unauthorized(format!("invalid token: {e}")),
        })?;

    if claims.tenant_id.trim().is_empty() {
        return Err(Error::Unauthorized("token carries no tenant".to_string()));
    }
    Ok(CallerIdentity {
        subject: claims.sub,
        tenant_id: TenantId::new(claims.tenant_id),
    })
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pulls the credential from `Authorization: Bearer`, falling back to a
/// `token` query parameter for clients (browsers) that cannot set headers
/// on a websocket upgrade.
fn credential(parts: &Parts) -> Option<String> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty())
    })
}

impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = credential(parts)
            .ok_or_else(|| Error::Unauthorized("missing bearer credential".to_string()))?;
        verify_token(&token, &state.auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".into(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn token_roundtrip() {
        let config = config();
        let token = issue_token("dashboard-1", &"org1".into(), &config).unwrap();
        let caller = verify_token(&token, &config).unwrap();
        assert_eq!(caller.subject, "dashboard-1");
        assert_eq!(caller.tenant_id, TenantId::from("org1"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("dashboard-1", &"org1".into(), &config()).unwrap();
        let other = AuthConfig {
            jwt_secret: "another-secret".into(),
            ..AuthConfig::default()
        };
        assert!(matches!(verify_token(&token, &other), Err(Error::Unauthorized(_))));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let token = issue_token("dashboard-1", &"org1".into(), &config()).unwrap();
        let other = AuthConfig {
            jwt_issuer: "someone-else".into(),
            ..config()
        };
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = config();
        let past = Utc::now().timestamp() - 3_600;
        let claims = Claims {
            sub: "dashboard-1".into(),
            tenant_id: "org1".into(),
            iss: config.jwt_issuer.clone(),
            iat: past - 60,
            exp: past,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        let err = verify_token(&token, &config).unwrap_err();
        assert_eq!(err.to_string(), "unauthorized: token has expired");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify_token("not-a-jwt", &config()).is_err());
    }

    #[test]
    fn credential_from_header_or_query() {
        let (parts, _) = Request::builder()
            .uri("/v1/live")
            .header(AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(credential(&parts).as_deref(), Some("abc"));

        let (parts, _) = Request::builder()
            .uri("/v1/live?token=xyz")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(credential(&parts).as_deref(), Some("xyz"));

        let (parts, _) = Request::builder().uri("/v1/live").body(()).unwrap().into_parts();
        assert_eq!(credential(&parts), None);
    }
}
