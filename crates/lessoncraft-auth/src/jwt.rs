//! HS256 JWT issuing and validation.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lessoncraft_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, Result};

/// A user's role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May take lessons.
    Learner,
    /// May author and edit lessons.
    Educator,
    /// Full control, including playground administration.
    Admin,
}

impl Role {
    /// Whether this role may author lessons.
    #[must_use]
    pub fn can_author(self) -> bool {
        self >= Self::Educator
    }

    /// Whether this role may administer playgrounds.
    #[must_use]
    pub fn is_admin(self) -> bool {
        self == Self::Admin
    }
}

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret shared between issue and validate.
    pub secret: String,
    /// Issuer claim.
    pub issuer: String,
    /// Token lifetime.
    pub token_ttl: Duration,
}

impl AuthConfig {
    /// Config with the given secret and defaults for the rest.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "lessoncraft".to_string(),
            token_ttl: Duration::hours(24),
        }
    }
}

/// Validated claims extracted from a JWT.
#[derive(Debug, Clone)]
pub struct ValidatedClaims {
    /// The authenticated user.
    pub user_id: UserId,
    /// The user's role.
    pub role: Role,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    iss: String,
    sub: String,
    role: Role,
    exp: i64,
    iat: i64,
}

/// Issues and validates HS256 tokens with a shared secret.
pub struct TokenService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    /// Create a token service from config.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Issue a token for a user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenGeneration`] if encoding fails.
    pub fn issue(&self, user_id: &UserId, role: Role) -> Result<String> {
        let now = Utc::now();
        let claims = RawClaims {
            iss: self.config.issuer.clone(),
            sub: user_id.to_string(),
            role,
            exp: (now + self.config.token_ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    /// Validate a token and extract its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is expired, forged, or malformed.
    pub fn validate(&self, token: &str) -> Result<ValidatedClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.validate_exp = true;

        let data =
            decode::<RawClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                        AuthError::InvalidSignature
                    }
                    _ => AuthError::InvalidToken(e.to_string()),
                }
            })?;

        let claims = data.claims;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::MissingClaim("exp".to_string()))?;

        Ok(ValidatedClaims {
            user_id: UserId::new(claims.sub),
            role: claims.role,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(AuthConfig::new("test-secret"))
    }

    #[test]
    fn issue_and_validate_roundtrip() {
        let service = service();
        let user = UserId::new("github-1234");

        let token = service.issue(&user, Role::Educator).unwrap();
        let claims = service.validate(&token).unwrap();

        assert_eq!(claims.user_id, user);
        assert_eq!(claims.role, Role::Educator);
        assert!(claims.expires_at > Utc::now());
    }

    #[test]
    fn forged_token_rejected() {
        let token = service().issue(&UserId::new("u"), Role::Learner).unwrap();

        let other = TokenService::new(AuthConfig::new("different-secret"));
        assert!(matches!(
            other.validate(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let config = AuthConfig {
            token_ttl: Duration::seconds(-120),
            ..AuthConfig::new("test-secret")
        };
        let service = TokenService::new(config);

        let token = service.issue(&UserId::new("u"), Role::Learner).unwrap();
        assert!(matches!(
            service.validate(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(matches!(
            service().validate("not.a.jwt"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn role_privileges() {
        assert!(Role::Admin.is_admin());
        assert!(Role::Admin.can_author());
        assert!(Role::Educator.can_author());
        assert!(!Role::Educator.is_admin());
        assert!(!Role::Learner.can_author());
    }
}
