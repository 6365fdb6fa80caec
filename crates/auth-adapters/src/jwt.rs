//! HS256 session tokens carrying the user id as `sub`.

use chrono::{TimeDelta, Utc};
use domains::{DomainError, DomainResult, TokenIssuer};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub ttl: TimeDelta,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error)]
enum TokenError {
    #[error("could not sign session token: {0}")]
    Sign(jsonwebtoken::errors::Error),

    #[error("invalid session token")]
    Rejected(#[source] jsonwebtoken::errors::Error),

    #[error("session token subject is not a user id")]
    Subject,
}

impl From<TokenError> for DomainError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Sign(e) => DomainError::internal(e),
            TokenError::Rejected(ref source) => {
                debug!(reason = %source, "session token rejected");
                DomainError::Unauthorized(err.to_string())
            }
            TokenError::Subject => DomainError::Unauthorized(err.to_string()),
        }
    }
}

pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    settings: JwtSettings,
}

impl JwtTokenIssuer {
    pub fn new(settings: JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);

        Self {
            encoding: EncodingKey::from_secret(&settings.secret),
            decoding: DecodingKey::from_secret(&settings.secret),
            validation,
            settings,
        }
    }

    fn claims_for(&self, user_id: Uuid) -> Claims {
        let now = Utc::now();
        Claims {
            sub: user_id.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: (now + self.settings.ttl).timestamp(),
        }
    }
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(&self, user_id: Uuid) -> DomainResult<String> {
        let token = encode(&Header::new(Algorithm::HS256), &self.claims_for(user_id), &self.encoding)
            .map_err(TokenError::Sign)?;
        Ok(token)
    }

    fn verify(&self, token: &str) -> DomainResult<Uuid> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Rejected)?;
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Subject)?;
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.as_bytes().to_vec(),
            issuer: "communiverse".into(),
            audience: "communiverse-web".into(),
            ttl: TimeDelta::hours(12),
        }
    }

    #[test]
    fn issued_token_carries_the_user() {
        let issuer = JwtTokenIssuer::new(settings("top-secret"));
        let user = Uuid::now_v7();
        let token = issuer.issue(user).unwrap();
        assert_eq!(issuer.verify(&token).unwrap(), user);
    }

    #[test]
    fn foreign_signature_is_unauthorized() {
        let ours = JwtTokenIssuer::new(settings("top-secret"));
        let theirs = JwtTokenIssuer::new(settings("another-secret"));
        let token = theirs.issue(Uuid::now_v7()).unwrap();

        assert!(matches!(ours.verify(&token), Err(DomainError::Unauthorized(_))));
        assert!(matches!(ours.verify("not.a.jwt"), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let mut expired = settings("top-secret");
        expired.ttl = TimeDelta::hours(-2);
        let issuer = JwtTokenIssuer::new(expired);
        let token = issuer.issue(Uuid::now_v7()).unwrap();

        assert!(matches!(issuer.verify(&token), Err(DomainError::Unauthorized(_))));
    }

    #[test]
    fn audience_must_match() {
        let issuer = JwtTokenIssuer::new(settings("top-secret"));
        let mut other = settings("top-secret");
        other.audience = "admin-console".into();
        let token = JwtTokenIssuer::new(other).issue(Uuid::now_v7()).unwrap();

        assert!(issuer.verify(&token).is_err());
    }
}
