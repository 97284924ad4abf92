use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{config::JwtConfig, state::AppState};

/// What a signed token is allowed to be used for. A token is only accepted
/// by the endpoint whose expected purpose matches.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    EmailConfirm,
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
    pub purpose: TokenPurpose,
    /// Password-hash fingerprint, present on password-reset tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Malformed token")]
    Malformed,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub confirm_ttl: Duration,
    pub reset_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            access_ttl_minutes,
            confirm_ttl_hours,
            reset_ttl_hours,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            confirm_ttl: Duration::from_secs((confirm_ttl_hours as u64) * 3600),
            reset_ttl: Duration::from_secs((reset_ttl_hours as u64) * 3600),
        }
    }
}

impl JwtKeys {
    fn sign_with(
        &self,
        user_id: Uuid,
        purpose: TokenPurpose,
        ttl: Duration,
        pwd: Option<String>,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            purpose,
            pwd,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, purpose = ?purpose, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with(user_id, TokenPurpose::Access, self.access_ttl, None)
    }

    pub fn sign_email_confirm(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with(user_id, TokenPurpose::EmailConfirm, self.confirm_ttl, None)
    }

    /// Reset tokens embed a fingerprint of the hash they were issued against,
    /// which invalidates them once the password actually changes.
    pub fn sign_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> anyhow::Result<String> {
        self.sign_with(
            user_id,
            TokenPurpose::PasswordReset,
            self.reset_ttl,
            Some(super::password::password_fingerprint(password_hash)),
        )
    }

    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(map_jwt_error)?;
        if data.claims.purpose != expected {
            return Err(TokenError::Invalid);
        }
        debug!(user_id = %data.claims.sub, purpose = ?data.claims.purpose, "jwt verified");
        Ok(data.claims)
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenError::Malformed,
        _ => TokenError::Invalid,
    }
}
