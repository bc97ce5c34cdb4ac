use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_models::auth::{JwtClaims, JwtHeader, User};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("JWT secret is not set")]
    MissingSecret,

    #[error("Invalid token format")]
    Malformed,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Invalid claims format")]
    BadClaims,

    #[error("Token expired")]
    Expired,
}

/// Validates an HS256 token issued by the identity provider and maps its
/// claims onto the caller record used by the scheduling handlers.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, TokenError> {
    validate_token_at(token, jwt_secret, Utc::now())
}

pub fn validate_token_at(token: &str, jwt_secret: &str, now: DateTime<Utc>) -> Result<User, TokenError> {
    if jwt_secret.is_empty() {
        return Err(TokenError::MissingSecret);
    }

    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err(TokenError::Malformed),
    };

    let header: JwtHeader = decode_segment(header_b64).ok_or(TokenError::Malformed)?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    }

    verify_signature(header_b64, claims_b64, signature_b64, jwt_secret)?;

    let claims: JwtClaims = decode_segment(claims_b64).ok_or(TokenError::BadClaims)?;

    if let Some(exp) = claims.exp {
        if (exp as i64) < now.timestamp() {
            debug!("Token expired at {} (now: {})", exp, now.timestamp());
            return Err(TokenError::Expired);
        }
    }

    let user = User {
        workplace_id: claims.workplace_id(),
        created_at: claims.iat.and_then(|iat| Utc.timestamp_opt(iat as i64, 0).single()),
        id: claims.sub,
        email: claims.email,
        role: claims.role,
    };

    debug!("Token validated for user {}", user.id);
    Ok(user)
}

fn verify_signature(header_b64: &str, claims_b64: &str, signature_b64: &str, secret: &str) -> Result<(), TokenError> {
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| TokenError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::MissingSecret)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());

    mac.verify_slice(&signature).map_err(|_| {
        debug!("Token signature verification failed");
        TokenError::BadSignature
    })
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Option<T> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}
