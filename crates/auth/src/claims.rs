use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::OwnerId;

use crate::Role;

/// JWT claims model (transport-agnostic).
///
/// The subject is the user that owns rows; every data access made on behalf
/// of these claims is scoped to `sub`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject / owning user.
    pub sub: OwnerId,

    /// RBAC roles granted to the user.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Issued-at timestamp. Also read from a numeric `iat`.
    #[serde(alias = "iat", deserialize_with = "timestamp::deserialize")]
    pub issued_at: DateTime<Utc>,

    /// Expiration timestamp. Also read from a numeric `exp`.
    #[serde(alias = "exp", deserialize_with = "timestamp::deserialize")]
    pub expires_at: DateTime<Utc>,
}

/// RFC 3339 strings or seconds since the Unix epoch.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(de)? {
            Raw::Seconds(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| D::Error::custom(format!("timestamp {secs} out of range"))),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("malformed or badly signed token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims.
///
/// Note: this validates the *claims* only. Signature verification lives in
/// [`crate::jwt`].
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.issued_at {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
