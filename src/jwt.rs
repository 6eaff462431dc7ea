use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub token_use: TokenUse,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Arc<Vec<u8>>,
    pub access_exp_hours: i64,
    pub refresh_exp_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let secret =
            std::env::var("JWT_SECRET").map_err(|_| AppError::configuration("JWT_SECRET not set"))?;
        let access_exp_hours = std::env::var("JWT_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(12))
            .map_err(|_| AppError::configuration("JWT_EXP_HOURS must be a valid integer"))?;
        let refresh_exp_hours = std::env::var("JWT_REFRESH_EXP_HOURS")
            .map(|val| val.parse::<i64>())
            .unwrap_or(Ok(24 * 14))
            .map_err(|_| AppError::configuration("JWT_REFRESH_EXP_HOURS must be a valid integer"))?;

        Ok(Self {
            secret: Arc::new(secret.into_bytes()),
            access_exp_hours,
            refresh_exp_hours,
        })
    }

    pub fn encode(&self, user_id: Uuid, token_use: TokenUse) -> Result<String, AppError> {
        use chrono::{Duration, Utc};

        let hours = match token_use {
            TokenUse::Access => self.access_exp_hours,
            TokenUse::Refresh => self.refresh_exp_hours,
        };

        let now = Utc::now();
        let exp = now + Duration::hours(hours);

        let claims = Claims {
            sub: user_id,
            token_use,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|err| AppError::internal(format!("failed to sign token: {err}")))
    }

    /// Verify signature and expiry; expiry is surfaced as its own kind so
    /// the envelope can say "token expired" rather than a generic 401.
    pub fn verify(&self, token: &str, expected_use: TokenUse) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        let claims = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => AppError::token_expired("credential has expired"),
            _ => AppError::unauthorized("invalid credential"),
        })?;

        if claims.token_use != expected_use {
            return Err(AppError::unauthorized("wrong token type for this operation"));
        }

        Ok(claims)
    }
}
