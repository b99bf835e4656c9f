use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::{error_response, AppState};

/// JWT claims. The token is only a signed, expiring wrapper around an API key.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub api_key: String,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies HS256 access tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: chrono::Duration,
}

impl JwtService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: chrono::Duration::hours(expiry_hours),
        }
    }

    pub fn create_token(&self, api_key: &str) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            api_key: api_key.to_string(),
            exp: (now + self.expiry).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify signature and expiry
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(char::is_whitespace)?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// `api_key` parameter from a raw query string
pub fn query_api_key(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == "api_key")
        .map(|(_, value)| value.into_owned())
}

/// A request carrying a valid API key, either in a bearer JWT or in `?api_key=`
pub struct ApiKeyAuth {
    pub api_key: String,
}

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let from_token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .and_then(|token| match state.jwt.verify_token(token) {
                Ok(claims) => Some(claims.api_key),
                Err(e) => {
                    debug!("Rejected bearer token: {}", e);
                    None
                }
            });

        if let Some(api_key) = from_token {
            if state.keys.validate(&api_key).await {
                return Ok(ApiKeyAuth { api_key });
            }
        }

        if let Some(api_key) = parts.uri.query().and_then(query_api_key) {
            if state.keys.validate(&api_key).await {
                return Ok(ApiKeyAuth { api_key });
            }
        }

        Err(error_response(StatusCode::UNAUTHORIZED, "Invalid or missing API key"))
    }
}
