//! Authentication middleware and session token verification

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::app::AppState;
use crate::game::PlayerId;
use crate::ws::hub::PlayerIdentity;

type HmacSha256 = Hmac<Sha256>;

fn unix_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Session token claims issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (player id)
    pub sub: PlayerId,
    /// Display name, if the provider knows one
    #[serde(default)]
    pub name: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

impl JwtClaims {
    /// Identity carried by the token; falls back to `Player_<id prefix>` for the name
    pub fn identity(&self) -> PlayerIdentity {
        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_display_name(&self.sub),
        };
        PlayerIdentity {
            id: self.sub.clone(),
            name,
        }
    }
}

fn default_display_name(player_id: &str) -> String {
    let prefix: String = player_id.chars().take(8).collect();
    format!("Player_{}", prefix)
}

/// Verify an HS256 token and extract its claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<JwtClaims, AuthError> {
    let mut parts = token.split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) => (h, p, s),
            _ => return Err(AuthError::InvalidToken),
        };

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;
    let claims: JwtClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    if claims.exp < unix_secs() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Extract JWT from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Invalid authorization header format")]
    InvalidFormat,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::InvalidFormat => StatusCode::BAD_REQUEST,
            AuthError::MissingHeader | AuthError::InvalidToken | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
        };

        (status, self.to_string()).into_response()
    }
}

/// Authenticated player, inserted into request extensions by [`require_auth`]
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub player_id: PlayerId,
    pub display_name: String,
}

impl From<PlayerIdentity> for AuthenticatedUser {
    fn from(identity: PlayerIdentity) -> Self {
        Self {
            player_id: identity.id,
            display_name: identity.name,
        }
    }
}

/// Middleware to require authentication
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;

    let token = extract_bearer_token(auth_header).ok_or(AuthError::InvalidFormat)?;
    let claims = verify_jwt(token, &state.config.auth_secret)?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser::from(claims.identity()));

    Ok(next.run(request).await)
}

/// Sign claims the way the identity provider does; used by tests
#[cfg(test)]
pub(crate) fn sign_jwt(claims: &JwtClaims, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", header, payload).as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{}.{}.{}", header, payload, signature)
}

#[cfg(test)]
pub(crate) fn test_claims(sub: &str, name: Option<&str>) -> JwtClaims {
    let now = unix_secs();
    JwtClaims {
        sub: sub.to_string(),
        name: name.map(str::to_string),
        exp: now + 3600,
        iat: now,
    }
}
