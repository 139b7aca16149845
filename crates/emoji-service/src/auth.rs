//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - a signed-in caller, validated from a JWT
//! - `OptionalAuthUser` - the same, but anonymous callers are allowed
//! - `AdminUser` - a signed-in caller holding the admin capability
//!
//! The admin capability is decided once, when the identity is built: either the
//! token carries an `admin` role or its verified email is in `ADMIN_EMAILS`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use emoji_core::{Capabilities, Identity, UserId};

use crate::error::ApiError;
use crate::handlers::stream::STREAM_PATH;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// How long to cache JWKS keys before refreshing.
const JWKS_CACHE_DURATION: Duration = Duration::from_secs(3600); // 1 hour

/// Timeout for JWKS fetch requests.
const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Role claim value granting the admin capability.
const ADMIN_ROLE: &str = "admin";

/// A signed-in caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The caller's identity and capabilities.
    pub identity: Identity,
}

impl AuthUser {
    /// The caller's user ID.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.identity.user_id
    }
}

/// A caller that may or may not be signed in.
///
/// A present but invalid token is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<Identity>);

/// A signed-in caller with the admin capability.
#[derive(Debug, Clone)]
pub struct AdminUser {
    /// The admin's identity.
    pub identity: Identity,
}

/// Bearer token from the `Authorization` header, or the `access_token` query
/// parameter on the change stream route only.
fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(header) = parts.headers.get("authorization") {
        return header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
    }
    if parts.uri.path() != STREAM_PATH {
        return None;
    }
    parts.uri.query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == "access_token")
            .map(|(_, value)| value.to_string())
    })
}

/// Validate a bearer token and build the caller's identity.
async fn authenticate(token: &str, state: &AppState) -> Result<Identity, ApiError> {
    // Allow test tokens in testing only.
    // This bypass is gated behind #[cfg(test)] or the "test-auth" feature
    // to ensure it is never active in production builds.
    #[cfg(any(test, feature = "test-auth"))]
    {
        if let Some(user) = token.strip_prefix("test-token:") {
            let user_id = user.parse::<UserId>().map_err(|_| ApiError::Unauthorized)?;
            return Ok(Identity::user(user_id));
        }
        if let Some(user) = token.strip_prefix("test-admin:") {
            let user_id = user.parse::<UserId>().map_err(|_| ApiError::Unauthorized)?;
            return Ok(Identity::admin(user_id));
        }
    }

    let claims = validate_jwt(token, state).await?;
    let user_id = claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized)?;

    let admin = claims.roles.iter().any(|r| r == ADMIN_ROLE)
        || claims
            .email
            .as_deref()
            .is_some_and(|email| state.config.is_admin_email(email));

    if admin {
        tracing::info!(user_id = %user_id, "Admin session established");
    }

    Ok(Identity {
        user_id,
        email: claims.email,
        capabilities: Capabilities { admin },
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
            let identity = authenticate(&token, state).await?;
            Ok(AuthUser { identity })
        })
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalAuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            match bearer_token(parts) {
                Some(token) => Ok(OptionalAuthUser(Some(authenticate(&token, state).await?))),
                None => Ok(OptionalAuthUser(None)),
            }
        })
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let AuthUser { identity } = AuthUser::from_request_parts(parts, state).await?;
            if !identity.is_admin() {
                tracing::warn!(user_id = %identity.user_id, "Admin capability required");
                return Err(ApiError::Forbidden);
            }
            Ok(AdminUser { identity })
        })
    }
}

/// JWT claims accepted by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Verified primary email.
    #[serde(default)]
    pub email: Option<String>,
    /// Roles granted by the identity provider.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Audience (can be string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Issuer.
    pub iss: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: i64,
}

// ============================================================================
// JWKS Client and JWT Validation
// ============================================================================

/// JWKS (JSON Web Key Set) response structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    /// List of JWK keys.
    pub keys: Vec<Jwk>,
}

/// Single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (e.g., "RSA").
    pub kty: String,
    /// Key ID.
    pub kid: Option<String>,
    /// RSA public key modulus (base64url encoded).
    pub n: Option<String>,
    /// RSA public key exponent (base64url encoded).
    pub e: Option<String>,
}

struct JwksCache {
    client: reqwest::Client,
    keys: HashMap<String, DecodingKey>,
    default_key: Option<DecodingKey>,
    last_updated: Instant,
}

impl JwksCache {
    fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            keys: HashMap::new(),
            default_key: None,
            last_updated: Instant::now()
                .checked_sub(JWKS_CACHE_DURATION)
                .unwrap_or_else(Instant::now),
        }
    }

    fn is_expired(&self) -> bool {
        self.last_updated.elapsed() >= JWKS_CACHE_DURATION
    }
}

static JWKS_CACHE: std::sync::OnceLock<RwLock<JwksCache>> = std::sync::OnceLock::new();

fn get_jwks_cache() -> &'static RwLock<JwksCache> {
    JWKS_CACHE.get_or_init(|| RwLock::new(JwksCache::new()))
}

/// Validate a JWT token against the JWKS.
async fn validate_jwt(token: &str, state: &AppState) -> Result<JwtClaims, ApiError> {
    let header = decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to decode JWT header");
        ApiError::Unauthorized
    })?;

    let decoding_key = get_decoding_key(header.kid.as_deref(), state).await?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[&state.config.auth_audience]);
    validation.set_issuer(&[&state.config.auth_base_url]);

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthorized
    })?;

    Ok(token_data.claims)
}

/// Get a decoding key from cache or fetch from JWKS endpoint.
async fn get_decoding_key(kid: Option<&str>, state: &AppState) -> Result<DecodingKey, ApiError> {
    let cache = get_jwks_cache();

    {
        let cache_read = cache.read().await;
        if !cache_read.is_expired() {
            if let Some(kid) = kid {
                if let Some(key) = cache_read.keys.get(kid) {
                    return Ok(key.clone());
                }
            } else if let Some(key) = &cache_read.default_key {
                return Ok(key.clone());
            }
        }
    }

    let jwks = fetch_jwks(state).await?;

    let mut cache_write = cache.write().await;
    cache_write.keys.clear();
    cache_write.default_key = None;
    cache_write.last_updated = Instant::now();

    for jwk in &jwks.keys {
        if let Some(decoding_key) = jwk_to_decoding_key(jwk) {
            if let Some(ref key_kid) = jwk.kid {
                cache_write.keys.insert(key_kid.clone(), decoding_key.clone());
            }
            if cache_write.default_key.is_none() {
                cache_write.default_key = Some(decoding_key);
            }
        }
    }

    match kid {
        Some(kid) => cache_write
            .keys
            .get(kid)
            .cloned()
            .ok_or(ApiError::Unauthorized),
        None => cache_write.default_key.clone().ok_or(ApiError::Unauthorized),
    }
}

/// Fetch JWKS from the identity provider.
async fn fetch_jwks(state: &AppState) -> Result<Jwks, ApiError> {
    let jwks_url = format!(
        "{}/.well-known/jwks.json",
        state.config.auth_base_url.trim_end_matches('/')
    );

    tracing::debug!(url = %jwks_url, "Fetching JWKS");

    let client = get_jwks_cache().read().await.client.clone();

    let response = client.get(&jwks_url).send().await.map_err(|e| {
        tracing::error!(error = %e, url = %jwks_url, "Failed to fetch JWKS");
        ApiError::ExternalService("Failed to fetch authentication keys".into())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            status = %response.status(),
            url = %jwks_url,
            "JWKS fetch returned non-success status"
        );
        return Err(ApiError::ExternalService(
            "Failed to fetch authentication keys".into(),
        ));
    }

    let jwks: Jwks = response.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse JWKS response");
        ApiError::ExternalService("Failed to parse authentication keys".into())
    })?;

    tracing::info!(keys_count = %jwks.keys.len(), "JWKS fetched successfully");

    Ok(jwks)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Option<DecodingKey> {
    if jwk.kty != "RSA" {
        tracing::debug!(kty = %jwk.kty, "Skipping non-RSA JWK");
        return None;
    }

    let n = jwk.n.as_ref()?;
    let e = jwk.e.as_ref()?;

    DecodingKey::from_rsa_components(n, e).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(request: Request<()>) -> Parts {
        request.into_parts().0
    }

    #[test]
    fn bearer_from_header() {
        let parts = parts(
            Request::builder()
                .uri("/v1/feed")
                .header("authorization", "Bearer abc")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc"));
    }

    #[test]
    fn bearer_from_query_for_websockets() {
        let parts = parts(
            Request::builder()
                .uri("/v1/feed/stream?x=1&access_token=test-token:user_1")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&parts).as_deref(), Some("test-token:user_1"));
    }

    #[test]
    fn query_token_ignored_outside_stream_route() {
        let parts = parts(
            Request::builder()
                .uri("/v1/credits/balance?access_token=test-token:user_1")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&parts), None);
    }

    #[test]
    fn malformed_header_is_not_a_token() {
        let parts = parts(
            Request::builder()
                .uri("/v1/feed")
                .header("authorization", "Basic abc")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&parts), None);
    }

    #[tokio::test]
    async fn test_tokens_carry_capabilities() {
        let state = AppState::new(
            Arc::new(emoji_store::MemoryStore::new()),
            Arc::new(emoji_store::MemoryBlobStore::new("http://localhost/blobs")),
            crate::ServiceConfig::default(),
        );

        let user = authenticate("test-token:user_1", &state).await.unwrap();
        assert!(!user.is_admin());

        let admin = authenticate("test-admin:user_2", &state).await.unwrap();
        assert!(admin.is_admin());
        assert_eq!(admin.user_id.as_str(), "user_2");
    }
}
