// Copyright 2025 Reflow Contributors (https://github.com/reflow-dev/reflow)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::form_urlencoded;

/// Authentication context attached to each authenticated request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub tenant_id: u64,
    pub user_id: Option<String>,
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid authentication credentials")]
    InvalidCredentials,

    #[error("JWT token validation failed: {0}")]
    JwtValidation(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,    // User ID
    pub tenant_id: u64, // Tenant ID
    pub exp: usize,     // Expiration time
}

/// Authenticator trait for pluggable auth strategies
pub trait Authenticator: Send + Sync {
    /// Authenticate request by examining headers (synchronous)
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError>;
}

/// API Key authenticator
pub struct ApiKeyAuth {
    /// Map of API key -> tenant_id
    keys: std::collections::HashMap<String, u64>,
}

impl ApiKeyAuth {
    pub fn new(api_keys: Vec<String>) -> Self {
        let mut keys = std::collections::HashMap::new();

        for key_config in api_keys {
            // Format: "api_key:tenant_id"
            let parts: Vec<&str> = key_config.split(':').collect();
            if parts.len() >= 2 {
                if let Ok(tenant_id) = parts[1].parse::<u64>() {
                    keys.insert(parts[0].to_string(), tenant_id);
                }
            }
        }

        Self { keys }
    }
}

impl Authenticator for ApiKeyAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let api_key = headers
            .get("X-API-Key")
            .or_else(|| headers.get("X-Reflow-API-Key"))
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let tenant_id = self
            .keys
            .get(api_key)
            .ok_or(AuthError::InvalidCredentials)?;

        Ok(AuthContext {
            tenant_id: *tenant_id,
            user_id: None,
        })
    }
}

/// Bearer token (JWT) authenticator
pub struct BearerTokenAuth {
    jwt_secret: Vec<u8>,
}

impl BearerTokenAuth {
    pub fn new(jwt_secret: String) -> Self {
        Self {
            jwt_secret: jwt_secret.into_bytes(),
        }
    }
}

impl Authenticator for BearerTokenAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingCredentials)?;

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(&self.jwt_secret),
            &jsonwebtoken::Validation::default(),
        )
        .map_err(|e| AuthError::JwtValidation(e.to_string()))?;

        Ok(AuthContext {
            tenant_id: token_data.claims.tenant_id,
            user_id: Some(token_data.claims.sub),
        })
    }
}

/// Multi-strategy authenticator (tries multiple auth methods)
pub struct MultiAuth {
    strategies: Vec<Arc<dyn Authenticator>>,
}

impl MultiAuth {
    pub fn new(strategies: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { strategies }
    }
}

impl Authenticator for MultiAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        for strategy in &self.strategies {
            if let Ok(ctx) = strategy.authenticate(headers) {
                return Ok(ctx);
            }
        }
        Err(AuthError::InvalidCredentials)
    }
}

/// No-op authenticator for development (no auth required)
pub struct NoAuth {
    default_tenant_id: u64,
}

impl NoAuth {
    pub fn new(default_tenant_id: u64) -> Self {
        Self { default_tenant_id }
    }
}

impl Authenticator for NoAuth {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        Ok(AuthContext {
            tenant_id: self.default_tenant_id,
            user_id: None,
        })
    }
}

/// Authentication middleware
///
/// Falls back to an `api_key` query parameter when header auth fails:
/// EventSource clients cannot attach custom headers to the resume request.
pub async fn auth_middleware(
    auth: axum::Extension<Arc<dyn Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    match auth.authenticate(req.headers()) {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            Ok(next.run(req).await)
        }
        Err(primary_err) => {
            if let Some(api_key) = extract_api_key_from_query(req.uri()) {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&api_key) {
                    headers.insert("X-API-Key", value);
                    if let Ok(ctx) = auth.authenticate(&headers) {
                        req.extensions_mut().insert(ctx);
                        return Ok(next.run(req).await);
                    }
                }
            }

            Err(primary_err)
        }
    }
}

fn extract_api_key_from_query(uri: &axum::http::Uri) -> Option<String> {
    let query = uri.query()?;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        let key = key.to_ascii_lowercase();
        if key == "api_key" || key == "x-api-key" {
            return Some(value.into_owned());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_auth() {
        let auth = ApiKeyAuth::new(vec!["test_key:123".to_string(), "other:456".to_string()]);

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", "test_key".parse().unwrap());

        let ctx = auth.authenticate(&headers).unwrap();
        assert_eq!(ctx.tenant_id, 123);
        assert!(ctx.user_id.is_none());
    }

    #[test]
    fn test_api_key_auth_rejects_unknown_key() {
        let auth = ApiKeyAuth::new(vec!["test_key:123".to_string()]);

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", "wrong".parse().unwrap());
        assert!(auth.authenticate(&headers).is_err());
    }

    #[test]
    fn test_no_auth() {
        let auth = NoAuth::new(999);
        let headers = HeaderMap::new();

        let ctx = auth.authenticate(&headers).unwrap();
        assert_eq!(ctx.tenant_id, 999);
    }

    #[test]
    fn test_multi_auth_falls_through() {
        let auth = MultiAuth::new(vec![
            Arc::new(ApiKeyAuth::new(vec!["a:1".to_string()])),
            Arc::new(ApiKeyAuth::new(vec!["b:2".to_string()])),
        ]);

        let mut headers = HeaderMap::new();
        headers.insert("X-API-Key", "b".parse().unwrap());
        let ctx = auth.authenticate(&headers).unwrap();
        assert_eq!(ctx.tenant_id, 2);
    }

    #[test]
    fn test_query_extraction() {
        let uri: axum::http::Uri = "/api/v1/conversations/abc/resume?api_key=secret"
            .parse()
            .unwrap();
        assert_eq!(extract_api_key_from_query(&uri), Some("secret".to_string()));

        let uri: axum::http::Uri = "/api/v1/conversations/abc/resume".parse().unwrap();
        assert_eq!(extract_api_key_from_query(&uri), None);
    }
}
