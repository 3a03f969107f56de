//! Keystone authentication
//!
//! Exchanges password or token credentials for a scoped Keystone v3 token
//! and caches it together with the service catalog until shortly before it
//! expires.

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::catalog::ServiceCatalog;
use super::http::{ApiError, OtcHttpClient};
use super::profile::AuthConfig;
use crate::args::Sensitive;

/// Refresh tokens this long before Keystone says they expire, so a token
/// never lapses in the middle of a wait loop
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;

/// Header Keystone returns the issued token in
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Supported `auth_type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Password,
    Token,
}

impl AuthType {
    pub fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        match value.unwrap_or("password") {
            "password" | "v3password" => Ok(Self::Password),
            "token" | "v3token" => Ok(Self::Token),
            other => Err(ApiError::Config(format!("unsupported auth_type '{}'", other))),
        }
    }
}

#[derive(Clone)]
struct CachedToken {
    token: Sensitive<String>,
    /// When this token expires (with buffer applied)
    expires_at: DateTime<Utc>,
    project_id: String,
    catalog: ServiceCatalog,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Keystone credentials holder with token caching
#[derive(Clone)]
pub struct OtcCredentials {
    auth: AuthConfig,
    auth_type: AuthType,
    http: OtcHttpClient,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl OtcCredentials {
    pub fn new(auth: AuthConfig, auth_type: AuthType, http: OtcHttpClient) -> Result<Self, ApiError> {
        if auth.auth_url.is_none() {
            return Err(ApiError::Config("auth.auth_url is required".to_string()));
        }
        Ok(Self {
            auth,
            auth_type,
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Current token, issuing a new one if the cached one is about to expire
    pub async fn get_token(&self) -> Result<Sensitive<String>, ApiError> {
        Ok(self.session().await?.token)
    }

    pub async fn project_id(&self) -> Result<String, ApiError> {
        Ok(self.session().await?.project_id)
    }

    pub async fn catalog(&self) -> Result<ServiceCatalog, ApiError> {
        Ok(self.session().await?.catalog)
    }

    /// Drop the cached token and authenticate again
    pub async fn refresh_token(&self) -> Result<Sensitive<String>, ApiError> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }

    async fn session(&self) -> Result<CachedToken, ApiError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let issued = self.issue().await?;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(issued.clone());
        }
        tracing::debug!("New token cached, valid until {}", issued.expires_at);

        Ok(issued)
    }

    async fn issue(&self) -> Result<CachedToken, ApiError> {
        let auth_url = self.auth.auth_url.as_deref().unwrap_or_default();
        let url = format!("{}/auth/tokens", auth_url.trim_end_matches('/'));
        let body = token_request(&self.auth, self.auth_type)?;

        let response = self.http.send(Method::POST, &url, None, Some(&body)).await?;

        let token = response
            .headers
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| Sensitive::new(s.to_string()))
            .ok_or_else(|| ApiError::Decode(format!("missing {} header", SUBJECT_TOKEN_HEADER)))?;

        let payload = response
            .body
            .get("token")
            .ok_or_else(|| ApiError::Decode("missing 'token' in Keystone response".to_string()))?;

        let expires_at = payload
            .get("expires_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|| Utc::now() + Duration::hours(1))
            - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS);

        let project_id = payload
            .pointer("/project/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.auth.project_id.clone())
            .ok_or_else(|| ApiError::Decode("token is not scoped to a project".to_string()))?;

        let catalog = ServiceCatalog::from_token(payload);

        Ok(CachedToken {
            token,
            expires_at,
            project_id,
            catalog,
        })
    }
}

/// Keystone v3 `POST /auth/tokens` body
fn token_request(auth: &AuthConfig, auth_type: AuthType) -> Result<Value, ApiError> {
    let identity = match auth_type {
        AuthType::Password => {
            let password = auth
                .password
                .as_ref()
                .ok_or_else(|| ApiError::Config("auth.password is required".to_string()))?;

            let mut user = serde_json::Map::new();
            if let Some(id) = &auth.user_id {
                user.insert("id".into(), json!(id));
            } else if let Some(name) = &auth.username {
                user.insert("name".into(), json!(name));
                user.insert(
                    "domain".into(),
                    domain_ref(
                        auth.user_domain_id.as_ref().or(auth.domain_id.as_ref()),
                        auth.user_domain_name.as_ref().or(auth.domain_name.as_ref()),
                    )
                    .ok_or_else(|| ApiError::Config("auth.user_domain_name is required".to_string()))?,
                );
            } else {
                return Err(ApiError::Config("auth.username or auth.user_id is required".to_string()));
            }
            user.insert("password".into(), json!(password.expose()));

            json!({ "methods": ["password"], "password": { "user": user } })
        }
        AuthType::Token => {
            let token = auth
                .token
                .as_ref()
                .ok_or_else(|| ApiError::Config("auth.token is required".to_string()))?;
            json!({ "methods": ["token"], "token": { "id": token.expose() } })
        }
    };

    let scope = if let Some(id) = &auth.project_id {
        json!({ "project": { "id": id } })
    } else if let Some(name) = &auth.project_name {
        let domain = domain_ref(
            auth.project_domain_id.as_ref().or(auth.user_domain_id.as_ref()),
            auth.project_domain_name
                .as_ref()
                .or(auth.user_domain_name.as_ref())
                .or(auth.domain_name.as_ref()),
        )
        .ok_or_else(|| ApiError::Config("auth.project_domain_name is required".to_string()))?;
        json!({ "project": { "name": name, "domain": domain } })
    } else {
        return Err(ApiError::Config("auth.project_name or auth.project_id is required".to_string()));
    };

    Ok(json!({ "auth": { "identity": identity, "scope": scope } }))
}

fn domain_ref(id: Option<&String>, name: Option<&String>) -> Option<Value> {
    match (id, name) {
        (Some(id), _) => Some(json!({ "id": id })),
        (None, Some(name)) => Some(json!({ "name": name })),
        (None, None) => None,
    }
}
