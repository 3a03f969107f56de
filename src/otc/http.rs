//! HTTP utilities for OTC REST API calls

use reqwest::header::HeaderMap;
use reqwest::{Certificate, Client, Identity, Method};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Maximum length of a remote error message carried into an error
const MAX_ERROR_MESSAGE_LENGTH: usize = 300;

/// Header carrying the Keystone token on requests
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Remote or transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("multiple {kind} resources named '{name}'")]
    Duplicate { kind: String, name: String },

    #[error("no endpoint for service '{0}'")]
    MissingEndpoint(String),

    #[error("client configuration: {0}")]
    Config(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = floor_char_boundary(body, MAX_LOG_BODY_LENGTH);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Pull a human-readable message out of the various OTC error shapes:
/// `{"error": {"message"}}`, `{"NeutronError": {"message"}}`,
/// `{"error_msg"}`, `{"message"}`, `{"badRequest": {"message"}}` ...
pub fn extract_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("error_msg")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error_description"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                v.as_object()?.values().find_map(|inner| {
                    inner
                        .get("message")
                        .or_else(|| inner.get("error_msg"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
            })
            .or_else(|| v.get("error").and_then(Value::as_str).map(str::to_string))
    });

    let message = message.unwrap_or_else(|| body.trim().to_string());
    let message: String = message
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(MAX_ERROR_MESSAGE_LENGTH)
        .collect();
    if message.is_empty() {
        "no error details returned".to_string()
    } else {
        message
    }
}

/// TLS and timeout options for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            verify: true,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            timeout: None,
        }
    }
}

/// Decoded response: headers plus JSON body (null when empty)
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub headers: HeaderMap,
    pub body: Value,
}

/// HTTP client wrapper for OTC API calls
#[derive(Clone)]
pub struct OtcHttpClient {
    client: Client,
}

impl OtcHttpClient {
    /// Create a new HTTP client
    pub fn new(options: &HttpOptions) -> Result<Self, ApiError> {
        let mut builder = Client::builder()
            .user_agent(concat!("otcmod/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!options.verify);

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(path) = &options.ca_cert {
            let pem = std::fs::read(path)
                .map_err(|e| ApiError::Config(format!("cannot read CA bundle {}: {}", path.display(), e)))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| ApiError::Config(format!("invalid CA bundle {}: {}", path.display(), e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if let Some(cert_path) = &options.client_cert {
            let mut pem = std::fs::read(cert_path).map_err(|e| {
                ApiError::Config(format!("cannot read client certificate {}: {}", cert_path.display(), e))
            })?;
            if let Some(key_path) = &options.client_key {
                let key = std::fs::read(key_path)
                    .map_err(|e| ApiError::Config(format!("cannot read client key: {}", e)))?;
                pem.push(b'\n');
                pem.extend_from_slice(&key);
            }
            let identity = Identity::from_pem(&pem)
                .map_err(|e| ApiError::Config(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Send a request and decode the JSON response
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<HttpResponse, ApiError> {
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), url)
            .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(describe_transport_error(&e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} {} -> {} - {}", method, url, status, sanitize_for_log(&text));
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: extract_error_message(&text),
            });
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ApiError::Decode(format!("failed to parse response JSON: {}", e)))?
        };

        Ok(HttpResponse { headers, body })
    }

    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        Ok(self.send(Method::GET, url, Some(token), None).await?.body)
    }

    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        Ok(self.send(Method::POST, url, Some(token), body).await?.body)
    }

    pub async fn put(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        Ok(self.send(Method::PUT, url, Some(token), body).await?.body)
    }

    pub async fn patch(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        Ok(self.send(Method::PATCH, url, Some(token), body).await?.body)
    }

    pub async fn delete(&self, url: &str, token: &str) -> Result<Value, ApiError> {
        Ok(self.send(Method::DELETE, url, Some(token), None).await?.body)
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    }
}

/// Append query parameters to a URL
pub fn add_query_params(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    if url.contains('?') {
        format!("{}&{}", url, query)
    } else {
        format!("{}?{}", url, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_error_message_shapes() {
        assert_eq!(
            extract_error_message(r#"{"NeutronError": {"message": "Security group not found", "type": "x"}}"#),
            "Security group not found"
        );
        assert_eq!(
            extract_error_message(r#"{"error_code": "DBS.200001", "error_msg": "Invalid flavor"}"#),
            "Invalid flavor"
        );
        assert_eq!(
            extract_error_message(r#"{"error": {"code": 401, "message": "Unauthorized"}}"#),
            "Unauthorized"
        );
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
        assert_eq!(extract_error_message(""), "no error details returned");
    }

    #[test]
    fn test_sanitize_truncates() {
        let body = "x".repeat(500);
        let sanitized = sanitize_for_log(&body);
        assert!(sanitized.contains("truncated, 500 bytes total"));
    }

    #[test]
    fn test_add_query_params() {
        let params = vec![
            ("name".to_string(), "sg a".to_string()),
            ("limit".to_string(), "100".to_string()),
        ];
        assert_eq!(
            add_query_params("https://vpc.eu-de.otc.t-systems.com/v2.0/security-groups", &params),
            "https://vpc.eu-de.otc.t-systems.com/v2.0/security-groups?name=sg%20a&limit=100"
        );
        assert_eq!(add_query_params("https://x/y?a=1", &params[1..]), "https://x/y?a=1&limit=100");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(ApiError::Status { status: 404, message: String::new() }.is_not_found());
        assert!(!ApiError::Transport("x".to_string()).is_not_found());
    }
}
