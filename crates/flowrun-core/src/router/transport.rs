//! The outbound HTTP seam.
//!
//! The router never talks to the network directly. It hands an assembled
//! [`HttpRequest`] and an optional [`AuthScheme`] to an [`HttpTransport`].

use std::collections::BTreeMap;

use base64::Engine as _;
use flowrun_types::credential::CredentialData;
use serde_json::Value;

use super::error::RequestError;
use super::request::HttpRequest;

/// A received response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON when the body is JSON, otherwise the body as a string.
    pub body: Value,
    pub raw: Vec<u8>,
}

impl HttpResponse {
    /// Build a response from raw bytes, parsing JSON where possible.
    pub fn from_bytes(status: u16, headers: BTreeMap<String, String>, raw: Vec<u8>) -> Self {
        let body = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&raw).into_owned()))
        };
        Self {
            status,
            headers,
            body,
            raw,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        let raw = serde_json::to_vec(&body).unwrap_or_default();
        Self {
            status,
            headers: BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body,
            raw,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// Shape exposed to post-receive expressions as `$response`.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "statusCode": self.status,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

/// Transport-level authentication derived from a credential.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer(String),
    Basic { username: String, password: String },
    Header { name: String, value: String },
    Query { name: String, value: String },
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Header { name, .. } => f
                .debug_struct("Header")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
            Self::Query { name, .. } => f
                .debug_struct("Query")
                .field("name", name)
                .field("value", &"[REDACTED]")
                .finish(),
        }
    }
}

impl AuthScheme {
    /// Pick an authentication scheme from a credential's fields.
    ///
    /// Checked in order: a token field, username/password, an explicit
    /// header pair, an explicit query pair, a bare API key.
    pub fn from_credential(credential: &CredentialData) -> Result<Self, RequestError> {
        if let Some(token) = ["token", "accessToken", "apiToken"]
            .iter()
            .find_map(|key| credential.get(key))
        {
            return Ok(Self::Bearer(token.to_string()));
        }
        if let (Some(username), Some(password)) = (
            credential.get("user").or_else(|| credential.get("username")),
            credential.get("password"),
        ) {
            return Ok(Self::Basic {
                username: username.to_string(),
                password: password.to_string(),
            });
        }
        if let (Some(name), Some(value)) =
            (credential.get("headerName"), credential.get("headerValue"))
        {
            return Ok(Self::Header {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        if let (Some(name), Some(value)) =
            (credential.get("queryName"), credential.get("queryValue"))
        {
            return Ok(Self::Query {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
        if let Some(key) = credential.get("apiKey") {
            return Ok(Self::Header {
                name: "X-API-Key".to_string(),
                value: key.to_string(),
            });
        }
        Err(RequestError::Credentials(format!(
            "credential has no usable authentication fields (found: {})",
            credential.keys().collect::<Vec<_>>().join(", ")
        )))
    }

    /// Fold the scheme into a request as a header or query parameter.
    pub fn apply(&self, request: &mut HttpRequest) {
        match self {
            Self::Bearer(token) => request
                .headers
                .push(("Authorization".to_string(), format!("Bearer {token}"))),
            Self::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                request
                    .headers
                    .push(("Authorization".to_string(), format!("Basic {encoded}")));
            }
            Self::Header { name, value } => request.headers.push((name.clone(), value.clone())),
            Self::Query { name, value } => {
                request
                    .query
                    .get_or_insert_with(Default::default)
                    .insert(name.clone(), Value::String(value.clone()));
            }
        }
    }
}

/// Sends assembled requests.
///
/// Implementations return `Ok` for every received response, whatever its
/// status; the router decides what counts as failure.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
        auth: Option<&AuthScheme>,
    ) -> impl std::future::Future<Output = Result<HttpResponse, RequestError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cred(pairs: &[(&str, &str)]) -> CredentialData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request() -> HttpRequest {
        HttpRequest {
            method: "GET".to_string(),
            url: "https://api.example.com".to_string(),
            headers: Vec::new(),
            query: None,
            body: None,
        }
    }

    #[test]
    fn from_credential_picks_scheme() {
        assert_eq!(
            AuthScheme::from_credential(&cred(&[("accessToken", "t")])).unwrap(),
            AuthScheme::Bearer("t".to_string())
        );
        assert!(matches!(
            AuthScheme::from_credential(&cred(&[("user", "u"), ("password", "p")])).unwrap(),
            AuthScheme::Basic { .. }
        ));
        assert_eq!(
            AuthScheme::from_credential(&cred(&[("apiKey", "k")])).unwrap(),
            AuthScheme::Header {
                name: "X-API-Key".to_string(),
                value: "k".to_string()
            }
        );
        assert!(matches!(
            AuthScheme::from_credential(&cred(&[("domain", "x")])),
            Err(RequestError::Credentials(_))
        ));
    }

    #[test]
    fn basic_auth_is_base64_encoded() {
        let mut req = request();
        AuthScheme::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        }
        .apply(&mut req);
        assert_eq!(
            req.headers,
            vec![("Authorization".to_string(), "Basic dXNlcjpwYXNz".to_string())]
        );
    }

    #[test]
    fn query_auth_creates_query() {
        let mut req = request();
        AuthScheme::Query {
            name: "api_key".to_string(),
            value: "k".to_string(),
        }
        .apply(&mut req);
        assert_eq!(req.query.unwrap().get("api_key"), Some(&json!("k")));
    }

    #[test]
    fn debug_redacts_secrets() {
        let shown = format!("{:?}", AuthScheme::Bearer("secret-token".to_string()));
        assert!(!shown.contains("secret-token"));
    }

    #[test]
    fn from_bytes_falls_back_to_string() {
        let resp = HttpResponse::from_bytes(200, BTreeMap::new(), b"plain".to_vec());
        assert_eq!(resp.body, json!("plain"));
        let resp = HttpResponse::from_bytes(200, BTreeMap::new(), br#"{"a":1}"#.to_vec());
        assert_eq!(resp.body, json!({ "a": 1 }));
        let resp = HttpResponse::from_bytes(204, BTreeMap::new(), Vec::new());
        assert_eq!(resp.body, Value::Null);
    }
}
